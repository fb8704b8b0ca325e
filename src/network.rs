pub mod interface;
pub mod topology;

pub use interface::{ExpiredNeighbor, FloodTarget, HelloOutcome, Interface, InterfaceTable, Neighbor};
pub use topology::{LsuOutcome, Router, RouterLink, TopologyDb, UNCONFIRMED};
