pub mod dijkstra;
pub mod route_synthesis;

pub use dijkstra::compute_shortest_paths;
pub use route_synthesis::{RouteWrapper, collect_route_wrappers, synthesize_routes};
