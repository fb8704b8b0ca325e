use std::sync::Mutex;

use crate::error::Result;

use super::PacketTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub interface: String,
    pub data: Vec<u8>,
}

/// Transport that keeps every frame instead of putting it on a wire. Frames
/// can be drained and handed to another router's receive path.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentFrame>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<SentFrame> {
        match self.sent.lock() {
            Ok(mut sent) => std::mem::take(&mut *sent),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl PacketTransport for RecordingTransport {
    fn send(&self, interface: &str, frame: &[u8]) -> Result<()> {
        let frame = SentFrame {
            interface: interface.to_string(),
            data: frame.to_vec(),
        };
        match self.sent.lock() {
            Ok(mut sent) => sent.push(frame),
            Err(poisoned) => poisoned.into_inner().push(frame),
        }
        Ok(())
    }
}
