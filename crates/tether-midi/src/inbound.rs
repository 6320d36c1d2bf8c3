//! Receive side: the backend callback produces into the receive ring.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::{MidiMessage, RingBuffer};

/// Receive ring shared between the callback thread and the emulation thread.
pub type SharedRing = Arc<Mutex<RingBuffer>>;

/// Producer handle for the receive ring.
///
/// Owned by the MIDI callback, which is the only producer. Messages are
/// stored whole or not at all, so the emulator never sees half a message.
pub struct Inbound {
    ring: SharedRing,
    name: String,
    dropped: u64,
}

impl Inbound {
    pub fn new(ring: SharedRing, name: impl Into<String>) -> Self {
        Self {
            ring,
            name: name.into(),
            dropped: 0,
        }
    }

    /// Frame and store one message delivered by the backend. Returns whether
    /// it was stored.
    pub fn push(&mut self, message: &[u8]) -> bool {
        let framed = MidiMessage::frame(message);
        let bytes = framed.as_bytes();
        if bytes.is_empty() {
            return false;
        }

        let stored = {
            let mut ring = self.ring.lock();
            if ring.writable_count() >= bytes.len() {
                ring.write_slice(bytes);
                true
            } else {
                false
            }
        };

        if stored {
            if self.dropped > 0 {
                log::warn!("{} RX overflow: {} messages dropped", self.name, self.dropped);
                self.dropped = 0;
            }
        } else {
            if self.dropped == 0 {
                log::warn!(
                    "{} RX overflow, dropping {}-byte message",
                    self.name,
                    bytes.len()
                );
            }
            self.dropped += 1;
        }
        stored
    }
}
