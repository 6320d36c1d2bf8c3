//! MIDI link driver.
//!
//! ```text
//!   midir callback ──► Inbound ──lock──► rx ring ──lock──► read_byte()
//!   post_byte() ──► tx ring ──► MessageAssembler ──► MidiOutputConnection
//!                        (drained in update())
//! ```
//!
//! Only the receive ring crosses threads. The transmit side lives entirely
//! on the emulation thread and is flushed once per tick.

use std::sync::Arc;

use midir::MidiInputConnection;
use parking_lot::Mutex;
use tether_core::{LinkState, RingBuffer, Transport, TransportError, TransportResult};

use crate::inbound::{Inbound, SharedRing};
use crate::outbound::{MessageOutput, OutputError, Outbound};

/// Link driver for a MIDI input/output port pair.
pub struct MidiDriver {
    name: String,
    rx: SharedRing,
    input: Option<MidiInputConnection<Inbound>>,
    outbound: Option<Outbound>,
    state: LinkState,
}

impl MidiDriver {
    /// Build a driver around an optional output, returning the producer
    /// handle for the receive ring.
    ///
    /// Without an output the link is receive-only and posted bytes are
    /// discarded.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        output: Option<(String, Box<dyn MessageOutput>)>,
    ) -> TransportResult<(Self, Inbound)> {
        if capacity < RingBuffer::MIN_CAPACITY {
            return Err(TransportError::InvalidConfiguration(format!(
                "buffer capacity {} is below the minimum of {}",
                capacity,
                RingBuffer::MIN_CAPACITY
            )));
        }

        let name = name.into();
        let rx: SharedRing = Arc::new(Mutex::new(RingBuffer::with_capacity(capacity)));
        let inbound = Inbound::new(Arc::clone(&rx), name.clone());
        let outbound = output.map(|(port, output)| Outbound::new(port, capacity, output));

        let driver = Self {
            name,
            rx,
            input: None,
            outbound,
            state: LinkState::Open,
        };
        Ok((driver, inbound))
    }

    /// Keep `connection` alive for the lifetime of the link.
    pub(crate) fn attach_input(&mut self, connection: MidiInputConnection<Inbound>) {
        self.input = Some(connection);
    }

    /// Input port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output port name, if the link can transmit.
    pub fn output_name(&self) -> Option<&str> {
        self.outbound.as_ref().map(Outbound::name)
    }

    pub fn is_receive_only(&self) -> bool {
        self.outbound.is_none()
    }

    /// Transmit bytes dropped because the ring was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.outbound.as_ref().map_or(0, Outbound::dropped_bytes)
    }

    /// Stop the callback, then release both ports.
    fn release(&mut self) {
        if let Some(connection) = self.input.take() {
            // Returns once the backend has stopped calling back.
            let (_input, _inbound) = connection.close();
        }
        self.outbound = None;
    }
}

impl Transport for MidiDriver {
    fn has_data(&self) -> bool {
        self.state.is_open() && !self.rx.lock().is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        if !self.state.is_open() {
            return 0;
        }
        self.rx.lock().try_read_one().unwrap_or(0)
    }

    fn post_byte(&mut self, byte: u8) {
        if !self.state.is_open() {
            return;
        }
        if let Some(outbound) = self.outbound.as_mut() {
            outbound.post(byte);
        }
    }

    fn update(&mut self) {
        if !self.state.is_open() {
            return;
        }
        let Some(outbound) = self.outbound.as_mut() else {
            return;
        };
        match outbound.flush() {
            Ok(0) => {}
            Ok(sent) => log::trace!("{}: sent {} MIDI messages", outbound.name(), sent),
            Err(e @ OutputError::Disconnected(_)) => {
                log::error!("MIDI output {} failed: {}", outbound.name(), e);
                self.release();
                self.state = LinkState::Failed;
            }
            Err(e) => log::warn!("MIDI output {}: {}", outbound.name(), e),
        }
    }

    fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.release();
        self.state = LinkState::Closed;
        log::info!("Closed MIDI port {}", self.name);
    }

    fn state(&self) -> LinkState {
        self.state
    }
}

impl Drop for MidiDriver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Sent = Arc<Mutex<Vec<Vec<u8>>>>;

    struct Recorder {
        sent: Sent,
        connected: Arc<Mutex<bool>>,
    }

    impl MessageOutput for Recorder {
        fn send(&mut self, message: &[u8]) -> Result<(), OutputError> {
            if !*self.connected.lock() {
                return Err(OutputError::Disconnected("unplugged".to_string()));
            }
            self.sent.lock().push(message.to_vec());
            Ok(())
        }
    }

    fn driver_with_output(capacity: usize) -> (MidiDriver, Inbound, Sent, Arc<Mutex<bool>>) {
        let sent = Sent::default();
        let connected = Arc::new(Mutex::new(true));
        let output = Recorder {
            sent: Arc::clone(&sent),
            connected: Arc::clone(&connected),
        };
        let output: Box<dyn MessageOutput> = Box::new(output);
        let (driver, inbound) =
            MidiDriver::new("SC-55", capacity, Some(("SC-55 Out".to_string(), output))).unwrap();
        (driver, inbound, sent, connected)
    }

    fn read_all(driver: &mut MidiDriver) -> Vec<u8> {
        let mut got = Vec::new();
        while driver.has_data() {
            got.push(driver.read_byte());
        }
        got
    }

    #[test]
    fn test_callback_messages_reach_emulator() {
        let (mut driver, mut inbound, _, _) = driver_with_output(64);

        // Deliver from another thread, as the backend does.
        std::thread::spawn(move || {
            inbound.push(&[0x90, 60, 100]);
            inbound.push(&[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]);
        })
        .join()
        .unwrap();

        assert_eq!(
            read_all(&mut driver),
            vec![0x90, 60, 100, 0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]
        );
        assert_eq!(driver.read_byte(), 0);
    }

    #[test]
    fn test_posted_bytes_sent_on_update() {
        let (mut driver, _inbound, sent, _) = driver_with_output(64);
        assert_eq!(driver.output_name(), Some("SC-55 Out"));

        for b in [0xC1, 0x10, 0xE1, 0x00, 0x40] {
            driver.post_byte(b);
        }
        assert!(sent.lock().is_empty());

        driver.update();
        assert_eq!(*sent.lock(), vec![vec![0xC1, 0x10], vec![0xE1, 0x00, 0x40]]);
    }

    #[test]
    fn test_receive_only_discards_posts() {
        let (mut driver, mut inbound) = MidiDriver::new("SC-55", 16, None).unwrap();
        assert!(driver.is_receive_only());

        driver.post_byte(0xF8);
        driver.update();
        assert!(driver.is_open());

        inbound.push(&[0xFA]);
        assert_eq!(read_all(&mut driver), vec![0xFA]);
    }

    #[test]
    fn test_output_disconnect_fails_link() {
        let (mut driver, mut inbound, _, connected) = driver_with_output(16);
        *connected.lock() = false;

        driver.post_byte(0xFC);
        driver.update();
        assert_eq!(driver.state(), LinkState::Failed);

        // Receive side degrades too.
        inbound.push(&[0xF8]);
        assert!(!driver.has_data());
        assert_eq!(driver.read_byte(), 0);

        driver.close();
        assert_eq!(driver.state(), LinkState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut driver, _inbound, _, _) = driver_with_output(16);
        driver.close();
        driver.close();
        assert_eq!(driver.state(), LinkState::Closed);
        driver.post_byte(0x90);
        driver.update();
        assert_eq!(driver.dropped_bytes(), 0);
    }

    #[test]
    fn test_rejects_tiny_capacity() {
        assert!(matches!(
            MidiDriver::new("x", 1, None),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
