//! Transmit side: the emulator's byte stream becomes whole MIDI messages.

use std::fmt;

use midir::{MidiOutputConnection, SendError};
use tether_core::{MessageAssembler, OverflowReporter, RingBuffer};

/// Why a message could not be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// The backend refused this message. Later messages may still go out.
    Rejected(String),
    /// The port is gone. Fatal for the link.
    Disconnected(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(msg) => write!(f, "message rejected: {}", msg),
            Self::Disconnected(msg) => write!(f, "output disconnected: {}", msg),
        }
    }
}

impl std::error::Error for OutputError {}

/// Destination for assembled outbound messages.
pub trait MessageOutput: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), OutputError>;
}

impl MessageOutput for MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> Result<(), OutputError> {
        MidiOutputConnection::send(self, message).map_err(|e| match e {
            SendError::InvalidData(msg) => OutputError::Rejected(msg.to_string()),
            SendError::Other(msg) => OutputError::Disconnected(msg.to_string()),
        })
    }
}

/// Transmit ring plus the assembler and port it drains into.
///
/// Owned by the emulation thread; nothing here is shared.
pub struct Outbound {
    name: String,
    tx: RingBuffer,
    assembler: MessageAssembler,
    output: Box<dyn MessageOutput>,
    overflow: OverflowReporter,
}

impl Outbound {
    pub fn new(name: impl Into<String>, capacity: usize, output: Box<dyn MessageOutput>) -> Self {
        Self {
            name: name.into(),
            tx: RingBuffer::with_capacity(capacity),
            assembler: MessageAssembler::new(),
            output,
            overflow: OverflowReporter::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue one byte, dropping it if the ring is full.
    pub fn post(&mut self, byte: u8) {
        if self.tx.try_write_one(byte) {
            if self.overflow.is_overflowing() {
                self.overflow.recovered(&self.name);
            }
        } else {
            self.overflow.dropped(&self.name);
        }
    }

    /// Bytes dropped because the ring was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.overflow.total_dropped()
    }

    /// Bytes queued but not yet assembled.
    pub fn queued(&self) -> usize {
        self.tx.readable_count()
    }

    /// Assemble everything queued and send completed messages. Returns the
    /// number of messages sent.
    ///
    /// Rejected messages are logged and skipped. A disconnect stops the
    /// flush and is returned.
    pub fn flush(&mut self) -> Result<usize, OutputError> {
        let Self {
            name,
            tx,
            assembler,
            output,
            ..
        } = self;

        let mut sent = 0;
        let mut fatal = None;
        while fatal.is_none() {
            let Some(byte) = tx.try_read_one() else {
                break;
            };
            assembler.push(byte, |message| {
                if fatal.is_some() {
                    return;
                }
                match output.send(message) {
                    Ok(()) => sent += 1,
                    Err(OutputError::Rejected(reason)) => {
                        log::warn!("{}: dropping MIDI message: {}", name, reason);
                    }
                    Err(e) => fatal = Some(e),
                }
            });
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Sent = Arc<Mutex<Vec<Vec<u8>>>>;

    /// Records sent messages, failing the ones starting with `fail_on`.
    struct Recorder {
        sent: Sent,
        fail_on: Option<(u8, OutputError)>,
    }

    impl MessageOutput for Recorder {
        fn send(&mut self, message: &[u8]) -> Result<(), OutputError> {
            if let Some((status, error)) = &self.fail_on {
                if message[0] == *status {
                    return Err(error.clone());
                }
            }
            self.sent.lock().push(message.to_vec());
            Ok(())
        }
    }

    fn recorder(fail_on: Option<(u8, OutputError)>) -> (Box<dyn MessageOutput>, Sent) {
        let sent = Sent::default();
        let output = Recorder {
            sent: Arc::clone(&sent),
            fail_on,
        };
        (Box::new(output), sent)
    }

    #[test]
    fn test_flush_sends_whole_messages() {
        let (output, sent) = recorder(None);
        let mut outbound = Outbound::new("out", 64, output);

        // Note on with running status, then a clock inside a SysEx.
        for b in [0x90, 60, 100, 62, 100, 0xF0, 0x41, 0xF8, 0x10, 0xF7] {
            outbound.post(b);
        }
        assert_eq!(outbound.flush(), Ok(4));
        assert_eq!(
            *sent.lock(),
            vec![
                vec![0x90, 60, 100],
                vec![0x90, 62, 100],
                vec![0xF8],
                vec![0xF0, 0x41, 0x10, 0xF7],
            ]
        );
        assert_eq!(outbound.queued(), 0);
    }

    #[test]
    fn test_partial_message_waits_for_next_flush() {
        let (output, sent) = recorder(None);
        let mut outbound = Outbound::new("out", 64, output);

        outbound.post(0xB0);
        outbound.post(7);
        assert_eq!(outbound.flush(), Ok(0));
        assert!(sent.lock().is_empty());

        outbound.post(127);
        assert_eq!(outbound.flush(), Ok(1));
        assert_eq!(*sent.lock(), vec![vec![0xB0, 7, 127]]);
    }

    #[test]
    fn test_rejected_message_skipped() {
        let rejected = OutputError::Rejected("unsupported".to_string());
        let (output, sent) = recorder(Some((0xF6, rejected)));
        let mut outbound = Outbound::new("out", 64, output);

        for b in [0xF6, 0xC0, 5] {
            outbound.post(b);
        }
        assert_eq!(outbound.flush(), Ok(1));
        assert_eq!(*sent.lock(), vec![vec![0xC0, 5]]);
    }

    #[test]
    fn test_disconnect_stops_flush() {
        let gone = OutputError::Disconnected("gone".to_string());
        let (output, sent) = recorder(Some((0xFE, gone.clone())));
        let mut outbound = Outbound::new("out", 64, output);

        for b in [0xFE, 0xFE, 0xFE] {
            outbound.post(b);
        }
        assert_eq!(outbound.flush(), Err(gone));
        assert!(sent.lock().is_empty());
        // The failing byte was consumed; the rest stay queued.
        assert_eq!(outbound.queued(), 2);
    }

    #[test]
    fn test_overflow_counts_dropped_bytes() {
        let (output, sent) = recorder(None);
        let mut outbound = Outbound::new("out", 4, output);
        for b in [0xF8, 0xFA, 0xFB, 0xFC, 0xFE] {
            outbound.post(b);
        }
        assert_eq!(outbound.dropped_bytes(), 2);
        assert_eq!(outbound.queued(), 3);

        // Only the accepted bytes go out, in order.
        assert_eq!(outbound.flush(), Ok(3));
        assert_eq!(*sent.lock(), vec![vec![0xF8], vec![0xFA], vec![0xFB]]);
    }
}
