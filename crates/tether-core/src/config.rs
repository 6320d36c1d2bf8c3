//! Link configuration.
//!
//! A [`LinkConfig`] names the device to bind and the buffer sizes to use. It
//! is consumed once by a driver's `open` and not kept afterwards.
//!
//! # Example
//!
//! ```
//! use tether_core::LinkConfig;
//!
//! let midi = LinkConfig::midi()
//!     .with_input("SC-55")
//!     .with_output("1");
//!
//! let serial = LinkConfig::serial("/dev/ttyUSB0")
//!     .with_buffer_capacity(8192);
//! assert!(serial.validate().is_ok());
//! ```

use crate::error::{TransportError, TransportResult};
use crate::ring::RingBuffer;

/// Which kind of link a config describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Serial port, named pipe or unix socket at the given path, or an
    /// enumerated serial port name/index.
    Serial { device: String },
    /// MIDI input/output port pair.
    Midi,
}

/// Device link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// The kind of link.
    pub kind: LinkKind,

    /// Preferred input device: name, name without port number, or index.
    /// `None` picks the first enumerated device.
    pub input: Option<String>,

    /// Preferred output device, resolved like `input`.
    pub output: Option<String>,

    /// Ring capacity per direction in bytes. One byte is always kept free.
    pub buffer_capacity: usize,

    /// Client name registered with the OS MIDI service.
    pub client_name: String,
}

impl LinkConfig {
    /// Default client name.
    pub const DEFAULT_CLIENT_NAME: &'static str = "tether";

    /// Configuration for a serial-style link.
    pub fn serial(device: impl Into<String>) -> Self {
        Self::with_kind(LinkKind::Serial {
            device: device.into(),
        })
    }

    /// Configuration for a MIDI link.
    pub fn midi() -> Self {
        Self::with_kind(LinkKind::Midi)
    }

    fn with_kind(kind: LinkKind) -> Self {
        Self {
            kind,
            input: None,
            output: None,
            buffer_capacity: RingBuffer::DEFAULT_CAPACITY,
            client_name: Self::DEFAULT_CLIENT_NAME.to_string(),
        }
    }

    /// Set the preferred input device.
    pub fn with_input(mut self, preference: impl Into<String>) -> Self {
        self.input = Some(preference.into());
        self
    }

    /// Set the preferred output device.
    pub fn with_output(mut self, preference: impl Into<String>) -> Self {
        self.output = Some(preference.into());
        self
    }

    /// Set the ring capacity per direction.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the client name registered with the MIDI service.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// The serial device string, if this is a serial config.
    pub fn serial_device(&self) -> Option<&str> {
        match &self.kind {
            LinkKind::Serial { device } => Some(device),
            LinkKind::Midi => None,
        }
    }

    /// Check the configuration before any OS resource is touched.
    pub fn validate(&self) -> TransportResult<()> {
        if self.buffer_capacity < RingBuffer::MIN_CAPACITY {
            return Err(TransportError::InvalidConfiguration(format!(
                "buffer capacity {} is below the minimum of {}",
                self.buffer_capacity,
                RingBuffer::MIN_CAPACITY
            )));
        }
        if let LinkKind::Serial { device } = &self.kind {
            if device.is_empty() {
                return Err(TransportError::InvalidConfiguration(
                    "serial device must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
