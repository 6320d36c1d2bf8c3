//! # Tether
//!
//! Connect an emulator's serial and MIDI ports to real devices.
//!
//! The emulation core polls a [`Transport`] once per tick and never blocks
//! on device I/O. Backends do their I/O on a background thread, through
//! polled asynchronous requests, or from the OS MIDI callback.
//!
//! ## Architecture
//!
//! ```text
//! Emulation core (UART / MIDI peripheral)
//!        ↓ has_data / read_byte / post_byte / update
//! Box<dyn Transport>
//!        ↓
//! tether-serial (tty, unix socket, COM, named pipe) | tether-midi (midir)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! let config = LinkConfig::midi().with_input("SC-55").with_output("1");
//! let mut link = tether::open(&config)?;
//!
//! // Once per emulation tick:
//! link.update();
//! deliver_received(&mut link, &emulator.lock, &mut emulator.uart);
//! while let Some(byte) = emulator.uart.take_transmit() {
//!     link.post_byte(byte);
//! }
//! ```

// Re-export sub-crates
pub use tether_core as core;
#[cfg(feature = "midi")]
pub use tether_midi as midi;
#[cfg(feature = "serial")]
pub use tether_serial as serial;

pub use tether_core::{
    describe_devices, DeviceInfo, LinkConfig, LinkKind, LinkState, Transport, TransportError,
    TransportResult,
};

/// Open the link described by `config` with the matching backend.
pub fn open(config: &LinkConfig) -> TransportResult<Box<dyn Transport>> {
    match config.kind {
        LinkKind::Serial { .. } => open_serial(config),
        LinkKind::Midi => open_midi(config),
    }
}

#[cfg(feature = "serial")]
fn open_serial(config: &LinkConfig) -> TransportResult<Box<dyn Transport>> {
    Ok(Box::new(tether_serial::open(config)?))
}

#[cfg(not(feature = "serial"))]
fn open_serial(_config: &LinkConfig) -> TransportResult<Box<dyn Transport>> {
    Err(TransportError::InvalidConfiguration(
        "serial support is not enabled".to_string(),
    ))
}

#[cfg(feature = "midi")]
fn open_midi(config: &LinkConfig) -> TransportResult<Box<dyn Transport>> {
    Ok(Box::new(tether_midi::open(config)?))
}

#[cfg(not(feature = "midi"))]
fn open_midi(_config: &LinkConfig) -> TransportResult<Box<dyn Transport>> {
    Err(TransportError::InvalidConfiguration(
        "MIDI support is not enabled".to_string(),
    ))
}

/// Human-readable listing of every device the enabled backends can see.
#[cfg_attr(not(feature = "midi"), allow(unused_variables))]
pub fn describe_all_devices(client_name: &str) -> String {
    let mut out = String::new();

    #[cfg(feature = "serial")]
    out.push_str(&describe_devices("serial", &tether_serial::list_devices()));

    #[cfg(feature = "midi")]
    match tether_midi::list_devices(client_name) {
        Ok((inputs, outputs)) => {
            out.push_str(&describe_devices("midi input", &inputs));
            out.push_str(&describe_devices("midi output", &outputs));
        }
        Err(e) => log::warn!("Could not enumerate MIDI ports: {}", e),
    }

    out
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    pub use tether_core::{
        // Emulator-facing API
        deliver_received, ByteSink, LinkState, Transport, WorkGuard, WorkLock,
        // Configuration
        LinkConfig, LinkKind,
        // Device selection
        DeviceInfo, Direction, Enumeration,
        // MIDI framing and routing
        route_message, MessageAssembler, MidiMessage, Route, ShortMessage,
        // Error types
        TransportError, TransportResult,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_validates_before_touching_devices() {
        let config = LinkConfig::serial("").with_buffer_capacity(4096);
        assert!(matches!(
            open(&config),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_describe_all_devices_lists_serial() {
        let listing = describe_all_devices("tether-test");
        assert!(listing.contains("serial devices"));
    }
}
