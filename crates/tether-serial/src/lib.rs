//! # tether-serial
//!
//! Serial-style links: ttys and unix sockets on POSIX, COM ports and named
//! pipes on Windows.
//!
//! ## Architecture
//!
//! Two drivers implement [`tether_core::Transport`], one per I/O model:
//!
//! ```text
//! ThreadedDriver<P: PortIo>        background thread, blocking reads/writes
//!        ↑
//!   UnixPort (tty / socket)
//!
//! OverlappedDriver<H: OverlappedIo> polled async requests, no extra thread
//!        ↑
//!   Win32Port (COM / pipe)
//! ```
//!
//! The device-facing traits are seams: the drivers are tested against
//! in-memory ports on every platform.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_core::{LinkConfig, Transport};
//!
//! let mut link = tether_serial::open(&LinkConfig::serial("/dev/ttyUSB0"))?;
//! link.update();
//! while link.has_data() {
//!     uart.receive(link.read_byte());
//! }
//! ```

pub mod overlapped;
pub mod path;
pub mod port;
pub mod threaded;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod win32;

// Re-exports
pub use overlapped::{OverlappedDriver, OverlappedIo, Submitted};
pub use path::{classify, device_namespace_path, is_named_pipe, is_serial_port, WindowsEndpoint};
pub use port::{PortIo, POLL_INTERVAL, WRITE_TIMEOUT};
pub use threaded::ThreadedDriver;

use tether_core::{
    DeviceInfo, Direction, Enumeration, LinkConfig, TransportError, TransportResult,
};

/// The driver `open` returns on this platform.
#[cfg(unix)]
pub type SerialDriver = ThreadedDriver<unix::UnixPort>;

/// The driver `open` returns on this platform.
#[cfg(windows)]
pub type SerialDriver = OverlappedDriver<win32::Win32Port>;

fn enumerate_ports() -> Vec<String> {
    #[cfg(unix)]
    {
        unix::enumerate()
    }
    #[cfg(windows)]
    {
        win32::enumerate()
    }
    #[cfg(not(any(unix, windows)))]
    {
        Vec::new()
    }
}

/// Serial ports currently visible to the OS, enumerated fresh on each call.
pub fn list_devices() -> Vec<DeviceInfo> {
    Enumeration::bidirectional(enumerate_ports()).devices(Direction::Input)
}

/// Whether `device` can be opened as given, without consulting enumeration.
fn is_direct_path(device: &str) -> bool {
    #[cfg(windows)]
    {
        classify(device).is_some()
    }
    #[cfg(not(windows))]
    {
        std::path::Path::new(device).exists()
    }
}

/// Turn a device string into the path to open.
///
/// A string naming an openable path is used as is. Anything else is resolved
/// against the enumerated ports by exact name, name without port number, or
/// index.
pub fn resolve_device(device: &str) -> TransportResult<String> {
    if is_direct_path(device) {
        return Ok(device.to_string());
    }
    let ports = Enumeration::bidirectional(enumerate_ports());
    let resolved = ports.resolve(Direction::Input, Some(device))?;
    log::info!("Resolved serial device '{}' to {}", device, resolved.name);
    Ok(resolved.name)
}

fn open_failed(device: &str, error: std::io::Error) -> TransportError {
    log::error!("Failed to open serial port {}: {}", device, error);
    TransportError::OpenFailed {
        device: device.to_string(),
        reason: error.to_string(),
    }
}

/// Open the serial link described by `config`.
#[cfg(any(unix, windows))]
pub fn open(config: &LinkConfig) -> TransportResult<SerialDriver> {
    config.validate()?;
    let device = config.serial_device().ok_or_else(|| {
        TransportError::InvalidConfiguration("not a serial link configuration".to_string())
    })?;
    let path = resolve_device(device)?;
    open_path(&path, config.buffer_capacity)
}

#[cfg(unix)]
fn open_path(path: &str, capacity: usize) -> TransportResult<SerialDriver> {
    let port = unix::UnixPort::open(std::path::Path::new(path)).map_err(|e| open_failed(path, e))?;
    ThreadedDriver::spawn(path, port, capacity)
}

#[cfg(windows)]
fn open_path(path: &str, capacity: usize) -> TransportResult<SerialDriver> {
    let port = win32::Win32Port::open(path).map_err(|e| open_failed(path, e))?;
    OverlappedDriver::new(path, port, capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_is_indexed() {
        for (i, device) in list_devices().iter().enumerate() {
            assert_eq!(device.index, i);
        }
    }

    #[test]
    fn test_open_rejects_midi_config() {
        let result = open(&LinkConfig::midi());
        assert!(matches!(
            result,
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_open_rejects_tiny_buffer() {
        let config = LinkConfig::serial("COM1").with_buffer_capacity(1);
        assert!(matches!(
            open(&config),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let result = resolve_device("no such serial port");
        assert!(matches!(
            result,
            Err(TransportError::DeviceNotFound { .. } | TransportError::NoDevices { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_path_used_directly() {
        assert_eq!(resolve_device("/dev/null").unwrap(), "/dev/null");
    }

    #[cfg(unix)]
    #[test]
    fn test_open_non_tty_fails() {
        let result = open(&LinkConfig::serial("/dev/null"));
        assert!(matches!(result, Err(TransportError::OpenFailed { .. })));
    }
}
