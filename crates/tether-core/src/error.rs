//! Error types for tether.

use std::fmt;
use std::io;

use crate::select::Direction;

/// Error type for opening and running a device link.
///
/// Only failures that can be reported to the caller synchronously live here.
/// Hard I/O errors hit by a background thread or an OS callback are logged
/// and move the link to [`LinkState::Failed`](crate::LinkState::Failed)
/// instead.
#[derive(Debug)]
pub enum TransportError {
    /// The enumeration for a direction was empty.
    NoDevices { direction: Direction },

    /// No enumerated device matched the preference.
    DeviceNotFound {
        direction: Direction,
        preference: String,
    },

    /// The OS refused to open or configure the device.
    OpenFailed { device: String, reason: String },

    /// OS I/O error.
    Io(io::Error),

    /// Configuration rejected by [`LinkConfig::validate`](crate::LinkConfig::validate).
    InvalidConfiguration(String),

    /// Error reported by a third-party backend.
    Backend(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevices { direction } => write!(f, "No {} devices found", direction),
            Self::DeviceNotFound {
                direction,
                preference,
            } => write!(f, "No {} device named '{}'", direction, preference),
            Self::OpenFailed { device, reason } => {
                write!(f, "Failed to open '{}': {}", device, reason)
            }
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Result type alias for tether operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Whether an I/O error only means "not yet".
///
/// Would-block, interrupted and timed-out operations are retried on the next
/// service iteration and never surface as errors.
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TransportError::DeviceNotFound {
            direction: Direction::Input,
            preference: "Port Z".to_string(),
        };
        assert_eq!(err.to_string(), "No input device named 'Port Z'");

        let err = TransportError::NoDevices {
            direction: Direction::Output,
        };
        assert_eq!(err.to_string(), "No output devices found");
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::UnexpectedEof)));
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;
        let err = TransportError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.source().is_some());
    }
}
