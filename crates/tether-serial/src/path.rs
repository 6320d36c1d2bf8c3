//! Windows device path classification.
//!
//! Pure string handling, so it is built and tested on every platform.

/// Prefix of the Win32 device namespace.
pub const DEVICE_NAMESPACE: &str = r"\\.\";

const PIPE_SEGMENT: &str = r"\pipe\";

/// Shortest and longest accepted named pipe paths.
const PIPE_PATH_LEN: std::ops::RangeInclusive<usize> = 10..=256;

/// Kind of Windows endpoint a device path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowsEndpoint {
    SerialPort,
    NamedPipe,
}

/// Classify `path`, or `None` if it is neither a serial port nor a named pipe.
pub fn classify(path: &str) -> Option<WindowsEndpoint> {
    if is_serial_port(path) {
        Some(WindowsEndpoint::SerialPort)
    } else if is_named_pipe(path) {
        Some(WindowsEndpoint::NamedPipe)
    } else {
        None
    }
}

/// Whether `path` is `COMn` or `\\.\COMn` (case-insensitive, n != 0).
pub fn is_serial_port(path: &str) -> bool {
    let name = if path.starts_with('\\') && path.len() >= DEVICE_NAMESPACE.len() {
        match path.strip_prefix(DEVICE_NAMESPACE) {
            Some(rest) => rest,
            None => return false,
        }
    } else {
        path
    };

    if name.len() <= 3 || !name.is_char_boundary(3) || !name[..3].eq_ignore_ascii_case("COM") {
        return false;
    }
    leading_number(&name[3..]).is_some_and(|n| n != 0)
}

/// Whether `path` is `\\host\pipe\name` with a non-empty host and name.
pub fn is_named_pipe(path: &str) -> bool {
    if !PIPE_PATH_LEN.contains(&path.len()) {
        return false;
    }
    let Some(rest) = path.strip_prefix(r"\\") else {
        return false;
    };
    let host_len = rest.find('\\').unwrap_or(rest.len());
    if host_len == 0 {
        return false;
    }
    let tail = &rest[host_len..];
    tail.len() > PIPE_SEGMENT.len()
        && tail.is_char_boundary(PIPE_SEGMENT.len())
        && tail[..PIPE_SEGMENT.len()].eq_ignore_ascii_case(PIPE_SEGMENT)
}

/// The path to hand to `CreateFile`: bare `COMn` names move into the device
/// namespace so ports above 9 open; everything else passes through.
pub fn device_namespace_path(path: &str) -> String {
    if is_serial_port(path) && !path.starts_with('\\') {
        format!("{}{}", DEVICE_NAMESPACE, path)
    } else {
        path.to_string()
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    s[..digits].parse().ok()
}
