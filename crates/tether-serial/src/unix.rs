//! POSIX ports: ttys in raw mode and unix domain sockets.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::mem;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use crate::port::{PortIo, POLL_INTERVAL, WRITE_TIMEOUT};

#[cfg(any(target_os = "macos", target_os = "ios"))]
const DEVICE_PREFIXES: &[&str] = &["cu."];
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
const DEVICE_PREFIXES: &[&str] = &["ttyS", "ttyUSB", "ttyACM", "ttyAMA"];

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A tty configured for raw 8N1 transfers. The previous settings are put
/// back on drop.
pub struct Tty {
    file: File,
    saved: libc::termios,
}

impl Tty {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)?;
        let fd = file.as_raw_fd();

        // SAFETY: termios is plain data; tcgetattr fills it in.
        let mut tty: libc::termios = unsafe { mem::zeroed() };
        cvt(unsafe { libc::tcgetattr(fd, &mut tty) })?;
        let saved = tty;

        make_raw(&mut tty);
        cvt(unsafe { libc::tcflush(fd, libc::TCIFLUSH) })?;
        cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) })?;

        Ok(Self { file, saved })
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        let ret = unsafe { libc::tcsetattr(self.file.as_raw_fd(), libc::TCSANOW, &self.saved) };
        if ret != 0 {
            log::debug!(
                "Could not restore tty settings: {}",
                io::Error::last_os_error()
            );
        }
    }
}

/// 8N1, receiver on, modem lines ignored, no line discipline, reads return
/// immediately.
fn make_raw(tty: &mut libc::termios) {
    tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
    tty.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;

    tty.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ECHONL | libc::ISIG);

    tty.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    tty.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL);

    tty.c_oflag &= !(libc::OPOST | libc::ONLCR);

    tty.c_cc[libc::VTIME] = 0;
    tty.c_cc[libc::VMIN] = 0;
}

/// Wait up to `timeout` for `events` on `fd`. `Ok(false)` on timeout.
fn wait_ready(fd: RawFd, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    if cvt(unsafe { libc::poll(&mut pfd, 1, millis) })? == 0 {
        return Ok(false);
    }
    if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device error"));
    }
    if pfd.revents & libc::POLLHUP != 0 && pfd.revents & events == 0 {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "device hung up",
        ));
    }
    Ok(true)
}

/// A blocking POSIX endpoint.
pub enum UnixPort {
    Tty(Tty),
    Socket(UnixStream),
}

impl UnixPort {
    /// Open `path`, connecting if it is a unix socket and configuring it as a
    /// tty otherwise.
    pub fn open(path: &Path) -> io::Result<Self> {
        if fs::metadata(path)?.file_type().is_socket() {
            log::debug!("{} is a unix socket", path.display());
            Self::from_stream(UnixStream::connect(path)?)
        } else {
            Tty::open(path).map(Self::Tty)
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Self::Socket(stream))
    }
}

impl PortIo for UnixPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tty(tty) => {
                if !wait_ready(tty.file.as_raw_fd(), libc::POLLIN, POLL_INTERVAL)? {
                    return Ok(0);
                }
                tty.file.read(buf)
            }
            Self::Socket(stream) => match stream.read(buf)? {
                0 if !buf.is_empty() => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the socket",
                )),
                n => Ok(n),
            },
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tty(tty) => {
                if !wait_ready(tty.file.as_raw_fd(), libc::POLLOUT, WRITE_TIMEOUT)? {
                    return Ok(0);
                }
                tty.file.write(buf)
            }
            Self::Socket(stream) => stream.write(buf),
        }
    }
}

/// Serial devices under `/dev`, sorted by name then unit number.
pub fn enumerate() -> Vec<String> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| DEVICE_PREFIXES.iter().any(|p| name.starts_with(p)))
        .collect();
    names.sort_by(|a, b| unit_key(a).cmp(&unit_key(b)));
    names.into_iter().map(|name| format!("/dev/{}", name)).collect()
}

/// `ttyUSB10` sorts after `ttyUSB9`.
fn unit_key(name: &str) -> (&str, u64, &str) {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let unit = name[stem.len()..].parse().unwrap_or(0);
    (stem, unit, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threaded::ThreadedDriver;
    use std::thread;
    use std::time::Instant;
    use tether_core::{LinkState, Transport};

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_socket_round_trip() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let port = UnixPort::from_stream(ours).unwrap();
        let mut driver = ThreadedDriver::spawn("socket", port, 256).unwrap();

        theirs.write_all(&[0xF0, 0x41, 0x10, 0x16, 0xF7]).unwrap();
        let mut got = Vec::new();
        assert!(wait_until(|| {
            while driver.has_data() {
                got.push(driver.read_byte());
            }
            got.len() == 5
        }));
        assert_eq!(got, vec![0xF0, 0x41, 0x10, 0x16, 0xF7]);

        for b in [0x90, 0x3C, 0x7F] {
            driver.post_byte(b);
        }
        let mut echoed = [0u8; 3];
        theirs
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        theirs.read_exact(&mut echoed).unwrap();
        assert_eq!(echoed, [0x90, 0x3C, 0x7F]);

        driver.close();
        assert_eq!(driver.state(), LinkState::Closed);
    }

    #[test]
    fn test_socket_peer_close_fails_link() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let port = UnixPort::from_stream(ours).unwrap();
        let mut driver = ThreadedDriver::spawn("socket", port, 64).unwrap();

        drop(theirs);
        assert!(wait_until(|| {
            driver.update();
            driver.state() == LinkState::Failed
        }));
        assert!(!driver.has_data());
    }

    #[test]
    fn test_open_missing_path() {
        let err = UnixPort::open(Path::new("/nonexistent/tether-port")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_make_raw_clears_line_discipline() {
        let mut tty: libc::termios = unsafe { mem::zeroed() };
        tty.c_lflag = !0;
        tty.c_iflag = !0;
        tty.c_oflag = !0;
        tty.c_cflag = libc::PARENB | libc::CSTOPB;
        tty.c_cc[libc::VMIN] = 1;
        make_raw(&mut tty);

        assert_eq!(tty.c_lflag & (libc::ICANON | libc::ECHO | libc::ISIG), 0);
        assert_eq!(tty.c_iflag & (libc::IXON | libc::ICRNL | libc::ISTRIP), 0);
        assert_eq!(tty.c_oflag & libc::OPOST, 0);
        assert_eq!(tty.c_cflag & libc::CSIZE, libc::CS8);
        assert_eq!(tty.c_cflag & (libc::PARENB | libc::CSTOPB), 0);
        assert_ne!(tty.c_cflag & libc::CREAD, 0);
        assert_eq!(tty.c_cc[libc::VMIN], 0);
    }

    #[test]
    fn test_unit_key_orders_numerically() {
        let mut names = vec!["ttyUSB10", "ttyS1", "ttyUSB9", "ttyS0"];
        names.sort_by(|a, b| unit_key(a).cmp(&unit_key(b)));
        assert_eq!(names, vec!["ttyS0", "ttyS1", "ttyUSB9", "ttyUSB10"]);
    }

    #[test]
    fn test_enumerate_lists_dev_paths() {
        for path in enumerate() {
            assert!(path.starts_with("/dev/"));
        }
    }

    /// Open a pseudo terminal pair, returning the master and the slave path.
    #[cfg(target_os = "linux")]
    fn open_pty() -> Option<(File, String)> {
        use std::os::unix::io::FromRawFd;

        let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) };
        if fd < 0 {
            return None;
        }
        let master = unsafe { File::from_raw_fd(fd) };
        if unsafe { libc::grantpt(fd) } != 0 || unsafe { libc::unlockpt(fd) } != 0 {
            return None;
        }
        let mut name = [0 as libc::c_char; 128];
        if unsafe { libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) } != 0 {
            return None;
        }
        let path = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) }
            .to_str()
            .ok()?
            .to_string();
        Some((master, path))
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pty_raw_bytes() {
        let Some((mut master, path)) = open_pty() else {
            return;
        };
        let port = UnixPort::open(Path::new(&path)).unwrap();
        assert!(matches!(port, UnixPort::Tty(_)));
        let mut driver = ThreadedDriver::spawn(path, port, 64).unwrap();

        // CR and ^C would be translated or swallowed in cooked mode.
        master.write_all(&[0x0D, 0x03, 0xF7]).unwrap();
        let mut got = Vec::new();
        assert!(wait_until(|| {
            while driver.has_data() {
                got.push(driver.read_byte());
            }
            got.len() == 3
        }));
        assert_eq!(got, vec![0x0D, 0x03, 0xF7]);

        driver.close();
    }
}
