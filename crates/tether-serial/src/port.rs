//! Blocking port interface used by the threaded driver.

use std::io;
use std::time::Duration;

/// How long a port may wait for input before returning `Ok(0)`.
///
/// Bounds how long [`ThreadedDriver::close`](crate::ThreadedDriver) waits
/// for the I/O thread to notice the stop request.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound for a single blocking write.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// A device handle serviced by the background I/O thread.
///
/// Both calls may block, but only for a bounded time. Transient conditions
/// (would-block, timed out, interrupted) are either mapped to `Ok(0)` or
/// returned as errors that [`tether_core::is_transient`] recognises. Any
/// other error is fatal for the link.
pub trait PortIo: Send + 'static {
    /// Read into `buf`. `Ok(0)` means nothing arrived within the poll interval.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write some prefix of `buf`, returning how much was accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<P: PortIo + ?Sized> PortIo for Box<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}
