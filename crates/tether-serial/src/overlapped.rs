//! Asynchronous-request driver.
//!
//! Each direction has at most one request in flight. Requests point straight
//! into the ring arena, sized to the contiguous run at the cursor, so a
//! request never wraps. The cursor is only advanced once the request has
//! completed.
//!
//! Everything runs on the emulation thread inside [`Transport::update`].
//! Completion is polled, never waited for.

use std::io;

use tether_core::{
    is_transient, LinkState, OverflowReporter, RingBuffer, Transport, TransportError,
    TransportResult,
};

/// Outcome of issuing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// The request finished synchronously, moving this many bytes.
    Complete(usize),
    /// The request is in flight. Poll for its result.
    Pending,
}

/// A device handle with one outstanding read and one outstanding write.
///
/// Implementations map "still pending" and "incomplete" results to
/// [`Submitted::Pending`] or `Ok(None)`. Every error returned is hard.
pub trait OverlappedIo: Send {
    /// Issue a read of up to `len` bytes into `buf`.
    ///
    /// # Safety
    ///
    /// `buf..buf + len` must stay valid and untouched by anyone else until
    /// the request completes or [`cancel_all`](Self::cancel_all) returns.
    unsafe fn start_read(&mut self, buf: *mut u8, len: usize) -> io::Result<Submitted>;

    /// Check the outstanding read without blocking.
    fn poll_read(&mut self) -> io::Result<Option<usize>>;

    /// Issue a write of `len` bytes from `buf`.
    ///
    /// # Safety
    ///
    /// `buf..buf + len` must stay valid until the request completes or
    /// [`cancel_all`](Self::cancel_all) returns.
    unsafe fn start_write(&mut self, buf: *const u8, len: usize) -> io::Result<Submitted>;

    /// Check the outstanding write without blocking.
    fn poll_write(&mut self) -> io::Result<Option<usize>>;

    /// Cancel anything in flight. Must not return until the device no longer
    /// references request buffers.
    fn cancel_all(&mut self);
}

/// Link driver polling an [`OverlappedIo`] once per tick.
pub struct OverlappedDriver<H: OverlappedIo> {
    name: String,
    rx: RingBuffer,
    tx: RingBuffer,
    read_pending: bool,
    write_pending: bool,
    handle: Option<H>,
    state: LinkState,
    overflow: OverflowReporter,
}

impl<H: OverlappedIo> OverlappedDriver<H> {
    pub fn new(name: impl Into<String>, handle: H, capacity: usize) -> TransportResult<Self> {
        if capacity < RingBuffer::MIN_CAPACITY {
            return Err(TransportError::InvalidConfiguration(format!(
                "buffer capacity {} is below the minimum of {}",
                capacity,
                RingBuffer::MIN_CAPACITY
            )));
        }

        let name = name.into();
        log::info!("Opened serial port {}", name);

        Ok(Self {
            name,
            rx: RingBuffer::with_capacity(capacity),
            tx: RingBuffer::with_capacity(capacity),
            read_pending: false,
            write_pending: false,
            handle: Some(handle),
            state: LinkState::Open,
            overflow: OverflowReporter::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_pending(&self) -> bool {
        self.read_pending
    }

    pub fn is_write_pending(&self) -> bool {
        self.write_pending
    }

    /// Transmit bytes dropped because the ring was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.overflow.total_dropped()
    }

    /// Run both directions. A transient error only ends the work of the
    /// direction that hit it; a hard error from either side is returned.
    fn service(&mut self) -> io::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        not_yet_is_ok(receive(handle, &mut self.rx, &mut self.read_pending))?;
        not_yet_is_ok(transmit(handle, &mut self.tx, &mut self.write_pending))
    }

    /// Cancel in-flight requests and close the handle.
    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if self.read_pending || self.write_pending {
                log::trace!("{}: cancelling outstanding requests", self.name);
            }
            handle.cancel_all();
            self.read_pending = false;
            self.write_pending = false;
        }
    }

    #[inline]
    fn is_serviceable(&self) -> bool {
        self.state == LinkState::Open
    }
}

fn not_yet_is_ok(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if is_transient(&e) => Ok(()),
        other => other,
    }
}

fn receive<H: OverlappedIo>(
    handle: &mut H,
    rx: &mut RingBuffer,
    pending: &mut bool,
) -> io::Result<()> {
    loop {
        if *pending {
            match handle.poll_read()? {
                None => return Ok(()),
                Some(n) => {
                    *pending = false;
                    rx.commit_write(n);
                    if n == 0 {
                        return Ok(());
                    }
                }
            }
        } else {
            let run = rx.writable_run();
            if run.is_empty() {
                return Ok(());
            }
            let (ptr, len) = (run.as_mut_ptr(), run.len());
            // SAFETY: the run lies in the ring's boxed arena, which lives as
            // long as the driver. The consumer only reads below the write
            // cursor, so nothing else touches the run until it is committed
            // or the request is cancelled in `release`.
            match unsafe { handle.start_read(ptr, len) }? {
                Submitted::Complete(0) => return Ok(()),
                Submitted::Complete(n) => rx.commit_write(n),
                Submitted::Pending => {
                    *pending = true;
                    return Ok(());
                }
            }
        }
    }
}

fn transmit<H: OverlappedIo>(
    handle: &mut H,
    tx: &mut RingBuffer,
    pending: &mut bool,
) -> io::Result<()> {
    loop {
        if *pending {
            match handle.poll_write()? {
                None => return Ok(()),
                Some(n) => {
                    *pending = false;
                    tx.commit_read(n);
                    if n == 0 {
                        return Ok(());
                    }
                }
            }
        } else {
            let run = tx.readable_run();
            if run.is_empty() {
                return Ok(());
            }
            let (ptr, len) = (run.as_ptr(), run.len());
            // SAFETY: as above. The producer only writes past the write
            // cursor, so the run is stable until committed.
            match unsafe { handle.start_write(ptr, len) }? {
                Submitted::Complete(0) => return Ok(()),
                Submitted::Complete(n) => tx.commit_read(n),
                Submitted::Pending => {
                    *pending = true;
                    return Ok(());
                }
            }
        }
    }
}

impl<H: OverlappedIo> Transport for OverlappedDriver<H> {
    fn has_data(&self) -> bool {
        self.is_serviceable() && !self.rx.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        if !self.is_serviceable() {
            return 0;
        }
        self.rx.try_read_one().unwrap_or(0)
    }

    fn post_byte(&mut self, byte: u8) {
        if !self.is_serviceable() {
            return;
        }
        if self.tx.try_write_one(byte) {
            if self.overflow.is_overflowing() {
                self.overflow.recovered(&self.name);
            }
        } else {
            self.overflow.dropped(&self.name);
        }
    }

    fn update(&mut self) {
        if !self.is_serviceable() {
            return;
        }
        if let Err(e) = self.service() {
            log::error!("I/O error on serial port {}: {}", self.name, e);
            self.release();
            self.state = LinkState::Failed;
        }
    }

    fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.release();
        self.state = LinkState::Closed;
        log::info!("Closed serial port {}", self.name);
    }

    fn state(&self) -> LinkState {
        self.state
    }
}

impl<H: OverlappedIo> Drop for OverlappedDriver<H> {
    fn drop(&mut self) {
        self.close();
    }
}
