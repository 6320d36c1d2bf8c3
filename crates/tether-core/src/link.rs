//! The emulator-facing side of a device link.
//!
//! The emulation core polls a [`Transport`] once per tick:
//!
//! ```ignore
//! fn tick(link: &mut dyn Transport, uart: &mut Uart) {
//!     link.update();
//!     while link.has_data() {
//!         uart.receive(link.read_byte());
//!     }
//!     while let Some(byte) = uart.take_transmit() {
//!         link.post_byte(byte);
//!     }
//! }
//! ```
//!
//! None of these calls block on device I/O. Drivers either do their I/O on a
//! background thread or poll asynchronous requests without waiting.

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Servicing I/O.
    Open,
    /// A hard I/O error stopped the link. Calls degrade to no-ops.
    Failed,
    /// Closed by the owner, or never opened.
    Closed,
}

impl LinkState {
    #[inline]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Byte-level interface the emulation core polls once per tick.
///
/// Implementations must never block the caller on OS I/O.
pub trait Transport: Send {
    /// Whether a received byte is waiting.
    fn has_data(&self) -> bool;

    /// Pop one received byte, or return 0 if none is waiting.
    ///
    /// Callers are expected to check [`has_data`](Self::has_data) first.
    fn read_byte(&mut self) -> u8;

    /// Queue one byte for transmission.
    ///
    /// If the transmit ring is full the byte is dropped and the overflow is
    /// logged; the link cannot keep up with the emulated traffic.
    fn post_byte(&mut self, byte: u8);

    /// Run one service iteration. Called once per emulation tick from the
    /// emulation thread.
    fn update(&mut self);

    /// Stop I/O and release the device.
    ///
    /// Idempotent, and safe on a link that failed or never opened.
    fn close(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    #[inline]
    fn is_open(&self) -> bool {
        self.state().is_open()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn has_data(&self) -> bool {
        (**self).has_data()
    }

    fn read_byte(&mut self) -> u8 {
        (**self).read_byte()
    }

    fn post_byte(&mut self, byte: u8) {
        (**self).post_byte(byte)
    }

    fn update(&mut self) {
        (**self).update()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn state(&self) -> LinkState {
        (**self).state()
    }
}

// =============================================================================
// Emulation Core Interfaces
// =============================================================================

/// Receiver for inbound bytes on the emulator side.
pub trait ByteSink {
    /// Deliver one received byte.
    fn on_byte_received(&mut self, byte: u8);

    /// Deliver one framed message. Defaults to per-byte delivery.
    fn on_message_received(&mut self, message: &[u8]) {
        for &byte in message {
            self.on_byte_received(byte);
        }
    }
}

impl<F: FnMut(u8)> ByteSink for F {
    fn on_byte_received(&mut self, byte: u8) {
        self(byte)
    }
}

/// The emulation core's work lock.
///
/// Taken around any block of work touching emulated device state from
/// outside the emulation thread's own step loop.
pub trait WorkLock {
    fn lock(&self);
    fn unlock(&self);

    /// Take the lock for the lifetime of the returned guard.
    fn guard(&self) -> WorkGuard<'_, Self>
    where
        Self: Sized,
    {
        self.lock();
        WorkGuard { lock: self }
    }
}

/// RAII guard returned by [`WorkLock::guard`].
pub struct WorkGuard<'a, L: WorkLock> {
    lock: &'a L,
}

impl<L: WorkLock> Drop for WorkGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// Move every currently readable byte from `transport` into `sink` while
/// holding the emulator's work lock. Returns the number of bytes delivered.
pub fn deliver_received<T, L, S>(transport: &mut T, lock: &L, sink: &mut S) -> usize
where
    T: Transport + ?Sized,
    L: WorkLock,
    S: ByteSink + ?Sized,
{
    if !transport.has_data() {
        return 0;
    }
    let _guard = lock.guard();
    let mut delivered = 0;
    while transport.has_data() {
        sink.on_byte_received(transport.read_byte());
        delivered += 1;
    }
    delivered
}

// =============================================================================
// Overflow Reporting
// =============================================================================

/// Rate-limited reporting of dropped transmit bytes.
///
/// The first drop of a burst is logged immediately; the rest are counted and
/// summarised once bytes are accepted again.
#[derive(Debug, Default)]
pub struct OverflowReporter {
    dropped: u64,
    total: u64,
}

impl OverflowReporter {
    pub const fn new() -> Self {
        Self {
            dropped: 0,
            total: 0,
        }
    }

    /// Record one dropped byte.
    pub fn dropped(&mut self, link: &str) {
        if self.dropped == 0 {
            log::error!("{} TX overflow, dropping bytes (this is a bug)", link);
        }
        self.dropped += 1;
        self.total += 1;
    }

    /// Record that bytes are flowing again, closing any open burst.
    pub fn recovered(&mut self, link: &str) {
        if self.dropped > 1 {
            log::error!("{} TX overflow: {} bytes dropped", link, self.dropped);
        }
        self.dropped = 0;
    }

    /// Whether a burst is in progress.
    pub fn is_overflowing(&self) -> bool {
        self.dropped > 0
    }

    /// Bytes dropped over the lifetime of the link.
    pub fn total_dropped(&self) -> u64 {
        self.total
    }
}
