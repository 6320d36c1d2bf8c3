//! Fixed-capacity single-producer/single-consumer byte ring.
//!
//! [`RingBuffer`] is the storage shared between the emulation thread and the
//! device side of a link. It never grows: capacity is fixed at construction
//! and one slot is always kept free so that `read == write` means empty.
//!
//! ## Usable Capacity
//!
//! A ring of capacity `C` holds at most `C - 1` bytes. At every quiescent
//! point `readable_count() + writable_count() == C - 1`.
//!
//! ## Thread Safety
//!
//! The ring itself does no locking. Drivers wrap it in a mutex (or keep it on
//! a single thread) and guarantee one producer and one consumer.
//!
//! ## Bulk Transfers
//!
//! The `*_contiguous` methods move at most one linear run (up to the end of
//! the arena) per call, which is what overlapped I/O needs. The `*_slice`
//! methods loop over both runs.

/// A position inside the ring arena.
///
/// Only supports increment-with-wrap, so a cursor can never leave `[0, C)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    pos: usize,
    capacity: usize,
}

impl Cursor {
    const fn new(capacity: usize) -> Self {
        Self { pos: 0, capacity }
    }

    #[inline]
    const fn get(self) -> usize {
        self.pos
    }

    /// Advance by `n` positions, wrapping at capacity.
    ///
    /// `n` must not exceed the capacity.
    #[inline]
    fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.capacity);
        let next = self.pos + n;
        self.pos = if next >= self.capacity {
            next - self.capacity
        } else {
            next
        };
    }

    /// Distance travelled from `other` to `self`, modulo capacity.
    #[inline]
    const fn distance_from(self, other: Cursor) -> usize {
        if self.pos >= other.pos {
            self.pos - other.pos
        } else {
            self.pos + self.capacity - other.pos
        }
    }
}

/// Fixed-capacity circular byte store with independent read and write cursors.
///
/// # Example
///
/// ```
/// use tether_core::RingBuffer;
///
/// let mut ring = RingBuffer::with_capacity(4);
/// assert_eq!(ring.writable_count(), 3);
///
/// ring.write_one(0x90);
/// assert_eq!(ring.readable_count(), 1);
/// assert_eq!(ring.read_one(), 0x90);
/// ```
pub struct RingBuffer {
    arena: Box<[u8]>,
    read: Cursor,
    write: Cursor,
}

impl RingBuffer {
    /// Default capacity used by the drivers (bytes per direction).
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Smallest capacity that can hold a byte.
    pub const MIN_CAPACITY: usize = 2;

    /// Create a ring with the given arena capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`. [`LinkConfig::validate`](crate::LinkConfig::validate)
    /// rejects such capacities before a driver gets here.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= Self::MIN_CAPACITY,
            "ring capacity must be at least {}",
            Self::MIN_CAPACITY
        );
        Self {
            arena: vec![0u8; capacity].into_boxed_slice(),
            read: Cursor::new(capacity),
            write: Cursor::new(capacity),
        }
    }

    /// Arena capacity. One less than this is usable.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Number of bytes that can be read.
    #[inline]
    pub fn readable_count(&self) -> usize {
        self.write.distance_from(self.read)
    }

    /// Number of bytes that can be written.
    #[inline]
    pub fn writable_count(&self) -> usize {
        self.capacity() - 1 - self.readable_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.writable_count() == 0
    }

    /// Discard everything readable.
    pub fn clear(&mut self) {
        self.read = self.write;
    }

    // =========================================================================
    // Single-byte access
    // =========================================================================

    /// Write one byte without checking for space.
    ///
    /// Callers must check `writable_count() > 0` first. Writing to a full ring
    /// would make it look empty; debug builds assert instead.
    #[inline]
    pub fn write_one(&mut self, byte: u8) {
        debug_assert!(self.writable_count() > 0, "write to full ring");
        self.arena[self.write.get()] = byte;
        self.write.advance(1);
    }

    /// Read one byte without checking for data.
    ///
    /// Callers must check `readable_count() > 0` first.
    #[inline]
    pub fn read_one(&mut self) -> u8 {
        debug_assert!(self.readable_count() > 0, "read from empty ring");
        let byte = self.arena[self.read.get()];
        self.read.advance(1);
        byte
    }

    /// Write one byte if there is space. Returns `false` when full.
    #[inline]
    pub fn try_write_one(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.write_one(byte);
        true
    }

    /// Read one byte if any is available.
    #[inline]
    pub fn try_read_one(&mut self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.read_one())
        }
    }

    // =========================================================================
    // Linear runs
    // =========================================================================

    /// Length of the writable run starting at the write cursor, without
    /// crossing the end of the arena.
    pub fn contiguous_writable(&self) -> usize {
        let (r, w) = (self.read.get(), self.write.get());
        if w >= r {
            // Free space runs to the end of the arena, but if the reader sits
            // at 0 the last slot must stay free.
            let run = self.capacity() - w;
            if r == 0 {
                run - 1
            } else {
                run
            }
        } else {
            r - w - 1
        }
    }

    /// Length of the readable run starting at the read cursor, without
    /// crossing the end of the arena.
    pub fn contiguous_readable(&self) -> usize {
        let (r, w) = (self.read.get(), self.write.get());
        if w >= r {
            w - r
        } else {
            self.capacity() - r
        }
    }

    /// The writable run as a mutable slice. Commit with [`commit_write`](Self::commit_write).
    pub fn writable_run(&mut self) -> &mut [u8] {
        let start = self.write.get();
        let len = self.contiguous_writable();
        &mut self.arena[start..start + len]
    }

    /// The readable run as a slice. Release with [`commit_read`](Self::commit_read).
    pub fn readable_run(&self) -> &[u8] {
        let start = self.read.get();
        let len = self.contiguous_readable();
        &self.arena[start..start + len]
    }

    /// Mark `n` bytes of the writable run as written.
    pub fn commit_write(&mut self, n: usize) {
        debug_assert!(n <= self.contiguous_writable(), "commit past writable run");
        self.write.advance(n);
    }

    /// Mark `n` bytes of the readable run as consumed.
    pub fn commit_read(&mut self, n: usize) {
        debug_assert!(n <= self.contiguous_readable(), "commit past readable run");
        self.read.advance(n);
    }

    // =========================================================================
    // Bulk copies
    // =========================================================================

    /// Copy from `src` into one linear run. Returns the number of bytes copied,
    /// which may be less than `src.len()` even if more space exists after
    /// wraparound.
    pub fn write_contiguous(&mut self, src: &[u8]) -> usize {
        let run = self.writable_run();
        let n = run.len().min(src.len());
        run[..n].copy_from_slice(&src[..n]);
        self.commit_write(n);
        n
    }

    /// Copy one linear run into `dst`. Returns the number of bytes copied.
    pub fn read_contiguous(&mut self, dst: &mut [u8]) -> usize {
        let run = self.readable_run();
        let n = run.len().min(dst.len());
        dst[..n].copy_from_slice(&run[..n]);
        self.commit_read(n);
        n
    }

    /// Copy as much of `src` as fits, across wraparound.
    pub fn write_slice(&mut self, src: &[u8]) -> usize {
        let mut written = 0;
        while written < src.len() {
            let n = self.write_contiguous(&src[written..]);
            if n == 0 {
                break;
            }
            written += n;
        }
        written
    }

    /// Fill as much of `dst` as possible, across wraparound.
    pub fn read_slice(&mut self, dst: &mut [u8]) -> usize {
        let mut read = 0;
        while read < dst.len() {
            let n = self.read_contiguous(&mut dst[read..]);
            if n == 0 {
                break;
            }
            read += n;
        }
        read
    }

    /// Move everything readable into `dst` (appending). Returns the byte count.
    pub fn drain_into(&mut self, dst: &mut Vec<u8>) -> usize {
        let mut moved = 0;
        while !self.is_empty() {
            let run = self.readable_run();
            let n = run.len();
            dst.extend_from_slice(run);
            self.commit_read(n);
            moved += n;
        }
        moved
    }
}

impl core::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("read", &self.read.get())
            .field("write", &self.write.get())
            .field("readable", &self.readable_count())
            .finish()
    }
}
