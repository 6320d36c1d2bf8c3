//! Background-thread driver for blocking ports.
//!
//! A dedicated I/O thread owns the port and loops until told to stop:
//!
//! ```text
//!            emulation thread                      I/O thread
//!   read_byte ──lock──► rx ring ◄──lock── copy staged ◄── port.read()
//!   post_byte ──lock──► tx ring ──lock──► drain to stage ──► port.write()
//! ```
//!
//! The shared lock is only held for ring copies. Port reads and writes
//! happen outside it, so the emulation thread never waits on the device.
//!
//! ## Shutdown
//!
//! The I/O thread owns the port and drops it on its way out, so closing a
//! slow device never stalls the emulation thread.
//! [`close`](ThreadedDriver::close) clears the run flag and joins the
//! thread; once it returns the port has been released. The rings are
//! reference counted and outlive both sides.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tether_core::{
    is_transient, LinkState, OverflowReporter, RingBuffer, Transport, TransportError,
    TransportResult,
};

use crate::port::{PortIo, POLL_INTERVAL};

struct Rings {
    rx: RingBuffer,
    tx: RingBuffer,
}

/// State shared between the emulation thread and the I/O thread.
struct Shared {
    rings: Mutex<Rings>,
    running: AtomicBool,
    failed: AtomicBool,
    read_pending: AtomicBool,
    write_pending: AtomicBool,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        Self {
            rings: Mutex::new(Rings {
                rx: RingBuffer::with_capacity(capacity),
                tx: RingBuffer::with_capacity(capacity),
            }),
            running: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            read_pending: AtomicBool::new(false),
            write_pending: AtomicBool::new(false),
        }
    }
}

/// Link driver that services a [`PortIo`] on a background thread.
pub struct ThreadedDriver<P: PortIo> {
    name: String,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    state: LinkState,
    overflow: OverflowReporter,
    _port: PhantomData<fn() -> P>,
}

impl<P: PortIo> ThreadedDriver<P> {
    /// Start servicing `port` with rings of `capacity` bytes per direction.
    pub fn spawn(name: impl Into<String>, port: P, capacity: usize) -> TransportResult<Self> {
        if capacity < RingBuffer::MIN_CAPACITY {
            return Err(TransportError::InvalidConfiguration(format!(
                "buffer capacity {} is below the minimum of {}",
                capacity,
                RingBuffer::MIN_CAPACITY
            )));
        }

        let name = name.into();
        let shared = Arc::new(Shared::new(capacity));

        let worker = {
            let shared = Arc::clone(&shared);
            let name = name.clone();
            thread::Builder::new()
                .name("tether-io".to_string())
                .spawn(move || service(port, &shared, &name))?
        };

        log::info!("Opened serial port {}", name);

        Ok(Self {
            name,
            shared,
            worker: Some(worker),
            state: LinkState::Open,
            overflow: OverflowReporter::new(),
            _port: PhantomData,
        })
    }

    /// Device name this driver was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the I/O thread is between reading from the port and storing
    /// the bytes in the receive ring.
    pub fn is_read_pending(&self) -> bool {
        self.shared.read_pending.load(Ordering::Acquire)
    }

    /// Whether drained transmit bytes are still waiting to reach the port.
    pub fn is_write_pending(&self) -> bool {
        self.shared.write_pending.load(Ordering::Acquire)
    }

    /// Transmit bytes dropped because the ring was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.overflow.total_dropped()
    }

    #[inline]
    fn is_serviceable(&self) -> bool {
        self.state == LinkState::Open && !self.shared.failed.load(Ordering::Acquire)
    }

    /// Stop the I/O thread and wait for it to release the port.
    fn join_worker(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.join().is_err() {
            log::error!("I/O thread for {} panicked", self.name);
        }
    }

    /// Reap the I/O thread only if it has already exited.
    fn reap_finished_worker(&mut self) {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_worker();
        }
    }
}

impl<P: PortIo> Transport for ThreadedDriver<P> {
    fn has_data(&self) -> bool {
        self.is_serviceable() && !self.shared.rings.lock().rx.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        if !self.is_serviceable() {
            return 0;
        }
        self.shared.rings.lock().rx.try_read_one().unwrap_or(0)
    }

    fn post_byte(&mut self, byte: u8) {
        if !self.is_serviceable() {
            return;
        }
        let accepted = self.shared.rings.lock().tx.try_write_one(byte);
        if accepted {
            if self.overflow.is_overflowing() {
                self.overflow.recovered(&self.name);
            }
        } else {
            self.overflow.dropped(&self.name);
        }
    }

    fn update(&mut self) {
        if self.state != LinkState::Open {
            return;
        }
        if self.shared.failed.load(Ordering::Acquire) {
            // The thread may still be releasing the port; never wait for it here.
            self.reap_finished_worker();
            self.state = LinkState::Failed;
            log::debug!("{} stopped after an I/O error", self.name);
        }
    }

    fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.join_worker();
        self.state = LinkState::Closed;
        log::info!("Closed serial port {}", self.name);
    }

    fn state(&self) -> LinkState {
        self.state
    }
}

impl<P: PortIo> Drop for ThreadedDriver<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The I/O thread loop. The port is released before the thread exits.
fn service<P: PortIo>(mut port: P, shared: &Shared, name: &str) {
    let capacity = shared.rings.lock().rx.capacity();
    let mut rx_stage = vec![0u8; capacity];
    let mut tx_stage: Vec<u8> = Vec::with_capacity(capacity);
    let mut tx_sent = 0usize;

    while shared.running.load(Ordering::Acquire) {
        let mut progressed = false;
        let mut waited = false;

        // Receive
        if !shared.read_pending.load(Ordering::Acquire) {
            let free = shared.rings.lock().rx.writable_count();
            if free > 0 {
                waited = true;
                match port.read(&mut rx_stage[..free]) {
                    Ok(0) => {}
                    Ok(n) => {
                        shared.read_pending.store(true, Ordering::Release);
                        let stored = shared.rings.lock().rx.write_slice(&rx_stage[..n]);
                        // Only this thread produces into rx, so free space
                        // can only have grown since it was measured.
                        debug_assert_eq!(stored, n);
                        shared.read_pending.store(false, Ordering::Release);
                        progressed = true;
                    }
                    Err(e) if is_transient(&e) => {}
                    Err(e) => {
                        log::error!("Error reading from serial port {}: {}", name, e);
                        shared.failed.store(true, Ordering::Release);
                        break;
                    }
                }
            }
        }

        // Transmit
        if !shared.write_pending.load(Ordering::Acquire) {
            let mut rings = shared.rings.lock();
            if !rings.tx.is_empty() {
                tx_stage.clear();
                tx_sent = 0;
                rings.tx.drain_into(&mut tx_stage);
                shared.write_pending.store(true, Ordering::Release);
            }
        }

        if shared.write_pending.load(Ordering::Acquire) {
            match port.write(&tx_stage[tx_sent..]) {
                Ok(n) => {
                    tx_sent += n;
                    progressed |= n > 0;
                    if tx_sent >= tx_stage.len() {
                        shared.write_pending.store(false, Ordering::Release);
                    }
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => {
                    log::error!("Error writing to serial port {}: {}", name, e);
                    shared.failed.store(true, Ordering::Release);
                    break;
                }
            }
        }

        if !progressed && !waited {
            thread::sleep(POLL_INTERVAL);
        }
    }

    log::debug!("I/O thread for {} exiting", name);
    drop(port);
}
