//! # tether-core
//!
//! Core abstractions for linking an emulator to external serial and MIDI
//! devices.
//!
//! This crate has no OS dependencies. Drivers live in `tether-serial` and
//! `tether-midi`; this crate provides what they share and what the emulation
//! core talks to.
//!
//! ## Main Traits
//!
//! - [`Transport`] - Byte-level interface polled once per emulation tick
//! - [`ByteSink`] - Emulator-side receiver for inbound bytes
//! - [`WorkLock`] - Emulator work lock taken around shared-state access
//!
//! ## Types
//!
//! - [`RingBuffer`] - Fixed-capacity SPSC byte ring
//! - [`LinkConfig`] - Device and buffer configuration
//! - [`Enumeration`] - Device snapshot and preference resolution
//! - [`ShortMessage`], [`MessageAssembler`] - MIDI framing
//! - [`TransportError`] - Error types

pub mod config;
pub mod error;
pub mod link;
pub mod midi;
pub mod ring;
pub mod select;

// Re-exports for convenience
pub use config::{LinkConfig, LinkKind};
pub use error::{is_transient, TransportError, TransportResult};
pub use link::{
    deliver_received, ByteSink, LinkState, OverflowReporter, Transport, WorkGuard, WorkLock,
};
pub use midi::{
    route_message, short_message_len, status, MessageAssembler, Midi1Status, MidiMessage, Route,
    ShortMessage, MAX_SYSEX_SIZE,
};
pub use ring::RingBuffer;
pub use select::{
    describe_devices, resolve_index, strip_port_number, DeviceInfo, DeviceSelection, Direction,
    Enumeration, ResolvedDevice,
};
