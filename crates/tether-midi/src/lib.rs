//! # tether-midi
//!
//! MIDI links through [`midir`].
//!
//! ## Architecture
//!
//! ```text
//! OS MIDI service
//!        ↓ callback thread
//! Inbound (frames messages, stores them whole)
//!        ↓ rx ring, shared lock
//! MidiDriver (implements tether_core::Transport)
//!        ↓ tx ring, emulation thread only
//! Outbound (MessageAssembler → MessageOutput)
//! ```
//!
//! Input and output ports are resolved from one enumeration snapshot. The
//! input must resolve; a missing output leaves the link receive-only.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_core::{LinkConfig, Transport};
//!
//! let config = LinkConfig::midi().with_input("SC-55").with_output("SC-55");
//! let mut link = tether_midi::open(&config)?;
//! ```

pub mod driver;
pub mod inbound;
pub mod outbound;
pub mod ports;

// Re-exports
pub use driver::MidiDriver;
pub use inbound::{Inbound, SharedRing};
pub use outbound::{MessageOutput, OutputError, Outbound};
pub use ports::{enumerate, list_devices, open};
