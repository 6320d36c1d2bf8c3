//! MIDI framing for byte-stream and event-word transports.
//!
//! Some MIDI backends deliver packed event words instead of a byte stream.
//! This module decides how many bytes of such a word belong to the message
//! (the short-message length rule), and in the other direction assembles a
//! raw outbound byte stream into whole messages for ports that only accept
//! complete messages.
//!
//! ## Short Messages
//!
//! Channel voice messages are identified by the high nibble of the status
//! byte alone:
//!
//! | High nibble           | Length |
//! |-----------------------|--------|
//! | `0x8 0x9 0xA 0xB 0xE` | 3      |
//! | `0xC 0xD`             | 2      |
//! | anything else         | not a short message |
//!
//! System common, real-time and SysEx bytes are passed through as raw spans.
//!
//! ## Buffer Sizes
//!
//! SysEx assembly size can be configured via Cargo features:
//! - Default: 1024 bytes
//! - `sysex-256`: 256 bytes
//! - `sysex-512`: 512 bytes
//! - `sysex-2048`: 2048 bytes

// =============================================================================
// Buffer Size Configuration
// =============================================================================

/// Maximum SysEx message size in bytes, including `F0` and `F7`.
///
/// Configurable via Cargo features: `sysex-256`, `sysex-512`, `sysex-2048`.
#[cfg(feature = "sysex-2048")]
pub const MAX_SYSEX_SIZE: usize = 2048;

/// Maximum SysEx message size in bytes, including `F0` and `F7`.
#[cfg(all(feature = "sysex-512", not(feature = "sysex-2048")))]
pub const MAX_SYSEX_SIZE: usize = 512;

/// Maximum SysEx message size in bytes, including `F0` and `F7`.
#[cfg(all(feature = "sysex-256", not(feature = "sysex-512"), not(feature = "sysex-2048")))]
pub const MAX_SYSEX_SIZE: usize = 256;

/// Maximum SysEx message size in bytes, including `F0` and `F7`.
#[cfg(not(any(feature = "sysex-256", feature = "sysex-512", feature = "sysex-2048")))]
pub const MAX_SYSEX_SIZE: usize = 1024;

/// Status bytes with special meaning.
pub mod status {
    /// Start of System Exclusive.
    pub const SYSEX_START: u8 = 0xF0;
    /// MIDI Time Code quarter frame (1 data byte).
    pub const MTC_QUARTER_FRAME: u8 = 0xF1;
    /// Song Position Pointer (2 data bytes).
    pub const SONG_POSITION: u8 = 0xF2;
    /// Song Select (1 data byte).
    pub const SONG_SELECT: u8 = 0xF3;
    /// Tune Request (no data).
    pub const TUNE_REQUEST: u8 = 0xF6;
    /// End of System Exclusive.
    pub const SYSEX_END: u8 = 0xF7;
    /// First real-time byte (Timing Clock). Everything from here up is real-time.
    pub const REALTIME_FIRST: u8 = 0xF8;
}

/// MIDI 1.0 channel voice message types (high nibble of the status byte).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Midi1Status {
    NoteOff = 0x80,
    NoteOn = 0x90,
    PolyPressure = 0xA0,
    ControlChange = 0xB0,
    ProgramChange = 0xC0,
    ChannelPressure = 0xD0,
    PitchBend = 0xE0,
}

impl Midi1Status {
    /// Classify a status byte, ignoring the channel nibble.
    pub const fn from_status(status: u8) -> Option<Self> {
        match status & 0xF0 {
            0x80 => Some(Self::NoteOff),
            0x90 => Some(Self::NoteOn),
            0xA0 => Some(Self::PolyPressure),
            0xB0 => Some(Self::ControlChange),
            0xC0 => Some(Self::ProgramChange),
            0xD0 => Some(Self::ChannelPressure),
            0xE0 => Some(Self::PitchBend),
            _ => None,
        }
    }

    /// Number of data bytes following the status byte.
    pub const fn data_len(self) -> usize {
        match self {
            Self::ProgramChange | Self::ChannelPressure => 1,
            _ => 2,
        }
    }
}

/// Total length (status plus data) of a short message, or `None` if `status`
/// does not start a short message.
///
/// ```
/// use tether_core::short_message_len;
///
/// assert_eq!(short_message_len(0x90), Some(3));
/// assert_eq!(short_message_len(0xC3), Some(2));
/// assert_eq!(short_message_len(0xF0), None);
/// ```
#[inline]
pub const fn short_message_len(status: u8) -> Option<usize> {
    match Midi1Status::from_status(status) {
        Some(kind) => Some(1 + kind.data_len()),
        None => None,
    }
}

/// A 2 or 3 byte channel voice message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortMessage {
    bytes: [u8; 3],
    len: u8,
}

impl ShortMessage {
    /// Build from raw bytes. `bytes` must start with a short-message status
    /// and contain at least the required data bytes; extra bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let len = short_message_len(status)?;
        if bytes.len() < len {
            return None;
        }
        let mut out = [0u8; 3];
        out[..len].copy_from_slice(&bytes[..len]);
        Some(Self {
            bytes: out,
            len: len as u8,
        })
    }

    /// Unpack an event word with the status in the low byte, first data byte
    /// in bits 8-15 and second data byte in bits 16-23.
    pub fn from_packed(word: u32) -> Option<Self> {
        Self::from_bytes(&word.to_le_bytes()[..3])
    }

    /// Pack into an event word, the inverse of [`from_packed`](Self::from_packed).
    pub fn to_packed(&self) -> u32 {
        self.as_bytes()
            .iter()
            .enumerate()
            .fold(0u32, |word, (i, &b)| word | (b as u32) << (i * 8))
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    #[inline]
    pub fn kind(&self) -> Midi1Status {
        // Construction guarantees a channel voice status.
        match Midi1Status::from_status(self.bytes[0]) {
            Some(kind) => kind,
            None => unreachable!("ShortMessage always holds a channel voice status"),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always `false`: a short message has at least a status and one data byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A framed inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage<'a> {
    /// Channel voice message.
    Short(ShortMessage),
    /// SysEx, system common or real-time bytes, passed through unframed.
    Raw(&'a [u8]),
}

impl<'a> MidiMessage<'a> {
    /// Classify a message span delivered by a backend.
    ///
    /// Spans starting with a channel voice status are trimmed to the
    /// short-message length. Anything else is returned as a raw span.
    pub fn frame(bytes: &'a [u8]) -> Self {
        match ShortMessage::from_bytes(bytes) {
            Some(short) => Self::Short(short),
            None => Self::Raw(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Short(short) => short.as_bytes(),
            Self::Raw(bytes) => bytes,
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Where an inbound message should go when several emulator instances share
/// one MIDI input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Deliver to every instance (SysEx).
    Broadcast,
    /// Deliver to one instance.
    Instance(usize),
    /// Drop the message.
    Discard,
}

/// Pick the destination for an inbound message.
///
/// SysEx is broadcast; everything else goes to `channel % instance_count`.
/// Empty spans and spans starting with a data byte are discarded.
pub fn route_message(bytes: &[u8], instance_count: usize) -> Route {
    let Some(&first) = bytes.first() else {
        return Route::Discard;
    };
    if instance_count == 0 {
        return Route::Discard;
    }
    if first < 0x80 {
        log::warn!("Dropping MIDI message starting with data byte {:02x}", first);
        return Route::Discard;
    }
    if first == status::SYSEX_START {
        Route::Broadcast
    } else {
        Route::Instance((first & 0x0F) as usize % instance_count)
    }
}

// =============================================================================
// Outbound Assembly
// =============================================================================

/// Turns a raw MIDI byte stream into complete messages.
///
/// Handles running status, interleaved real-time bytes and SysEx. Storage is
/// fixed at [`MAX_SYSEX_SIZE`]; overlong SysEx is dropped.
///
/// # Example
///
/// ```
/// use tether_core::MessageAssembler;
///
/// let mut asm = MessageAssembler::new();
/// let mut out = Vec::new();
/// for b in [0x90, 60, 100, 62, 100] {
///     asm.push(b, |msg| out.push(msg.to_vec()));
/// }
/// assert_eq!(out, vec![vec![0x90, 60, 100], vec![0x90, 62, 100]]);
/// ```
pub struct MessageAssembler {
    buffer: Box<[u8; MAX_SYSEX_SIZE]>,
    len: usize,
    /// Bytes the current message needs in total, or `None` for SysEx.
    expected: Option<usize>,
    running_status: Option<u8>,
    in_sysex: bool,
    sysex_overflowed: bool,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Box::new([0u8; MAX_SYSEX_SIZE]),
            len: 0,
            expected: None,
            running_status: None,
            in_sysex: false,
            sysex_overflowed: false,
        }
    }

    /// Drop any partial message and forget running status.
    pub fn reset(&mut self) {
        self.len = 0;
        self.expected = None;
        self.running_status = None;
        self.in_sysex = false;
        self.sysex_overflowed = false;
    }

    /// Whether a message is partially assembled.
    pub fn is_partial(&self) -> bool {
        self.len > 0
    }

    /// Feed one byte. `emit` is called for every completed message.
    pub fn push<F: FnMut(&[u8])>(&mut self, byte: u8, mut emit: F) {
        // Real-time bytes may appear anywhere, even inside SysEx.
        if byte >= status::REALTIME_FIRST {
            emit(&[byte]);
            return;
        }

        if byte >= 0x80 {
            self.start_status(byte, &mut emit);
            return;
        }

        if self.in_sysex {
            self.push_sysex(byte);
            return;
        }

        if self.len == 0 {
            // Data byte with no message open: reuse running status.
            match self.running_status {
                Some(status) => {
                    self.buffer[0] = status;
                    self.len = 1;
                    self.expected = short_message_len(status);
                }
                None => {
                    log::debug!("Dropping stray MIDI data byte {:02x}", byte);
                    return;
                }
            }
        }

        self.buffer[self.len] = byte;
        self.len += 1;
        if Some(self.len) == self.expected {
            emit(&self.buffer[..self.len]);
            self.len = 0;
            self.expected = None;
        }
    }

    fn start_status<F: FnMut(&[u8])>(&mut self, byte: u8, emit: &mut F) {
        if self.in_sysex {
            if byte == status::SYSEX_END {
                self.push_sysex(byte);
                if self.sysex_overflowed {
                    log::warn!(
                        "Dropping SysEx message longer than {} bytes",
                        MAX_SYSEX_SIZE
                    );
                } else {
                    emit(&self.buffer[..self.len]);
                }
                self.reset_message();
                return;
            }
            // Any other status terminates SysEx without completing it.
            log::warn!("Unterminated SysEx interrupted by status {:02x}", byte);
            self.reset_message();
        } else if self.len > 0 {
            log::debug!("Incomplete MIDI message interrupted by status {:02x}", byte);
            self.reset_message();
        }

        if byte == status::SYSEX_START {
            self.running_status = None;
            self.in_sysex = true;
            self.buffer[0] = byte;
            self.len = 1;
            return;
        }

        if let Some(len) = short_message_len(byte) {
            self.running_status = Some(byte);
            self.buffer[0] = byte;
            self.len = 1;
            self.expected = Some(len);
            return;
        }

        // System common: cancels running status.
        self.running_status = None;
        let len = match byte {
            status::MTC_QUARTER_FRAME | status::SONG_SELECT => 2,
            status::SONG_POSITION => 3,
            status::TUNE_REQUEST => 1,
            _ => {
                // Undefined (F4, F5) or a stray F7.
                log::debug!("Dropping undefined MIDI status {:02x}", byte);
                return;
            }
        };
        if len == 1 {
            emit(&[byte]);
        } else {
            self.buffer[0] = byte;
            self.len = 1;
            self.expected = Some(len);
        }
    }

    fn push_sysex(&mut self, byte: u8) {
        if self.len < MAX_SYSEX_SIZE {
            self.buffer[self.len] = byte;
            self.len += 1;
        } else {
            self.sysex_overflowed = true;
        }
    }

    fn reset_message(&mut self) {
        self.len = 0;
        self.expected = None;
        self.in_sysex = false;
        self.sysex_overflowed = false;
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut asm = MessageAssembler::new();
        let mut out = Vec::new();
        for &b in bytes {
            asm.push(b, |msg| out.push(msg.to_vec()));
        }
        out
    }

    #[test]
    fn test_short_message_len() {
        assert_eq!(short_message_len(0x90), Some(3));
        assert_eq!(short_message_len(0x8F), Some(3));
        assert_eq!(short_message_len(0xA0), Some(3));
        assert_eq!(short_message_len(0xB5), Some(3));
        assert_eq!(short_message_len(0xE0), Some(3));
        assert_eq!(short_message_len(0xC3), Some(2));
        assert_eq!(short_message_len(0xD0), Some(2));
        assert_eq!(short_message_len(0xF0), None);
        assert_eq!(short_message_len(0xF8), None);
        assert_eq!(short_message_len(0x40), None);
    }

    #[test]
    fn test_from_packed_note_on() {
        let msg = ShortMessage::from_packed(0x0064_3C91).unwrap();
        assert_eq!(msg.as_bytes(), &[0x91, 0x3C, 0x64]);
        assert_eq!(msg.channel(), 1);
        assert_eq!(msg.kind(), Midi1Status::NoteOn);
    }

    #[test]
    fn test_from_packed_program_change_ignores_third_byte() {
        let msg = ShortMessage::from_packed(0x00FF_05C2).unwrap();
        assert_eq!(msg.as_bytes(), &[0xC2, 0x05]);
        assert_eq!(msg.len(), 2);
    }

    #[test]
    fn test_from_packed_rejects_system_messages() {
        assert!(ShortMessage::from_packed(0x0000_00F8).is_none());
        assert!(ShortMessage::from_packed(0x0000_00F0).is_none());
    }

    #[test]
    fn test_packed_inverse() {
        let msg = ShortMessage::from_bytes(&[0xE3, 0x00, 0x40]).unwrap();
        assert_eq!(msg.to_packed(), 0x0040_00E3);
        assert_eq!(ShortMessage::from_packed(msg.to_packed()), Some(msg));
    }

    #[test]
    fn test_from_bytes_needs_data() {
        assert!(ShortMessage::from_bytes(&[0x90, 0x3C]).is_none());
        assert!(ShortMessage::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_frame_trims_short_and_passes_raw() {
        let short = MidiMessage::frame(&[0xC0, 0x10, 0x99]);
        assert_eq!(short.as_bytes(), &[0xC0, 0x10]);

        let sysex = [0xF0, 0x41, 0x10, 0xF7];
        assert_eq!(MidiMessage::frame(&sysex), MidiMessage::Raw(&sysex));
    }

    #[test]
    fn test_route_message() {
        assert_eq!(route_message(&[], 2), Route::Discard);
        assert_eq!(route_message(&[0x40, 0x00], 2), Route::Discard);
        assert_eq!(route_message(&[0xF0, 0x41, 0xF7], 2), Route::Broadcast);
        assert_eq!(route_message(&[0x93, 60, 100], 2), Route::Instance(1));
        assert_eq!(route_message(&[0x94, 60, 100], 2), Route::Instance(0));
        assert_eq!(route_message(&[0x90, 60, 100], 0), Route::Discard);
    }

    #[test]
    fn test_assemble_running_status() {
        let out = assemble(&[0x90, 60, 100, 62, 100, 0xC1, 5, 6]);
        assert_eq!(
            out,
            vec![
                vec![0x90, 60, 100],
                vec![0x90, 62, 100],
                vec![0xC1, 5],
                vec![0xC1, 6],
            ]
        );
    }

    #[test]
    fn test_assemble_realtime_inside_message() {
        let out = assemble(&[0x90, 60, 0xF8, 100]);
        assert_eq!(out, vec![vec![0xF8], vec![0x90, 60, 100]]);
    }

    #[test]
    fn test_assemble_sysex() {
        let out = assemble(&[0xF0, 0x41, 0x10, 0x42, 0xF8, 0x12, 0xF7]);
        assert_eq!(out, vec![vec![0xF8], vec![0xF0, 0x41, 0x10, 0x42, 0x12, 0xF7]]);
    }

    #[test]
    fn test_assemble_system_common_cancels_running_status() {
        let out = assemble(&[0x90, 60, 100, 0xF3, 2, 62, 100, 0xF6]);
        // The data bytes after Song Select have no running status to reuse.
        assert_eq!(out, vec![vec![0x90, 60, 100], vec![0xF3, 2], vec![0xF6]]);
    }

    #[test]
    fn test_assemble_drops_overlong_sysex() {
        let mut bytes = vec![0xF0];
        bytes.extend(std::iter::repeat(0x01).take(MAX_SYSEX_SIZE));
        bytes.push(0xF7);
        bytes.extend_from_slice(&[0xB0, 7, 100]);
        let out = assemble(&bytes);
        assert_eq!(out, vec![vec![0xB0, 7, 100]]);
    }

    #[test]
    fn test_assemble_interrupted_message_is_dropped() {
        let out = assemble(&[0x90, 60, 0xB0, 7, 127]);
        assert_eq!(out, vec![vec![0xB0, 7, 127]]);
    }

    #[test]
    fn test_assemble_stray_data_without_status() {
        assert!(assemble(&[0x10, 0x20]).is_empty());
    }
}
