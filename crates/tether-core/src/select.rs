//! Device discovery results and preferred-device resolution.
//!
//! Backends enumerate their OS-visible endpoints into an [`Enumeration`]
//! snapshot once, then resolve the user's input and output preferences
//! against that same snapshot. Devices appearing or disappearing while the
//! preferences are resolved cannot make the two directions disagree.
//!
//! ## Resolution Order
//!
//! For each direction independently:
//!
//! 1. No preference: index 0.
//! 2. Exact name match.
//! 3. Name match after stripping a volatile `" N"` suffix from the enumerated
//!    name (some backends append the port number to otherwise stable names).
//! 4. The preference parsed as an index into the enumeration. Only plain
//!    decimal digits count; `"+1"` is a name, not an index.
//! 5. Otherwise resolution fails.
//!
//! Every name is checked for an exact match before any stripped name is, so
//! with `["Synth 1", "Synth"]` the preference `"Synth"` picks index 1 rather
//! than the first entry whose stripped name matches.

use crate::error::{TransportError, TransportResult};

/// Link direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to emulator.
    Input,
    /// Emulator to device.
    Output,
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// One enumerated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the enumeration at the time it was taken.
    pub index: usize,
    /// Display name as reported by the OS.
    pub name: String,
}

/// A device picked for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub index: usize,
    pub name: String,
}

/// Result of resolving both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    pub input: ResolvedDevice,
    /// `None` if the output preference could not be resolved; the link then
    /// runs receive-only.
    pub output: Option<ResolvedDevice>,
}

/// Snapshot of input and output endpoint names taken at one point in time.
///
/// Backends with a single bidirectional endpoint (serial ports) put the same
/// list in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Enumeration {
    pub fn new(inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Self { inputs, outputs }
    }

    /// Same endpoint list for both directions.
    pub fn bidirectional(names: Vec<String>) -> Self {
        Self {
            outputs: names.clone(),
            inputs: names,
        }
    }

    pub fn names(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    /// Ordered `(index, name)` listing for one direction.
    pub fn devices(&self, direction: Direction) -> Vec<DeviceInfo> {
        self.names(direction)
            .iter()
            .enumerate()
            .map(|(index, name)| DeviceInfo {
                index,
                name: name.clone(),
            })
            .collect()
    }

    /// Resolve one preference in one direction.
    pub fn resolve(
        &self,
        direction: Direction,
        preference: Option<&str>,
    ) -> TransportResult<ResolvedDevice> {
        let names = self.names(direction);
        match resolve_index(names, preference) {
            Some(index) => Ok(ResolvedDevice {
                index,
                name: names[index].clone(),
            }),
            None if names.is_empty() => Err(TransportError::NoDevices { direction }),
            None => Err(TransportError::DeviceNotFound {
                direction,
                preference: preference.unwrap_or_default().to_string(),
            }),
        }
    }

    /// Resolve both directions from this snapshot.
    ///
    /// A failed input resolution is an error. A failed output resolution is
    /// logged and leaves `output` empty.
    pub fn select(
        &self,
        input: Option<&str>,
        output: Option<&str>,
    ) -> TransportResult<DeviceSelection> {
        let input = self.resolve(Direction::Input, input)?;
        let output = match self.resolve(Direction::Output, output) {
            Ok(device) => Some(device),
            Err(e) => {
                log::warn!("{}; continuing receive-only", e);
                None
            }
        };
        Ok(DeviceSelection { input, output })
    }
}

/// Strip a trailing `" <digits>"` run that some backends append to port names.
///
/// Names that do not end in a digit, or have no space, are returned unchanged.
pub fn strip_port_number(name: &str) -> &str {
    if !name.ends_with(|c: char| c.is_ascii_digit()) {
        return name;
    }
    match name.rfind(' ') {
        Some(space) => &name[..space],
        None => name,
    }
}

/// Find the enumeration index for `preference`.
///
/// See the module docs for the resolution order. Returns `None` when the
/// preference matches nothing or the enumeration is empty.
pub fn resolve_index<S: AsRef<str>>(names: &[S], preference: Option<&str>) -> Option<usize> {
    if names.is_empty() {
        return None;
    }

    let preference = match preference {
        Some(p) if !p.is_empty() => p,
        _ => return Some(0),
    };

    if let Some(i) = names.iter().position(|n| n.as_ref() == preference) {
        return Some(i);
    }

    if let Some(i) = names
        .iter()
        .position(|n| strip_port_number(n.as_ref()) == preference)
    {
        return Some(i);
    }

    if !preference.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match preference.parse::<usize>() {
        Ok(i) if i < names.len() => Some(i),
        _ => None,
    }
}

/// Format a device listing the way the command-line help prints it.
pub fn describe_devices(kind: &str, devices: &[DeviceInfo]) -> String {
    use core::fmt::Write;

    let mut out = String::new();
    if devices.is_empty() {
        let _ = writeln!(out, "No {} devices found.", kind);
        return out;
    }
    let _ = writeln!(out, "Known {} devices:", kind);
    let _ = writeln!(out);
    for device in devices {
        let _ = writeln!(out, "  {}: {}", device.index, device.name);
    }
    out
}
