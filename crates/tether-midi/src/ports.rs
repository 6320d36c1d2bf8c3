//! Port enumeration and the `open` entry point.

use midir::{Ignore, MidiIO, MidiInput, MidiOutput};
use tether_core::{
    DeviceInfo, Direction, Enumeration, LinkConfig, LinkKind, TransportError, TransportResult,
};

use crate::driver::MidiDriver;
use crate::inbound::Inbound;
use crate::outbound::MessageOutput;

fn backend_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Backend(e.to_string())
}

fn port_names<T: MidiIO>(io: &T, ports: &[T::Port]) -> Vec<String> {
    ports
        .iter()
        .map(|port| io.port_name(port).unwrap_or_default())
        .collect()
}

/// Both directions enumerated back to back, with the port handles the names
/// were read from.
struct Snapshot {
    input: MidiInput,
    input_ports: Vec<midir::MidiInputPort>,
    output: MidiOutput,
    output_ports: Vec<midir::MidiOutputPort>,
    names: Enumeration,
}

impl Snapshot {
    fn take(client_name: &str) -> TransportResult<Self> {
        let input = MidiInput::new(client_name).map_err(backend_error)?;
        let output = MidiOutput::new(client_name).map_err(backend_error)?;
        let input_ports = input.ports();
        let output_ports = output.ports();
        let names = Enumeration::new(
            port_names(&input, &input_ports),
            port_names(&output, &output_ports),
        );
        Ok(Self {
            input,
            input_ports,
            output,
            output_ports,
            names,
        })
    }
}

/// Current MIDI input and output port names.
pub fn enumerate(client_name: &str) -> TransportResult<Enumeration> {
    Snapshot::take(client_name).map(|snapshot| snapshot.names)
}

/// `(index, name)` listings for inputs and outputs, enumerated fresh.
pub fn list_devices(client_name: &str) -> TransportResult<(Vec<DeviceInfo>, Vec<DeviceInfo>)> {
    let names = enumerate(client_name)?;
    Ok((
        names.devices(Direction::Input),
        names.devices(Direction::Output),
    ))
}

/// Open the MIDI link described by `config`.
///
/// The input port must resolve. An output that does not resolve or fails
/// to connect leaves the link receive-only.
pub fn open(config: &LinkConfig) -> TransportResult<MidiDriver> {
    config.validate()?;
    if config.kind != LinkKind::Midi {
        return Err(TransportError::InvalidConfiguration(
            "not a MIDI link configuration".to_string(),
        ));
    }

    let Snapshot {
        mut input,
        input_ports,
        output,
        output_ports,
        names,
    } = Snapshot::take(&config.client_name)?;
    let selection = names.select(config.input.as_deref(), config.output.as_deref())?;

    let output = match selection.output {
        Some(device) => match output.connect(&output_ports[device.index], &config.client_name) {
            Ok(connection) => {
                log::info!("Opened MIDI output {}", device.name);
                Some((
                    device.name,
                    Box::new(connection) as Box<dyn MessageOutput>,
                ))
            }
            Err(e) => {
                log::warn!(
                    "Failed to open MIDI output {}: {}; continuing receive-only",
                    device.name,
                    e
                );
                None
            }
        },
        None => None,
    };

    let device = selection.input;
    let (mut driver, inbound) = MidiDriver::new(device.name.clone(), config.buffer_capacity, output)?;

    input.ignore(Ignore::None);
    let connection = input
        .connect(
            &input_ports[device.index],
            &config.client_name,
            |_timestamp, message, inbound: &mut Inbound| {
                inbound.push(message);
            },
            inbound,
        )
        .map_err(|e| {
            log::error!("Failed to open MIDI input {}: {}", device.name, e);
            TransportError::OpenFailed {
                device: device.name.clone(),
                reason: e.to_string(),
            }
        })?;
    driver.attach_input(connection);

    log::info!("Opened MIDI input {}", device.name);
    Ok(driver)
}
