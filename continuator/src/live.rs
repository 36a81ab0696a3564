// Live MIDI transport over midir.
//
// The input callback runs on midir's own thread; it parses each message and
// pushes note events into an mpsc channel, which `poll_pending_events`
// drains without blocking from the session loop's thread. Event timestamps
// are seconds since the session epoch shared with the loop, not midir's
// backend-specific stamps.
//
// Default ports: the first input, and the second output when more than one
// exists (the first is usually a software synth thru port), else the first.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Instant;

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::error::ContinuatorError;
use crate::note::{NoteEvent, NoteEventKind};
use crate::transport::{MidiTransport, note_message};

const CLIENT_NAME: &str = "continuator";

fn transport_err(e: impl std::fmt::Display) -> ContinuatorError {
    ContinuatorError::Transport(e.to_string())
}

/// Names of the available input and output ports, in backend order.
pub fn list_ports() -> Result<(Vec<String>, Vec<String>), ContinuatorError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(transport_err)?;
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(transport_err)?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();
    Ok((inputs, outputs))
}

/// Which direction a port is chosen for; only affects the default choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRole {
    Input,
    Output,
}

/// Pick a port index among `names`. A `wanted` name matches any port whose
/// name contains it.
pub fn choose_port(names: &[String], wanted: Option<&str>, role: PortRole) -> Result<usize, ContinuatorError> {
    if names.is_empty() {
        return Err(ContinuatorError::Transport(format!(
            "no MIDI {} ports available",
            match role {
                PortRole::Input => "input",
                PortRole::Output => "output",
            }
        )));
    }
    match wanted {
        Some(wanted) => names
            .iter()
            .position(|n| n.contains(wanted))
            .ok_or_else(|| ContinuatorError::Transport(format!("MIDI port '{wanted}' not found"))),
        None => match role {
            PortRole::Output if names.len() > 1 => Ok(1),
            _ => Ok(0),
        },
    }
}

pub struct MidirTransport {
    // Held only to keep the input callback alive.
    _input: MidiInputConnection<()>,
    output: MidiOutputConnection,
    events: Receiver<NoteEvent>,
    channel: u8,
    input_name: String,
}

impl MidirTransport {
    /// Open an input and an output port. `in_port` / `out_port` select by
    /// name; `None` takes the default described above. Outgoing messages go
    /// on `channel` (0-15).
    pub fn connect(
        in_port: Option<&str>,
        out_port: Option<&str>,
        channel: u8,
        epoch: Instant,
    ) -> Result<Self, ContinuatorError> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(transport_err)?;
        midi_in.ignore(Ignore::All);
        let in_ports = midi_in.ports();
        let in_names: Vec<String> = in_ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_default())
            .collect();
        let in_index = choose_port(&in_names, in_port, PortRole::Input)?;
        let input_name = in_names[in_index].clone();

        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(transport_err)?;
        let out_ports = midi_out.ports();
        let out_names: Vec<String> = out_ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();
        let out_index = choose_port(&out_names, out_port, PortRole::Output)?;
        let output_name = out_names[out_index].clone();

        let (sender, events) = mpsc::channel();
        let input = midi_in
            .connect(
                &in_ports[in_index],
                "continuator-in",
                move |_stamp, message, _| {
                    let timestamp = epoch.elapsed().as_secs_f64();
                    if let Some(event) = NoteEvent::from_midi_bytes(message, timestamp) {
                        // The receiver only goes away when the transport is dropped.
                        let _ = sender.send(event);
                    }
                },
                (),
            )
            .map_err(transport_err)?;
        let output = midi_out
            .connect(&out_ports[out_index], "continuator-out")
            .map_err(transport_err)?;

        log::info!("Listening on '{input_name}', playing on '{output_name}' (channel {channel})");
        Ok(Self {
            _input: input,
            output,
            events,
            channel: channel & 0x0F,
            input_name,
        })
    }
}

impl MidiTransport for MidirTransport {
    fn poll_pending_events(&mut self) -> Vec<NoteEvent> {
        let mut pending = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => pending.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("MIDI input '{}' disconnected", self.input_name);
                    break;
                }
            }
        }
        pending
    }

    fn send(&mut self, kind: NoteEventKind, pitch: u8, velocity: u8) -> Result<(), ContinuatorError> {
        self.output
            .send(&note_message(kind, self.channel, pitch, velocity))
            .map_err(transport_err)
    }
}
