// MIDI transport seam between the session loop and a device.
//
// The session loop only ever polls for pending note events and sends
// note-on / note-off messages; device discovery, port selection and the
// wire encoding stay behind this trait. `live::MidirTransport` implements it
// over real ports, and the tests drive the loop through a scripted mock.

use crate::error::ContinuatorError;
use crate::note::{NoteEvent, NoteEventKind};

pub trait MidiTransport {
    /// Drain every event received since the last call. Never blocks; an
    /// empty vector means nothing arrived.
    fn poll_pending_events(&mut self) -> Vec<NoteEvent>;

    fn send(&mut self, kind: NoteEventKind, pitch: u8, velocity: u8) -> Result<(), ContinuatorError>;
}

/// Raw bytes of a channel-voice note message.
pub fn note_message(kind: NoteEventKind, channel: u8, pitch: u8, velocity: u8) -> [u8; 3] {
    let status = match kind {
        NoteEventKind::NoteOn => 0x90,
        NoteEventKind::NoteOff => 0x80,
    };
    [status | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F]
}
