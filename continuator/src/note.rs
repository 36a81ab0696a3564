// Note and event model.
//
// `Note` is what the engine learns and generates: a pitch plus auxiliary
// attributes (duration, velocity) and onset timing. `NoteEvent` is what a
// MIDI transport exchanges with the session loop. `MatchTolerance` decides
// when two notes count as "the same" for prefix-tree traversal.
//
// Pitches are MIDI note numbers in [0, 127]. Times are seconds on whatever
// clock the producer uses (session epoch for live input, file start for
// MIDI files); only differences between them are ever interpreted.

use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// A performed or generated note.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    /// Seconds the note was held. `None` while the note is still sounding,
    /// or when the source never reported a release.
    pub duration: Option<f64>,
    pub velocity: u8,
    /// Onset time in seconds.
    pub start_time: f64,
    /// Onset-to-onset time since the previous note of the same sequence.
    /// Zero for the first note; recomputed by every training pass.
    pub delta: f64,
}

impl Note {
    pub fn new(pitch: u8, duration: Option<f64>, velocity: u8, start_time: f64) -> Self {
        Self {
            pitch,
            duration,
            velocity,
            start_time,
            delta: 0.0,
        }
    }

    /// Build an untimed sequence from bare pitches, as the batch driver does.
    pub fn from_pitches(pitches: &[u8], duration: f64, velocity: u8) -> Vec<Note> {
        pitches
            .iter()
            .map(|&p| Note::new(p, Some(duration), velocity, 0.0))
            .collect()
    }

    /// Whether `self` matches `other` within `tolerance`.
    pub fn matches(&self, other: &Note, tolerance: &MatchTolerance) -> bool {
        if self.pitch.abs_diff(other.pitch) > tolerance.pitch {
            return false;
        }
        if let (Some(tol), Some(a), Some(b)) = (tolerance.duration, self.duration, other.duration) {
            if (a - b).abs() > tol {
                return false;
            }
        }
        match tolerance.velocity {
            Some(tol) => self.velocity.abs_diff(other.velocity) <= tol,
            None => true,
        }
    }
}

/// Pitches of a note sequence, for logging and tests.
pub fn pitches(notes: &[Note]) -> Vec<u8> {
    notes.iter().map(|n| n.pitch).collect()
}

/// Recompute every note's `delta` from the onset times.
pub fn compute_deltas(notes: &mut [Note]) {
    let mut previous_start = None;
    for note in notes.iter_mut() {
        note.delta = match previous_start {
            Some(prev) => note.start_time - prev,
            None => 0.0,
        };
        previous_start = Some(note.start_time);
    }
}

/// Shift every pitch by `offset` semitones. Returns `None` when any shifted
/// pitch would leave the MIDI range; the copy is skipped, never clamped.
pub fn transposed(notes: &[Note], offset: i16) -> Option<Vec<Note>> {
    notes
        .iter()
        .map(|n| {
            let pitch = i16::from(n.pitch) + offset;
            if (0..=i16::from(MAX_PITCH)).contains(&pitch) {
                Some(Note {
                    pitch: pitch as u8,
                    ..n.clone()
                })
            } else {
                None
            }
        })
        .collect()
}

/// Tolerance window under which two notes are considered equivalent.
///
/// `pitch` is a symmetric semitone window. `duration` (seconds) and
/// `velocity` are only compared when set; `None` ignores the attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchTolerance {
    pub pitch: u8,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub velocity: Option<u8>,
}

impl MatchTolerance {
    /// Exact pitch equality, other attributes ignored.
    pub const fn exact() -> Self {
        Self {
            pitch: 0,
            duration: None,
            velocity: None,
        }
    }

    pub const fn pitch_window(semitones: u8) -> Self {
        Self {
            pitch: semitones,
            duration: None,
            velocity: None,
        }
    }

    /// Inclusive pitch range a note of `pitch` can match under this tolerance.
    pub fn pitch_range(&self, pitch: u8) -> std::ops::RangeInclusive<u8> {
        pitch.saturating_sub(self.pitch)..=pitch.saturating_add(self.pitch).min(MAX_PITCH)
    }
}

impl Default for MatchTolerance {
    fn default() -> Self {
        Self::exact()
    }
}

/// Kind of a note event exchanged with a MIDI transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A timestamped note-on / note-off.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub velocity: u8,
    /// Seconds since the session epoch.
    pub timestamp: f64,
}

impl NoteEvent {
    /// Build an event, folding "note-on with velocity 0" into a note-off as
    /// MIDI running-status senders expect.
    pub fn new(kind: NoteEventKind, pitch: u8, velocity: u8, timestamp: f64) -> Self {
        let kind = match kind {
            NoteEventKind::NoteOn if velocity == 0 => NoteEventKind::NoteOff,
            other => other,
        };
        Self {
            kind,
            pitch,
            velocity,
            timestamp,
        }
    }

    /// Parse a raw channel-voice message. Anything other than note-on or
    /// note-off (clock, controllers, sysex) yields `None`.
    pub fn from_midi_bytes(bytes: &[u8], timestamp: f64) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }
        let kind = match bytes[0] & 0xF0 {
            0x90 => NoteEventKind::NoteOn,
            0x80 => NoteEventKind::NoteOff,
            _ => return None,
        };
        Some(Self::new(kind, bytes[1] & 0x7F, bytes[2] & 0x7F, timestamp))
    }
}
