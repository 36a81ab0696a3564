// Standard MIDI File input and output for the file-based driver.
//
// `read_notes` flattens every track of an SMF into one time-ordered note
// list: ticks are converted to seconds through the file's tempo map, note-on
// / note-off pairs become `Note`s with a duration, and deltas are filled in.
// Notes never released keep `duration: None`.
//
// `write_notes` lays a continuation out with `generate::schedule` and writes
// a Format 1 file: a tempo track plus one note track, 480 ticks per quarter
// at 120 BPM.

use std::collections::HashMap;
use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::error::ContinuatorError;
use crate::generate::schedule;
use crate::note::{self, Note, NoteEventKind};

/// Ticks per quarter note in written files.
const TICKS_PER_QUARTER: u16 = 480;

/// Microseconds per quarter note when a file has no tempo event (120 BPM).
const DEFAULT_TEMPO: u32 = 500_000;

/// Tick → seconds conversion for one file.
struct TempoMap {
    /// Seconds per tick for timecode-based files; `None` for metrical ones.
    fixed_tick_secs: Option<f64>,
    ticks_per_quarter: f64,
    /// (absolute tick, µs per quarter), sorted by tick, starting at tick 0.
    changes: Vec<(u64, f64)>,
}

impl TempoMap {
    fn from_smf(smf: &Smf<'_>) -> Self {
        let (fixed_tick_secs, ticks_per_quarter) = match smf.header.timing {
            Timing::Metrical(tpq) => (None, f64::from(tpq.as_int())),
            Timing::Timecode(fps, subframe) => (
                Some(1.0 / (f64::from(fps.as_f32()) * f64::from(subframe))),
                f64::from(TICKS_PER_QUARTER),
            ),
        };

        let mut changes: Vec<(u64, f64)> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, f64::from(tempo.as_int())));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);
        if changes.first().is_none_or(|&(tick, _)| tick > 0) {
            changes.insert(0, (0, f64::from(DEFAULT_TEMPO)));
        }

        Self {
            fixed_tick_secs,
            ticks_per_quarter,
            changes,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        if let Some(tick_secs) = self.fixed_tick_secs {
            return tick as f64 * tick_secs;
        }
        let mut seconds = 0.0;
        for (i, &(start, us_per_quarter)) in self.changes.iter().enumerate() {
            if start >= tick {
                break;
            }
            let end = self
                .changes
                .get(i + 1)
                .map_or(tick, |&(next, _)| next.min(tick));
            seconds += (end - start) as f64 / self.ticks_per_quarter * us_per_quarter / 1_000_000.0;
        }
        seconds
    }
}

/// Read every note of an SMF, all tracks and channels merged by onset.
pub fn read_notes(path: &Path) -> Result<Vec<Note>, ContinuatorError> {
    let data = std::fs::read(path)?;
    let smf = Smf::parse(&data)?;
    let tempo = TempoMap::from_smf(&smf);

    // (tick, track order, kind, pitch, velocity)
    let mut raw: Vec<(u64, usize, NoteEventKind, u8, u8)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += u64::from(event.delta.as_int());
            let TrackEventKind::Midi { message, .. } = event.kind else {
                continue;
            };
            let (kind, key, vel) = match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    (NoteEventKind::NoteOn, key, vel)
                }
                MidiMessage::NoteOn { key, vel } | MidiMessage::NoteOff { key, vel } => {
                    (NoteEventKind::NoteOff, key, vel)
                }
                _ => continue,
            };
            raw.push((tick, raw.len(), kind, key.as_int(), vel.as_int()));
        }
    }
    raw.sort_by_key(|&(tick, order, ..)| (tick, order));

    let mut notes: Vec<Note> = Vec::new();
    let mut open: HashMap<u8, usize> = HashMap::new();
    for (tick, _, kind, pitch, velocity) in raw {
        let time = tempo.seconds_at(tick);
        match kind {
            NoteEventKind::NoteOn => {
                if open.contains_key(&pitch) {
                    log::warn!("{}: note {pitch} repeated before being released", path.display());
                    continue;
                }
                open.insert(pitch, notes.len());
                notes.push(Note::new(pitch, None, velocity, time));
            }
            NoteEventKind::NoteOff => match open.remove(&pitch) {
                Some(index) => {
                    let note = &mut notes[index];
                    note.duration = Some(time - note.start_time);
                }
                None => log::debug!("{}: ignoring note-off for {pitch} with no note-on", path.display()),
            },
        }
    }

    note::compute_deltas(&mut notes);
    log::info!("Read {} notes from {}", notes.len(), path.display());
    Ok(notes)
}

/// Write `notes` as a two-track SMF, laid out from their deltas.
pub fn write_notes(path: &Path, notes: &[Note], default_duration: f64) -> Result<(), ContinuatorError> {
    let smf = notes_to_smf(notes, default_duration);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    log::info!("Wrote {} notes to {}", notes.len(), path.display());
    Ok(())
}

fn notes_to_smf(notes: &[Note], default_duration: f64) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(DEFAULT_TEMPO))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    let ticks_per_sec = f64::from(TICKS_PER_QUARTER) * 1_000_000.0 / f64::from(DEFAULT_TEMPO);
    let mut track: Track<'static> = Vec::new();
    let mut last_tick: u32 = 0;
    for event in schedule(notes, 0.0, default_duration) {
        let tick = (event.due * ticks_per_sec).round().max(0.0) as u32;
        let key = u7::new(event.pitch.min(note::MAX_PITCH));
        let message = match event.kind {
            NoteEventKind::NoteOn => MidiMessage::NoteOn {
                key,
                vel: u7::new(event.velocity.min(127)),
            },
            NoteEventKind::NoteOff => MidiMessage::NoteOff { key, vel: u7::new(0) },
        };
        track.push(TrackEvent {
            delta: u28::new(tick.saturating_sub(last_tick)),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
        last_tick = last_tick.max(tick);
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}
