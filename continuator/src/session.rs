// Real-time session state for live continuation.
//
// `Session` is the central data structure that `run` drives. It owns the
// memory, the PRNG, the notes played since the last answer, the open (held)
// notes, and the queue of scheduled playback events. All mutation happens
// through `handle_event` and `tick`, called from one polling loop; there is
// no internal locking.
//
// Phases:
// - Idle: nothing played yet.
// - Listening: collecting the player's notes.
// - Training / Generating: entered and left within a single `tick`, once the
//   player has been silent for `start_silence_secs` with no note held.
// - Playing: scheduled continuation events are emitted as they fall due.
// - Stopped: after a continuation finished, nothing happened for
//   `stop_silence_secs`.
//
// A player note-on during playback cancels the rest of the continuation and
// releases every voice the session is sounding. Messages for the transport
// are buffered and collected with `take_outgoing`.
//
// Protocol anomalies (a repeated note-on for a held pitch, a note-off for a
// pitch that is not held) are logged and returned as `SessionWarning`s; the
// session carries on.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use continuator_prng::ContinuatorRng;

use crate::config::ContinuatorConfig;
use crate::error::ContinuatorError;
use crate::generate::{Continuation, ScheduledEvent, generate, schedule};
use crate::memory::Memory;
use crate::note::{self, Note, NoteEvent, NoteEventKind};
use crate::train::train;
use crate::transport::MidiTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Training,
    Generating,
    Playing,
    Stopped,
}

/// A recoverable anomaly in the incoming event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionWarning {
    /// Note-on for a pitch that is already held; the earlier hold is kept.
    DuplicateNoteOn { pitch: u8 },
    /// Note-off for a pitch that is not held; ignored.
    OrphanNoteOff { pitch: u8 },
}

impl fmt::Display for SessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionWarning::DuplicateNoteOn { pitch } => {
                write!(f, "note {pitch} repeated before being released")
            }
            SessionWarning::OrphanNoteOff { pitch } => {
                write!(f, "note {pitch} released without being started")
            }
        }
    }
}

pub struct Session {
    config: ContinuatorConfig,
    memory: Memory,
    rng: ContinuatorRng,
    state: SessionState,

    /// Notes played since the last continuation, in onset order.
    played: Vec<Note>,
    /// Held pitch → index into `played`.
    open: BTreeMap<u8, usize>,
    /// Time of the most recent player note-off.
    last_release: Option<f64>,

    queue: VecDeque<ScheduledEvent>,
    /// Pitch → voices the session has turned on and not yet off.
    sounding: BTreeMap<u8, u32>,
    /// When the last continuation finished (or failed to start). Cleared by
    /// any player note-on.
    playback_done_at: Option<f64>,
    outgoing: Vec<NoteEvent>,
    last_continuation: Option<Continuation>,
}

impl Session {
    pub fn new(config: ContinuatorConfig, memory: Memory, rng: ContinuatorRng) -> Self {
        Self {
            config,
            memory,
            rng,
            state: SessionState::Idle,
            played: Vec::new(),
            open: BTreeMap::new(),
            last_release: None,
            queue: VecDeque::new(),
            sounding: BTreeMap::new(),
            playback_done_at: None,
            outgoing: Vec::new(),
            last_continuation: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn into_memory(self) -> Memory {
        self.memory
    }

    pub fn config(&self) -> &ContinuatorConfig {
        &self.config
    }

    /// Notes collected since the last continuation.
    pub fn played(&self) -> &[Note] {
        &self.played
    }

    pub fn last_continuation(&self) -> Option<&Continuation> {
        self.last_continuation.as_ref()
    }

    /// Due time of the next queued playback event, if any.
    pub fn next_due(&self) -> Option<f64> {
        self.queue.front().map(|e| e.due)
    }

    /// Messages for the transport produced since the last call.
    pub fn take_outgoing(&mut self) -> Vec<NoteEvent> {
        std::mem::take(&mut self.outgoing)
    }

    /// Process one incoming note event.
    pub fn handle_event(&mut self, event: NoteEvent) -> Option<SessionWarning> {
        if self.state == SessionState::Stopped {
            return None;
        }
        let warning = match event.kind {
            NoteEventKind::NoteOn => self.note_on(event),
            NoteEventKind::NoteOff => self.note_off(event),
        };
        if let Some(warning) = warning {
            log::warn!("{warning}");
        }
        warning
    }

    fn note_on(&mut self, event: NoteEvent) -> Option<SessionWarning> {
        if self.open.contains_key(&event.pitch) {
            return Some(SessionWarning::DuplicateNoteOn { pitch: event.pitch });
        }
        if !self.queue.is_empty() || !self.sounding.is_empty() {
            log::info!("Player resumed; interrupting continuation");
            self.silence(event.timestamp);
        }
        self.open.insert(event.pitch, self.played.len());
        self.played
            .push(Note::new(event.pitch, None, event.velocity, event.timestamp));
        self.playback_done_at = None;
        self.state = SessionState::Listening;
        None
    }

    fn note_off(&mut self, event: NoteEvent) -> Option<SessionWarning> {
        let Some(index) = self.open.remove(&event.pitch) else {
            return Some(SessionWarning::OrphanNoteOff { pitch: event.pitch });
        };
        let note = &mut self.played[index];
        note.duration = Some((event.timestamp - note.start_time).max(0.0));
        self.last_release = Some(event.timestamp);
        None
    }

    /// Drop queued playback and release every voice the session sounds.
    pub fn silence(&mut self, now: f64) {
        self.queue.clear();
        for (pitch, voices) in std::mem::take(&mut self.sounding) {
            for _ in 0..voices {
                self.outgoing.push(NoteEvent::new(NoteEventKind::NoteOff, pitch, 0, now));
            }
        }
    }

    /// Advance the session clock to `now` (seconds since the epoch). Does at
    /// most one of: emit due playback events, train and generate, stop.
    pub fn tick(&mut self, now: f64) -> SessionState {
        if self.state == SessionState::Stopped {
            return self.state;
        }

        if !self.queue.is_empty() {
            self.emit_due(now);
        } else if self.ready_to_answer(now) {
            self.answer(now);
        } else if let Some(done) = self.playback_done_at {
            if self.open.is_empty() && now - done > self.config.stop_silence_secs {
                log::info!(
                    "Stopping after {} s without player activity",
                    self.config.stop_silence_secs
                );
                self.state = SessionState::Stopped;
            }
        }
        self.state
    }

    fn ready_to_answer(&self, now: f64) -> bool {
        if self.played.is_empty() || !self.open.is_empty() {
            return false;
        }
        match self.last_release {
            Some(release) => now - release >= self.config.start_silence_secs,
            None => false,
        }
    }

    fn emit_due(&mut self, now: f64) {
        self.state = SessionState::Playing;
        while let Some(event) = self.queue.front().copied() {
            if event.due > now {
                break;
            }
            self.queue.pop_front();
            match event.kind {
                NoteEventKind::NoteOn => {
                    *self.sounding.entry(event.pitch).or_insert(0) += 1;
                }
                NoteEventKind::NoteOff => {
                    if let Some(voices) = self.sounding.get_mut(&event.pitch) {
                        *voices -= 1;
                        if *voices == 0 {
                            self.sounding.remove(&event.pitch);
                        }
                    }
                }
            }
            self.outgoing
                .push(NoteEvent::new(event.kind, event.pitch, event.velocity, now));
        }
        if self.queue.is_empty() {
            log::debug!("Continuation finished");
            self.playback_done_at = Some(now);
            self.state = SessionState::Listening;
        }
    }

    /// Train on the collected phrase, then generate and queue an answer.
    fn answer(&mut self, now: f64) {
        let phrase = std::mem::take(&mut self.played);
        self.last_release = None;

        self.state = SessionState::Training;
        log::info!("Training on {:?}", note::pitches(&phrase));
        match train(&mut self.memory, &phrase, &self.config) {
            Ok(report) => log::debug!(
                "Trained {} copies, {} continuations added",
                report.copies,
                report.continuations_added
            ),
            Err(ContinuatorError::InsufficientContext { len }) => {
                log::warn!("Not training on a phrase of {len} note(s); generating from memory as is")
            }
            Err(e) => log::warn!("Training failed: {e}"),
        }
        log::debug!("Memory:\n{}", self.memory);

        self.state = SessionState::Generating;
        let seed_start = phrase
            .len()
            .saturating_sub(self.config.max_played_notes_considered);
        let continuation = generate(
            &self.memory,
            &phrase[seed_start..],
            self.config.max_continuation_length,
            &self.config,
            &mut self.rng,
        );
        log::info!(
            "Continuation {:?} ({:?})",
            note::pitches(&continuation.notes),
            continuation.outcome
        );

        self.queue
            .extend(schedule(&continuation.notes, now, self.config.default_duration_secs));
        if self.queue.is_empty() {
            log::info!("Generation failed to extend the phrase");
            self.playback_done_at = Some(now);
            self.state = SessionState::Listening;
        } else {
            self.state = SessionState::Playing;
        }
        self.last_continuation = Some(continuation);
    }
}

/// Drive `session` from `transport` until it stops or `keep_running` is
/// cleared. Times are measured from `epoch`, which must be the same instant
/// the transport stamps incoming events against.
pub fn run(
    session: &mut Session,
    transport: &mut impl MidiTransport,
    epoch: Instant,
    keep_running: &AtomicBool,
) -> Result<(), ContinuatorError> {
    let poll_interval = Duration::from_millis(session.config().poll_interval_ms);
    log::info!("Continuator listening");

    while keep_running.load(Ordering::SeqCst) {
        for event in transport.poll_pending_events() {
            session.handle_event(event);
        }

        let now = epoch.elapsed().as_secs_f64();
        let state = session.tick(now);
        send_all(transport, session.take_outgoing());
        if state == SessionState::Stopped {
            break;
        }

        let wait = match session.next_due() {
            Some(due) => poll_interval.min(Duration::from_secs_f64((due - now).max(0.0))),
            None => poll_interval,
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    session.silence(epoch.elapsed().as_secs_f64());
    send_all(transport, session.take_outgoing());
    log::info!("Continuator stopped");
    Ok(())
}

fn send_all(transport: &mut impl MidiTransport, events: Vec<NoteEvent>) {
    for event in events {
        if let Err(e) = transport.send(event.kind, event.pitch, event.velocity) {
            log::warn!("Failed to send {:?} {}: {e}", event.kind, event.pitch);
        }
    }
}
