// Session hyperparameters.
//
// All tunable values live in `ContinuatorConfig`, loaded from JSON at startup
// and treated as immutable for the whole session. The engine never reads
// magic numbers; trainer, generator and session loop all take the config
// explicitly. Missing JSON fields fall back to the defaults below, so a
// config file only needs to list what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContinuatorError;
use crate::note::MatchTolerance;

/// Upper bound on `max_continuation_length`.
pub const MAX_CONTINUATION_LENGTH: usize = 10_000;

/// Where a generated note's duration comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationMode {
    /// Keep the duration of the learned continuation note.
    #[default]
    Learnt,
    /// Reuse the durations of the played seed, cycling through them.
    Played,
    /// Use `fixed_duration_secs` for every note.
    Fixed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuatorConfig {
    /// Player silence (seconds since the last note-off) after which the
    /// continuator trains and answers.
    pub start_silence_secs: f64,
    /// Inactivity after a continuation finished playing after which the
    /// session stops.
    pub stop_silence_secs: f64,
    /// Maximum number of notes in one continuation.
    pub max_continuation_length: usize,
    /// Only the last N played notes seed a generation.
    pub max_played_notes_considered: usize,
    /// Maximum context length (tree depth) consulted per generated note.
    pub max_order: usize,
    /// N: also train the sequence shifted down 1..N-1 and up 1..N semitones.
    /// N = 6 covers all twelve keys. 0 disables.
    pub key_transposition_semitones: u8,
    /// M: also train the sequence shifted by ±12·k semitones for k in 1..=M.
    pub octave_transpositions: u8,
    /// Draw a random learned note when the very first generation step finds
    /// no matching root.
    pub first_failure_random: bool,
    /// Draw a random learned note whenever any step finds no matching root.
    pub general_random_fallback: bool,
    pub duration_mode: DurationMode,
    pub fixed_duration_secs: f64,
    /// Velocity for notes built from bare pitches (batch mode).
    pub default_velocity: u8,
    /// Duration for notes built from bare pitches, and for playing notes
    /// whose duration is unknown.
    pub default_duration_secs: f64,
    /// Node matching while training. Exact pitch by default: training must
    /// not conflate genuinely distinct notes.
    pub train_tolerance: MatchTolerance,
    /// Node matching while generating, tried tight to loose.
    pub generate_tolerances: Vec<MatchTolerance>,
    pub poll_interval_ms: u64,
    /// MIDI channel (0-15) continuations are played on.
    pub output_channel: u8,
    /// Fixed PRNG seed; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for ContinuatorConfig {
    fn default() -> Self {
        Self {
            start_silence_secs: 2.0,
            stop_silence_secs: 15.0,
            max_continuation_length: 50,
            max_played_notes_considered: 30,
            max_order: 20,
            key_transposition_semitones: 0,
            octave_transpositions: 0,
            first_failure_random: true,
            general_random_fallback: false,
            duration_mode: DurationMode::Learnt,
            fixed_duration_secs: 0.1,
            default_velocity: 64,
            default_duration_secs: 0.5,
            train_tolerance: MatchTolerance::exact(),
            generate_tolerances: vec![MatchTolerance::exact()],
            poll_interval_ms: 5,
            output_channel: 0,
            seed: None,
        }
    }
}

impl ContinuatorConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> Result<Self, ContinuatorError> {
        let data = std::fs::read_to_string(path)?;
        let config: ContinuatorConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ContinuatorError> {
        let invalid = |msg: String| -> Result<(), ContinuatorError> {
            Err(ContinuatorError::InvalidConfig(msg))
        };

        if self.start_silence_secs <= 0.0 {
            return invalid(format!(
                "start_silence_secs must be positive, got {}",
                self.start_silence_secs
            ));
        }
        if self.stop_silence_secs <= self.start_silence_secs {
            return invalid(format!(
                "stop_silence_secs ({}) must exceed start_silence_secs ({})",
                self.stop_silence_secs, self.start_silence_secs
            ));
        }
        if self.fixed_duration_secs <= 0.0 || self.default_duration_secs <= 0.0 {
            return invalid("note durations must be positive".into());
        }
        if self.max_continuation_length > MAX_CONTINUATION_LENGTH {
            return invalid(format!(
                "max_continuation_length must be at most {MAX_CONTINUATION_LENGTH}, got {}",
                self.max_continuation_length
            ));
        }
        if self.max_played_notes_considered == 0 {
            return invalid("max_played_notes_considered must be at least 1".into());
        }
        if self.output_channel > 15 {
            return invalid(format!(
                "output_channel must be 0-15, got {}",
                self.output_channel
            ));
        }
        if self.default_velocity > 127 {
            return invalid(format!(
                "default_velocity must be 0-127, got {}",
                self.default_velocity
            ));
        }
        // Generation windows must be at least as wide as the training window.
        if let Some(loose) = self
            .generate_tolerances
            .iter()
            .find(|t| t.pitch < self.train_tolerance.pitch)
        {
            return invalid(format!(
                "generation pitch tolerance {} is tighter than training tolerance {}",
                loose.pitch, self.train_tolerance.pitch
            ));
        }
        Ok(())
    }

    /// Semitone offsets each trained sequence is additionally learned under,
    /// in training order: semitones down, semitones up, octaves down, octaves
    /// up. Zero and duplicates are dropped.
    pub fn transposition_offsets(&self) -> Vec<i16> {
        let n = i16::from(self.key_transposition_semitones);
        let m = i16::from(self.octave_transpositions);
        let mut offsets: Vec<i16> = Vec::new();
        let candidates = (1..n)
            .map(|k| -k)
            .chain(1..=n)
            .chain((1..=m).map(|k| -12 * k))
            .chain((1..=m).map(|k| 12 * k));
        for offset in candidates {
            if offset != 0 && !offsets.contains(&offset) {
                offsets.push(offset);
            }
        }
        offsets
    }
}
