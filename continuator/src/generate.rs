// Generator: walks the root forest against a seed to produce a continuation.
//
// Each step restarts from the forest. The last note of the working sequence
// (seed followed by everything generated so far) selects a root; the
// descent then matches the second-to-last note against that root's
// children, the third-to-last against the grandchildren, and so on, until a
// leaf is reached, the context is used up, `max_order` notes have been
// consulted, or no child matches. The next note is drawn uniformly from the
// continuation ids of the node the descent stopped at; since ids repeat once
// per observation, frequent continuations win proportionally more often.
//
// When no root matches, the configured random fallbacks may substitute a
// note drawn from the whole continuation index. Otherwise generation simply
// ends early. Neither case is an error: the result carries a
// `GenerationOutcome` describing why it stopped.
//
// `schedule` turns a generated note list into timed note-on / note-off
// events for playback.

use continuator_prng::ContinuatorRng;

use crate::config::{ContinuatorConfig, DurationMode};
use crate::memory::Memory;
use crate::note::{self, Note, NoteEventKind};
use crate::tree::PrefixTreeNode;

/// Why generation stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// `max_length` notes were produced.
    Completed,
    /// Step `step` found no root for the last note and no fallback applied.
    NoMatchingRoot { step: usize },
    /// Step `step` needed a random note but there was nothing to draw from
    /// (empty memory), or the seed itself was empty.
    Exhausted { step: usize },
}

/// A generated continuation, excluding the seed.
#[derive(Clone, Debug, PartialEq)]
pub struct Continuation {
    pub notes: Vec<Note>,
    pub outcome: GenerationOutcome,
}

impl Continuation {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }
}

/// Generate up to `max_length` notes continuing `seed`.
///
/// `memory` is only read; every generated note is a copy with the duration
/// policy applied.
pub fn generate(
    memory: &Memory,
    seed: &[Note],
    max_length: usize,
    config: &ContinuatorConfig,
    rng: &mut ContinuatorRng,
) -> Continuation {
    let mut working: Vec<Note> = seed.to_vec();
    let mut generated: Vec<Note> = Vec::new();

    for step in 0..max_length {
        let Some(last) = working.last() else {
            return Continuation {
                notes: generated,
                outcome: GenerationOutcome::Exhausted { step },
            };
        };

        let roots = memory.forest.matching_roots(last, &config.generate_tolerances);
        let picked = match rng.choose(&roots) {
            Some(root) => {
                let node = descend(*root, &working, config, rng);
                node_continuation(memory, node, rng)
            }
            None => {
                let fallback_allowed = config.general_random_fallback
                    || (step == 0 && config.first_failure_random);
                if !fallback_allowed {
                    log::debug!("No root for pitch {} at step {step}", last.pitch);
                    return Continuation {
                        notes: generated,
                        outcome: GenerationOutcome::NoMatchingRoot { step },
                    };
                }
                match memory.continuations.random(rng) {
                    Some((_, note)) => {
                        log::debug!(
                            "No root for pitch {} at step {step}, random fallback {}",
                            last.pitch,
                            note.pitch
                        );
                        Some(note)
                    }
                    None => None,
                }
            }
        };

        let Some(learned) = picked else {
            return Continuation {
                notes: generated,
                outcome: GenerationOutcome::Exhausted { step },
            };
        };

        let mut next = learned.clone();
        apply_duration_policy(&mut next, seed, step, config);
        working.push(next.clone());
        generated.push(next);
    }

    log::debug!("Generated {:?}", note::pitches(&generated));
    Continuation {
        notes: generated,
        outcome: GenerationOutcome::Completed,
    }
}

/// Follow the working sequence backwards from `root` as deep as it matches.
fn descend<'a>(
    root: &'a PrefixTreeNode,
    working: &[Note],
    config: &ContinuatorConfig,
    rng: &mut ContinuatorRng,
) -> &'a PrefixTreeNode {
    let mut node = root;
    // j-th most recent note of `working` is matched at tree level j.
    let mut j = 2;
    while !node.is_leaf() && j < working.len() && j <= config.max_order {
        let target = &working[working.len() - j];
        let children = node.matching_children(target, &config.generate_tolerances);
        match rng.choose(&children) {
            Some(child) => node = *child,
            None => break,
        }
        j += 1;
    }
    node
}

fn node_continuation<'m>(
    memory: &'m Memory,
    node: &PrefixTreeNode,
    rng: &mut ContinuatorRng,
) -> Option<&'m Note> {
    let id = rng.choose(&node.continuations)?;
    memory.continuations.get(*id)
}

fn apply_duration_policy(note: &mut Note, seed: &[Note], step: usize, config: &ContinuatorConfig) {
    match config.duration_mode {
        DurationMode::Learnt => {}
        DurationMode::Played => {
            if !seed.is_empty() {
                note.duration = seed[step % seed.len()].duration;
            }
        }
        DurationMode::Fixed => note.duration = Some(config.fixed_duration_secs),
    }
}

/// One timed MIDI action of a continuation's playback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    /// Seconds on the caller's clock.
    pub due: f64,
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub velocity: u8,
}

/// Lay `notes` out in time starting at `start`.
///
/// The first note sounds at `start`, whatever its own `delta`: the player's
/// silence before the answer already spans at least `start_silence_secs`.
/// Each later note sounds `delta` seconds after its predecessor. Every note-off falls at onset + duration, with
/// `default_duration` for notes of unknown length. The result is ordered by
/// due time; ties keep note order with each note-on before its note-off.
pub fn schedule(notes: &[Note], start: f64, default_duration: f64) -> Vec<ScheduledEvent> {
    let mut events = Vec::with_capacity(notes.len() * 2);
    let mut onset = start;
    for (i, note) in notes.iter().enumerate() {
        if i > 0 {
            // Onsets never move backwards.
            onset += note.delta.max(0.0);
        }
        let duration = note.duration.unwrap_or(default_duration).max(0.0);
        events.push(ScheduledEvent {
            due: onset,
            kind: NoteEventKind::NoteOn,
            pitch: note.pitch,
            velocity: note.velocity,
        });
        events.push(ScheduledEvent {
            due: onset + duration,
            kind: NoteEventKind::NoteOff,
            pitch: note.pitch,
            velocity: note.velocity,
        });
    }
    events.sort_by(|a, b| a.due.total_cmp(&b.due));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::MatchTolerance;
    use crate::train::train;

    fn seq(pitches: &[u8]) -> Vec<Note> {
        Note::from_pitches(pitches, 0.5, 64)
    }

    fn no_fallback() -> ContinuatorConfig {
        ContinuatorConfig {
            first_failure_random: false,
            general_random_fallback: false,
            ..Default::default()
        }
    }

    fn trained(sequences: &[&[u8]], config: &ContinuatorConfig) -> Memory {
        let mut memory = Memory::new();
        for s in sequences {
            train(&mut memory, &seq(s), config).unwrap();
        }
        memory
    }

    #[test]
    fn unmatched_last_note_without_fallback_is_empty() {
        let config = no_fallback();
        let memory = trained(&[&[48, 50, 52, 53]], &config);
        let mut rng = ContinuatorRng::new(1);
        let result = generate(&memory, &seq(&[48, 50, 52, 53]), 10, &config, &mut rng);
        assert!(result.is_empty());
        assert_eq!(result.outcome, GenerationOutcome::NoMatchingRoot { step: 0 });
    }

    #[test]
    fn single_path_generation_is_deterministic() {
        let config = no_fallback();
        let memory = trained(&[&[60, 62, 64, 65]], &config);
        for rng_seed in [1u64, 2, 99, 12345] {
            let mut rng = ContinuatorRng::new(rng_seed);
            let result = generate(&memory, &seq(&[60]), 10, &config, &mut rng);
            assert_eq!(note::pitches(&result.notes), vec![62, 64, 65]);
            assert_eq!(result.outcome, GenerationOutcome::NoMatchingRoot { step: 3 });
        }
    }

    #[test]
    fn stops_at_max_length() {
        let config = no_fallback();
        let memory = trained(&[&[60, 62, 60]], &config);
        let mut rng = ContinuatorRng::new(3);
        let result = generate(&memory, &seq(&[60]), 5, &config, &mut rng);
        assert_eq!(note::pitches(&result.notes), vec![62, 60, 62, 60, 62]);
        assert_eq!(result.outcome, GenerationOutcome::Completed);
        assert!(generate(&memory, &seq(&[60]), 0, &config, &mut rng).is_empty());
    }

    #[test]
    fn repeated_continuations_are_drawn_more_often() {
        let config = no_fallback();
        let memory = trained(
            &[&[48, 50, 52, 53], &[48, 50, 52, 53], &[48, 50, 50, 52]],
            &config,
        );
        let mut rng = ContinuatorRng::new(2024);
        let (mut after_52, mut after_50) = (0u32, 0u32);
        let runs = 4000;
        for _ in 0..runs {
            let result = generate(&memory, &seq(&[48, 50]), 1, &config, &mut rng);
            match result.notes[0].pitch {
                52 => after_52 += 1,
                50 => after_50 += 1,
                other => panic!("unexpected continuation {other}"),
            }
        }
        // Root 50 lists 52 three times and 50 once.
        let share = f64::from(after_52) / f64::from(runs);
        assert!(after_50 > 0);
        assert!((0.68..0.82).contains(&share), "share of 52 was {share}");
    }

    #[test]
    fn first_failure_fallback_draws_from_index() {
        let config = ContinuatorConfig {
            first_failure_random: true,
            general_random_fallback: false,
            ..Default::default()
        };
        let memory = trained(&[&[48, 50, 52, 53]], &config);
        let mut rng = ContinuatorRng::new(8);
        let result = generate(&memory, &seq(&[53]), 10, &config, &mut rng);
        assert!(!result.is_empty());
        assert!([50, 52, 53].contains(&result.notes[0].pitch));
        // Every path ends on 53, which has no root; later steps get no fallback.
        assert_eq!(result.notes.last().map(|n| n.pitch), Some(53));
        assert_eq!(
            result.outcome,
            GenerationOutcome::NoMatchingRoot { step: result.len() }
        );
    }

    #[test]
    fn general_fallback_keeps_generating() {
        let config = ContinuatorConfig {
            general_random_fallback: true,
            ..Default::default()
        };
        let memory = trained(&[&[48, 50, 52, 53]], &config);
        let mut rng = ContinuatorRng::new(8);
        let result = generate(&memory, &seq(&[53]), 12, &config, &mut rng);
        assert_eq!(result.len(), 12);
        assert_eq!(result.outcome, GenerationOutcome::Completed);
    }

    #[test]
    fn fallback_on_empty_memory_is_exhausted() {
        let config = ContinuatorConfig {
            general_random_fallback: true,
            ..Default::default()
        };
        let mut rng = ContinuatorRng::new(1);
        let result = generate(&Memory::new(), &seq(&[60]), 5, &config, &mut rng);
        assert!(result.is_empty());
        assert_eq!(result.outcome, GenerationOutcome::Exhausted { step: 0 });
    }

    #[test]
    fn empty_seed_is_exhausted() {
        let config = ContinuatorConfig::default();
        let memory = trained(&[&[60, 62]], &config);
        let mut rng = ContinuatorRng::new(1);
        let result = generate(&memory, &[], 5, &config, &mut rng);
        assert_eq!(result.outcome, GenerationOutcome::Exhausted { step: 0 });
    }

    #[test]
    fn longer_context_disambiguates_until_max_order() {
        let mut config = no_fallback();
        let memory = trained(&[&[70, 60, 62, 80], &[71, 60, 62, 81]], &config);
        let seed = seq(&[5, 70, 60, 62]);

        let mut rng = ContinuatorRng::new(11);
        for _ in 0..50 {
            let result = generate(&memory, &seed, 1, &config, &mut rng);
            assert_eq!(result.notes[0].pitch, 80);
        }

        // Two notes of context cannot tell the phrases apart.
        config.max_order = 2;
        let mut seen = Vec::new();
        for _ in 0..200 {
            let result = generate(&memory, &seed, 1, &config, &mut rng);
            seen.push(result.notes[0].pitch);
        }
        assert!(seen.contains(&80));
        assert!(seen.contains(&81));
    }

    #[test]
    fn tolerance_cascade_widens_root_lookup() {
        let mut config = no_fallback();
        let memory = trained(&[&[60, 62]], &config);
        let mut rng = ContinuatorRng::new(5);
        assert!(generate(&memory, &seq(&[61]), 1, &config, &mut rng).is_empty());

        config.generate_tolerances = vec![MatchTolerance::exact(), MatchTolerance::pitch_window(1)];
        let result = generate(&memory, &seq(&[61]), 1, &config, &mut rng);
        assert_eq!(note::pitches(&result.notes), vec![62]);
    }

    /// Share of `runs` single-note generations from `seed` that produced `pitch`.
    fn share_of(
        memory: &Memory,
        seed: &[u8],
        pitch: u8,
        config: &ContinuatorConfig,
        rng: &mut ContinuatorRng,
    ) -> f64 {
        let runs = 2000;
        let hits = (0..runs)
            .filter(|_| generate(memory, &seq(seed), 1, config, rng).notes[0].pitch == pitch)
            .count();
        hits as f64 / runs as f64
    }

    #[test]
    fn tied_roots_are_picked_uniformly() {
        let mut config = no_fallback();
        config.generate_tolerances = vec![MatchTolerance::exact(), MatchTolerance::pitch_window(1)];
        let memory = trained(&[&[60, 70], &[62, 72]], &config);
        let mut rng = ContinuatorRng::new(17);

        // 61 matches roots 60 and 62 only at the looser level.
        let mut seen = Vec::new();
        for _ in 0..200 {
            seen.push(generate(&memory, &seq(&[61]), 1, &config, &mut rng).notes[0].pitch);
        }
        assert!(seen.iter().all(|p| [70, 72].contains(p)));
        let share = share_of(&memory, &[61], 70, &config, &mut rng);
        assert!((0.43..0.57).contains(&share), "share of 70 was {share}");
    }

    #[test]
    fn tied_children_are_picked_uniformly() {
        let mut config = no_fallback();
        config.generate_tolerances = vec![MatchTolerance::exact(), MatchTolerance::pitch_window(1)];
        // Root 60 gets children 59 (→ 70) and 61 (→ 72).
        let memory = trained(&[&[59, 60, 70], &[61, 60, 72]], &config);
        let mut rng = ContinuatorRng::new(23);

        // The second-to-last 60 matches neither child exactly, both within 1.
        let share = share_of(&memory, &[0, 60, 60], 70, &config, &mut rng);
        assert!((0.43..0.57).contains(&share), "share of 70 was {share}");
    }

    #[test]
    fn duration_policies() {
        let base = no_fallback();
        let memory = trained(&[&[60, 62, 60]], &base);
        let seed = vec![
            Note::new(60, Some(0.125), 64, 0.0),
            Note::new(62, Some(0.25), 64, 0.5),
        ];
        let mut rng = ContinuatorRng::new(4);

        let learnt = generate(&memory, &seed, 3, &base, &mut rng);
        assert!(learnt.notes.iter().all(|n| n.duration == Some(0.5)));

        let played = ContinuatorConfig {
            duration_mode: DurationMode::Played,
            ..base.clone()
        };
        let result = generate(&memory, &seed, 3, &played, &mut rng);
        let durations: Vec<Option<f64>> = result.notes.iter().map(|n| n.duration).collect();
        assert_eq!(durations, vec![Some(0.125), Some(0.25), Some(0.125)]);

        let fixed = ContinuatorConfig {
            duration_mode: DurationMode::Fixed,
            fixed_duration_secs: 0.75,
            ..base
        };
        let result = generate(&memory, &seed, 3, &fixed, &mut rng);
        assert!(result.notes.iter().all(|n| n.duration == Some(0.75)));
        // The memory itself keeps the learned durations.
        assert!(memory.continuations.iter().all(|(_, n)| n.duration == Some(0.5)));
    }

    #[test]
    fn schedule_lays_out_onsets_and_releases() {
        let mut notes = vec![
            Note::new(60, Some(1.0), 90, 0.0),
            Note::new(62, None, 80, 0.5),
        ];
        note::compute_deltas(&mut notes);
        let events = schedule(&notes, 1.0, 0.75);
        let summary: Vec<(f64, NoteEventKind, u8)> =
            events.iter().map(|e| (e.due, e.kind, e.pitch)).collect();
        assert_eq!(
            summary,
            vec![
                (1.0, NoteEventKind::NoteOn, 60),
                (1.5, NoteEventKind::NoteOn, 62),
                (2.0, NoteEventKind::NoteOff, 60),
                (2.25, NoteEventKind::NoteOff, 62),
            ]
        );
    }

    #[test]
    fn schedule_starts_at_start_despite_first_delta() {
        let mut note = Note::new(64, Some(0.5), 70, 3.0);
        note.delta = 1.5;
        let events = schedule(&[note], 10.0, 1.0);
        assert_eq!(events[0].due, 10.0);
        assert_eq!(events[1].due, 10.5);
    }

    #[test]
    fn schedule_keeps_release_before_repeated_onset() {
        let mut notes = vec![
            Note::new(60, Some(0.5), 64, 0.0),
            Note::new(60, Some(0.5), 64, 0.5),
        ];
        note::compute_deltas(&mut notes);
        let kinds: Vec<NoteEventKind> = schedule(&notes, 0.0, 0.5).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NoteEventKind::NoteOn,
                NoteEventKind::NoteOff,
                NoteEventKind::NoteOn,
                NoteEventKind::NoteOff,
            ]
        );
    }
}
