// Trainer: extends a `Memory` from an observed note sequence.
//
// For a sequence [n1, ..., nK], each split point i (from K-1 down to 1)
// contributes one insertion: n(i+1) is appended to the continuation index and
// its id recorded along the reversed prefix [ni, ..., n1] in the root forest.
//
// Deltas are recomputed on a private copy before anything is inserted, and
// the transposed copies (see `ContinuatorConfig::transposition_offsets`)
// inherit those deltas. A transposition that would push any pitch outside
// the MIDI range is skipped as a whole.

use crate::config::ContinuatorConfig;
use crate::error::ContinuatorError;
use crate::memory::Memory;
use crate::note::{self, Note};

/// What a training pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrainReport {
    /// Sequences inserted: the original plus every in-range transposition.
    pub copies: usize,
    /// Configured offsets left out because they leave the MIDI range.
    pub skipped_offsets: Vec<i16>,
    pub continuations_added: usize,
}

/// Learn `sequence` into `memory`. The caller's notes are not modified.
pub fn train(
    memory: &mut Memory,
    sequence: &[Note],
    config: &ContinuatorConfig,
) -> Result<TrainReport, ContinuatorError> {
    if sequence.len() <= 1 {
        return Err(ContinuatorError::InsufficientContext {
            len: sequence.len(),
        });
    }

    let mut notes = sequence.to_vec();
    note::compute_deltas(&mut notes);

    let mut report = TrainReport::default();
    report.continuations_added += insert_sequence(memory, &notes, config);
    report.copies += 1;

    for offset in config.transposition_offsets() {
        match note::transposed(&notes, offset) {
            Some(shifted) => {
                report.continuations_added += insert_sequence(memory, &shifted, config);
                report.copies += 1;
            }
            None => report.skipped_offsets.push(offset),
        }
    }

    log::debug!(
        "Trained {} notes as {} copies ({} skipped offsets): {}",
        sequence.len(),
        report.copies,
        report.skipped_offsets.len(),
        memory.stats()
    );
    Ok(report)
}

/// Insert every (prefix, continuation) pair of one already-prepared
/// sequence. Returns the number of continuations appended.
fn insert_sequence(memory: &mut Memory, notes: &[Note], config: &ContinuatorConfig) -> usize {
    let mut added = 0;
    for split in (1..notes.len()).rev() {
        let continuation = memory.continuations.append(notes[split].clone());
        let reversed_prefix: Vec<Note> = notes[..split].iter().rev().cloned().collect();
        memory
            .forest
            .insert(&reversed_prefix, continuation, &config.train_tolerance);
        added += 1;
    }
    added
}
