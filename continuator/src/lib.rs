// Continuator
//
// An interactive musical continuator: it listens to a performer, learns the
// sequences they play into a prefix memory, and after a pause answers with a
// continuation in the same style. Learning is incremental and never forgets;
// the memory can be saved at the end of a session and reloaded at the start
// of the next.
//
// Architecture:
// - note.rs: Note / NoteEvent model, tolerance matching, deltas, transposition
// - continuation.rs: Append-only index of learned continuation notes
// - tree.rs: Root forest of reversed-prefix trees (the learned contexts)
// - memory.rs: Forest + index as one unit; stats, dump, JSON persistence
// - train.rs: Inserts every (prefix, next note) pair, across transpositions
// - generate.rs: Longest-context generation with random fallbacks; playback
//   scheduling
// - config.rs: Session hyperparameters (JSON, validated, immutable)
// - error.rs: Error taxonomy
// - transport.rs: The MIDI transport trait the session loop talks to
// - live.rs: midir-backed transport for real ports
// - midi_file.rs: Standard MIDI File reading and writing (midly)
// - session.rs: Real-time state machine and polling loop
//
// Generation is deterministic given the PRNG seed (`continuator_prng`).

pub mod config;
pub mod continuation;
pub mod error;
pub mod generate;
pub mod live;
pub mod memory;
pub mod midi_file;
pub mod note;
pub mod session;
pub mod train;
pub mod transport;
pub mod tree;
