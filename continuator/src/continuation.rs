// Continuation index: the append-only store of learned continuation notes.
//
// Every (prefix, next note) pair observed during training appends the next
// note here once and gets a `ContinuationId`. Tree nodes only hold ids, so
// the one transition that training inserts under every prefix length (and
// every node on each insertion path) shares a single owned `Note`.
//
// Ids are dense and start at 0; nothing is ever removed or overwritten.

use continuator_prng::ContinuatorRng;
use serde::{Deserialize, Serialize};

use crate::note::Note;

/// Stable identity of one learned continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContinuationId(pub u32);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuationIndex {
    notes: Vec<Note>,
}

impl ContinuationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `note` and return its id. O(1), never fails.
    pub fn append(&mut self, note: Note) -> ContinuationId {
        let id = ContinuationId(self.notes.len() as u32);
        self.notes.push(note);
        id
    }

    pub fn get(&self, id: ContinuationId) -> Option<&Note> {
        self.notes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// A uniformly random entry of the whole index (the fallback when no
    /// tree context matches). `None` only when nothing was learned yet.
    pub fn random(&self, rng: &mut ContinuatorRng) -> Option<(ContinuationId, &Note)> {
        if self.notes.is_empty() {
            return None;
        }
        let i = rng.range_usize(0, self.notes.len());
        Some((ContinuationId(i as u32), &self.notes[i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContinuationId, &Note)> {
        self.notes
            .iter()
            .enumerate()
            .map(|(i, n)| (ContinuationId(i as u32), n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_dense_ids() {
        let mut index = ContinuationIndex::new();
        let a = index.append(Note::new(60, Some(0.5), 64, 0.0));
        let b = index.append(Note::new(62, Some(0.5), 64, 0.5));
        assert_eq!(a, ContinuationId(0));
        assert_eq!(b, ContinuationId(1));
        assert_eq!(index.get(b).map(|n| n.pitch), Some(62));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn identical_notes_keep_separate_ids() {
        let mut index = ContinuationIndex::new();
        let note = Note::new(60, Some(0.5), 64, 0.0);
        let a = index.append(note.clone());
        let b = index.append(note);
        assert_ne!(a, b);
        assert_eq!(index.get(a), index.get(b));
    }

    #[test]
    fn unknown_id_is_none() {
        let index = ContinuationIndex::new();
        assert!(index.get(ContinuationId(3)).is_none());
    }

    #[test]
    fn random_on_empty_index_is_none() {
        let index = ContinuationIndex::new();
        let mut rng = ContinuatorRng::new(1);
        assert!(index.random(&mut rng).is_none());
    }

    #[test]
    fn random_draws_from_the_whole_index() {
        let mut index = ContinuationIndex::new();
        for p in [48u8, 50, 52] {
            index.append(Note::new(p, Some(0.5), 64, 0.0));
        }
        let mut rng = ContinuatorRng::new(77);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let (id, note) = index.random(&mut rng).unwrap();
            assert_eq!(index.get(id), Some(note));
            seen[id.0 as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
