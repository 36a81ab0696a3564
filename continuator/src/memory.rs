// The continuator's long-term memory: root forest plus continuation index.
//
// `Memory` is the unit the trainer extends, the generator reads, and the
// binary persists between sessions. It grows monotonically; nothing is ever
// removed. Persistence is plain JSON through serde, so a memory saved at the
// end of one session (`PostMemory.json` by default) can be fed back as the
// starting memory of the next (`PreMemory.json`), forming a continuously
// growing cross-session memory.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::continuation::ContinuationIndex;
use crate::error::ContinuatorError;
use crate::tree::{PrefixTreeNode, RootForest};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub forest: RootForest,
    pub continuations: ContinuationIndex,
}

/// Size summary, logged after each training pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryStats {
    pub roots: usize,
    pub nodes: usize,
    pub max_depth: usize,
    pub continuations: usize,
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} roots, {} nodes, depth {}, {} continuations",
            self.roots, self.nodes, self.max_depth, self.continuations
        )
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.continuations.is_empty()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            roots: self.forest.root_count(),
            nodes: self.forest.node_count(),
            max_depth: self.forest.max_depth(),
            continuations: self.continuations.len(),
        }
    }

    /// Continuation pitches recorded on `node`, in training order.
    pub fn continuation_pitches(&self, node: &PrefixTreeNode) -> Vec<u8> {
        node.continuations
            .iter()
            .filter_map(|id| self.continuations.get(*id))
            .map(|n| n.pitch)
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), ContinuatorError> {
        let data = serde_json::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ContinuatorError> {
        let data = std::fs::read_to_string(path)?;
        let memory: Memory = serde_json::from_str(&data)?;
        Ok(memory)
    }

    /// Load `path` if it exists, otherwise start from an empty memory.
    pub fn load_or_default(path: &Path) -> Result<Self, ContinuatorError> {
        if path.exists() {
            let memory = Self::load(path)?;
            log::info!("Loaded memory from {} ({})", path.display(), memory.stats());
            Ok(memory)
        } else {
            log::info!("No memory at {}, starting empty", path.display());
            Ok(Self::new())
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, node: &PrefixTreeNode, level: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{}{:?}",
            "",
            node.note.pitch,
            self.continuation_pitches(node),
            indent = level * 2
        )?;
        for child in &node.children {
            self.fmt_node(f, child, level + 1)?;
        }
        Ok(())
    }
}

/// Indented dump of every tree: `pitch[continuation pitches]` per node.
impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for root in self.forest.roots() {
            self.fmt_node(f, root, 0)?;
        }
        Ok(())
    }
}
