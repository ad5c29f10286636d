//! Shared data models for the extraction pipeline.
//!
//! Lifecycle states, the name-keyed song lists read from the database, and
//! the run statistics reported at the end of an export.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Lifecycle State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileState {
    /// A distinct hash and file name
    Unique,
    /// The kept copy of a duplicate hash or duplicate name
    Preferred,
    /// Any other copy of a duplicate hash or duplicate name
    Obsolete,
}

impl FileState {
    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Unique => "Unique",
            FileState::Preferred => "Preferred",
            FileState::Obsolete => "Obsolete",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Set Lists and Collections
// ============================================================================

/// One named set list or collection. `songs` holds indices into the scanned
/// song list, in database row order, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongList {
    pub name: String,
    pub songs: Vec<usize>,
}

/// Name-keyed song lists with case-insensitive names. The first spelling
/// seen for a name is the one kept for display.
#[derive(Debug, Clone, Default)]
pub struct SongLists {
    lists: Vec<SongList>,
    index: FxHashMap<String, usize>,
}

impl SongLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, song: usize) {
        let key = name.to_lowercase();
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.lists.push(SongList {
                    name: name.to_string(),
                    songs: Vec::new(),
                });
                self.index.insert(key, self.lists.len() - 1);
                self.lists.len() - 1
            }
        };
        self.lists[slot].songs.push(song);
    }

    pub fn get(&self, name: &str) -> Option<&SongList> {
        self.index
            .get(&name.to_lowercase())
            .map(|&slot| &self.lists[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SongList> {
        self.lists.iter()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Default, Debug, Clone, Serialize)]
pub struct ExtractStats {
    pub files_scanned: usize,
    pub database_matches: usize,
    pub unmatched_database_rows: usize,

    pub unique: usize,
    pub preferred: usize,
    pub obsolete: usize,

    pub augmented: usize,
    pub augment_failures: usize,

    pub set_lists: usize,
    pub collections: usize,
    pub cleanup_candidates: usize,

    pub elapsed_seconds: f64,
}

impl ExtractStats {
    pub fn record_state(&mut self, state: FileState) {
        match state {
            FileState::Unique => self.unique += 1,
            FileState::Preferred => self.preferred += 1,
            FileState::Obsolete => self.obsolete += 1,
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
