//! Export of a classified library.
//!
//! Layout below the output root:
//!
//! ```text
//! Files/<relative path>        Unique and Preferred songs
//! Obsolete/<relative path>     Obsolete songs
//! Augmented/<relative path>    ChordPro files that gained directives
//! Songs.csv                    one row per scanned file
//! SetLists/<name>.txt          display titles, one per line
//! Collections/<name>.txt
//! Cleanup.sh                   rm commands for unreferenced input files
//! ```
//!
//! Nothing is ever overwritten. Running twice into the same folder fails on
//! the first path that already exists.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::augment::{augment_song, is_eligible, AugmentOutcome, VALUE_SEPARATOR};
use crate::database::DatabaseSummary;
use crate::error::{ExtractError, Result};
use crate::models::{ExtractStats, FileState, SongLists};
use crate::progress::{create_progress_bar, log_progress};
use crate::safety::{copy_new, create_new, destination, write_new};
use crate::song::Song;

pub const FILES_DIR: &str = "Files";
pub const OBSOLETE_DIR: &str = "Obsolete";
pub const AUGMENTED_DIR: &str = "Augmented";
pub const SET_LISTS_DIR: &str = "SetLists";
pub const COLLECTIONS_DIR: &str = "Collections";
pub const SONGS_CSV: &str = "Songs.csv";
pub const CLEANUP_SCRIPT: &str = "Cleanup.sh";

const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static ILLEGAL_FS_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[:\?<>\\\*\|"/]+"#).unwrap());

// ============================================================================
// Songs.csv
// ============================================================================

/// One `Songs.csv` row. Field order is column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SongRecord {
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    pub modified: String,
    pub file_state: FileState,
    pub title: String,
    pub artists: String,
    pub keys: String,
    pub tempos: String,
    pub capo: Option<u8>,
    pub content_type: Option<String>,
    pub id: Option<i64>,
    pub relative_path: String,
}

impl SongRecord {
    pub fn from_song(song: &Song, date_time_prefix: &str) -> Self {
        SongRecord {
            file_name: song.file.file_name.clone(),
            file_type: song.file.extension.clone(),
            size: song.file.size,
            modified: format!(
                "{}{}",
                date_time_prefix,
                song.file.modified.format(MODIFIED_FORMAT)
            ),
            file_state: song.state(),
            title: song.display_title().to_string(),
            artists: song.artists.join(VALUE_SEPARATOR),
            keys: song.keys.join(VALUE_SEPARATOR),
            tempos: song
                .tempos
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(VALUE_SEPARATOR),
            capo: song.capo,
            content_type: song.content_type.clone(),
            id: song.database_id(),
            relative_path: song.relative_path.clone(),
        }
    }
}

/// Replaces characters that are illegal in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = ILLEGAL_FS_CHARS.replace_all(name.trim(), "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.into_owned()
    }
}

// ============================================================================
// Exporter
// ============================================================================

pub struct Exporter {
    output: PathBuf,
    input: PathBuf,
    date_time_prefix: String,
}

impl Exporter {
    pub fn new(output: &Path, input: &Path, date_time_prefix: &str) -> Self {
        Exporter {
            output: output.to_path_buf(),
            input: input.to_path_buf(),
            date_time_prefix: date_time_prefix.to_string(),
        }
    }

    /// Runs every export step in order.
    pub fn export_all(
        &self,
        songs: &[Song],
        lists: &DatabaseSummary,
        stats: &mut ExtractStats,
    ) -> Result<()> {
        self.copy_songs(songs, stats)?;
        self.augment_songs(songs, stats)?;
        self.write_songs_csv(songs)?;
        stats.set_lists = self.write_lists(&lists.set_lists, SET_LISTS_DIR, songs)?;
        stats.collections = self.write_lists(&lists.collections, COLLECTIONS_DIR, songs)?;
        stats.cleanup_candidates = self.write_cleanup_script(songs)?;
        Ok(())
    }

    pub fn copy_songs(&self, songs: &[Song], stats: &mut ExtractStats) -> Result<()> {
        let total = songs.len() as u64;
        let pb = create_progress_bar(total, "Phase 4: Copying files");

        for (i, song) in songs.iter().enumerate() {
            let folder = match song.state() {
                FileState::Obsolete => OBSOLETE_DIR,
                FileState::Unique | FileState::Preferred => FILES_DIR,
            };
            let target = destination(&self.output.join(folder), &song.relative_path);
            copy_new(&song.file.path, &target)?;
            stats.record_state(song.state());
            pb.inc(1);
            log_progress("COPY", i as u64 + 1, total, 500);
        }

        pb.finish_with_message(format!("Phase 4: Copied {} files", songs.len()));
        Ok(())
    }

    /// Writes augmented ChordPro copies. A file that cannot be parsed or
    /// decoded is reported and skipped; any other failure ends the export.
    pub fn augment_songs(&self, songs: &[Song], stats: &mut ExtractStats) -> Result<()> {
        let root = self.output.join(AUGMENTED_DIR);
        let eligible: Vec<&Song> = songs.iter().filter(|s| is_eligible(s)).collect();
        let total = eligible.len() as u64;
        let pb = create_progress_bar(total, "Phase 5: Augmenting ChordPro");

        for (i, song) in eligible.into_iter().enumerate() {
            match augment_song(song, &root) {
                Ok(AugmentOutcome::Augmented(_)) => stats.augmented += 1,
                Ok(AugmentOutcome::Unchanged | AugmentOutcome::NotEligible) => {}
                Err(e) if e.is_recoverable() => {
                    pb.suspend(|| warn!("Skipping augmentation: {}", e));
                    stats.augment_failures += 1;
                }
                Err(e) => return Err(e),
            }
            pb.inc(1);
            log_progress("AUGMENT", i as u64 + 1, total, 500);
        }

        pb.finish_with_message(format!("Phase 5: Augmented {} files", stats.augmented));
        Ok(())
    }

    pub fn write_songs_csv(&self, songs: &[Song]) -> Result<PathBuf> {
        let path = self.output.join(SONGS_CSV);
        let file = create_new(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        for song in songs {
            writer.serialize(SongRecord::from_song(song, &self.date_time_prefix))?;
        }
        writer.flush().map_err(|e| ExtractError::io(&path, e))?;
        info!("Wrote {} rows to {}", songs.len(), path.display());
        Ok(path)
    }

    /// One text file per list. Returns how many were written.
    pub fn write_lists(&self, lists: &SongLists, subfolder: &str, songs: &[Song]) -> Result<usize> {
        let folder = self.output.join(subfolder);
        for list in lists.iter() {
            let path = folder.join(format!("{}.txt", sanitize_file_name(&list.name)));
            let mut content = String::new();
            for &idx in &list.songs {
                content.push_str(songs[idx].display_title());
                content.push('\n');
            }
            write_new(&path, content.as_bytes())?;
        }
        Ok(lists.len())
    }

    /// Lists every scanned file the database does not reference, grouped by
    /// state. The script is written for review and never run here.
    pub fn write_cleanup_script(&self, songs: &[Song]) -> Result<usize> {
        let path = self.output.join(CLEANUP_SCRIPT);
        let mut script = format!(
            "#!/bin/sh\n# Files under {} that MobileSheets does not reference.\n\
             # Review before running.\nset -e\n",
            self.input.display()
        );

        let mut count = 0;
        for state in [FileState::Obsolete, FileState::Preferred, FileState::Unique] {
            let orphans: Vec<&Song> = songs
                .iter()
                .filter(|s| s.state() == state && s.database_id().is_none())
                .collect();
            if orphans.is_empty() {
                continue;
            }
            script.push_str(&format!("\n# {}\n", state));
            for song in orphans {
                let quoted = shell_escape::escape(song.file.path.to_string_lossy());
                script.push_str(&format!("rm -- {}\n", quoted));
                count += 1;
            }
        }

        write_new(&path, script.as_bytes())?;
        Ok(count)
    }
}
