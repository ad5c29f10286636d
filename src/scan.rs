//! File discovery: walks the MobileSheets folder for files matching the
//! configured masks and builds one `Song` per file.

use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ExtractError, Result};
use crate::progress::{create_progress_bar, log_progress};
use crate::song::Song;

const MASK_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Splits a `;`-separated mask list, dropping blank entries.
pub fn parse_masks(masks: &str) -> Vec<String> {
    masks
        .split(';')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

/// File-name masks such as `*.cho`, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct FileMasks {
    patterns: Vec<Pattern>,
}

impl FileMasks {
    pub fn new(masks: &[String]) -> Result<Self> {
        let patterns = masks
            .iter()
            .map(|mask| {
                Pattern::new(mask).map_err(|e| ExtractError::Mask {
                    mask: mask.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FileMasks { patterns })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(file_name, MASK_OPTIONS))
    }
}

/// Paths below `root` whose file name matches a mask, sorted, each once.
pub fn find_files(root: &Path, masks: &FileMasks) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let source = e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "directory loop")
            });
            ExtractError::io(path, source)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = masks.matches(&entry.file_name().to_string_lossy());
        if matched {
            found.insert(entry.into_path());
        } else {
            debug!("Skipping {}", entry.path().display());
        }
    }
    Ok(found.into_iter().collect())
}

/// Discovers and hashes every matching file. Any unreadable file fails the
/// scan, since it could be neither classified nor exported.
pub fn scan_songs(root: &Path, masks: &FileMasks) -> Result<Vec<Song>> {
    let paths = find_files(root, masks)?;
    let total = paths.len() as u64;
    let pb = create_progress_bar(total, "Phase 1: Hashing files");

    let mut songs = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        songs.push(Song::from_path(path, root)?);
        pb.inc(1);
        log_progress("SCAN", i as u64 + 1, total, 500);
    }

    pb.finish_with_message(format!("Phase 1: Hashed {} files", songs.len()));
    Ok(songs)
}
