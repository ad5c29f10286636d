//! Directive merge: adds missing metadata directives to ChordPro files.
//!
//! Existing directives are never rewritten. A field counts as present when
//! at least one of its directives carries a non-blank value; `{artist:}`
//! with nothing after it does not block an insertion.
//!
//! Generated lines go below the existing directives of the fields that come
//! before the first generated one in `title, artist, key, tempo, capo`
//! order, or at the very top when there are none. A file that only has
//! `{key: G}` gets `{title: ...}` as its first line, which some viewers
//! require.

use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::chordpro::{parse_lines, Entry, MetadataField, ParseError};
use crate::error::{ExtractError, Result};
use crate::models::FileState;
use crate::safety;
use crate::song::Song;
use crate::text::TextFormat;

/// Join delimiter for multi-valued fields. Strict viewers accept one
/// directive per field and need the space after the semicolon.
pub const VALUE_SEPARATOR: &str = "; ";

// ============================================================================
// Field Values
// ============================================================================

/// What the export knows about each metadata field, already rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    title: Option<String>,
    artist: Option<String>,
    key: Option<String>,
    tempo: Option<String>,
    capo: Option<String>,
}

impl FieldValues {
    pub fn from_song(song: &Song) -> Self {
        FieldValues {
            title: non_blank(song.display_title()),
            artist: join_non_blank(song.artists.iter().map(String::as_str)),
            key: join_non_blank(song.keys.iter().map(String::as_str)),
            tempo: join_non_blank(song.tempos.iter().map(|t| t.to_string())),
            capo: song.capo.map(|c| c.to_string()),
        }
    }

    pub fn with(mut self, field: MetadataField, value: &str) -> Self {
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Artist => &mut self.artist,
            MetadataField::Key => &mut self.key,
            MetadataField::Tempo => &mut self.tempo,
            MetadataField::Capo => &mut self.capo,
        };
        *slot = non_blank(value);
        self
    }

    pub fn get(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::Title => self.title.as_deref(),
            MetadataField::Artist => self.artist.as_deref(),
            MetadataField::Key => self.key.as_deref(),
            MetadataField::Tempo => self.tempo.as_deref(),
            MetadataField::Capo => self.capo.as_deref(),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn join_non_blank<I, S>(values: I) -> Option<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = values
        .filter_map(|v| non_blank(v.as_ref()))
        .collect();
    (!parts.is_empty()).then(|| parts.join(VALUE_SEPARATOR))
}

// ============================================================================
// Merge Planning
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Line index the new block is inserted before.
    pub insert_at: usize,
    pub directives: Vec<String>,
    /// Whether a blank line follows the block.
    pub blank_separator: bool,
}

/// Line positions of directives with a non-blank value, per field.
pub fn present_fields(entries: &[Entry]) -> FxHashMap<MetadataField, Vec<usize>> {
    let mut present: FxHashMap<MetadataField, Vec<usize>> = FxHashMap::default();
    for (pos, entry) in entries.iter().enumerate() {
        if let Entry::Directive(directive) = entry {
            if let Some(field) = directive.field {
                if directive.has_value() {
                    present.entry(field).or_default().push(pos);
                }
            }
        }
    }
    present
}

pub fn render_directive(field: MetadataField, value: &str) -> String {
    format!("{{{}: {}}}", field.directive_name(), value)
}

/// Works out which directives to add and where. `None` when nothing is
/// missing.
///
/// The block goes one line past the last present directive among the fields
/// that come before the first generated one, not past every directive in
/// the file. Only that reading puts `{title}` first in a file whose sole
/// directive is `{key: G}`.
pub fn plan_merge(entries: &[Entry], values: &FieldValues) -> Option<MergePlan> {
    let present = present_fields(entries);
    let mut insert_at = 0;
    let mut directives = Vec::new();

    for field in MetadataField::ALL {
        if let Some(positions) = present.get(&field) {
            if directives.is_empty() {
                if let Some(&last) = positions.last() {
                    insert_at = insert_at.max(last + 1);
                }
            }
            continue;
        }
        if let Some(value) = values.get(field) {
            directives.push(render_directive(field, value));
        }
    }

    if directives.is_empty() {
        return None;
    }

    let blank_separator = matches!(entries.get(insert_at), Some(Entry::Content | Entry::Comment));
    Some(MergePlan {
        insert_at,
        directives,
        blank_separator,
    })
}

/// Returns the merged lines, or `None` when the file needs no change.
pub fn merge_lines(
    lines: &[String],
    values: &FieldValues,
) -> std::result::Result<Option<Vec<String>>, ParseError> {
    let entries = parse_lines(lines)?;
    let Some(plan) = plan_merge(&entries, values) else {
        return Ok(None);
    };

    let extra = plan.directives.len() + usize::from(plan.blank_separator);
    let mut merged = Vec::with_capacity(lines.len() + extra);
    merged.extend_from_slice(&lines[..plan.insert_at]);
    merged.extend(plan.directives);
    if plan.blank_separator {
        merged.push(String::new());
    }
    merged.extend_from_slice(&lines[plan.insert_at..]);
    Ok(Some(merged))
}

// ============================================================================
// File Augmentation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AugmentOutcome {
    /// Not a ChordPro file, or an obsolete copy.
    NotEligible,
    /// Every field with a known value is already declared.
    Unchanged,
    Augmented(PathBuf),
}

pub fn is_eligible(song: &Song) -> bool {
    song.is_chordpro() && song.state() != FileState::Obsolete
}

/// Writes an augmented copy of `song` below `output_root` when directives
/// are missing. The source file is never modified.
pub fn augment_song(song: &Song, output_root: &Path) -> Result<AugmentOutcome> {
    if !is_eligible(song) {
        return Ok(AugmentOutcome::NotEligible);
    }

    let path = &song.file.path;
    let bytes = fs::read(path).map_err(|e| ExtractError::io(path, e))?;
    let format = song
        .text_format
        .unwrap_or_else(|| TextFormat::detect(&bytes));
    let encoding_error = || ExtractError::Encoding {
        path: path.clone(),
        encoding: format.encoding.name().to_string(),
    };

    let lines = format.decode_lines(&bytes).ok_or_else(encoding_error)?;
    let merged =
        merge_lines(&lines, &FieldValues::from_song(song)).map_err(|e| ExtractError::Parse {
            path: path.clone(),
            line: e.line,
            message: e.message,
        })?;
    let Some(merged) = merged else {
        return Ok(AugmentOutcome::Unchanged);
    };

    let encoded = format.encode_lines(&merged).ok_or_else(encoding_error)?;
    let destination = safety::destination(output_root, &song.relative_path);
    safety::write_new(&destination, &encoded)?;
    Ok(AugmentOutcome::Augmented(destination))
}
