//! Line-level ChordPro parsing.
//!
//! Only enough structure is recovered to find metadata directives: every
//! line becomes one entry, so an entry's index is its line position.
//! Environment blocks (`{start_of_chorus}` ... `{end_of_chorus}`) and
//! selector-conditioned directives are kept flat.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Title,
    Artist,
    Key,
    Tempo,
    Capo,
}

impl MetadataField {
    /// Fixed order in which missing directives are generated.
    pub const ALL: [MetadataField; 5] = [
        MetadataField::Title,
        MetadataField::Artist,
        MetadataField::Key,
        MetadataField::Tempo,
        MetadataField::Capo,
    ];

    pub fn directive_name(self) -> &'static str {
        match self {
            MetadataField::Title => "title",
            MetadataField::Artist => "artist",
            MetadataField::Key => "key",
            MetadataField::Tempo => "tempo",
            MetadataField::Capo => "capo",
        }
    }

    /// Maps a directive name to its field, ignoring case, the `t` short form
    /// and any selector suffix (`title-piano`, `key-!guitar`).
    pub fn from_directive_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let base = lower.split('-').next().unwrap_or(&lower);
        match base {
            "title" | "t" => Some(MetadataField::Title),
            "artist" => Some(MetadataField::Artist),
            "key" => Some(MetadataField::Key),
            "tempo" => Some(MetadataField::Tempo),
            "capo" => Some(MetadataField::Capo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub field: Option<MetadataField>,
    pub value: Option<String>,
}

impl Directive {
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directive(Directive),
    Comment,
    Content,
    Blank,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

/// Parses every line into an entry.
pub fn parse_lines(lines: &[String]) -> Result<Vec<Entry>, ParseError> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            parse_line(line).map_err(|message| ParseError {
                line: i + 1,
                message,
            })
        })
        .collect()
}

fn parse_line(line: &str) -> Result<Entry, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Entry::Blank);
    }
    if trimmed.starts_with('#') {
        return Ok(Entry::Comment);
    }
    if !trimmed.starts_with('{') {
        return Ok(Entry::Content);
    }
    if !trimmed.ends_with('}') || trimmed.len() < 2 {
        return Err("unterminated directive".to_string());
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let (name, value) = match inner.find(|c: char| c == ':' || c.is_whitespace()) {
        Some(pos) => {
            let separator_len = inner[pos..].chars().next().map_or(1, char::len_utf8);
            (inner[..pos].trim(), Some(inner[pos + separator_len..].trim()))
        }
        None => (inner.trim(), None),
    };

    if name.is_empty() {
        return Err("empty directive name".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '!')
    {
        return Err(format!("invalid directive name '{}'", name));
    }

    let value = value.map(|v| v.trim_start_matches(':').trim().to_string());
    let (field, value) = if is_meta(name) {
        meta_field(value)
    } else {
        (MetadataField::from_directive_name(name), value)
    };
    Ok(Entry::Directive(Directive {
        name: name.to_string(),
        field,
        value,
    }))
}

fn is_meta(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "meta" || lower.starts_with("meta-")
}

/// `{meta: artist Bob Dylan}` declares the artist. The first word names the
/// field and the rest is its value; other meta keys map to no field.
fn meta_field(value: Option<String>) -> (Option<MetadataField>, Option<String>) {
    let Some(value) = value else {
        return (None, None);
    };
    let (key, rest) = value
        .split_once(char::is_whitespace)
        .unwrap_or((value.as_str(), ""));
    match MetadataField::from_directive_name(key) {
        Some(field) => (Some(field), Some(rest.trim().to_string())),
        None => (None, Some(value)),
    }
}
