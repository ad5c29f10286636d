//! Text encoding and line-ending handling for song files.
//!
//! Song files travel between Windows, Android and iOS apps, and some of those
//! apps choke on a changed byte-order mark or line ending. Whatever convention
//! a file arrives with is captured once and reused verbatim when an augmented
//! copy is written.

use serde::Serialize;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    /// Fallback for bytes that are not valid UTF-8. Decoding is lossless for
    /// any byte sequence.
    Latin1,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8 (bom)",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Detects the encoding from a byte-order mark, then from UTF-8 validity.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(UTF8_BOM) {
            TextEncoding::Utf8Bom
        } else if bytes.starts_with(UTF16_LE_BOM) {
            TextEncoding::Utf16Le
        } else if bytes.starts_with(UTF16_BE_BOM) {
            TextEncoding::Utf16Be
        } else if std::str::from_utf8(bytes).is_ok() {
            TextEncoding::Utf8
        } else {
            TextEncoding::Latin1
        }
    }

    /// Decodes `bytes`, dropping the byte-order mark. Returns `None` when the
    /// bytes do not fit the encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            TextEncoding::Utf8Bom => {
                let body = bytes.strip_prefix(UTF8_BOM)?;
                String::from_utf8(body.to_vec()).ok()
            }
            TextEncoding::Utf16Le => {
                decode_utf16(bytes.strip_prefix(UTF16_LE_BOM)?, u16::from_le_bytes)
            }
            TextEncoding::Utf16Be => {
                decode_utf16(bytes.strip_prefix(UTF16_BE_BOM)?, u16::from_be_bytes)
            }
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encodes `text`, writing the byte-order mark back. Returns `None` when a
    /// character cannot be represented.
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Some(text.as_bytes().to_vec()),
            TextEncoding::Utf8Bom => {
                let mut out = UTF8_BOM.to_vec();
                out.extend_from_slice(text.as_bytes());
                Some(out)
            }
            TextEncoding::Utf16Le => {
                let mut out = UTF16_LE_BOM.to_vec();
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Some(out)
            }
            TextEncoding::Utf16Be => {
                let mut out = UTF16_BE_BOM.to_vec();
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                Some(out)
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok())
                .collect(),
        }
    }
}

fn decode_utf16(body: &[u8], to_unit: fn([u8; 2]) -> u16) -> Option<String> {
    if body.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// The first terminator in `text` decides. `None` for single-line text.
    pub fn detect(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let pos = bytes.iter().position(|&b| b == b'\n' || b == b'\r')?;
        Some(match (bytes[pos], bytes.get(pos + 1)) {
            (b'\r', Some(b'\n')) => LineEnding::CrLf,
            (b'\r', _) => LineEnding::Cr,
            _ => LineEnding::Lf,
        })
    }
}

/// Encoding and line-ending convention of one song file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextFormat {
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub trailing_newline: bool,
}

impl TextFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        let encoding = TextEncoding::detect(bytes);
        let decoded = encoding.decode(bytes).unwrap_or_default();
        TextFormat {
            encoding,
            line_ending: LineEnding::detect(&decoded).unwrap_or(LineEnding::Lf),
            trailing_newline: ends_with_terminator(&decoded),
        }
    }

    /// Decodes `bytes` into lines without terminators.
    pub fn decode_lines(&self, bytes: &[u8]) -> Option<Vec<String>> {
        let text = self.encoding.decode(bytes)?;
        Some(split_lines(&text))
    }

    /// Joins `lines` with this format's terminator and encodes the result.
    pub fn encode_lines(&self, lines: &[String]) -> Option<Vec<u8>> {
        let mut text = lines.join(self.line_ending.as_str());
        if self.trailing_newline && !lines.is_empty() {
            text.push_str(self.line_ending.as_str());
        }
        self.encoding.encode(&text)
    }
}

fn ends_with_terminator(text: &str) -> bool {
    text.ends_with('\n') || text.ends_with('\r')
}

/// Splits on `\r\n`, `\n` or `\r`. A final terminator does not produce an
/// extra empty line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if !current.is_empty() || (!text.is_empty() && !ends_with_terminator(text)) {
        lines.push(current);
    }
    lines
}
