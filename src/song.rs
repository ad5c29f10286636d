//! Song identity: one record per discovered file.
//!
//! A song starts life with what the file system can tell us (name, size,
//! timestamp, content hash, a title/artist guess from the file name) and is
//! then enriched in place from the MobileSheets database.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

use crate::error::{ExtractError, Result};
use crate::models::FileState;
use crate::text::TextFormat;

/// Extensions of the structured ChordPro text format (lower-case, no dot).
pub const CHORDPRO_EXTENSIONS: &[&str] = &["cho", "chopro", "chordpro", "crd"];

/// Hyphen or en-dash between title and artist in "Title - Artist" names.
const TITLE_ARTIST_SEPARATORS: &[char] = &['-', '–'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_name: String,
    /// Lower-case extension without the dot, empty when there is none.
    pub extension: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileInfo {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| ExtractError::io(path, e))?;
        let modified = metadata.modified().map_err(|e| ExtractError::io(path, e))?;
        Ok(FileInfo {
            path: path.to_path_buf(),
            file_name: file_name_of(path),
            extension: extension_of(path),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        })
    }

    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(pos) if pos > 0 => &self.file_name[..pos],
            _ => &self.file_name,
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Song {
    pub file: FileInfo,
    /// Path below the scan root with `/` separators, as MobileSheets stores it.
    pub relative_path: String,
    /// Upper-case hex SHA-256 of the file bytes.
    pub hash: String,
    /// Title inferred from the file name. Never overwritten by enrichment.
    pub title: String,
    pub database_title: Option<String>,
    pub artists: Vec<String>,
    pub capo: Option<u8>,
    pub content_type: Option<String>,
    pub keys: Vec<String>,
    pub tempos: Vec<i32>,
    /// Captured at discovery for ChordPro files only.
    pub text_format: Option<TextFormat>,
    database_id: Option<i64>,
    state: FileState,
}

impl Song {
    pub fn new(file: FileInfo, relative_path: String, hash: String) -> Self {
        let (title, artist) = split_title_artist(file.stem());
        Song {
            file,
            relative_path,
            hash,
            title,
            database_title: None,
            artists: artist.into_iter().collect(),
            capo: None,
            content_type: None,
            keys: Vec::new(),
            tempos: Vec::new(),
            text_format: None,
            database_id: None,
            state: FileState::Unique,
        }
    }

    /// Reads metadata and hashes the file. ChordPro files are read whole so
    /// their text format can be captured from the same bytes; everything else
    /// is streamed through the hasher.
    pub fn from_path(path: &Path, root: &Path) -> Result<Self> {
        let file = FileInfo::from_path(path)?;
        let relative_path = relative_path_string(path, root);

        if is_chordpro_extension(&file.extension) {
            let bytes = fs::read(path).map_err(|e| ExtractError::io(path, e))?;
            let hash = hex::encode_upper(Sha256::digest(&bytes));
            let mut song = Song::new(file, relative_path, hash);
            song.text_format = Some(TextFormat::detect(&bytes));
            Ok(song)
        } else {
            let hash = hash_file(path)?;
            Ok(Song::new(file, relative_path, hash))
        }
    }

    pub fn database_id(&self) -> Option<i64> {
        self.database_id
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// The database title when the song was matched, else the file-name guess.
    pub fn display_title(&self) -> &str {
        self.database_title.as_deref().unwrap_or(&self.title)
    }

    pub fn is_chordpro(&self) -> bool {
        is_chordpro_extension(&self.file.extension)
    }

    /// Key used to join against database paths.
    pub fn match_key(&self) -> String {
        path_key(&self.relative_path)
    }

    /// Narrows a `Unique` song to `Preferred` or `Obsolete`. A song that was
    /// already classified keeps its state; returns whether anything changed.
    pub fn narrow_state(&mut self, state: FileState) -> bool {
        if self.state != FileState::Unique || state == FileState::Unique {
            return false;
        }
        self.state = state;
        true
    }

    /// Attaches the song-detail row of a matching database song. The first
    /// row wins; later rows for the same file are ignored and reported as
    /// `false`.
    pub fn attach_database_row(
        &mut self,
        id: i64,
        title: String,
        capo: Option<u8>,
        content_type: Option<String>,
    ) -> bool {
        if self.database_id.is_some() {
            return false;
        }
        self.database_id = Some(id);
        self.database_title = Some(title);
        self.capo = capo;
        self.content_type = content_type;
        true
    }

    pub fn add_artist(&mut self, artist: String) {
        push_unique(&mut self.artists, artist);
    }

    pub fn add_key(&mut self, key: String) {
        push_unique(&mut self.keys, key);
    }

    pub fn add_tempo(&mut self, tempo: i32) {
        push_unique(&mut self.tempos, tempo);
    }
}

fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

pub fn is_chordpro_extension(extension: &str) -> bool {
    CHORDPRO_EXTENSIONS.contains(&extension)
}

/// Splits "Title - Artist" on the first hyphen or en-dash. The artist is
/// `None` when there is no separator or nothing follows it.
pub fn split_title_artist(stem: &str) -> (String, Option<String>) {
    match stem.find(TITLE_ARTIST_SEPARATORS) {
        Some(pos) => {
            let title = stem[..pos].trim();
            let separator_len = stem[pos..].chars().next().map_or(1, char::len_utf8);
            let artist = stem[pos + separator_len..].trim();
            let title = if title.is_empty() { stem.trim() } else { title };
            let artist = (!artist.is_empty()).then(|| artist.to_string());
            (title.to_string(), artist)
        }
        None => (stem.trim().to_string(), None),
    }
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_path_string(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Case-insensitive, normalisation-insensitive comparison key for a path.
pub fn path_key(path: &str) -> String {
    path.nfc().collect::<String>().to_lowercase()
}

/// Streams a file through SHA-256 with one open handle.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| ExtractError::io(path, e))?;
    Ok(hex::encode_upper(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn info(name: &str) -> FileInfo {
        FileInfo {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            extension: extension_of(Path::new(name)),
            size: 0,
            modified: Utc.with_ymd_and_hms(2024, 7, 27, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_split_title_artist() {
        assert_eq!(
            split_title_artist("Yesterday - Beatles"),
            ("Yesterday".to_string(), Some("Beatles".to_string()))
        );
        assert_eq!(
            split_title_artist("Hallelujah – Leonard Cohen"),
            ("Hallelujah".to_string(), Some("Leonard Cohen".to_string()))
        );
        // Only the first separator splits
        assert_eq!(
            split_title_artist("Ob-La-Di - Beatles"),
            ("Ob".to_string(), Some("La-Di - Beatles".to_string()))
        );
        assert_eq!(split_title_artist("Greensleeves"), ("Greensleeves".to_string(), None));
        assert_eq!(split_title_artist("Intro -"), ("Intro".to_string(), None));
        assert_eq!(
            split_title_artist("- Unknown"),
            ("- Unknown".to_string(), Some("Unknown".to_string()))
        );
    }

    #[test]
    fn test_new_song_guesses_from_file_name() {
        let song = Song::new(info("Yesterday - Beatles (copy).cho"), "a/b.cho".into(), "00".into());
        assert_eq!(song.title, "Yesterday");
        assert_eq!(song.artists, vec!["Beatles (copy)"]);
        assert_eq!(song.state(), FileState::Unique);
        assert!(song.is_chordpro());
        assert_eq!(song.display_title(), "Yesterday");
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/library");
        let path = root.join("Rock").join("Songs").join("A.cho");
        assert_eq!(relative_path_string(&path, root), "Rock/Songs/A.cho");
    }

    #[test]
    fn test_path_key_folds_case_and_normalization() {
        // "é" precomposed vs "e" + combining acute
        assert_eq!(path_key("Caf\u{e9}/A.CHO"), path_key("cafe\u{301}/a.cho"));
    }

    #[test]
    fn test_database_id_is_never_replaced() {
        let mut song = Song::new(info("A.cho"), "A.cho".into(), "00".into());
        assert!(song.attach_database_row(7, "Alpha".into(), Some(0), None));
        assert!(!song.attach_database_row(8, "Beta".into(), None, None));
        assert_eq!(song.database_id(), Some(7));
        assert_eq!(song.capo, Some(0));
        assert_eq!(song.display_title(), "Alpha");
        assert_eq!(song.title, "A");
    }

    #[test]
    fn test_enrichment_dedupes_values() {
        let mut song = Song::new(info("Blowin - Bob Dylan.cho"), "x.cho".into(), "00".into());
        song.add_artist("Bob Dylan".into());
        song.add_artist("The Band".into());
        song.add_key("G".into());
        song.add_key("G".into());
        song.add_tempo(96);
        song.add_tempo(96);
        assert_eq!(song.artists, vec!["Bob Dylan", "The Band"]);
        assert_eq!(song.keys, vec!["G"]);
        assert_eq!(song.tempos, vec![96]);
    }

    #[test]
    fn test_state_narrows_once() {
        let mut song = Song::new(info("A.pdf"), "A.pdf".into(), "00".into());
        assert!(song.narrow_state(FileState::Obsolete));
        assert!(!song.narrow_state(FileState::Preferred));
        assert_eq!(song.state(), FileState::Obsolete);
    }

    #[test]
    fn test_from_path_hashes_and_captures_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Set 1").join("Yesterday - Beatles.cho");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{title: Yesterday}\r\n").unwrap();

        let song = Song::from_path(&path, dir.path()).unwrap();
        assert_eq!(song.relative_path, "Set 1/Yesterday - Beatles.cho");
        assert_eq!(song.file.size, 20);
        assert_eq!(song.hash, hex::encode_upper(Sha256::digest(b"{title: Yesterday}\r\n")));
        assert_eq!(song.hash, hash_file(&path).unwrap());
        let format = song.text_format.unwrap();
        assert_eq!(format.line_ending, crate::text::LineEnding::CrLf);
    }

    #[test]
    fn test_from_path_skips_format_for_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Score.pdf");
        fs::write(&path, b"%PDF-1.4").unwrap();

        let song = Song::from_path(&path, dir.path()).unwrap();
        assert!(song.text_format.is_none());
        assert_eq!(song.hash.len(), 64);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.cho");
        assert!(matches!(
            Song::from_path(&missing, dir.path()),
            Err(ExtractError::Io { .. })
        ));
    }
}
