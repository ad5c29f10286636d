//! MobileSheets database enrichment.
//!
//! Reads song details, artists, keys, tempos, set lists and collections from
//! `MobileSheets.db` and attaches them to the scanned songs. The database is
//! opened read-only and never written.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::SongLists;
use crate::progress::create_spinner;
use crate::song::{path_key, Song};

pub const DATABASE_FILE_NAME: &str = "MobileSheets.db";

// ============================================================================
// Queries
// ============================================================================

const SONG_DETAILS_SQL: &str = "
    SELECT s.Id, s.Title, s.Custom2 AS Capo, f.Path, st.Type
    FROM Songs s
        JOIN Files f ON f.SongId = s.Id
        LEFT JOIN SourceTypeSongs sts ON sts.SongId = s.Id
        LEFT JOIN SourceType st ON st.Id = sts.SourceTypeId
    ORDER BY s.Title";

const ARTISTS_SQL: &str = "
    SELECT s.Id, ar.Name
    FROM Songs s
        LEFT JOIN ArtistsSongs ars ON ars.SongId = s.Id
        LEFT JOIN Artists ar ON ar.Id = ars.ArtistId
    WHERE ar.Name IS NOT NULL
    ORDER BY s.Title, ars.Id, ar.SortBy";

const KEYS_SQL: &str = "
    SELECT s.Id, k.Name
    FROM Songs s
        LEFT JOIN KeySongs ks ON ks.SongId = s.Id
        LEFT JOIN Key k ON k.Id = ks.KeyId
    WHERE k.Name IS NOT NULL
    ORDER BY s.Title, ks.Id, k.SortBy";

const TEMPOS_SQL: &str = "
    SELECT s.Id, t.Tempo
    FROM Songs s
        LEFT JOIN Tempos t ON t.SongId = s.Id
    WHERE t.Tempo IS NOT NULL
    ORDER BY s.Title, t.TempoIndex";

const SET_LISTS_SQL: &str = "
    SELECT sl.Name, s.Id
    FROM Songs s
        LEFT JOIN SetlistSong sls ON sls.SongId = s.Id
        LEFT JOIN Setlists sl ON sl.Id = sls.SetlistId
    WHERE sl.Name IS NOT NULL
    ORDER BY sl.Name, sls.Id, sl.SortBy";

const COLLECTIONS_SQL: &str = "
    SELECT c.Name, s.Id
    FROM Songs s
        LEFT JOIN CollectionSong cs ON cs.SongId = s.Id
        LEFT JOIN Collections c ON c.Id = cs.CollectionId
    WHERE c.Name IS NOT NULL
    ORDER BY c.Name, cs.Id, c.SortBy";

// ============================================================================
// Enrichment
// ============================================================================

/// What the database contributed beyond the per-song fields.
#[derive(Debug, Default)]
pub struct DatabaseSummary {
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub set_lists: SongLists,
    pub collections: SongLists,
}

pub fn database_path(input: &Path) -> PathBuf {
    input.join(DATABASE_FILE_NAME)
}

pub fn open_read_only(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(Connection::open_with_flags(path, flags)?)
}

/// Opens the input folder's database, enriches `songs` and closes it again.
pub fn load(input: &Path, songs: &mut [Song]) -> Result<DatabaseSummary> {
    let conn = open_read_only(&database_path(input))?;
    let summary = enrich_songs(&conn, songs)?;
    drop(conn);
    Ok(summary)
}

/// Runs the full query sequence against `conn`.
pub fn enrich_songs(conn: &Connection, songs: &mut [Song]) -> Result<DatabaseSummary> {
    let spinner = create_spinner("Phase 2: Reading database");

    let mut summary = DatabaseSummary::default();
    let by_id = attach_song_details(conn, songs, &mut summary)?;

    for_each_value(conn, ARTISTS_SQL, |id, row| {
        let artist: String = row.get(1)?;
        with_songs(&by_id, songs, id, |song| song.add_artist(artist.clone()));
        Ok(())
    })?;
    for_each_value(conn, KEYS_SQL, |id, row| {
        let key: String = row.get(1)?;
        with_songs(&by_id, songs, id, |song| song.add_key(key.clone()));
        Ok(())
    })?;
    for_each_value(conn, TEMPOS_SQL, |id, row| {
        let tempo: i32 = row.get(1)?;
        with_songs(&by_id, songs, id, |song| song.add_tempo(tempo));
        Ok(())
    })?;

    summary.set_lists = read_song_lists(conn, SET_LISTS_SQL, &by_id)?;
    summary.collections = read_song_lists(conn, COLLECTIONS_SQL, &by_id)?;

    spinner.finish_with_message(format!(
        "Phase 2: Matched {} database songs ({} unmatched)",
        summary.matched_rows, summary.unmatched_rows
    ));
    Ok(summary)
}

/// Matches song-detail rows to songs by path and returns the id index.
fn attach_song_details(
    conn: &Connection,
    songs: &mut [Song],
    summary: &mut DatabaseSummary,
) -> Result<FxHashMap<i64, Vec<usize>>> {
    let by_path = index_by_path(songs);

    let mut stmt = conn.prepare(SONG_DETAILS_SQL)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let capo = parse_capo(row.get_ref(2)?);
        let path: String = row.get(3)?;
        let content_type: Option<String> = row.get(4)?;
        let title = title.unwrap_or_default();

        match by_path.get(&database_path_key(&path)) {
            Some(&idx) => {
                if songs[idx].attach_database_row(id, title, capo, content_type) {
                    summary.matched_rows += 1;
                } else {
                    debug!("Ignoring extra row for song {} at {}", id, path);
                }
            }
            None => {
                warn!("Song {} \"{}\" has no matching file at {}", id, title, path);
                summary.unmatched_rows += 1;
            }
        }
    }

    let mut by_id: FxHashMap<i64, Vec<usize>> = FxHashMap::default();
    for (idx, song) in songs.iter().enumerate() {
        if let Some(id) = song.database_id() {
            by_id.entry(id).or_default().push(idx);
        }
    }
    Ok(by_id)
}

/// Match keys to song indices. When two files fold to the same key, the
/// first one in scan order is the one a database row can reach.
fn index_by_path(songs: &[Song]) -> FxHashMap<String, usize> {
    let mut by_path: FxHashMap<String, usize> = FxHashMap::default();
    for (idx, song) in songs.iter().enumerate() {
        let key = song.match_key();
        match by_path.get(&key) {
            Some(&first) => warn!(
                "{} and {} share a database path; only the first can match",
                songs[first].relative_path, song.relative_path
            ),
            None => {
                by_path.insert(key, idx);
            }
        }
    }
    by_path
}

/// Runs a `(song id, value)` query, skipping ids no scanned file matched.
fn for_each_value<F>(conn: &Connection, sql: &str, mut apply: F) -> Result<()>
where
    F: FnMut(i64, &rusqlite::Row<'_>) -> rusqlite::Result<()>,
{
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        apply(id, row)?;
    }
    Ok(())
}

fn with_songs<F>(by_id: &FxHashMap<i64, Vec<usize>>, songs: &mut [Song], id: i64, mut apply: F)
where
    F: FnMut(&mut Song),
{
    if let Some(indices) = by_id.get(&id) {
        for &idx in indices {
            apply(&mut songs[idx]);
        }
    }
}

/// Reads a `(list name, song id)` query. A song listed under an id that
/// several files share is entered once, as its first file.
fn read_song_lists(
    conn: &Connection,
    sql: &str,
    by_id: &FxHashMap<i64, Vec<usize>>,
) -> Result<SongLists> {
    let mut lists = SongLists::new();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let id: i64 = row.get(1)?;
        match by_id.get(&id).and_then(|indices| indices.first()) {
            Some(&idx) => lists.push(&name, idx),
            None => debug!("List '{}' references song {} with no file", name, id),
        }
    }
    Ok(lists)
}

/// Database paths may use either separator.
fn database_path_key(path: &str) -> String {
    path_key(path.replace('\\', "/").trim_start_matches('/'))
}

/// Capo is stored in a free-text custom column.
fn parse_capo(value: ValueRef<'_>) -> Option<u8> {
    match value {
        ValueRef::Integer(n) => u8::try_from(n).ok(),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}
