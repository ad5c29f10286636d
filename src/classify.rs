//! Duplicate classification.
//!
//! Songs are grouped twice, first by content hash and then by file name. In
//! every group with more than one member a single song is kept (`Preferred`)
//! and the others become `Obsolete`. A song keeps the first state it is
//! given, so the name pass only decides songs the hash pass left `Unique`.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;

use crate::models::FileState;
use crate::song::Song;

/// Tie-break order: database id ascending with unreferenced songs last, then
/// newest modification first, then relative path.
pub fn priority_order(a: &Song, b: &Song) -> Ordering {
    let by_id = match (a.database_id(), b.database_id()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_id
        .then_with(|| b.file.modified.cmp(&a.file.modified))
        .then_with(|| a.relative_path.cmp(&b.relative_path))
}

/// Classifies every song. The result is parallel to `songs`.
pub fn classify(songs: &[Song]) -> Vec<FileState> {
    let mut order: Vec<usize> = (0..songs.len()).collect();
    order.sort_by(|&a, &b| priority_order(&songs[a], &songs[b]));

    let mut states = vec![FileState::Unique; songs.len()];
    for group in group_by(&order, move |idx| songs[idx].hash.as_str()) {
        resolve_group(songs, &group, &mut states);
    }
    for group in group_by(&order, move |idx| songs[idx].file.file_name.as_str()) {
        resolve_group(songs, &group, &mut states);
    }
    states
}

/// Classifies and stores the states on the songs.
pub fn apply_classification(songs: &mut [Song]) {
    let states = classify(songs);
    for (song, state) in songs.iter_mut().zip(states) {
        song.narrow_state(state);
    }
}

/// Groups of `order` sharing a key, each kept in `order`'s sequence, listed
/// by first appearance.
fn group_by<'a, F>(order: &[usize], key: F) -> Vec<Vec<usize>>
where
    F: Fn(usize) -> &'a str,
{
    let mut slots: FxHashMap<&'a str, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &idx in order {
        let slot = *slots.entry(key(idx)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(idx);
    }
    groups
}

fn resolve_group(songs: &[Song], group: &[usize], states: &mut [FileState]) {
    if group.len() < 2 {
        return;
    }
    let keeper = pick_keeper(songs, group, states);

    // An earlier keeper without a database id cannot push out the file the
    // app references: the newest still-unique id-holder is kept as well.
    let also_kept = keeper
        .filter(|&k| songs[k].database_id().is_none())
        .and_then(|_| {
            newest_referenced(
                songs,
                group.iter().copied().filter(|&idx| states[idx] == FileState::Unique),
            )
        });

    for &idx in group {
        if states[idx] == FileState::Unique {
            states[idx] = if Some(idx) == keeper || Some(idx) == also_kept {
                FileState::Preferred
            } else {
                FileState::Obsolete
            };
        }
    }
}

/// The song a group keeps. Obsolete songs never come back. A song already
/// preferred by an earlier pass stays the keeper. Otherwise a song the
/// database references wins over unreferenced files, and among several
/// referenced songs the newest file wins.
fn pick_keeper(songs: &[Song], group: &[usize], states: &[FileState]) -> Option<usize> {
    let candidates: Vec<usize> = group
        .iter()
        .copied()
        .filter(|&idx| states[idx] != FileState::Obsolete)
        .collect();

    if let Some(&kept) = candidates
        .iter()
        .find(|&&idx| states[idx] == FileState::Preferred)
    {
        return Some(kept);
    }

    newest_referenced(songs, candidates.iter().copied()).or_else(|| candidates.first().copied())
}

/// The newest song with a database id. Ties fall back to iteration order,
/// which in a group already prefers the lower id.
fn newest_referenced<I>(songs: &[Song], indices: I) -> Option<usize>
where
    I: Iterator<Item = usize>,
{
    indices
        .filter(|&idx| songs[idx].database_id().is_some())
        .reduce(|best, idx| {
            if songs[idx].file.modified > songs[best].file.modified {
                idx
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::FileInfo;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn song(relative_path: &str, hash: &str, minute: u32, id: Option<i64>) -> Song {
        let file_name = relative_path.rsplit('/').next().unwrap().to_string();
        let file = FileInfo {
            path: PathBuf::from(relative_path),
            extension: "cho".into(),
            file_name,
            size: 10,
            modified: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
        };
        let mut song = Song::new(file, relative_path.to_string(), hash.to_string());
        if let Some(id) = id {
            song.attach_database_row(id, "T".into(), None, None);
        }
        song
    }

    #[test]
    fn test_priority_order() {
        let with_low_id = song("z.cho", "h", 0, Some(1));
        let with_high_id = song("a.cho", "h", 59, Some(9));
        let newer = song("b.cho", "h", 30, None);
        let older = song("a.cho", "h", 10, None);
        let same_time = song("c.cho", "h", 30, None);

        assert_eq!(priority_order(&with_low_id, &with_high_id), Ordering::Less);
        assert_eq!(priority_order(&with_high_id, &newer), Ordering::Less);
        assert_eq!(priority_order(&newer, &older), Ordering::Less);
        assert_eq!(priority_order(&newer, &same_time), Ordering::Less);
    }

    #[test]
    fn test_singletons_stay_unique() {
        let songs = vec![song("a.cho", "h1", 0, None), song("b.cho", "h2", 0, None)];
        assert_eq!(classify(&songs), vec![FileState::Unique, FileState::Unique]);
    }

    #[test]
    fn test_identical_copies_without_database_prefer_newest() {
        let songs = vec![
            song("Yesterday - Beatles.cho", "same", 5, None),
            song("Yesterday - Beatles (copy).cho", "same", 9, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_identical_timestamps_break_on_path() {
        let songs = vec![
            song("Yesterday - Beatles.cho", "same", 5, None),
            song("Yesterday - Beatles (copy).cho", "same", 5, None),
        ];
        // "Yesterday - Beatles (copy).cho" < "Yesterday - Beatles.cho"
        assert_eq!(
            classify(&songs),
            vec![FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_database_reference_beats_newer_file() {
        let songs = vec![
            song("new.cho", "same", 50, None),
            song("active.cho", "same", 1, Some(4)),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_two_referenced_copies_keep_newest() {
        let songs = vec![
            song("low-id.cho", "same", 1, Some(2)),
            song("high-id.cho", "same", 40, Some(8)),
            song("loose.cho", "same", 59, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Obsolete, FileState::Preferred, FileState::Obsolete]
        );
    }

    #[test]
    fn test_same_name_different_content_is_resolved() {
        let songs = vec![
            song("old/Song.cho", "before-edit", 1, None),
            song("new/Song.cho", "after-edit", 2, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_hash_result_is_not_overridden_by_name_pass() {
        // a and b share content; b loses. b and c share a name; b being
        // obsolete already must not stop c from being kept.
        let songs = vec![
            song("x/A.cho", "h1", 30, Some(1)),
            song("y/B.cho", "h1", 50, None),
            song("z/B.cho", "h2", 10, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Preferred, FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_preferred_by_hash_keeps_its_name_group() {
        // a wins the hash group; c shares a's name with other content and is
        // newer, but a is already the kept copy of that name.
        let songs = vec![
            song("x/A.cho", "h1", 10, None),
            song("y/Other.cho", "h1", 5, None),
            song("z/A.cho", "h2", 40, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Preferred, FileState::Obsolete, FileState::Obsolete]
        );
    }

    #[test]
    fn test_referenced_song_survives_earlier_keeper_of_its_name() {
        // a wins the hash group without an id; c shares a's name and is the
        // file the database references, so it is kept too.
        let songs = vec![
            song("old/Song.cho", "h1", 10, None),
            song("old/Backup.cho", "h1", 5, None),
            song("new/Song.cho", "h2", 50, Some(5)),
        ];
        assert_eq!(
            classify(&songs),
            vec![FileState::Preferred, FileState::Obsolete, FileState::Preferred]
        );
    }

    #[test]
    fn test_newest_referenced_song_kept_beside_earlier_keeper() {
        let songs = vec![
            song("a/Song.cho", "h1", 10, None),
            song("b/Other.cho", "h1", 5, None),
            song("c/Song.cho", "h2", 20, Some(3)),
            song("d/Song.cho", "h3", 40, Some(9)),
            song("e/Song.cho", "h4", 59, None),
        ];
        assert_eq!(
            classify(&songs),
            vec![
                FileState::Preferred,
                FileState::Obsolete,
                FileState::Obsolete,
                FileState::Preferred,
                FileState::Obsolete,
            ]
        );
    }

    #[test]
    fn test_exactly_one_preferred_per_hash_group() {
        let songs: Vec<Song> = (0..6)
            .map(|i| {
                let id = if i % 2 == 0 { Some(i as i64) } else { None };
                let hash = if i < 4 { "dup" } else { "other" };
                song(&format!("d{}/S{}.cho", i, i), hash, i * 7, id)
            })
            .collect();
        let states = classify(&songs);
        for hash in ["dup", "other"] {
            let members: Vec<_> = songs
                .iter()
                .zip(&states)
                .filter(|(s, _)| s.hash == hash)
                .map(|(_, st)| *st)
                .collect();
            assert_eq!(members.iter().filter(|s| **s == FileState::Preferred).count(), 1);
            assert_eq!(members.iter().filter(|s| **s == FileState::Unique).count(), 0);
        }
    }

    #[test]
    fn test_classification_is_deterministic_across_input_order() {
        let mut songs = vec![
            song("a/S.cho", "h", 3, None),
            song("b/S.cho", "h", 3, None),
            song("c/T.cho", "h", 3, None),
        ];
        let first = classify(&songs);
        songs.reverse();
        let mut second = classify(&songs);
        second.reverse();
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_classification_sets_states() {
        let mut songs = vec![song("a.cho", "h", 1, None), song("b.cho", "h", 2, None)];
        apply_classification(&mut songs);
        assert_eq!(songs[0].state(), FileState::Obsolete);
        assert_eq!(songs[1].state(), FileState::Preferred);
    }
}
