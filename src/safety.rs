//! Safety utilities that keep an export from touching what it must not.
//!
//! Output files are only ever created, never replaced, so a second run into
//! the same folder fails instead of mixing its results with the first. The
//! output folder may not overlap the MobileSheets folder being read.

use anyhow::{bail, Result as AnyResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};

/// Validates that an output folder is safe to export into.
///
/// Checks:
/// - Output and input must not be the same folder
/// - Neither may contain the other (a later scan would pick up exported
///   copies, or the export would land inside the app's storage)
pub fn validate_output_root(output: &Path, input: &Path) -> AnyResult<()> {
    let output = output.canonicalize().unwrap_or_else(|_| output.to_path_buf());
    let input = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());

    if output == input {
        bail!(
            "Safety check failed: output '{}' cannot be the same as input '{}'",
            output.display(),
            input.display()
        );
    }
    if output.starts_with(&input) {
        bail!(
            "Safety check failed: output '{}' is inside input '{}'",
            output.display(),
            input.display()
        );
    }
    if input.starts_with(&output) {
        bail!(
            "Safety check failed: input '{}' is inside output '{}'",
            input.display(),
            output.display()
        );
    }
    Ok(())
}

/// Destination for a `/`-separated relative path below `root`.
pub fn destination(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Creates `path` (and its parents), failing with `OutputExists` when
/// something is already there.
pub fn create_new(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ExtractError::OutputExists {
                path: path.to_path_buf(),
            },
            _ => ExtractError::io(path, e),
        })
}

pub fn write_new(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = create_new(path)?;
    file.write_all(bytes).map_err(|e| ExtractError::io(path, e))?;
    file.flush().map_err(|e| ExtractError::io(path, e))
}

/// Copies `src` to a new file at `dst`, keeping the modification time.
pub fn copy_new(src: &Path, dst: &Path) -> Result<u64> {
    let mut input = File::open(src).map_err(|e| ExtractError::io(src, e))?;
    let mut output = create_new(dst)?;
    let copied = io::copy(&mut input, &mut output).map_err(|e| ExtractError::io(dst, e))?;

    let modified = input
        .metadata()
        .and_then(|m| m.modified())
        .map_err(|e| ExtractError::io(src, e))?;
    output
        .set_modified(modified)
        .map_err(|e| ExtractError::io(dst, e))?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_valid_sibling_folders() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("LocalState");
        let output = dir.path().join("Export");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        assert!(validate_output_root(&output, &input).is_ok());
    }

    #[test]
    fn test_output_equals_input() {
        let dir = TempDir::new().unwrap();
        let result = validate_output_root(dir.path(), dir.path());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as input"));
    }

    #[test]
    fn test_nested_folders_blocked() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("Export");
        fs::create_dir_all(&inner).unwrap();
        assert!(validate_output_root(&inner, dir.path())
            .unwrap_err()
            .to_string()
            .contains("is inside input"));
        assert!(validate_output_root(dir.path(), &inner)
            .unwrap_err()
            .to_string()
            .contains("is inside output"));
    }

    #[test]
    fn test_destination_joins_segments() {
        let root = Path::new("/out/Files");
        assert_eq!(
            destination(root, "Rock/A - B.cho"),
            PathBuf::from("/out/Files").join("Rock").join("A - B.cho")
        );
    }

    #[test]
    fn test_write_new_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("Songs.csv");
        write_new(&path, b"first").unwrap();

        let err = write_new(&path, b"second").unwrap_err();
        assert!(matches!(err, ExtractError::OutputExists { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn test_copy_new_keeps_content_and_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.pdf");
        let dst = dir.path().join("out").join("a.pdf");
        fs::write(&src, b"%PDF").unwrap();

        assert_eq!(copy_new(&src, &dst).unwrap(), 4);
        assert_eq!(fs::read(&dst).unwrap(), b"%PDF");
        let src_mtime = fs::metadata(&src).unwrap().modified().unwrap();
        let dst_mtime = fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);

        assert!(matches!(
            copy_new(&src, &dst),
            Err(ExtractError::OutputExists { .. })
        ));
    }
}
