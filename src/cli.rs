//! Command-line arguments and their validation.

use clap::Parser;
use std::path::PathBuf;

use crate::database::database_path;
use crate::error::{ExtractError, Result};
use crate::scan::parse_masks;

pub const USAGE: &str = "Usage: OutputFolder [InputFolder] [FileMasks = *.cho;*.pdf] [DateTimePrefix = ']";
pub const DEFAULT_FILE_MASKS: &str = "*.cho;*.pdf";
/// Prefixed to CSV timestamps so spreadsheets keep them as text.
pub const DEFAULT_DATE_TIME_PREFIX: &str = "'";

const MOBILESHEETS_PACKAGE: &str = "41730Zubersoft.MobileSheets_ys1c8ct2g6ypr";

#[derive(Parser, Debug)]
#[command(name = "mobilesheets-extract")]
#[command(about = "Extract a deduplicated, annotated song library from MobileSheets storage")]
pub struct Args {
    /// Existing folder to export into
    pub output_folder: Option<String>,

    /// MobileSheets storage folder (defaults to the app's LocalState folder)
    pub input_folder: Option<String>,

    /// File masks separated by ';'
    pub file_masks: Option<String>,

    /// Text placed before each Modified timestamp in Songs.csv
    pub date_time_prefix: Option<String>,

    /// Log-only mode: no progress bars, periodic progress lines instead
    #[arg(long)]
    pub log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    pub stats: Option<PathBuf>,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub output: PathBuf,
    pub input: PathBuf,
    pub masks: Vec<String>,
    pub date_time_prefix: String,
    pub log_only: bool,
    pub stats: Option<PathBuf>,
}

/// The MobileSheets Windows store app keeps its library here.
pub fn default_input_folder() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| {
        dir.join("Packages")
            .join(MOBILESHEETS_PACKAGE)
            .join("LocalState")
    })
}

fn is_help_request(arg: &str) -> bool {
    arg.is_empty() || arg == "/?" || arg.eq_ignore_ascii_case("/help")
}

impl Args {
    /// Checks every argument and reports all problems at once as a `Usage`
    /// error. Nothing on disk is touched.
    pub fn into_config(self) -> Result<Config> {
        let output = self.output_folder.as_deref().map(str::trim).unwrap_or_default().to_string();
        let input = match self.input_folder.as_deref().map(str::trim) {
            Some(input) => input.to_string(),
            None => default_input_folder()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let masks = parse_masks(self.file_masks.as_deref().unwrap_or(DEFAULT_FILE_MASKS));
        let date_time_prefix = self
            .date_time_prefix
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_DATE_TIME_PREFIX)
            .to_string();

        let mut problems = Vec::new();
        if is_help_request(&output) {
            problems.push(USAGE.to_string());
        } else if !PathBuf::from(&output).is_dir() {
            problems.push("The output folder does not exist.".to_string());
        }

        if input.is_empty() {
            problems.push("The input folder cannot be empty.".to_string());
        } else if !PathBuf::from(&input).is_dir() {
            problems.push("The input folder does not exist.".to_string());
        } else if !database_path(&PathBuf::from(&input)).is_file() {
            problems.push("The database file does not exist.".to_string());
        }

        if masks.is_empty() {
            problems.push("You must specify a file mask (e.g., *.cho).".to_string());
        }

        if !problems.is_empty() {
            return Err(ExtractError::Usage(problems.join("\n")));
        }

        Ok(Config {
            output: PathBuf::from(output),
            input: PathBuf::from(input),
            masks,
            date_time_prefix,
            log_only: self.log_only,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Result<Config> {
        let mut argv = vec!["mobilesheets-extract"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().into_config()
    }

    fn usage_text(result: Result<Config>) -> String {
        match result {
            Err(ExtractError::Usage(text)) => text,
            other => panic!("expected usage error, got {:?}", other),
        }
    }

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("MobileSheets.db"), b"").unwrap();
        dir
    }

    #[test]
    fn test_help_requests_print_usage() {
        let input = library();
        let input = input.path().to_str().unwrap();
        for output in ["/?", "/HELP", " "] {
            let text = usage_text(parse(&[output, input]));
            assert!(text.starts_with("Usage: OutputFolder"), "{}", text);
        }
    }

    #[test]
    fn test_all_problems_are_reported_together() {
        let text = usage_text(parse(&["/no/such/out", "/no/such/in", " ; "]));
        assert!(text.contains("The output folder does not exist."));
        assert!(text.contains("The input folder does not exist."));
        assert!(text.contains("You must specify a file mask"));
        assert!(!text.contains("database"));
    }

    #[test]
    fn test_missing_database_is_reported() {
        let output = TempDir::new().unwrap();
        let input = TempDir::new().unwrap();
        let text = usage_text(parse(&[
            output.path().to_str().unwrap(),
            input.path().to_str().unwrap(),
        ]));
        assert_eq!(text, "The database file does not exist.");
    }

    #[test]
    fn test_defaults_apply() {
        let output = TempDir::new().unwrap();
        let input = library();
        let config = parse(&[
            output.path().to_str().unwrap(),
            input.path().to_str().unwrap(),
            "--log-only",
        ])
        .unwrap();
        assert_eq!(config.masks, vec!["*.cho", "*.pdf"]);
        assert_eq!(config.date_time_prefix, "'");
        assert!(config.log_only);
        assert!(config.stats.is_none());
    }

    #[test]
    fn test_explicit_masks_and_prefix() {
        let output = TempDir::new().unwrap();
        let input = library();
        let config = parse(&[
            output.path().to_str().unwrap(),
            input.path().to_str().unwrap(),
            "*.chopro; *.CHO",
            "=",
            "--stats",
            "stats.json",
        ])
        .unwrap();
        assert_eq!(config.masks, vec!["*.chopro", "*.CHO"]);
        assert_eq!(config.date_time_prefix, "=");
        assert_eq!(config.stats, Some(PathBuf::from("stats.json")));
    }

    #[test]
    fn test_default_input_points_at_local_state() {
        if let Some(path) = default_input_folder() {
            assert!(path.ends_with("LocalState"));
        }
    }
}
