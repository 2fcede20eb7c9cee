//! Job intake: plain text, one job id per line.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Failure to load the job input file.
#[derive(Debug)]
pub struct JobFileError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for JobFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jobs file \"{}\": {}", self.path.display(), self.message)
    }
}

impl std::error::Error for JobFileError {}

/// Reads job ids from `path`: any non-empty line is taken as an id,
/// blank and whitespace-only lines are ignored.
///
/// # Errors
///
/// Returns a [`JobFileError`] if the file cannot be read or contains no
/// ids at all.
pub fn load_job_ids(path: &Path) -> Result<Vec<String>, JobFileError> {
    let content = fs::read_to_string(path).map_err(|e| JobFileError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let ids: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if ids.is_empty() {
        return Err(JobFileError {
            path: path.to_path_buf(),
            message: "no job ids found".to_string(),
        });
    }
    Ok(ids)
}
