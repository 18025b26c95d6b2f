use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::{DirEntry, WalkDir};

/// Durable state kept in the work dir. Never removed by the janitor.
pub static PERSISTENT_STATE_FILE: &str = "dump_keeper.db";

/// Files untouched for longer than this are considered orphaned.
pub static MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Removes every regular file under `dir` older than [`MAX_AGE`], except
/// [`PERSISTENT_STATE_FILE`]. Returns the removed paths.
pub fn cleanup<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let threshold = SystemTime::now()
        .checked_sub(MAX_AGE)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    cleanup_older_than(dir.as_ref(), threshold)
}

/// Keeps going past individual failures and reports all of them at the end.
#[named]
pub fn cleanup_older_than(dir: &Path, threshold: SystemTime) -> Result<Vec<PathBuf>> {
    tracing::info!("Cleaning up files older than {:?} in {:?}", MAX_AGE, dir);
    if !dir.is_dir() {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a directory",
        ))
        .add_msg(format!("{:?} cleanup failed", dir))
        .add_fn_name(function_path!()));
    }

    let mut removed = Vec::new();
    let mut errors = Vec::new();
    for entry in WalkDir::new(dir).into_iter() {
        let res = entry
            .map_err(Error::from)
            .and_then(|de| remove_if_stale(de, threshold));
        match res {
            Ok(Some(path)) => removed.push(path),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    convert_error_vec(errors)
        .add_msg(format!("{:?} cleanup failed", dir))
        .add_fn_name(function_path!())?;
    tracing::info!("Removed {} stale files from {:?}", removed.len(), dir);
    Ok(removed)
}

fn remove_if_stale(de: DirEntry, threshold: SystemTime) -> Result<Option<PathBuf>> {
    if !de.file_type().is_file() || de.file_name() == PERSISTENT_STATE_FILE {
        return Ok(None);
    }

    let modified = de
        .metadata()
        .map_err(Error::from)
        .and_then(|md| md.modified().map_err(Error::from))
        .add_msg(format!("Cannot read modification time of {:?}", de.path()))?;
    if modified >= threshold {
        return Ok(None);
    }

    let path = de.into_path();
    tracing::debug!("Removing stale file {:?}", path);
    std::fs::remove_file(&path)
        .map_err(Error::from)
        .add_msg(format!("Cannot remove {:?}", path))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn write_aged(path: &Path, age: Duration) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_cleanup_keeps_state_file_and_young_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let two_days = Duration::from_secs(2 * 24 * 60 * 60);

        write_aged(&dir.join(PERSISTENT_STATE_FILE), two_days);
        write_aged(&dir.join("p-1.gz"), two_days);
        write_aged(&dir.join("p-1.log"), two_days);
        write_aged(&dir.join("p-2.gz"), Duration::from_secs(60));
        std::fs::create_dir(dir.join("crashed")).unwrap();
        write_aged(&dir.join("crashed").join("partial.gz"), two_days);

        let mut removed = cleanup(dir).unwrap();
        removed.sort();
        assert_eq!(
            removed,
            vec![
                dir.join("crashed").join("partial.gz"),
                dir.join("p-1.gz"),
                dir.join("p-1.log"),
            ]
        );
        assert!(dir.join(PERSISTENT_STATE_FILE).exists());
        assert!(dir.join("p-2.gz").exists());
        assert!(dir.join("crashed").is_dir());
    }

    #[test]
    fn test_cleanup_just_under_a_day_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("recent.gz");
        write_aged(&path, MAX_AGE - Duration::from_secs(600));

        assert!(cleanup(temp_dir.path()).unwrap().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_cleanup_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(cleanup(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_missing_dir_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = cleanup(temp_dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("cleanup failed"));
    }

    #[test]
    fn test_cleanup_older_than_custom_threshold() {
        let temp_dir = TempDir::new().unwrap();
        write_aged(&temp_dir.path().join("a.gz"), Duration::from_secs(120));
        let removed = cleanup_older_than(
            temp_dir.path(),
            SystemTime::now() - Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(removed.len(), 1);
    }
}
