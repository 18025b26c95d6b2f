use crate::backup::file_ext::{ArtifactKind, FileExtProvider};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use std::cmp::Reverse;
use std::ffi::OsStr;
use std::fs::read_dir;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Files removed by one retention pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RetentionReport {
    deleted_archives: Vec<PathBuf>,
    deleted_logs: Vec<PathBuf>,
}

impl RetentionReport {
    pub fn is_empty(&self) -> bool {
        self.deleted_archives.is_empty() && self.deleted_logs.is_empty()
    }
}

/// Keeps the `retention` newest archives and, counted separately, the
/// `retention` newest logs in `dir`. Everything older is deleted.
///
/// Archives go first and stop at the first failed deletion. Logs are handled
/// afterwards regardless, and a log that is already gone is not an error.
#[named]
pub fn enforce<P: AsRef<Path>>(dir: P, retention: usize) -> Result<RetentionReport> {
    let dir = dir.as_ref();
    let mut errors = Vec::new();

    let deleted_archives = match delete_archives(dir, retention) {
        Ok(deleted) => deleted,
        Err(e) => {
            errors.push(e.add_msg(format!("removing old gz files from {:?} failed", dir)));
            Vec::new()
        }
    };

    let (deleted_logs, log_errors) = delete_logs(dir, retention);
    if !log_errors.is_empty() {
        tracing::warn!("Removing old log files from {:?} failed partially", dir);
        errors.push(
            Error::from(log_errors).add_msg(format!("removing old log files from {:?} failed", dir)),
        );
    }

    convert_error_vec(errors).add_fn_name(function_path!())?;

    let report = RetentionReport {
        deleted_archives,
        deleted_logs,
    };
    if report.is_empty() {
        tracing::debug!("Nothing out of retention in {:?}", dir);
    }
    Ok(report)
}

fn delete_archives(dir: &Path, retention: usize) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    for path in out_of_retention(dir, ArtifactKind::Archive, retention)? {
        tracing::info!("Removing out of retention archive {:?}", path);
        std::fs::remove_file(&path)
            .map_err(Error::from)
            .add_msg(format!("Cannot remove {:?}", path))?;
        deleted.push(path);
    }
    Ok(deleted)
}

fn delete_logs(dir: &Path, retention: usize) -> (Vec<PathBuf>, Vec<Error>) {
    let candidates = match out_of_retention(dir, ArtifactKind::Log, retention) {
        Ok(c) => c,
        Err(e) => return (Vec::new(), vec![e]),
    };

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for path in candidates {
        tracing::info!("Removing out of retention log {:?}", path);
        match std::fs::remove_file(&path) {
            Ok(_) => deleted.push(path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Log {:?} vanished before removal, ignoring", path)
            }
            Err(e) => errors.push(Error::from(e).add_msg(format!("Cannot remove {:?}", path))),
        }
    }
    (deleted, errors)
}

/// Files of `kind` in `dir` past the newest `retention`, newest first.
fn out_of_retention(dir: &Path, kind: ArtifactKind, retention: usize) -> Result<Vec<PathBuf>> {
    Ok(list_by_recency(dir, kind)?.into_iter().skip(retention).collect())
}

/// Regular files of `kind` in `dir`, newest modification time first. Equal
/// times fall back to the file name, which embeds the run timestamp.
pub fn list_by_recency(dir: &Path, kind: ArtifactKind) -> Result<Vec<PathBuf>> {
    let ext = OsStr::new(kind.file_ext());
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in read_dir(dir)
        .map_err(Error::from)
        .add_msg(format!("Cannot list {:?}", dir))?
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || path.extension() != Some(ext) {
            continue;
        }
        files.push((entry.metadata()?.modified()?, path));
    }

    Ok(files
        .into_iter()
        .sorted_unstable_by_key(|(modified, path)| {
            Reverse((*modified, path.file_name().map(OsStr::to_owned)))
        })
        .map(|(_, path)| path)
        .collect())
}
