pub mod command;
pub mod mongodb;

use crate::backup::file_ext::{ArtifactKind, FileExtProvider};
use crate::backup::plan::Plan;
use crate::backup::result_error::result::Result;
use crate::backup::target::Target;
use chrono::{DateTime, Utc};
use getset::Getters;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Archive and log produced by one dump.
///
/// Both names embed the plan name and the Unix timestamp of the run, so
/// files of one plan sort by time. Two runs of the same plan within the same
/// second end up with the same names.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupArtifact {
    archive: PathBuf,
    log: PathBuf,
}

impl BackupArtifact {
    pub fn new<P: AsRef<Path>>(work_dir: P, plan_name: &str, ts: DateTime<Utc>) -> Self {
        let work_dir = work_dir.as_ref();
        Self {
            archive: work_dir.join(artifact_file_name(plan_name, ts, ArtifactKind::Archive)),
            log: work_dir.join(artifact_file_name(plan_name, ts, ArtifactKind::Log)),
        }
    }

    pub fn path(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Archive => &self.archive,
            ArtifactKind::Log => &self.log,
        }
    }

    /// The log is only written when the dump tool printed something.
    pub fn has_log(&self) -> bool {
        self.log.is_file()
    }
}

pub fn artifact_file_name(plan_name: &str, ts: DateTime<Utc>, kind: ArtifactKind) -> String {
    format!("{}-{}.{}", plan_name, ts.timestamp(), kind.file_ext())
}

/// Runs the dump tool of one platform.
pub trait DumpExecutor: Debug + Send + Sync {
    fn dump(
        &self,
        plan: &Plan,
        target: &Target,
        work_dir: &Path,
        ts: DateTime<Utc>,
    ) -> Result<BackupArtifact>;
}
