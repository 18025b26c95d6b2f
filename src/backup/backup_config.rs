use crate::backup::dispatch::{Dispatcher, DumpOutcome};
use crate::backup::dump::BackupArtifact;
use crate::backup::function_path;
use crate::backup::janitor;
use crate::backup::plan::Plan;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::retention::{self, RetentionReport};
use crate::backup::validate::{
    validate_command_prefix, validate_dir_exist_or_created, validate_writable_dir,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use validator::{Validate, ValidationError};

static DEFAULT_SECRET_STORE: &str = "/secrets";
static DEFAULT_MONGODUMP: &str = "mongodump";

fn default_secret_store() -> PathBuf {
    PathBuf::from(DEFAULT_SECRET_STORE)
}

fn default_mongodump() -> Vec<String> {
    vec![DEFAULT_MONGODUMP.to_owned()]
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Shared scratch dir where dumps land before being stored
    #[validate(custom(function = validate_writable_dir))]
    #[builder(into)]
    work_dir: PathBuf,
    /// Archives are kept under `{storage_dir}/{plan name}/`
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[builder(into)]
    storage_dir: PathBuf,
    #[serde(default = "default_secret_store")]
    #[builder(default = default_secret_store(), into)]
    secret_store: PathBuf,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    tools: ToolsConfig,
    #[validate(nested, custom(function = validate_unique_plan_names))]
    plans: Vec<Plan>,
}

/// How external dump tools are launched.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ToolsConfig {
    /// Command prefix, the dump arguments are appended to it
    #[serde(default = "default_mongodump")]
    #[validate(custom(function = validate_command_prefix))]
    #[builder(default = default_mongodump())]
    mongodump: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mongodump: default_mongodump(),
        }
    }
}

fn validate_unique_plan_names(plans: &[Plan]) -> std::result::Result<(), ValidationError> {
    let duplicates = plans.iter().map(Plan::name).duplicates().join(", ");
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new("DuplicatePlanName")
            .with_message(format!("plan names must be unique: {duplicates}").into()))
    }
}

/// Result of one successfully stored run.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct RunReport {
    plan: String,
    archive: PathBuf,
    log: Option<PathBuf>,
    size: u64,
    duration: Duration,
    retention: RetentionReport,
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Nothing was dumped, e.g. the platform is unknown
    Skipped { plan: String, reason: String },
}

impl BackupConfig {
    /// Reads and validates a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| {
                serde_yml::from_reader::<_, BackupConfig>(f)
                    .map_err(Error::from)
                    .add_msg(format!("Parse YAML config failed: {:?}", path))
            })
            .and_then(|bc| {
                bc.validate()
                    .map_err(Error::from)
                    .map(|_| bc)
                    .add_msg(format!("Config validation failed: {:?}", path))
            })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::with_default_strategies(&self.secret_store, self.tools.mongodump.clone())
    }

    pub fn plan(&self, name: &str) -> Result<&Plan> {
        self.plans
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::plan_not_found(name))
    }

    pub fn plan_storage_dir(&self, plan: &Plan) -> PathBuf {
        self.storage_dir.join(plan.name())
    }

    /// Dumps `plan` into the work dir, moves the result into the plan's
    /// storage dir, then applies the plan's retention there.
    #[named]
    pub fn run_plan(
        &self,
        dispatcher: &Dispatcher,
        plan: &Plan,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        tracing::info!("Starting backup of plan {:?}", plan.name());

        let artifact = match dispatcher
            .dispatch(plan, &self.work_dir, now)
            .add_fn_name(function_path!())?
        {
            DumpOutcome::Dumped(artifact) => artifact,
            DumpOutcome::UnknownPlatform(reason) => {
                return Ok(RunOutcome::Skipped {
                    plan: plan.name().clone(),
                    reason,
                })
            }
        };

        let storage_dir = self.plan_storage_dir(plan);
        let (archive, log) = store_artifact(&artifact, &storage_dir)
            .add_msg(format!("Storing backup of plan {:?} failed", plan.name()))
            .add_fn_name(function_path!())?;
        let size = std::fs::metadata(&archive)?.len();

        let retention = retention::enforce(&storage_dir, *plan.retention())
            .add_msg(format!("Retention of plan {:?} failed", plan.name()))
            .add_fn_name(function_path!())?;

        let report = RunReport {
            plan: plan.name().clone(),
            archive,
            log,
            size,
            duration: started.elapsed(),
            retention,
        };
        tracing::info!(
            "Backup of plan {:?} finished in {:?}: {:?} ({} bytes)",
            report.plan,
            report.duration,
            report.archive,
            report.size
        );
        Ok(RunOutcome::Completed(report))
    }

    /// Runs every plan on `pool`. Failures of single plans don't stop the
    /// others; they come back together as one error.
    pub fn run_all(&self, pool: &ThreadPool, now: DateTime<Utc>) -> Result<Vec<RunOutcome>> {
        let dispatcher = self.dispatcher();
        let (outcomes, errors): (Vec<_>, Vec<_>) = pool.install(|| {
            self.plans
                .par_iter()
                .map(|plan| {
                    self.run_plan(&dispatcher, plan, now)
                        .add_msg(format!("Backup of plan {:?} failed", plan.name()))
                })
                .collect::<Vec<_>>()
        })
        .into_iter()
        .partition_result();

        convert_error_vec(errors)?;
        Ok(outcomes)
    }

    /// Removes stale files from the work dir.
    pub fn cleanup(&self) -> Result<Vec<PathBuf>> {
        janitor::cleanup(&self.work_dir)
    }
}

/// Moves archive and, if one was written, log into `storage_dir`.
fn store_artifact(
    artifact: &BackupArtifact,
    storage_dir: &Path,
) -> Result<(PathBuf, Option<PathBuf>)> {
    std::fs::create_dir_all(storage_dir)
        .map_err(Error::from)
        .add_msg(format!("Cannot create {:?}", storage_dir))?;

    let archive = move_into(artifact.archive(), storage_dir)?;
    let log = if artifact.has_log() {
        Some(move_into(artifact.log(), storage_dir)?)
    } else {
        None
    };
    Ok((archive, log))
}

/// Rename, falling back to copy and remove when the rename fails (e.g. the
/// work dir is on another device).
fn move_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .ok_or_else(|| Error::from(std::io::Error::other("path has no file name")))
        .add_msg(format!("Cannot move {:?}", src))?;
    let dst = dir.join(file_name);

    if let Err(rename_err) = std::fs::rename(src, &dst) {
        tracing::debug!("Rename {:?} failed ({}), copying instead", src, rename_err);
        std::fs::copy(src, &dst)
            .and_then(|_| std::fs::remove_file(src))
            .map_err(|e| Error::from(rename_err).chain(e.into()))
            .add_msg(format!("Cannot move {:?} to {:?}", src, dst))?;
    }
    Ok(dst)
}
