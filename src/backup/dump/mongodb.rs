use crate::backup::dump::command::{run_with_timeout, Completion};
use crate::backup::dump::{BackupArtifact, DumpExecutor};
use crate::backup::function_path;
use crate::backup::plan::Plan;
use crate::backup::redacted::REDACTED_SECRET;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::target::Target;
use chrono::{DateTime, Utc};
use function_name::named;
use itertools::Itertools;
use std::path::Path;
use std::process::Command;

static DEFAULT_PROGRAM: &str = "mongodump";

/// Dumps a MongoDB target with `mongodump --archive --gzip`.
#[derive(Clone, Debug)]
pub struct MongoDumpExecutor {
    /// Program plus leading arguments, e.g. `["docker", "exec", "mongo", "mongodump"]`
    command: Vec<String>,
}

impl Default for MongoDumpExecutor {
    fn default() -> Self {
        Self::new(vec![DEFAULT_PROGRAM.to_owned()])
    }
}

impl MongoDumpExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or(DEFAULT_PROGRAM)
    }

    /// Tool arguments, without the command prefix.
    ///
    /// `--db` is only passed with a database, `-u`/`-p` only when both
    /// username and password are set. Extra params are split on whitespace.
    pub fn dump_args(&self, target: &Target, archive: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--archive={}", archive.display()),
            "--gzip".to_owned(),
            "--host".to_owned(),
            target.host().clone(),
            "--port".to_owned(),
            target.port().to_string(),
        ];
        if let Some(database) = target.database_name() {
            args.extend(["--db".to_owned(), database.to_owned()]);
        }
        if let Some((username, password)) = target.credentials() {
            args.extend([
                "-u".to_owned(),
                username.to_owned(),
                "-p".to_owned(),
                password.to_owned(),
            ]);
        }
        args.extend(target.extra_params().map(str::to_owned));
        args
    }

    pub fn build_command(&self, target: &Target, archive: &Path) -> Command {
        let mut command = Command::new(self.program());
        command
            .args(self.command.iter().skip(1))
            .args(self.dump_args(target, archive));
        command
    }

    fn loggable_command(&self, target: &Target, archive: &Path) -> String {
        let password = target.credentials().map(|(_, p)| p);
        self.command
            .iter()
            .cloned()
            .chain(self.dump_args(target, archive))
            .map(|arg| match password {
                Some(p) if arg == p => REDACTED_SECRET.to_owned(),
                _ => arg,
            })
            .join(" ")
    }
}

impl DumpExecutor for MongoDumpExecutor {
    #[named]
    fn dump(
        &self,
        plan: &Plan,
        target: &Target,
        work_dir: &Path,
        ts: DateTime<Utc>,
    ) -> Result<BackupArtifact> {
        let artifact = BackupArtifact::new(work_dir, plan.name(), ts);
        let timeout = plan.timeout();
        tracing::debug!(
            "Running {} with timeout {:?}",
            self.loggable_command(target, artifact.archive()),
            timeout
        );

        let output = run_with_timeout(&mut self.build_command(target, artifact.archive()), timeout)
            .add_msg(format!("Cannot start {} for plan {:?}", self.program(), plan.name()))
            .add_fn_name(function_path!())?;

        match output.completion {
            Completion::Exited(status) if status.success() => {}
            Completion::Exited(status) => {
                return Err(Error::dump_failed(
                    self.program(),
                    status.to_string(),
                    output.flattened_output(),
                )
                .add_fn_name(function_path!()));
            }
            Completion::TimedOut => {
                return Err(
                    Error::dump_timed_out(self.program(), timeout, output.flattened_output())
                        .add_fn_name(function_path!()),
                );
            }
        }

        if !output.output.is_empty() {
            std::fs::write(artifact.log(), &output.output)
                .map_err(Error::from)
                .add_msg(format!("writing log {:?} failed", artifact.log()))
                .add_fn_name(function_path!())?;
        }

        tracing::info!(
            "Dumped plan {:?} to {:?}",
            plan.name(),
            artifact.archive()
        );
        Ok(artifact)
    }
}
