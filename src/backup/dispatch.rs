//! Maps a plan's platform tag onto the dump strategy that handles it.

use crate::backup::dump::mongodb::MongoDumpExecutor;
use crate::backup::dump::{BackupArtifact, DumpExecutor};
use crate::backup::function_path;
use crate::backup::plan::Plan;
use crate::backup::platform::Platform;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::target::{SecretFileResolver, Target, TargetResolver};
use chrono::{DateTime, Utc};
use function_name::named;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum DumpStrategy {
    Implemented(Arc<dyn DumpExecutor>),
    /// Known platform whose dump is not written yet. Always an error.
    Unimplemented,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DumpOutcome {
    Dumped(BackupArtifact),
    /// The tag matched no registered strategy; nothing was attempted.
    UnknownPlatform(String),
}

#[derive(Debug)]
pub struct Dispatcher {
    secret_store: PathBuf,
    resolver: Arc<dyn TargetResolver>,
    strategies: HashMap<Platform, DumpStrategy>,
}

impl Dispatcher {
    /// A dispatcher with no strategies registered.
    pub fn new<P: Into<PathBuf>>(secret_store: P, resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            secret_store: secret_store.into(),
            resolver,
            strategies: HashMap::new(),
        }
    }

    /// MongoDB through `mongodump_command`; InfluxDB, Prometheus and GitLab
    /// registered as unimplemented.
    pub fn with_default_strategies<P: Into<PathBuf>>(
        secret_store: P,
        mongodump_command: Vec<String>,
    ) -> Self {
        Self::new(secret_store, Arc::new(SecretFileResolver))
            .register(
                Platform::MongoDb,
                DumpStrategy::Implemented(Arc::new(MongoDumpExecutor::new(mongodump_command))),
            )
            .register(Platform::InfluxDb, DumpStrategy::Unimplemented)
            .register(Platform::Prometheus, DumpStrategy::Unimplemented)
            .register(Platform::Gitlab, DumpStrategy::Unimplemented)
    }

    pub fn register(mut self, platform: Platform, strategy: DumpStrategy) -> Self {
        self.strategies.insert(platform, strategy);
        self
    }

    pub fn secret_store(&self) -> &Path {
        &self.secret_store
    }

    #[named]
    pub fn dispatch(&self, plan: &Plan, work_dir: &Path, ts: DateTime<Utc>) -> Result<DumpOutcome> {
        let tag = plan.target().platform();
        let strategy = tag
            .parse::<Platform>()
            .ok()
            .and_then(|platform| self.strategies.get(&platform).map(|s| (platform, s)));

        let (platform, executor) = match strategy {
            None => {
                tracing::warn!("Plan {:?} has unknown platform {:?}, skipping", plan.name(), tag);
                return Ok(DumpOutcome::UnknownPlatform(format!("Unknown platform {}", tag)));
            }
            Some((platform, DumpStrategy::Unimplemented)) => {
                return Err(Error::platform_not_implemented(platform.to_string())
                    .add_msg(format!("Cannot dump plan {:?}", plan.name()))
                    .add_fn_name(function_path!()));
            }
            Some((platform, DumpStrategy::Implemented(executor))) => (platform, executor),
        };

        tracing::info!("Dumping plan {:?} with platform {}", plan.name(), platform);
        let target = self.resolve_target(plan).add_fn_name(function_path!())?;
        executor
            .dump(plan, &target, work_dir, ts)
            .map(DumpOutcome::Dumped)
            .add_fn_name(function_path!())
    }

    /// The secret store wins over inline parameters; with neither the run
    /// fails before any dump is attempted.
    fn resolve_target(&self, plan: &Plan) -> Result<Target> {
        match plan.target().existing_secret() {
            Some(reference) => self
                .resolver
                .load_target(&self.secret_store, reference)
                .add_msg(format!("Cannot load target {}", reference)),
            None => plan
                .target()
                .inline_target()
                .ok_or_else(|| Error::missing_target(plan.name().as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::plan::TargetConfig;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the targets it was asked to dump and writes an empty archive.
    #[derive(Debug, Default)]
    struct RecordingExecutor {
        targets: Mutex<Vec<Target>>,
    }

    impl DumpExecutor for RecordingExecutor {
        fn dump(
            &self,
            plan: &Plan,
            target: &Target,
            work_dir: &Path,
            ts: DateTime<Utc>,
        ) -> Result<BackupArtifact> {
            self.targets.lock().unwrap().push(target.clone());
            let artifact = BackupArtifact::new(work_dir, plan.name(), ts);
            std::fs::write(artifact.archive(), b"")?;
            Ok(artifact)
        }
    }

    #[derive(Debug)]
    struct StaticResolver(Option<Target>);

    impl TargetResolver for StaticResolver {
        fn load_target(&self, secret_store: &Path, reference: &str) -> Result<Target> {
            self.0
                .clone()
                .ok_or_else(|| Error::secret_not_found(secret_store, reference))
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn plan(target: TargetConfig) -> Plan {
        Plan::builder().name("p").target(target).retention(1).build()
    }

    fn dispatcher(resolver: StaticResolver) -> (Dispatcher, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = Dispatcher::new("/secrets", Arc::new(resolver))
            .register(Platform::MongoDb, DumpStrategy::Implemented(executor.clone()))
            .register(Platform::Gitlab, DumpStrategy::Unimplemented);
        (dispatcher, executor)
    }

    #[test]
    fn test_unknown_platform_is_not_an_error() {
        let work_dir = TempDir::new().unwrap();
        let (dispatcher, executor) = dispatcher(StaticResolver(None));
        for tag in ["mysql", "MongoDB", ""] {
            let outcome = dispatcher
                .dispatch(
                    &plan(TargetConfig::builder().platform(tag).build()),
                    work_dir.path(),
                    ts(),
                )
                .unwrap();
            assert_eq!(
                outcome,
                DumpOutcome::UnknownPlatform(format!("Unknown platform {}", tag))
            );
        }
        assert!(executor.targets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_known_platform_without_strategy_is_unknown() {
        let work_dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(StaticResolver(None));
        let outcome = dispatcher
            .dispatch(
                &plan(TargetConfig::builder().platform("influxdb").build()),
                work_dir.path(),
                ts(),
            )
            .unwrap();
        assert!(matches!(outcome, DumpOutcome::UnknownPlatform(_)));
    }

    #[test]
    fn test_unimplemented_platform_is_an_error() {
        let work_dir = TempDir::new().unwrap();
        let (dispatcher, _) = dispatcher(StaticResolver(None));
        let err = dispatcher
            .dispatch(
                &plan(TargetConfig::builder().platform("gitlab").build()),
                work_dir.path(),
                ts(),
            )
            .unwrap_err();
        assert!(matches!(err.root(), Error::PlatformNotImplemented(p) if p == "gitlab"));
    }

    #[test]
    fn test_default_strategies_leave_other_platforms_unimplemented() {
        let work_dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::with_default_strategies("/secrets", vec!["mongodump".into()]);
        for tag in ["influxdb", "prometheus", "gitlab"] {
            let err = dispatcher
                .dispatch(
                    &plan(TargetConfig::builder().platform(tag).build()),
                    work_dir.path(),
                    ts(),
                )
                .unwrap_err();
            assert!(matches!(err.root(), Error::PlatformNotImplemented(_)));
        }
    }

    #[test]
    fn test_secret_is_resolved_before_dump() {
        let work_dir = TempDir::new().unwrap();
        let secret_target = Target::builder().host("from-secret").build();
        let (dispatcher, executor) = dispatcher(StaticResolver(Some(secret_target.clone())));

        let outcome = dispatcher
            .dispatch(
                &plan(
                    TargetConfig::builder()
                        .platform("mongodb")
                        .existing_secret("mongo-prod")
                        .host("inline-host")
                        .build(),
                ),
                work_dir.path(),
                ts(),
            )
            .unwrap();

        assert_eq!(
            outcome,
            DumpOutcome::Dumped(BackupArtifact::new(work_dir.path(), "p", ts()))
        );
        assert_eq!(*executor.targets.lock().unwrap(), vec![secret_target]);
    }

    #[test]
    fn test_failed_resolution_aborts_before_dump() {
        let work_dir = TempDir::new().unwrap();
        let (dispatcher, executor) = dispatcher(StaticResolver(None));

        let err = dispatcher
            .dispatch(
                &plan(
                    TargetConfig::builder()
                        .platform("mongodb")
                        .existing_secret("missing")
                        .build(),
                ),
                work_dir.path(),
                ts(),
            )
            .unwrap_err();

        assert!(matches!(err.root(), Error::SecretNotFound { .. }));
        assert!(err.to_string().contains("Cannot load target missing"));
        assert!(executor.targets.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inline_target_and_missing_target() {
        let work_dir = TempDir::new().unwrap();
        let (dispatcher, executor) = dispatcher(StaticResolver(None));

        dispatcher
            .dispatch(
                &plan(TargetConfig::builder().platform("mongodb").host("inline").build()),
                work_dir.path(),
                ts(),
            )
            .unwrap();
        assert_eq!(executor.targets.lock().unwrap()[0].host(), "inline");

        let err = dispatcher
            .dispatch(
                &plan(TargetConfig::builder().platform("mongodb").build()),
                work_dir.path(),
                ts(),
            )
            .unwrap_err();
        assert!(matches!(err.root(), Error::MissingTarget(_)));
    }
}
