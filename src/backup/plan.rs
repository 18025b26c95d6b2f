use crate::backup::redacted::RedactedString;
use crate::backup::target::Target;
use crate::backup::validate::validate_file_name_component;
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::Duration;
use validator::Validate;

/// A named backup job for one data store.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct Plan {
    #[validate(custom(function = validate_file_name_component))]
    #[builder(into)]
    name: String,
    #[validate(nested)]
    target: TargetConfig,
    #[validate(nested)]
    #[serde(default)]
    #[builder(default)]
    scheduler: SchedulerConfig,
    /// Number of most recent archives (and, separately, logs) to keep
    #[validate(range(min = 1))]
    retention: usize,
}

impl Plan {
    pub fn timeout(&self) -> Duration {
        self.scheduler.timeout()
    }
}

static DEFAULT_TIMEOUT_MINUTES: u64 = 60;

fn default_timeout_minutes() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Upper bound on a single dump, in minutes
    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_minutes")]
    #[builder(default = default_timeout_minutes())]
    timeout: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

impl SchedulerConfig {
    pub fn timeout_minutes(&self) -> u64 {
        self.timeout
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.saturating_mul(60))
    }
}

/// Where a plan's data lives: a platform tag plus either a secret reference
/// or inline connection parameters.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct TargetConfig {
    /// Matched exactly against the supported platforms at dispatch time
    #[builder(into)]
    platform: String,
    #[validate(custom(function = validate_file_name_component))]
    #[builder(into)]
    existing_secret: Option<String>,
    #[builder(into)]
    host: Option<String>,
    port: Option<u16>,
    #[builder(into)]
    database: Option<String>,
    #[builder(into)]
    username: Option<String>,
    #[builder(into)]
    password: Option<RedactedString>,
    #[builder(into)]
    params: Option<String>,
}

impl TargetConfig {
    /// Builds a target out of the inline fields, if a host is given.
    pub fn inline_target(&self) -> Option<Target> {
        let host = self.host.as_ref().filter(|h| !h.is_empty())?;
        Some(
            Target::builder()
                .host(host.clone())
                .port(self.port.unwrap_or(Target::DEFAULT_PORT))
                .maybe_database(self.database.clone())
                .maybe_username(self.username.clone())
                .maybe_password(self.password.clone())
                .maybe_params(self.params.clone())
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_yaml() {
        let yaml = r#"
name: mongo-prod
target:
  platform: mongodb
  existing_secret: mongo-prod
scheduler:
  timeout: 30
retention: 7
"#;
        let plan: Plan = serde_yml::from_str(yaml).unwrap();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.name(), "mongo-prod");
        assert_eq!(plan.target().platform(), "mongodb");
        assert_eq!(plan.target().existing_secret().as_deref(), Some("mongo-prod"));
        assert_eq!(plan.timeout(), Duration::from_secs(30 * 60));
        assert_eq!(*plan.retention(), 7);
    }

    #[test]
    fn test_plan_scheduler_defaults() {
        let yaml = r#"
name: nightly
target:
  platform: mongodb
  host: localhost
retention: 1
"#;
        let plan: Plan = serde_yml::from_str(yaml).unwrap();
        assert_eq!(plan.timeout(), Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_plan_validation_rejects_bad_values() {
        let zero_retention = Plan::builder()
            .name("nightly")
            .target(TargetConfig::builder().platform("mongodb").build())
            .retention(0)
            .build();
        assert!(zero_retention.validate().is_err());

        let bad_name = Plan::builder()
            .name("night/ly")
            .target(TargetConfig::builder().platform("mongodb").build())
            .retention(1)
            .build();
        assert!(bad_name.validate().is_err());

        let zero_timeout = Plan::builder()
            .name("nightly")
            .target(TargetConfig::builder().platform("mongodb").build())
            .scheduler(SchedulerConfig::builder().timeout(0).build())
            .retention(1)
            .build();
        assert!(zero_timeout.validate().is_err());

        let traversal_secret = Plan::builder()
            .name("nightly")
            .target(
                TargetConfig::builder()
                    .platform("mongodb")
                    .existing_secret("../shadow")
                    .build(),
            )
            .retention(1)
            .build();
        assert!(traversal_secret.validate().is_err());
    }

    #[test]
    fn test_plan_rejects_unknown_fields() {
        let yaml = r#"
name: nightly
target:
  platform: mongodb
retention: 1
cron: "* * * * *"
"#;
        assert!(serde_yml::from_str::<Plan>(yaml).is_err());
    }

    #[test]
    fn test_inline_target() {
        let target_config = TargetConfig::builder()
            .platform("mongodb")
            .host("db.internal")
            .database("app")
            .build();
        let target = target_config.inline_target().unwrap();
        assert_eq!(target.host(), "db.internal");
        assert_eq!(*target.port(), Target::DEFAULT_PORT);
        assert_eq!(target.database().as_deref(), Some("app"));

        let no_host = TargetConfig::builder().platform("mongodb").build();
        assert!(no_host.inline_target().is_none());
    }

    #[test]
    fn test_password_is_redacted_in_debug() {
        let target_config = TargetConfig::builder()
            .platform("mongodb")
            .password(RedactedString::from("hunter2"))
            .build();
        assert!(!format!("{:?}", target_config).contains("hunter2"));
    }
}
