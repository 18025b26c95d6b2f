//! Connection parameters for one backup run and the resolver that loads them
//! from the secret store.

use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::validate::validate_file_name_component;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Resolved connection parameters, built fresh for every run.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct Target {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[serde(default = "default_port")]
    #[builder(default = Target::DEFAULT_PORT)]
    port: u16,
    #[builder(into)]
    database: Option<String>,
    #[builder(into)]
    username: Option<String>,
    #[builder(into)]
    password: Option<RedactedString>,
    /// Extra tool arguments, appended verbatim
    #[builder(into)]
    params: Option<String>,
    #[builder(into)]
    existing_secret: Option<String>,
}

fn default_port() -> u16 {
    Target::DEFAULT_PORT
}

impl Target {
    pub const DEFAULT_PORT: u16 = 27017;

    /// Username and password, only when both are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self
            .password
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| p.inner().as_str())?;
        Some((username, password))
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().filter(|d| !d.is_empty())
    }

    pub fn extra_params(&self) -> impl Iterator<Item = &str> {
        self.params.as_deref().unwrap_or_default().split_whitespace()
    }
}

/// Source of connection parameters kept outside the plan configuration.
pub trait TargetResolver: Debug + Send + Sync {
    fn load_target(&self, secret_store: &Path, reference: &str) -> Result<Target>;
}

static SECRET_FILE_SUFFIXES: [&str; 3] = ["", ".yml", ".yaml"];

/// Reads a target from a YAML file named after the secret reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecretFileResolver;

impl SecretFileResolver {
    fn find_secret_file(&self, secret_store: &Path, reference: &str) -> Option<PathBuf> {
        SECRET_FILE_SUFFIXES
            .iter()
            .map(|suffix| secret_store.join(format!("{reference}{suffix}")))
            .find(|p| p.is_file())
    }
}

impl TargetResolver for SecretFileResolver {
    #[named]
    fn load_target(&self, secret_store: &Path, reference: &str) -> Result<Target> {
        if validate_file_name_component(reference).is_err() {
            return Err(Error::invalid_secret_reference(reference).add_fn_name(function_path!()));
        }

        let secret_file = self
            .find_secret_file(secret_store, reference)
            .ok_or_else(|| Error::secret_not_found(secret_store, reference))
            .add_fn_name(function_path!())?;
        tracing::debug!("Loading target from secret file {:?}", secret_file);

        let mut target: Target = File::open(&secret_file)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader(f).map_err(Error::from))
            .and_then(|t: Target| t.validate().map_err(Error::from).map(|_| t))
            .add_msg(format!("Malformed secret file {:?}", secret_file))
            .add_fn_name(function_path!())?;

        target.existing_secret = Some(reference.to_owned());
        Ok(target)
    }
}

/// Loads a target through the default file based resolver.
pub fn load_target<P: AsRef<Path>>(secret_store: P, reference: &str) -> Result<Target> {
    SecretFileResolver.load_target(secret_store.as_ref(), reference)
}
