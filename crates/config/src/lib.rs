//! Layered configuration for ferry.
//!
//! Values are resolved, lowest precedence first, from:
//!
//! 1. built-in defaults,
//! 2. a configuration file: either an explicit path, or `config.toml`,
//!    `config.yaml` or `config.json` in the platform configuration directory,
//! 3. `FERRY_` prefixed environment variables, with `__` separating nested
//!    keys (`FERRY_MIGRATION__CONCURRENCY=4`).

pub mod error;
mod seconds;
mod sections;

pub use crate::sections::{Backend, MigrationConfig, ProgressConfig, RecordsConfig, SourceConfig, TargetConfig};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FERRY_";
const CONFIG_BASENAME: &str = "config";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub records: RecordsConfig,
    pub migration: MigrationConfig,
    pub progress: ProgressConfig,
}

impl Config {
    /// Load and validate the configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let figment = match explicit {
            Some(path) => Self::figment_with_file(path)?,
            None => Self::figment_with_defaults(),
        };
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(migration = ?config.migration, "configuration loaded");
        Ok(config)
    }

    fn figment_with_file(path: &Path) -> Result<Figment> {
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let figment = Figment::from(Serialized::defaults(Self::default()));
        Ok(match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    fn figment_with_defaults() -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        match project_dirs() {
            Some(dirs) => {
                let dir = dirs.config_dir();
                tracing::trace!(dir = %dir.display(), "looking for configuration files");
                figment
                    .merge(Toml::file(dir.join(format!("{CONFIG_BASENAME}.toml"))))
                    .merge(Yaml::file(dir.join(format!("{CONFIG_BASENAME}.yaml"))))
                    .merge(Json::file(dir.join(format!("{CONFIG_BASENAME}.json"))))
            },
            None => figment,
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| exn::Exn::from(ErrorKind::Invalid(message.to_string()));
        if self.migration.concurrency == 0 {
            return Err(invalid("migration.concurrency must be at least 1"));
        }
        if self.migration.retry_attempts == 0 {
            return Err(invalid("migration.retry_attempts must be at least 1"));
        }
        if self.migration.save_interval == 0 {
            return Err(invalid("migration.save_interval must be at least 1"));
        }
        if self.migration.max_retry_delay < self.migration.retry_delay {
            return Err(invalid("migration.max_retry_delay must not be below migration.retry_delay"));
        }
        if self.migration.metadata_timeout.is_zero() || self.migration.transfer_timeout.is_zero() {
            return Err(invalid("timeouts must be greater than zero"));
        }
        if self.source.burst == 0 {
            return Err(invalid("source.burst must be at least 1"));
        }
        if !(self.source.requests_per_second.is_finite() && self.source.requests_per_second > 0.0) {
            return Err(invalid("source.requests_per_second must be a positive number"));
        }
        Ok(())
    }

    /// Directory progress snapshots are kept in.
    pub fn progress_directory(&self) -> Result<PathBuf> {
        if let Some(directory) = &self.progress.directory {
            return Ok(directory.clone());
        }
        let dirs = project_dirs().ok_or_else(|| exn::Exn::from(ErrorKind::NoHomeDirectory))?;
        Ok(dirs.data_dir().join("progress"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "ferry")
}
