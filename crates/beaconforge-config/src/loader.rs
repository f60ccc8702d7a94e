//! Layered configuration loading.
//!
//! # Design
//! - Every source (YAML file, command line, environment) produces a partial
//!   [`ConfigLayer`]; higher layers win field by field.
//! - Resolution order: defaults < file < command line < environment.
//! - Environment lookups go through a caller-supplied closure so tests never
//!   touch the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Configuration, FailurePolicy};
use crate::validate;

/// Environment variable overriding the service address.
pub const ENV_SERVICE_ADDR: &str = "BEACON_CREATOR_ADDR";
/// Environment variable overriding the beacon connection string.
pub const ENV_CONNECTION_STRING: &str = "CONNECTION_STRING";

/// Partial configuration contributed by one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Service base address.
    pub addr: Option<String>,
    /// Source files.
    pub files: Option<Vec<PathBuf>>,
    /// Output folder.
    pub output: Option<PathBuf>,
    /// Request path on the service.
    pub upload_path: Option<String>,
    /// Staging directory.
    pub temp_dir: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Per-wave concurrency cap.
    pub max_concurrency: Option<usize>,
    /// Failure handling.
    pub failure_policy: Option<FailurePolicy>,
    /// Beacon connection string.
    pub connection_string: Option<String>,
    /// Beacon transport name.
    pub transport: Option<String>,
    /// Static binary toggle.
    #[serde(rename = "static")]
    pub static_binary: Option<bool>,
    /// upx toggle.
    pub upx: Option<bool>,
    /// upx compression level.
    pub upx_level: Option<i64>,
    /// Gzip toggle.
    pub gzip: Option<bool>,
    /// Beacon debug toggle.
    pub debug: Option<bool>,
    /// Target operating system.
    pub os: Option<String>,
    /// Target architecture.
    pub arch: Option<String>,
    /// Beacon group identifier.
    pub group_id: Option<Uuid>,
    /// Extra linker flags.
    pub ldflags: Option<String>,
}

impl ConfigLayer {
    /// Overlay `upper` on top of `self`; fields set in `upper` win.
    #[must_use]
    pub fn overlay(self, upper: Self) -> Self {
        Self {
            addr: upper.addr.or(self.addr),
            files: upper.files.filter(|files| !files.is_empty()).or(self.files),
            output: upper.output.or(self.output),
            upload_path: upper.upload_path.or(self.upload_path),
            temp_dir: upper.temp_dir.or(self.temp_dir),
            timeout_secs: upper.timeout_secs.or(self.timeout_secs),
            max_concurrency: upper.max_concurrency.or(self.max_concurrency),
            failure_policy: upper.failure_policy.or(self.failure_policy),
            connection_string: upper.connection_string.or(self.connection_string),
            transport: upper.transport.or(self.transport),
            static_binary: upper.static_binary.or(self.static_binary),
            upx: upper.upx.or(self.upx),
            upx_level: upper.upx_level.or(self.upx_level),
            gzip: upper.gzip.or(self.gzip),
            debug: upper.debug.or(self.debug),
            os: upper.os.or(self.os),
            arch: upper.arch.or(self.arch),
            group_id: upper.group_id.or(self.group_id),
            ldflags: upper.ldflags.or(self.ldflags),
        }
    }
}

/// Read a YAML configuration file into a layer.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Parse`] when it is not a valid configuration document.
pub fn load_file(path: &Path) -> ConfigResult<ConfigLayer> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(ConfigLayer::default());
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply environment overrides on top of `layer`. Empty values are ignored.
#[must_use]
pub fn apply_env_overrides<F>(mut layer: ConfigLayer, lookup: F) -> ConfigLayer
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(addr) = non_empty(ENV_SERVICE_ADDR) {
        layer.addr = Some(addr);
    }
    if let Some(connection) = non_empty(ENV_CONNECTION_STRING) {
        layer.connection_string = Some(connection);
    }
    layer
}

/// Resolve the final configuration from an optional config file, the
/// command-line layer and the environment.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or the merged
/// settings fail validation.
pub fn resolve<F>(
    config_file: Option<&Path>,
    command_line: ConfigLayer,
    env_lookup: F,
) -> ConfigResult<Configuration>
where
    F: Fn(&str) -> Option<String>,
{
    let file_layer = match config_file {
        Some(path) => load_file(path)?,
        None => ConfigLayer::default(),
    };
    let merged = apply_env_overrides(file_layer.overlay(command_line), env_lookup);
    let config = validate::build(merged)?;
    debug!(?config, "resolved configuration");
    Ok(config)
}
