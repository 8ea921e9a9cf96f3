//! ---
//! oms_section: "01-core-functionality"
//! oms_subsection: "module"
//! oms_type: "source"
//! oms_scope: "code"
//! oms_description: "Shared primitives and utilities for the R-OMS runtime."
//! oms_version: "v0.0.0-prealpha"
//! oms_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_api_base() -> String {
    "http://127.0.0.1:8787/oms".to_owned()
}

fn default_relay_port() -> u16 {
    19765
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(12)
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_indeterminate_debounce() -> u32 {
    2
}

fn default_required_consecutive() -> u32 {
    3
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(800)
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(700)
}

fn default_hard_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_mirror_path() -> PathBuf {
    PathBuf::from("target/state/snapshot.json")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the R-OMS runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "R_OMS_CONFIG";

    /// Load configuration from disk, respecting the `R_OMS_CONFIG` override.
    /// Candidates are inspected in order; the first existing file wins. When
    /// nothing matches, the built-in defaults are returned so that the
    /// orchestrator can run without any file present.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }
        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }
        debug!("no configuration file found; using defaults");
        Ok(Self::default())
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|err| anyhow!("invalid config {}: {}", path.display(), err))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Location of the OMS web service all HTTP clients are rooted at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL prefix, e.g. `http://127.0.0.1:8787/oms`.
    #[serde(default = "default_api_base")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
        }
    }
}

/// Relay connection parameters shared by the transport and the sequencer.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Default daemon-protocol port used when a caller does not supply one.
    #[serde(default = "default_relay_port")]
    pub default_port: u16,
    /// Per-call timeout handed to the relay for the inner daemon round trip.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_send_timeout")]
    pub send_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_port: default_relay_port(),
            send_timeout: default_send_timeout(),
        }
    }
}

/// Liveness probing cadence and debounce policy.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Interval between probe rounds.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_probe_interval")]
    pub probe_interval: Duration,
    /// Consecutive indeterminate probe results required before a unit is
    /// latched off. Explicit dead results latch immediately regardless.
    #[serde(default = "default_indeterminate_debounce")]
    pub indeterminate_debounce: u32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            indeterminate_debounce: default_indeterminate_debounce(),
        }
    }
}

/// Restart stabilizer watch parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Number of consecutive all-good polls that declares the fleet stable.
    #[serde(default = "default_required_consecutive")]
    pub required_consecutive: u32,
    /// Interval between aggregate health polls.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Delay before the first poll fires.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_initial_delay")]
    pub initial_delay: Duration,
    /// Wall-clock bound on the whole watch, independent of poll count.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_hard_timeout")]
    pub hard_timeout: Duration,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            required_consecutive: default_required_consecutive(),
            poll_interval: default_poll_interval(),
            initial_delay: default_initial_delay(),
            hard_timeout: default_hard_timeout(),
        }
    }
}

/// Durable local snapshot mirror location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Well-known file holding the latest serialized snapshot.
    #[serde(default = "default_mirror_path")]
    pub path: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            path: default_mirror_path(),
        }
    }
}

/// Logging sink configuration consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_section() {
        let config = AppConfig::default();
        assert_eq!(config.relay.default_port, 19765);
        assert_eq!(config.liveness.indeterminate_debounce, 2);
        assert_eq!(config.stabilizer.required_consecutive, 3);
        assert_eq!(config.stabilizer.poll_interval, Duration::from_millis(800));
        assert!(config.api.base_url.ends_with("/oms"));
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[stabilizer]\nrequired_consecutive = 5\nhard_timeout = 30\n"
        )
        .unwrap();
        let config = AppConfig::load(&[file.path()]).unwrap();
        assert_eq!(config.stabilizer.required_consecutive, 5);
        assert_eq!(config.stabilizer.hard_timeout, Duration::from_secs(30));
        // untouched sections keep defaults
        assert_eq!(config.relay.default_port, 19765);
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() {
        let config = AppConfig::load(&[Path::new("does/not/exist.toml")]).unwrap();
        assert_eq!(config.liveness.probe_interval, Duration::from_secs(2));
    }
}
