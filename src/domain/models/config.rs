use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Shepherd
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Local working directory where job payloads are staged for runners
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Docker image registry (required by docker sheep)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<DockerRegistryConfig>,

    /// Health checking and timeouts
    #[serde(default)]
    pub health: HealthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sheep configurations keyed by sheep name
    #[serde(default)]
    pub sheep: BTreeMap<String, SheepConfig>,
}

fn default_data_root() -> PathBuf {
    std::env::temp_dir().join("shepherd").join("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            storage: StorageConfig::default(),
            registry: None,
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
            sheep: BTreeMap::new(),
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Root directory of the filesystem-backed object store
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    std::env::temp_dir().join("shepherd").join("storage")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// Docker image registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DockerRegistryConfig {
    /// Registry host, e.g. `registry.example.com:5000`
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl DockerRegistryConfig {
    /// Whether `docker login` should run before pulling.
    pub const fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Health checking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthConfig {
    /// Interval between liveness probes of busy sheep
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Delay between attempts to connect to a freshly started runner
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// Fail jobs (and slaughter their sheep) after this long in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
}

const fn default_check_interval_ms() -> u64 {
    1000
}

const fn default_connect_retry_ms() -> u64 {
    100
}

impl HealthConfig {
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub const fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            connect_retry_ms: default_connect_retry_ms(),
            job_timeout_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Raw configuration of a single sheep.
///
/// Kept loosely typed on purpose so the registry can report unknown
/// variants and missing fields as configuration errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SheepConfig {
    /// Variant tag: `bare` or `docker`
    #[serde(rename = "type")]
    pub sheep_type: String,

    /// Port of the runner's message socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// GPU devices (`"0"` or `"/dev/nvidia0"`)
    #[serde(default)]
    pub devices: Vec<String>,

    /// Working directory of the runner (bare)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,

    /// Capture the runner's stdout into this file (bare)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_file: Option<PathBuf>,

    /// Capture the runner's stderr into this file (bare)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_file: Option<PathBuf>,

    /// Runner executable (bare), defaults to `shepherd-runner`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_command: Option<String>,

    /// Alternate container engine command (docker), e.g. `nvidia-docker`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Image name (docker), defaults to the model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheep_config_yaml() {
        let yaml = r"
type: bare
port: 9001
devices: ['/dev/nvidia0']
working_directory: /srv/models
stdout_file: /var/log/bare.out
";
        let config: SheepConfig = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.sheep_type, "bare");
        assert_eq!(config.port, Some(9001));
        assert_eq!(config.devices, vec!["/dev/nvidia0".to_string()]);
        assert_eq!(config.working_directory, Some(PathBuf::from("/srv/models")));
        assert_eq!(config.stdout_file, Some(PathBuf::from("/var/log/bare.out")));
        assert!(config.stderr_file.is_none());
    }

    #[test]
    fn test_health_defaults() {
        let health = HealthConfig::default();
        assert_eq!(health.check_interval(), Duration::from_secs(1));
        assert_eq!(health.connect_retry(), Duration::from_millis(100));
        assert!(health.job_timeout().is_none());
    }

    #[test]
    fn test_registry_credentials() {
        let mut registry = DockerRegistryConfig {
            url: "localhost:5000".to_string(),
            username: Some("user".to_string()),
            password: None,
        };
        assert!(!registry.has_credentials());
        registry.password = Some("secret".to_string());
        assert!(registry.has_credentials());
    }
}
