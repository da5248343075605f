//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Listener addresses for the request/reply and publish endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// IP address both listeners bind to
    #[serde(default = "default_ip")]
    pub ip: String,
    /// Port of the request/reply endpoint
    #[serde(default = "default_router_port")]
    pub router_port: u16,
    /// Port of the update publish endpoint
    #[serde(default = "default_publisher_port")]
    pub publisher_port: u16,
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_router_port() -> u16 {
    39001
}

fn default_publisher_port() -> u16 {
    39002
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            router_port: default_router_port(),
            publisher_port: default_publisher_port(),
        }
    }
}

/// Queue-depth and retention limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Maximum number of jobs allowed in the queue at once
    #[serde(default = "default_max_jobs_in_queue")]
    pub max_jobs_in_queue: u32,
    /// Hours a completed job stays in the queue before removal
    #[serde(default = "default_hours_completed_until_removal")]
    pub hours_completed_until_removal: u32,
    /// Hours an errored job stays in the queue before removal
    #[serde(default = "default_hours_errored_until_removal")]
    pub hours_errored_until_removal: u32,
}

fn default_max_jobs_in_queue() -> u32 {
    20
}

fn default_hours_completed_until_removal() -> u32 {
    1
}

fn default_hours_errored_until_removal() -> u32 {
    2
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_jobs_in_queue: default_max_jobs_in_queue(),
            hours_completed_until_removal: default_hours_completed_until_removal(),
            hours_errored_until_removal: default_hours_errored_until_removal(),
        }
    }
}

/// Source-file discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Allowed video file extensions (matched case-insensitively)
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Secondary extension that marks a file as skipped (e.g. "name.skip.mkv")
    #[serde(default = "default_secondary_skip_extension")]
    pub secondary_skip_extension: String,
    /// Seconds between discovery scans
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

fn default_video_extensions() -> Vec<String> {
    vec![".mkv".to_string(), ".m4v".to_string(), ".avi".to_string()]
}

fn default_secondary_skip_extension() -> String {
    "skip".to_string()
}

fn default_scan_interval_secs() -> u64 {
    60
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            video_extensions: default_video_extensions(),
            secondary_skip_extension: default_secondary_skip_extension(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

/// Post-processing actions applied after a job finishes encoding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PostProcessingConfig {
    /// Destination roots the encoded output is copied to
    #[serde(default)]
    pub copy_file_paths: Vec<PathBuf>,
    /// Delete the source file after a successful encode
    #[serde(default)]
    pub delete_source_file: bool,
}

impl PostProcessingConfig {
    /// True if any post-processing action is configured
    pub fn any_enabled(&self) -> bool {
        !self.copy_file_paths.is_empty() || self.delete_source_file
    }
}

/// A named directory pair watched for source files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchDirectoryConfig {
    /// Root directory scanned for source files
    pub source: PathBuf,
    /// Root directory encoded output is written to
    pub destination: PathBuf,
    /// Automatically queue encoding jobs for unencoded files
    #[serde(default)]
    pub automated: bool,
    /// Directory holds episodic content (named per-episode)
    #[serde(default)]
    pub episode_naming: bool,
    /// Optional post-processing actions for jobs created from this directory
    #[serde(default)]
    pub post_processing: Option<PostProcessingConfig>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Search directories keyed by display name
    #[serde(default)]
    pub directories: HashMap<String, SearchDirectoryConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - ENCODA_ROUTER_PORT -> connection.router_port
    /// - ENCODA_PUBLISHER_PORT -> connection.publisher_port
    /// - ENCODA_MAX_JOBS_IN_QUEUE -> limits.max_jobs_in_queue
    /// - ENCODA_HOURS_COMPLETED_UNTIL_REMOVAL -> limits.hours_completed_until_removal
    /// - ENCODA_HOURS_ERRORED_UNTIL_REMOVAL -> limits.hours_errored_until_removal
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ENCODA_ROUTER_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.connection.router_port = port;
            }
        }

        if let Ok(val) = env::var("ENCODA_PUBLISHER_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.connection.publisher_port = port;
            }
        }

        if let Ok(val) = env::var("ENCODA_MAX_JOBS_IN_QUEUE") {
            if let Ok(depth) = val.parse::<u32>() {
                self.limits.max_jobs_in_queue = depth;
            }
        }

        if let Ok(val) = env::var("ENCODA_HOURS_COMPLETED_UNTIL_REMOVAL") {
            if let Ok(hours) = val.parse::<u32>() {
                self.limits.hours_completed_until_removal = hours;
            }
        }

        if let Ok(val) = env::var("ENCODA_HOURS_ERRORED_UNTIL_REMOVAL") {
            if let Ok(hours) = val.parse::<u32>() {
                self.limits.hours_errored_until_removal = hours;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}
