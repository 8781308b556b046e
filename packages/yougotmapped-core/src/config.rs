//! Layered runtime configuration.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default geolocation service URL
pub const DEFAULT_API_URL: &str = "https://ipinfo.io";

/// Default map artifact path
pub const DEFAULT_MAP_FILE: &str = "ip_geolocation_map.html";

/// Environment variable name for service URL override
const ENV_API_URL: &str = "YOUGOTMAPPED_API_URL";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PING_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TRACEROUTE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_HOPS: u8 = 30;
const DEFAULT_CONCURRENCY: usize = 1;

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    service: Option<ServiceSection>,
    map: Option<MapSection>,
    diagnostics: Option<DiagnosticsSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ServiceSection {
    /// Geolocation API base URL (e.g., "https://ipinfo.io")
    api_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MapSection {
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DiagnosticsSection {
    ping_timeout_secs: Option<u64>,
    traceroute_timeout_secs: Option<u64>,
    max_hops: Option<u8>,
    concurrency: Option<usize>,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL for geolocation calls
    pub api_url: String,
    /// Where the service URL came from (for display)
    pub source: ConfigSource,
    pub http_timeout: Duration,
    pub map_output: PathBuf,
    pub ping_timeout: Duration,
    pub traceroute_timeout: Duration,
    pub max_hops: u8,
    /// Number of targets processed at once
    pub concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            source: ConfigSource::Default,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            map_output: PathBuf::from(DEFAULT_MAP_FILE),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            traceroute_timeout: Duration::from_secs(DEFAULT_TRACEROUTE_TIMEOUT_SECS),
            max_hops: DEFAULT_MAX_HOPS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Where the service URL came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("yougotmapped").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Load configuration with priority:
/// 1. Environment variable (YOUGOTMAPPED_API_URL, service URL only)
/// 2. Config file (~/.config/yougotmapped/config.toml)
/// 3. Default values
pub fn load_config() -> AppConfig {
    resolve_config(std::env::var(ENV_API_URL).ok(), load_config_file())
}

/// Merge the environment override and the parsed config file over defaults.
pub fn resolve_config(env_url: Option<String>, file: Option<ConfigFile>) -> AppConfig {
    let mut config = AppConfig::default();
    let file = file.unwrap_or_default();

    if let Some(service) = file.service {
        if let Some(api) = service.api_url.as_deref().and_then(normalize_url) {
            tracing::debug!("Using geolocation API URL from config file: {}", api);
            config.api_url = api;
            config.source = ConfigSource::ConfigFile;
        }
        if let Some(secs) = service.timeout_secs.filter(|s| *s > 0) {
            config.http_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(output) = file.map.and_then(|m| m.output) {
        config.map_output = output;
    }

    if let Some(diag) = file.diagnostics {
        if let Some(secs) = diag.ping_timeout_secs.filter(|s| *s > 0) {
            config.ping_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = diag.traceroute_timeout_secs.filter(|s| *s > 0) {
            config.traceroute_timeout = Duration::from_secs(secs);
        }
        if let Some(hops) = diag.max_hops.filter(|h| *h > 0) {
            config.max_hops = hops;
        }
        if let Some(n) = diag.concurrency.filter(|n| *n > 0) {
            config.concurrency = n;
        }
    }

    if let Some(url) = env_url.as_deref().and_then(normalize_url) {
        tracing::info!("Using geolocation API URL from environment variable: {}", url);
        config.api_url = url;
        config.source = ConfigSource::Environment;
    }

    config
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/yougotmapped/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# yougotmapped configuration
# Place this file at: ~/.config/yougotmapped/config.toml

[service]
# Geolocation API base URL (ipinfo.io compatible)
# api_url = "https://ipinfo.io"
# timeout_secs = 10

[map]
# output = "ip_geolocation_map.html"

[diagnostics]
# ping_timeout_secs = 5
# traceroute_timeout_secs = 60
# max_hops = 30
# Number of targets looked up at the same time
# concurrency = 1
"#
    .to_string()
}
