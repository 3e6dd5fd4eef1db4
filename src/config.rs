//! Sync configuration module.
//!
//! Handles loading, validating, and merging `notion-hugo.toml`. Stock
//! defaults are the base layer; the user's file only needs the keys it wants
//! to change. Command-line flags and environment variables are applied on
//! top by the binary.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [notion]
//! database_id = ""                       # Usually set via NOTION_DATABASE_ID
//! api_base = "https://api.notion.com/v1"
//! api_version = "2022-06-28"
//!
//! [paths]
//! content_dir = "content"                # Hugo content root
//! static_dir = "static"                  # Hugo static root (assets land here)
//! section = "posts"                      # content/<section>/<slug>.md
//! cache_file = ".notion_cache.json"
//!
//! [media]
//! max_width = 1920                       # Downscale wider images (0 = never)
//! quality = 85                           # JPEG quality (1-100)
//! background = [255, 255, 255]           # Transparency is flattened onto this
//!
//! [download]
//! max_concurrent = 5                     # Downloads in flight at once
//! timeout_secs = 30                      # Per request
//!
//! [retry]
//! max_attempts = 3                       # Content API calls
//! delay_ms = 2000
//! backoff = 2
//!
//! [processing]
//! max_processes = 4                      # Documents in parallel (omit for auto)
//! ```
//!
//! The API token is never read from this file: pass `--notion-token` or set
//! `NOTION_TOKEN`.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::Quality;
use crate::media::OptimizeSettings;
use crate::source::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory when `--config` isn't given.
pub const CONFIG_FILE_NAME: &str = "notion-hugo.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Sync configuration loaded from `notion-hugo.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Which database to read and how to reach the API.
    pub notion: NotionConfig,
    /// Where output, assets, and the cache live.
    pub paths: PathsConfig,
    /// Image optimization applied to downloaded images.
    pub media: MediaConfig,
    /// Asset download limits.
    pub download: DownloadConfig,
    /// Retry behavior for content API calls.
    pub retry: RetryConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.media.quality) {
            return Err(ConfigError::Validation(
                "media.quality must be 1-100".into(),
            ));
        }
        if self.download.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "download.max_concurrent must be at least 1".into(),
            ));
        }
        if self.download.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "download.timeout_secs must be non-zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        let section = self.paths.section.trim();
        if section.is_empty() || section.contains(['/', '\\']) || section.starts_with('.') {
            return Err(ConfigError::Validation(
                "paths.section must be a single directory name".into(),
            ));
        }
        if self.notion.api_base.trim().is_empty() {
            return Err(ConfigError::Validation(
                "notion.api_base must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Directory the compiled documents are written to.
    pub fn section_dir(&self) -> PathBuf {
        Path::new(&self.paths.content_dir).join(&self.paths.section)
    }
}

/// Content API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotionConfig {
    /// Database to sync. Overridden by `--database-id` / `NOTION_DATABASE_ID`.
    pub database_id: String,
    pub api_base: String,
    /// Value of the `Notion-Version` header.
    pub api_version: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            database_id: String::new(),
            api_base: "https://api.notion.com/v1".to_string(),
            api_version: "2022-06-28".to_string(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub content_dir: String,
    pub static_dir: String,
    /// Content section documents are written into.
    pub section: String,
    pub cache_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content_dir: "content".to_string(),
            static_dir: "static".to_string(),
            section: "posts".to_string(),
            cache_file: ".notion_cache.json".to_string(),
        }
    }
}

/// Image optimization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Images wider than this are downscaled; 0 disables resizing.
    pub max_width: u32,
    /// JPEG quality (1-100).
    pub quality: u32,
    /// RGB color transparent pixels are flattened onto.
    pub background: [u8; 3],
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            quality: 85,
            background: [255, 255, 255],
        }
    }
}

impl MediaConfig {
    pub fn optimize_settings(&self) -> OptimizeSettings {
        OptimizeSettings {
            max_width: self.max_width,
            quality: Quality::new(self.quality),
            background: self.background,
        }
    }
}

/// Asset download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Maximum downloads in flight at once, across all documents.
    pub max_concurrent: usize,
    /// Per-request timeout in seconds. A timed-out download counts as failed.
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_secs: 30,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry settings for content API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Wait before the first retry, in milliseconds.
    pub delay_ms: u64,
    /// Multiplier applied to the wait after each further failure.
    pub backoff: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            backoff: 2,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
            backoff: self.backoff,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of documents compiled in parallel.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, or stock defaults if it doesn't exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `notion-hugo.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# notion-hugo Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.
#
# The API token is never read from this file. Pass --notion-token or set
# NOTION_TOKEN in the environment.

# ---------------------------------------------------------------------------
# Content source
# ---------------------------------------------------------------------------
[notion]
# Database to sync. --database-id and NOTION_DATABASE_ID take precedence.
database_id = ""
api_base = "https://api.notion.com/v1"
# Sent as the Notion-Version header.
api_version = "2022-06-28"

# ---------------------------------------------------------------------------
# Output locations
# ---------------------------------------------------------------------------
[paths]
# Hugo content root. Documents are written to <content_dir>/<section>/<slug>.md
content_dir = "content"
# Hugo static root. Assets are mirrored into images/, videos/, audio/, files/.
static_dir = "static"
section = "posts"
# Remembers what was synced, so unchanged documents and assets are skipped.
cache_file = ".notion_cache.json"

# ---------------------------------------------------------------------------
# Image optimization
# ---------------------------------------------------------------------------
[media]
# Images wider than this are downscaled, keeping the aspect ratio.
# 0 keeps the original width.
max_width = 1920
# JPEG quality (1-100). Downloaded images are re-encoded in place.
quality = 85
# Transparent pixels are flattened onto this RGB color.
background = [255, 255, 255]

# ---------------------------------------------------------------------------
# Asset downloads
# ---------------------------------------------------------------------------
[download]
# Downloads in flight at once, across all documents.
max_concurrent = 5
# Per-request timeout. A timed-out download keeps the remote URL.
timeout_secs = 30

# ---------------------------------------------------------------------------
# Content API retries
# ---------------------------------------------------------------------------
[retry]
# Network errors, rate limiting (429), and server errors (5xx) are retried.
max_attempts = 3
# Wait before the first retry; multiplied by `backoff` after each failure.
delay_ms = 2000
backoff = 2

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum documents compiled in parallel.
# Omit to auto-detect (uses all CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = SiteConfig::default();
        assert_eq!(config.notion.api_base, "https://api.notion.com/v1");
        assert_eq!(config.paths.content_dir, "content");
        assert_eq!(config.paths.section, "posts");
        assert_eq!(config.media.max_width, 1920);
        assert_eq!(config.media.quality, 85);
        assert_eq!(config.download.max_concurrent, 5);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[media]
quality = 70
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        // Overridden value
        assert_eq!(config.media.quality, 70);
        // Default values preserved
        assert_eq!(config.media.max_width, 1920);
        assert_eq!(config.paths.static_dir, "static");
    }

    #[test]
    fn section_dir_joins_content_and_section() {
        let config = SiteConfig::default();
        assert_eq!(config.section_dir(), Path::new("content").join("posts"));
    }

    #[test]
    fn conversions_to_runtime_types() {
        let config = SiteConfig::default();
        assert_eq!(config.download.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        let optimize = config.media.optimize_settings();
        assert_eq!(optimize.quality.value(), 85);
        assert_eq!(optimize.background, [255, 255, 255]);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
[notion]
database_id = "abc123"

[paths]
section = "blog"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.notion.database_id, "abc123");
        assert_eq!(config.paths.section, "blog");
        // Unspecified values should be defaults
        assert_eq!(config.notion.api_version, "2022-06-28");
        assert_eq!(config.paths.content_dir, "content");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "this is not valid toml [[[").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[download]\nmax_concurrent = 0\n").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // Processing
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_zero_means_one() {
        let config = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 85"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_table_merge_preserves_base_keys() {
        let base: toml::Value = toml::from_str(
            r#"
[download]
max_concurrent = 5
timeout_secs = 30
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[download]
timeout_secs = 10
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let download = merged.get("download").unwrap();
        assert_eq!(download.get("max_concurrent").unwrap().as_integer(), Some(5));
        assert_eq!(download.get("timeout_secs").unwrap().as_integer(), Some(10));
    }

    #[test]
    fn merge_toml_array_replaced_wholesale() {
        let base: toml::Value = toml::from_str("background = [255, 255, 255]").unwrap();
        let overlay: toml::Value = toml::from_str("background = [0, 0, 0]").unwrap();
        let merged = merge_toml(base, overlay);
        let bg = merged.get("background").unwrap().as_array().unwrap();
        assert!(bg.iter().all(|v| v.as_integer() == Some(0)));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[media]
qualty = 90
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let toml_str = r#"
[mediaa]
quality = 90
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn token_is_not_a_config_key() {
        let toml_str = r#"
[notion]
token = "secret_abc"
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = SiteConfig::default();
        config.media.quality = 100;
        assert!(config.validate().is_ok());
        config.media.quality = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        config.media.quality = 101;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_section_is_single_directory() {
        let mut config = SiteConfig::default();
        config.paths.section = "posts/2024".into();
        assert!(config.validate().is_err());
        config.paths.section = "..".into();
        assert!(config.validate().is_err());
        config.paths.section = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_retry_attempts() {
        let mut config = SiteConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_config_with_overlay() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str(
            r#"
[media]
quality = 70
"#,
        )
        .unwrap();
        let config = resolve_config(base, Some(overlay)).unwrap();
        assert_eq!(config.media.quality, 70);
        assert_eq!(config.media.max_width, 1920);
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let base = stock_defaults_value();
        let overlay: toml::Value = toml::from_str(
            r#"
[media]
quality = 200
"#,
        )
        .unwrap();
        let result = resolve_config(base, Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[notion]",
            "[paths]",
            "[media]",
            "[download]",
            "[retry]",
            "[processing]",
        ] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value();
        assert!(val.is_table());
        for section in ["notion", "paths", "media", "download", "retry", "processing"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }
}
