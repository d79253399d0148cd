use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ProbeError, ProbeResult};

pub const CONFIG_FILE_NAME: &str = "omniprobe.toml";

/// Environment variable that overrides `[omniparser].base_url`.
pub const BASE_URL_ENV: &str = "OMNIPROBE_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub omniparser: OmniParserConfig,
}

/// Connection, model parameters and polling bounds for the UI-element parsing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmniParserConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path segment inserted between the base URL and `/call/...`.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_procedure")]
    pub procedure: String,
    #[serde(default = "default_box_threshold")]
    pub box_threshold: f64,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,
    /// Enables the service's secondary OCR engine (PaddleOCR on OmniParser).
    #[serde(default = "default_true")]
    pub use_secondary_ocr: bool,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:7861".to_string()
}

fn default_api_prefix() -> String {
    "/gradio_api".to_string()
}

fn default_procedure() -> String {
    "process".to_string()
}

fn default_box_threshold() -> f64 {
    0.05
}

fn default_iou_threshold() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_image_size() -> u32 {
    640
}

fn default_max_attempts() -> u32 {
    30
}

fn default_poll_delay_ms() -> u64 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_submit_timeout_ms() -> u64 {
    10_000
}

impl Default for OmniParserConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            procedure: default_procedure(),
            box_threshold: default_box_threshold(),
            iou_threshold: default_iou_threshold(),
            use_secondary_ocr: default_true(),
            image_size: default_image_size(),
            max_attempts: default_max_attempts(),
            poll_delay_ms: default_poll_delay_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
        }
    }
}

impl OmniParserConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// `{base_url}{api_prefix}/call/{procedure}`, tolerating stray slashes.
    pub fn call_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        let procedure = self.procedure.trim_matches('/');
        if prefix.is_empty() {
            format!("{base}/call/{procedure}")
        } else {
            format!("{base}/{prefix}/call/{procedure}")
        }
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ProbeError::Config("base_url must not be empty".into()));
        }
        if self.procedure.trim_matches('/').is_empty() {
            return Err(ProbeError::Config("procedure must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ProbeError::Config("max_attempts must be at least 1".into()));
        }
        for (name, value) in [
            ("box_threshold", self.box_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ProbeError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.image_size == 0 {
            return Err(ProbeError::Config("image_size must be positive".into()));
        }
        Ok(())
    }
}

fn resolve_config_path() -> ProbeResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ProbeError::Config(format!(
        "{CONFIG_FILE_NAME} not found next to executable or in working directory"
    )))
}

/// Parse and validate a config document, then apply environment overrides.
pub fn parse_config(content: &str) -> ProbeResult<AppConfig> {
    let mut config: AppConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);
    config.omniparser.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var(BASE_URL_ENV) {
        if !url.trim().is_empty() {
            tracing::debug!(base_url = %url, "base_url overridden from environment");
            config.omniparser.base_url = url;
        }
    }
}

pub fn load_config_from(path: &Path) -> ProbeResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(
        path = %path.display(),
        base_url = %config.omniparser.base_url,
        "config loaded"
    );
    Ok(config)
}

pub fn load_config() -> ProbeResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

/// Built-in defaults with environment overrides, for running without a file.
pub fn default_config() -> ProbeResult<AppConfig> {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    config.omniparser.validate()?;
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> ProbeResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
