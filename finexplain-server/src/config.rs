//! Server configuration read from `FINEXPLAIN_*` environment variables

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use finexplain_core::DEFAULT_DATASET_PATH;

const DEFAULT_MODEL: &str = "google/flan-t5-large";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub model_id: String,
    pub revision: String,
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
    pub dataset_path: PathBuf,
    /// Skip accelerator detection
    pub force_cpu: bool,
    pub request_timeout: Option<Duration>,
    pub max_concurrency: Option<usize>,
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            revision: "main".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            force_cpu: false,
            request_timeout: None,
            max_concurrency: None,
            log_level: Level::INFO,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(model_id) = get("FINEXPLAIN_MODEL") {
            config.model_id = model_id;
        }
        if let Some(revision) = get("FINEXPLAIN_REVISION") {
            config.revision = revision;
        }
        if let Some(host) = get("FINEXPLAIN_HOST") {
            config.host = host;
        }
        if let Some(port) = get("FINEXPLAIN_PORT") {
            config.port = parse("FINEXPLAIN_PORT", &port)?;
        }
        if let Some(origins) = get("FINEXPLAIN_CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = get("FINEXPLAIN_DATASET") {
            config.dataset_path = PathBuf::from(path);
        }
        if let Some(flag) = get("FINEXPLAIN_FORCE_CPU") {
            config.force_cpu = parse_flag("FINEXPLAIN_FORCE_CPU", &flag)?;
        }
        if let Some(secs) = get("FINEXPLAIN_TIMEOUT_SECS") {
            let secs: u64 = parse("FINEXPLAIN_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                bail!("FINEXPLAIN_TIMEOUT_SECS must be positive");
            }
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(limit) = get("FINEXPLAIN_MAX_CONCURRENCY") {
            let limit: usize = parse("FINEXPLAIN_MAX_CONCURRENCY", &limit)?;
            if limit == 0 {
                bail!("FINEXPLAIN_MAX_CONCURRENCY must be positive");
            }
            config.max_concurrency = Some(limit);
        }
        if let Some(level) = get("FINEXPLAIN_LOG") {
            config.log_level = parse("FINEXPLAIN_LOG", &level)?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid value for {key}: {value:?}"),
    }
}
