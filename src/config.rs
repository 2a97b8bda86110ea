// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, FileCache, KvRestCache, MemoryCache};
use crate::orchestrator::FallbackOrchestrator;
use crate::sources::{build_http_client, build_sources};

pub const ENV_CONFIG_PATH: &str = "CALENDAR_CONFIG_PATH";
pub const ENV_CRON_SECRET: &str = "CRON_SECRET";
pub const ENV_CACHE_TTL_SECS: &str = "CALENDAR_CACHE_TTL_SECS";
pub const ENV_SOURCE_TIMEOUT_SECS: &str = "CALENDAR_SOURCE_TIMEOUT_SECS";
pub const ENV_REFRESH_INTERVAL_SECS: &str = "CALENDAR_REFRESH_INTERVAL_SECS";
pub const ENV_KV_URL: &str = "KV_REST_API_URL";
pub const ENV_KV_TOKEN: &str = "KV_REST_API_TOKEN";

const DEFAULT_TOML_PATH: &str = "config/calendar.toml";
const DEFAULT_JSON_PATH: &str = "config/calendar.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    FormPost,
    DirectJson,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    /// Upstream time zone id (form sources only).
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    None,
    #[default]
    Memory,
    File,
    Kv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub kv_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub kv_token: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: default_ttl_secs(),
            dir: default_cache_dir(),
            kv_url: None,
            kv_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Tried in this order.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_timeout_secs")]
    pub source_timeout_secs: u64,
    /// In-process refresh period; `None` or 0 disables it.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default, skip_serializing)]
    pub cron_secret: Option<String>,
}

fn default_ttl_secs() -> u64 {
    3600
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/calendar")
}
fn default_timeout_secs() -> u64 {
    15
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "investing.com".into(),
            kind: SourceKind::FormPost,
            url: "https://www.investing.com/economic-calendar/Service/getCalendarFilteredData"
                .into(),
            time_zone: Some("8".into()),
        },
        SourceConfig {
            name: "calendar.gt.tc".into(),
            kind: SourceKind::DirectJson,
            url: "https://calendar.gt.tc/index.php".into(),
            time_zone: None,
        },
    ]
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            cache: CacheConfig::default(),
            source_timeout_secs: default_timeout_secs(),
            refresh_interval_secs: None,
            cron_secret: None,
        }
    }
}

impl CalendarConfig {
    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading calendar config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing calendar config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $CALENDAR_CONFIG_PATH
    /// 2) config/calendar.toml
    /// 3) config/calendar.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_TOML_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_TOML_PATH))?
        } else if Path::new(DEFAULT_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_JSON_PATH))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Secrets and deployment knobs come from the environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(s) = std::env::var(ENV_CRON_SECRET) {
            let s = s.trim().to_string();
            self.cron_secret = (!s.is_empty()).then_some(s);
        }
        if let Some(v) = env_u64(ENV_CACHE_TTL_SECS)? {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = env_u64(ENV_SOURCE_TIMEOUT_SECS)? {
            self.source_timeout_secs = v;
        }
        if let Some(v) = env_u64(ENV_REFRESH_INTERVAL_SECS)? {
            self.refresh_interval_secs = Some(v);
        }
        if let Ok(u) = std::env::var(ENV_KV_URL) {
            self.cache.kv_url = Some(u);
        }
        if let Ok(t) = std::env::var(ENV_KV_TOKEN) {
            self.cache.kv_token = Some(t);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("calendar config lists no sources");
        }
        if self.source_timeout_secs == 0 {
            bail!("source_timeout_secs must be > 0");
        }
        for s in &self.sources {
            if s.name.trim().is_empty() || s.url.trim().is_empty() {
                return Err(anyhow!("source entries need a name and a url"));
            }
        }
        Ok(())
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn build_cache(&self) -> Result<Option<Arc<dyn CacheStore>>> {
        let cache: Arc<dyn CacheStore> = match self.cache.backend {
            CacheBackend::None => return Ok(None),
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::File => Arc::new(FileCache::new(&self.cache.dir)),
            CacheBackend::Kv => {
                let url = self
                    .cache
                    .kv_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("kv cache backend needs {ENV_KV_URL}"))?;
                let token = self
                    .cache
                    .kv_token
                    .as_deref()
                    .ok_or_else(|| anyhow!("kv cache backend needs {ENV_KV_TOKEN}"))?;
                let client = build_http_client(self.source_timeout()).context("kv http client")?;
                Arc::new(KvRestCache::new(url, token, client))
            }
        };
        Ok(Some(cache))
    }

    pub fn build_orchestrator(&self) -> Result<FallbackOrchestrator> {
        let sources =
            build_sources(&self.sources, self.source_timeout()).context("source http client")?;
        Ok(FallbackOrchestrator::new(
            sources,
            self.build_cache()?,
            self.cache_ttl(),
        ))
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{name} must be an unsigned integer")),
        _ => Ok(None),
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<CalendarConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    if hint_ext == "toml" {
        return Ok(toml::from_str(s)?);
    }
    // Unknown extension: JSON if it looks like an object, else TOML.
    if s.trim_start().starts_with('{') {
        Ok(serde_json::from_str(s)?)
    } else {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_with_partial_fields_uses_defaults() {
        let toml = r#"
source_timeout_secs = 5

[cache]
backend = "file"
dir = "/tmp/cal"

[[sources]]
name = "mirror"
kind = "direct_json"
url = "https://mirror.example.test/calendar"
"#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].kind, SourceKind::DirectJson);
        assert_eq!(cfg.cache.backend, CacheBackend::File);
        assert_eq!(cfg.cache.ttl_secs, 3600);
        assert_eq!(cfg.source_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.refresh_interval(), None);
    }

    #[test]
    fn json_config_and_sniffing() {
        let json = r#"{"cache":{"backend":"none"},"refresh_interval_secs":0}"#;
        let cfg = parse_config(json, "").unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::None);
        assert_eq!(cfg.sources, default_sources());
        assert_eq!(cfg.refresh_interval(), None);
        assert!(cfg.build_cache().unwrap().is_none());
    }

    #[test]
    fn validation_rejects_empty_sources_and_zero_timeout() {
        let mut cfg = CalendarConfig::default();
        cfg.source_timeout_secs = 0;
        assert!(cfg.validate().is_err());
        let cfg = CalendarConfig {
            sources: vec![],
            ..CalendarConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn kv_backend_requires_credentials() {
        let mut cfg = CalendarConfig::default();
        cfg.cache.backend = CacheBackend::Kv;
        assert!(cfg.build_cache().is_err());
        cfg.cache.kv_url = Some("https://kv.example.test".into());
        cfg.cache.kv_token = Some("secret".into());
        assert_eq!(cfg.build_cache().unwrap().unwrap().backend_name(), "kv");
    }
}
