// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::fetcher::BackoffPolicy;
use crate::ingest::parser::LayoutName;
use crate::snapshot::PublishMode;

const ENV_PATH: &str = "LIVE_MAP_CONFIG";
const DEFAULT_PATH: &str = "config/ingest.toml";

pub const DEFAULT_MANIFEST_URL: &str = "http://data.gdeltproject.org/gdeltv2/lastupdate.txt";

fn default_manifest_url() -> String {
    DEFAULT_MANIFEST_URL.to_string()
}
fn default_export_marker() -> String {
    ".export.".to_string()
}
fn default_interval_secs() -> u64 {
    900
}
fn default_window_count() -> usize {
    2
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_user_agent() -> String {
    concat!("live-event-map/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    /// Substring identifying the event export among the manifest's artifacts.
    #[serde(default = "default_export_marker")]
    pub export_marker: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// 1 = latest window only, 2 = latest + the one before it.
    #[serde(default = "default_window_count")]
    pub window_count: usize,
    #[serde(default)]
    pub layout: LayoutName,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional on-disk copy of the published document, reloaded on restart.
    #[serde(default)]
    pub mirror_path: Option<PathBuf>,
    #[serde(default)]
    pub allow_empty_publish: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            manifest_url: default_manifest_url(),
            export_marker: default_export_marker(),
            interval_secs: default_interval_secs(),
            window_count: default_window_count(),
            layout: LayoutName::default(),
            http_timeout_secs: default_http_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            user_agent: default_user_agent(),
            mirror_path: None,
            allow_empty_publish: false,
            metrics_enabled: true,
        }
    }
}

impl IngestConfig {
    /// Load from an explicit TOML file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading ingest config from {}", path.display()))?;
        let cfg: IngestConfig = toml::from_str(&content)
            .with_context(|| format!("parsing ingest config {}", path.display()))?;
        cfg.with_env_overrides().map(Self::sanitized)
    }

    /// Load using env var + fallbacks:
    /// 1) $LIVE_MAP_CONFIG
    /// 2) config/ingest.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from(DEFAULT_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        Self::default().with_env_overrides().map(Self::sanitized)
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("LIVE_MAP_MANIFEST_URL") {
            self.manifest_url = v;
        }
        if let Ok(v) = std::env::var("LIVE_MAP_INTERVAL_SECS") {
            self.interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("LIVE_MAP_INTERVAL_SECS=`{v}`"))?;
        }
        if let Ok(v) = std::env::var("LIVE_MAP_WINDOWS") {
            self.window_count = v
                .trim()
                .parse()
                .with_context(|| format!("LIVE_MAP_WINDOWS=`{v}`"))?;
        }
        if let Ok(v) = std::env::var("LIVE_MAP_LAYOUT") {
            self.layout =
                LayoutName::parse(&v).ok_or_else(|| anyhow!("LIVE_MAP_LAYOUT=`{v}` is unknown"))?;
        }
        if let Ok(v) = std::env::var("LIVE_MAP_MIRROR_PATH") {
            let v = v.trim();
            self.mirror_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        Ok(self)
    }

    fn sanitized(mut self) -> Self {
        self.window_count = self.window_count.clamp(1, 2);
        self.interval_secs = self.interval_secs.max(1);
        self.http_timeout_secs = self.http_timeout_secs.max(1);
        if self.max_delay_ms < self.base_delay_ms {
            // keep a valid interval
            std::mem::swap(&mut self.max_delay_ms, &mut self.base_delay_ms);
        }
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn publish_mode(&self) -> PublishMode {
        if self.allow_empty_publish {
            PublishMode::AllowEmpty
        } else {
            PublishMode::Guarded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn clear_env() {
        for k in [
            ENV_PATH,
            "LIVE_MAP_MANIFEST_URL",
            "LIVE_MAP_INTERVAL_SECS",
            "LIVE_MAP_WINDOWS",
            "LIVE_MAP_LAYOUT",
            "LIVE_MAP_MIRROR_PATH",
        ] {
            env::remove_var(k);
        }
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: IngestConfig = toml::from_str(
            r#"
            window_count = 1
            layout = "legacy"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window_count, 1);
        assert_eq!(cfg.layout, LayoutName::Legacy);
        assert_eq!(cfg.manifest_url, DEFAULT_MANIFEST_URL);
        assert_eq!(cfg.interval_secs, 900);
        assert!(cfg.metrics_enabled);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<IngestConfig>("windw_count = 1").is_err());
    }

    #[test]
    fn sanitize_clamps() {
        let cfg = IngestConfig {
            window_count: 7,
            interval_secs: 0,
            base_delay_ms: 900,
            max_delay_ms: 100,
            ..IngestConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.window_count, 2);
        assert_eq!(cfg.interval_secs, 1);
        assert_eq!(cfg.backoff().base_delay, Duration::from_millis(100));
        assert_eq!(cfg.backoff().max_delay, Duration::from_millis(900));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // isolate CWD so the repo's own config/ does not leak in
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        let cfg = IngestConfig::load_default().unwrap();
        assert_eq!(cfg, IngestConfig::default());

        let p = tmp.path().join("custom.toml");
        fs::write(&p, "interval_secs = 60\nmirror_path = \"/tmp/x.geojson\"\n").unwrap();
        env::set_var(ENV_PATH, p.display().to_string());
        env::set_var("LIVE_MAP_WINDOWS", "1");
        let cfg = IngestConfig::load_default().unwrap();
        assert_eq!(cfg.interval_secs, 60);
        assert_eq!(cfg.window_count, 1);
        assert_eq!(cfg.mirror_path, Some(PathBuf::from("/tmp/x.geojson")));

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(IngestConfig::load_default().is_err());

        clear_env();
        env::set_var("LIVE_MAP_LAYOUT", "bogus");
        assert!(IngestConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
