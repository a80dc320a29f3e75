use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory (relative to the working directory) searched for `config.toml`.
pub const CONFIG_DIR: &str = ".provis";

/// Top-level provis configuration, matching `.provis/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisConfig {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub lineage: LineageSection,
    #[serde(default)]
    pub jobs: JobsSection,
}

/// Base URLs of the remote APIs plus request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Provenance API (lineage exploration).
    pub prov_url: String,
    /// Entity registry API (record details).
    pub registry_url: String,
    /// Async job API.
    pub jobs_url: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            prov_url: "http://localhost:8000".to_string(),
            registry_url: "http://localhost:8001".to_string(),
            jobs_url: "http://localhost:8002".to_string(),
            token_env: "PROVIS_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageSection {
    /// Lineage depth requested per expansion.
    pub depth: u32,
    /// Delay before a hover-exit clears the hover target.
    pub hover_delay_ms: u64,
}

impl Default for LineageSection {
    fn default() -> Self {
        Self {
            depth: 1,
            hover_delay_ms: 500,
        }
    }
}

impl LineageSection {
    pub fn hover_delay(&self) -> Duration {
        Duration::from_millis(self.hover_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub poll_interval_ms: u64,
    pub batch_poll_interval_ms: u64,
    /// Maximum jobs fetched when listing a batch.
    pub batch_limit: u32,
    /// Page size for job listings.
    pub page_size: u32,
    pub refetch_on_error: bool,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2500,
            batch_poll_interval_ms: 5000,
            batch_limit: 100,
            page_size: 20,
            refetch_on_error: false,
        }
    }
}

impl JobsSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }
}

impl ProvisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Resolve the active configuration.
    ///
    /// An explicit path must exist. Without one, `.provis/config.toml` under
    /// `cwd` is used when present, otherwise the defaults.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = default_path(cwd);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Check semantic constraints that TOML types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("api.prov_url", &self.api.prov_url),
            ("api.registry_url", &self.api.registry_url),
            ("api.jobs_url", &self.api.jobs_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".into()));
        }
        if self.lineage.depth == 0 {
            return Err(ConfigError::Invalid("lineage.depth must be > 0".into()));
        }
        if self.jobs.poll_interval_ms == 0 || self.jobs.batch_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be > 0".into()));
        }
        if self.jobs.batch_limit == 0 || self.jobs.page_size == 0 {
            return Err(ConfigError::Invalid(
                "jobs.batch_limit and jobs.page_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Read the bearer token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.api.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}

/// Location of the implicit config file under `cwd`.
pub fn default_path(cwd: &Path) -> PathBuf {
    cwd.join(CONFIG_DIR).join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProvisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.jobs.poll_interval(), Duration::from_millis(2500));
        assert_eq!(config.jobs.batch_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.lineage.hover_delay(), Duration::from_millis(500));
        assert_eq!(config.lineage.depth, 1);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ProvisConfig::from_toml_str(
            "[api]\nprov_url = \"https://prov.example.org\"\n\n[jobs]\nrefetch_on_error = true\n",
        )
        .unwrap();
        assert_eq!(config.api.prov_url, "https://prov.example.org");
        assert_eq!(config.api.registry_url, "http://localhost:8001");
        assert!(config.jobs.refetch_on_error);
        assert_eq!(config.jobs.poll_interval_ms, 2500);
    }

    #[test]
    fn rejects_bad_url() {
        let err = ProvisConfig::from_toml_str("[api]\njobs_url = \"ftp://nope\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = ProvisConfig::from_toml_str("[jobs]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ProvisConfig::from_toml_str("[api\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn discover_prefers_explicit_then_local_then_default() {
        let dir = tempfile::tempdir().unwrap();

        let config = ProvisConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config, ProvisConfig::default());

        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            default_path(dir.path()),
            "[lineage]\nhover_delay_ms = 250\n",
        )
        .unwrap();
        let config = ProvisConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.lineage.hover_delay_ms, 250);

        let missing = dir.path().join("missing.toml");
        let err = ProvisConfig::discover(Some(&missing), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
