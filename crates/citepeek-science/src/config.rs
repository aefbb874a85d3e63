use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

const ENV_CONFIG_PATH: &str = "CITEPEEK_CONFIG";
const ENV_POLITE_EMAIL: &str = "CITEPEEK_POLITE_EMAIL";
const ENV_SEMANTIC_SCHOLAR_API_KEY: &str = "CITEPEEK_SEMANTIC_SCHOLAR_API_KEY";

/// Root resolver configuration, loaded from `~/.config/citepeek/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub window: WindowConfig,
    pub segmenter: SegmenterConfig,
    pub parser: ParserConfig,
    pub retry: RetryConfig,
    pub sources: SourcesConfig,
    pub resolver: ChainConfig,
}

/// Vertical window around an anchor's destination, in page units.
/// A fragment is kept when `-below < fragment.y - y0 < above`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub above: f64,
    pub below: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub line_tolerance: f64,
    pub entry_gap: f64,
    pub bracket_follow_gap: f64,
    pub author_year_follow_gap: f64,
    pub fallback_to_window_text: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub min_title_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub rate_limit_wait_ms: u64,
    pub max_rate_limit_waits: u32,
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub arxiv_url: String,
    pub semantic_scholar_url: String,
    pub crossref_url: String,
    pub keyed_search_limit: u32,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub ambiguity: AmbiguityPolicy,
    /// Zero disables the overall deadline.
    pub overall_timeout_secs: u64,
}

/// What the keyed-search stage does when more than one entry passes the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Treat the stage as inconclusive and move on.
    #[default]
    Fallthrough,
    /// Accept the first matching entry.
    First,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            above: 50.0,
            below: 300.0,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            line_tolerance: 5.0,
            entry_gap: 100.0,
            bracket_follow_gap: 50.0,
            author_year_follow_gap: 20.0,
            fallback_to_window_text: true,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { min_title_len: 10 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            rate_limit_wait_ms: 1000,
            max_rate_limit_waits: 5,
            min_interval_ms: 300,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            arxiv_url: "http://export.arxiv.org/api/query".to_string(),
            semantic_scholar_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            crossref_url: "https://api.crossref.org".to_string(),
            keyed_search_limit: 50,
            user_agent: "citepeek/0.1".to_string(),
            polite_email: None,
            semantic_scholar_api_key: None,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::Fallthrough,
            overall_timeout_secs: 30,
        }
    }
}

// ─── Derived values ────────────────────────────────────────

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.rate_limit_wait_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay().saturating_mul(factor)
    }
}

impl ChainConfig {
    pub fn overall_timeout(&self) -> Option<Duration> {
        (self.overall_timeout_secs > 0).then(|| Duration::from_secs(self.overall_timeout_secs))
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl ResolverConfig {
    /// Standard config file path: `~/.config/citepeek/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("citepeek")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    /// Environment credentials override the file.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make every resolution miss.
    pub fn validate(&self) -> Result<()> {
        if self.window.above <= 0.0 || self.window.below <= 0.0 {
            return Err(ScienceError::Config(
                "window.above and window.below must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ScienceError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.sources.keyed_search_limit == 0 {
            return Err(ScienceError::Config(
                "sources.keyed_search_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlays `CITEPEEK_POLITE_EMAIL` and `CITEPEEK_SEMANTIC_SCHOLAR_API_KEY`.
    pub fn apply_env(&mut self) {
        if let Some(email) = env_non_empty(ENV_POLITE_EMAIL) {
            self.sources.polite_email = Some(email);
        }
        if let Some(key) = env_non_empty(ENV_SEMANTIC_SCHOLAR_API_KEY) {
            self.sources.semantic_scholar_api_key = Some(key);
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
