//! Portal configuration
//!
//! Loaded from `<config_dir>/omniclient/config.toml`. A missing file yields
//! defaults; a malformed one is an error.

use crate::error::CoreError;
use omni_types::{Division, PerDivision};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://omni.top-academy.ru/";

/// Each division is presented to the portal as a distinct browser
pub const ACADEMY_USER_AGENT: &str = "Mozilla/5.0 (rv:68.0) Gecko/68.0 Firefox/68.0";
pub const COLLEGE_USER_AGENT: &str =
    "Opera/9.80 (X11; Linux x86_64; U; en) Presto/2.12.388 Version/12.18";

/// Configuration for sessions, cache and write-back queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Portal root, must end with `/`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// User-Agent per division
    pub user_agents: PerDivision<String>,

    /// Pause between two write-back tasks, in milliseconds
    pub write_delay_ms: u64,

    /// Auto-login backoff after a network failure, in seconds
    pub login_retry_secs: u64,

    /// Weeks kept on each side of the focused week
    pub window_radius: i32,

    /// Event bus channel capacity
    pub event_capacity: usize,

    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,

    /// Default login (password is never read from the file)
    pub username: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            user_agents: PerDivision::new(
                ACADEMY_USER_AGENT.to_string(),
                COLLEGE_USER_AGENT.to_string(),
            ),
            write_delay_ms: 500,
            login_retry_secs: 30,
            window_radius: 2,
            event_capacity: 256,
            cache_dir: None,
            username: None,
        }
    }
}

impl PortalConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("omniclient").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(CoreError::ConfigRead { path, source }),
        };

        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(content).map_err(|e| CoreError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.base()?;
        if self.window_radius < 0 {
            return Err(CoreError::InvalidConfig {
                message: format!("window_radius must be >= 0, got {}", self.window_radius),
            });
        }
        if self.event_capacity == 0 {
            return Err(CoreError::InvalidConfig {
                message: "event_capacity must be > 0".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig {
                message: "request_timeout_secs must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed base URL
    pub fn base(&self) -> Result<Url, CoreError> {
        if !self.base_url.ends_with('/') {
            return Err(CoreError::InvalidConfig {
                message: format!("base_url must end with '/': {}", self.base_url),
            });
        }
        Url::parse(&self.base_url).map_err(|e| CoreError::InvalidConfig {
            message: format!("base_url {}: {}", self.base_url, e),
        })
    }

    /// Replace the base URL, appending the trailing slash if missing
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn user_agent(&self, division: Division) -> &str {
        &self.user_agents[division]
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    pub fn login_retry(&self) -> Duration {
        Duration::from_secs(self.login_retry_secs)
    }

    /// Directory holding the week store
    pub fn cache_path(&self) -> Result<PathBuf, CoreError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join("omniclient"))
                .ok_or_else(|| CoreError::InvalidConfig {
                    message: "no platform cache directory, set cache_dir".to_string(),
                }),
        }
    }
}

/// Login pair for both divisions (the portal uses one account for both)
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
