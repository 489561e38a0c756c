//! System configuration, read once from the environment at start-up.

use autoforge_core::Secret;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::{ConfigError, ConfigResult};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:6400";
pub const DEFAULT_WORKFLOW: &str = "ChatDev_v1.yaml";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Seoul;

/// Connection settings for the build backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    /// Workflow identifier sent with `start_workflow`.
    pub workflow_id: String,
    pub log_level: String,
    /// Server log of the backend, used to count active sessions.
    pub log_file: Option<PathBuf>,
    /// How long to wait for the backend to assign a session id.
    pub handshake_timeout: Duration,
    /// Upper bound on monitoring one session.
    pub monitor_ceiling: Duration,
    pub health_timeout: Duration,
}

/// Admission control settings.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub max_active_sessions: usize,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: Option<Secret>,
    /// Organisation to publish under; the token's user when absent.
    pub owner: Option<String>,
    pub private: bool,
    pub api_url: Url,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: Secret,
    pub database_id: String,
    pub api_url: Url,
}

/// Immutable configuration passed by reference to every component.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub backend: BackendConfig,
    pub admission: AdmissionConfig,
    pub github: GitHubConfig,
    pub notion: Option<NotionConfig>,
    /// Model API key the backend's agents use.
    pub llm_api_key: Option<Secret>,
    pub log_dir: PathBuf,
    pub schedule_file: Option<PathBuf>,
    pub ideas_file: Option<PathBuf>,
    pub timezone: Tz,
    /// Timeout for outbound HTTP calls to collaborators.
    pub http_timeout: Duration,
}

impl SystemConfig {
    /// Load from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secret = |key: &str| get(key).map(Secret::new);

        let base_url = parse_url(
            "AUTOFORGE_BACKEND_URL",
            &get("AUTOFORGE_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
        )?;

        let backend = BackendConfig {
            base_url,
            workflow_id: get("AUTOFORGE_WORKFLOW").unwrap_or_else(|| DEFAULT_WORKFLOW.to_string()),
            log_level: get("AUTOFORGE_BACKEND_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: get("AUTOFORGE_BACKEND_LOG").map(PathBuf::from),
            handshake_timeout: Duration::from_secs(10),
            monitor_ceiling: secs(&get, "AUTOFORGE_MONITOR_TIMEOUT_SECS", 4 * 60 * 60)?,
            health_timeout: Duration::from_secs(5),
        };

        let admission = AdmissionConfig {
            max_active_sessions: number(&get, "AUTOFORGE_MAX_SESSIONS", 1)? as usize,
            max_wait: secs(&get, "AUTOFORGE_ADMISSION_WAIT_SECS", 300)?,
            poll_interval: secs(&get, "AUTOFORGE_ADMISSION_POLL_SECS", 30)?,
        };
        if admission.max_active_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AUTOFORGE_MAX_SESSIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if admission.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "AUTOFORGE_ADMISSION_POLL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let github = GitHubConfig {
            token: secret("GITHUB_TOKEN"),
            owner: get("GITHUB_OWNER"),
            private: get("GITHUB_PRIVATE").is_some_and(|v| v == "true" || v == "1"),
            api_url: parse_url(
                "GITHUB_API_URL",
                &get("GITHUB_API_URL").unwrap_or_else(|| "https://api.github.com".to_string()),
            )?,
        };

        let notion = match (secret("BUILDER_NOTION_TOKEN"), get("BUILDER_NOTION_DATABASE_ID")) {
            (Some(token), Some(database_id)) => Some(NotionConfig {
                token,
                database_id,
                api_url: parse_url(
                    "NOTION_API_URL",
                    &get("NOTION_API_URL")
                        .unwrap_or_else(|| "https://api.notion.com/v1".to_string()),
                )?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::MissingField(
                    "BUILDER_NOTION_DATABASE_ID".to_string(),
                ));
            }
            _ => None,
        };

        let timezone = match get("AUTOFORGE_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|_| ConfigError::InvalidValue {
                field: "AUTOFORGE_TIMEZONE".to_string(),
                message: format!("unknown timezone '{}'", name),
            })?,
            None => DEFAULT_TIMEZONE,
        };

        Ok(Self {
            backend,
            admission,
            github,
            notion,
            llm_api_key: secret("API_KEY"),
            log_dir: PathBuf::from(get("AUTOFORGE_LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            schedule_file: get("AUTOFORGE_SCHEDULE").map(PathBuf::from),
            ideas_file: get("AUTOFORGE_IDEAS").map(PathBuf::from),
            timezone,
            http_timeout: Duration::from_secs(30),
        })
    }

    /// Fail unless the credentials an unattended build needs are present.
    pub fn require_credentials(&self) -> ConfigResult<()> {
        if self.github.token.is_none() {
            return Err(ConfigError::MissingCredential("GITHUB_TOKEN".to_string()));
        }
        if self.llm_api_key.is_none() {
            return Err(ConfigError::MissingCredential("API_KEY".to_string()));
        }
        Ok(())
    }

    /// Append-only journal of pipeline runs.
    pub fn history_file(&self) -> PathBuf {
        self.log_dir.join("project_history.jsonl")
    }

    /// Server log the active session count is derived from.
    pub fn backend_log_file(&self) -> PathBuf {
        self.backend
            .log_file
            .clone()
            .unwrap_or_else(|| self.log_dir.join("chatdev_server.log"))
    }

    /// Append-only log of health probe results.
    pub fn health_log_file(&self) -> PathBuf {
        self.log_dir.join("health_check.log")
    }
}

fn parse_url(field: &str, value: &str) -> ConfigResult<Url> {
    Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: e.to_string(),
    })
}

fn number<G>(get: &G, key: &str, default: u64) -> ConfigResult<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            message: format!("'{}' is not a non-negative integer", value),
        }),
        None => Ok(default),
    }
}

fn secs<G>(get: &G, key: &str, default: u64) -> ConfigResult<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    number(get, key, default).map(Duration::from_secs)
}
