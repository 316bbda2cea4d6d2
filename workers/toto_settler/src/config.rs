use serde::{Deserialize, Serialize};
use std::{env, fmt, str::FromStr, time::Duration};

use crate::{error::ConfigError, service::Credentials};

pub const DEFAULT_AUTH_PATH: &str = "/api/admins/auth-with-password";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    pub identity: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub auth_path: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub page_size: u32,
}

impl ServiceConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.identity.clone(), self.password.clone())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs as i64)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            identity: String::new(),
            password: String::new(),
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            user_agent: "toto-settler/0.1".to_string(),
            request_timeout_secs: 30,
            session_ttl_secs: 12 * 60 * 60,
            page_size: 200,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("identity", &self.identity)
            .field("password", &"<redacted>")
            .field("auth_path", &self.auth_path)
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_second: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub poll_interval_ms: u64,
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    pub service: ServiceConfig,
    pub rate_limits: RateLimits,
    pub schedule: ScheduleConfig,
}

impl WorkerConfig {
    /// Reads the worker configuration from the process environment.
    ///
    /// `SERVICE_URL`, `SERVICE_USER` and `SERVICE_PASSWORD` are required;
    /// everything else falls back to [`Default`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.service.base_url = env_required("SERVICE_URL")?.trim_end_matches('/').to_string();
        config.service.identity = env_required("SERVICE_USER")?;
        config.service.password = env_required("SERVICE_PASSWORD")?;

        if let Ok(path) = env::var("SERVICE_AUTH_PATH") {
            if !path.is_empty() {
                config.service.auth_path = path;
            }
        }
        if let Ok(user_agent) = env::var("SERVICE_USER_AGENT") {
            config.service.user_agent = user_agent;
        }
        if let Some(timeout) = env_parse::<u64>("SERVICE_TIMEOUT_SECS")? {
            config.service.request_timeout_secs = timeout;
        }
        if let Some(ttl) = env_parse::<u64>("SESSION_TTL_SECS")? {
            config.service.session_ttl_secs = ttl;
        }
        if let Some(page_size) = env_parse_positive::<u32>("PAGE_SIZE")? {
            config.service.page_size = page_size;
        }
        if let Some(rps) = env_parse_positive::<u32>("RATE_LIMIT_RPS")? {
            config.rate_limits.requests_per_second = rps;
        }
        if let Some(interval) = env_parse_positive::<u64>("POLL_INTERVAL_MS")? {
            config.schedule.poll_interval_ms = interval;
        }

        Ok(config)
    }
}

fn env_required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn env_parse<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

fn env_parse_positive<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
{
    match env_parse::<T>(var)? {
        Some(value) if value <= T::default() => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
        parsed => Ok(parsed),
    }
}
