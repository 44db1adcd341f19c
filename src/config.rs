//! # Configuration Module
//!
//! Environment-driven bot settings plus the tuning knobs of the connection
//! resilience layer and the per-event retry policy.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use teloxide::types::ChatId;

use crate::errors::BotError;

// Constants for bot configuration
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CLINICS_PATH: &str = "data/clinics.json";
pub const DEFAULT_DISTRICTS_PATH: &str = "data/districts.json";
pub const USER_AGENT: &str = "ClinicDirectoryBot/1.0";

/// Connection lifecycle configuration
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// First reconnect delay in milliseconds
    pub initial_reconnect_delay_ms: u64,
    /// Multiplier applied per reconnect attempt
    pub backoff_growth_factor: f64,
    /// Ceiling of the reconnect delay in milliseconds
    pub max_reconnect_delay_ms: u64,
    /// Attempts before the counter wraps around with an extra pause
    pub max_reconnect_attempts: u32,
    /// Period of the health check timer
    pub health_check_interval: Duration,
    /// Time without a successful health check before a forced reconnect
    pub health_check_staleness: Duration,
    /// Deadline of a single liveness probe
    pub probe_timeout: Duration,
    /// Deadline for stopping a connection during teardown
    pub stop_timeout: Duration,
    /// Minimum spacing between two registered failures
    pub failure_debounce: Duration,
    /// Quiet period collapsing bursts of unhandled errors
    pub fallback_debounce: Duration,
    /// TCP connect timeout of the HTTP client
    pub connect_timeout: Duration,
    /// Extra budget on top of the long-poll timeout for a whole request
    pub socket_timeout: Duration,
    /// TCP keep-alive and idle pool timeout
    pub keep_alive: Duration,
    /// Idle connections kept per host
    pub max_idle_connections: usize,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay_ms: 50,
            backoff_growth_factor: 1.3,
            max_reconnect_delay_ms: 3000,
            max_reconnect_attempts: 50,
            health_check_interval: Duration::from_secs(2),
            health_check_staleness: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
            failure_debounce: Duration::from_secs(2),
            fallback_debounce: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(3),
            socket_timeout: Duration::from_secs(5),
            keep_alive: Duration::from_secs(10),
            max_idle_connections: 5,
            poll_timeout: Duration::from_secs(10),
        }
    }
}

impl ResilienceConfig {
    /// Whole-request timeout; must outlive the long poll
    pub fn request_timeout(&self) -> Duration {
        self.poll_timeout + self.socket_timeout
    }
}

/// Bounded retry applied to every inbound event
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Deadline of a single attempt
    pub attempt_timeout: Duration,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Process configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub admin_id: ChatId,
    pub port: u16,
    pub clinics_path: PathBuf,
    pub districts_path: PathBuf,
    pub resilience: ResilienceConfig,
    pub retry: RetryPolicy,
}

impl BotConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| BotError::Config("TELEGRAM_BOT_TOKEN must be set".to_string()))?;

        let admin_id = lookup("ADMIN_ID")
            .ok_or_else(|| BotError::Config("ADMIN_ID must be set".to_string()))?
            .trim()
            .parse::<i64>()
            .map_err(|e| BotError::Config(format!("ADMIN_ID must be a chat id: {e}")))?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| BotError::Config(format!("PORT must be a port number: {e}")))?,
            None => DEFAULT_PORT,
        };

        let clinics_path = lookup("CLINICS_PATH")
            .unwrap_or_else(|| DEFAULT_CLINICS_PATH.to_string())
            .into();
        let districts_path = lookup("DISTRICTS_PATH")
            .unwrap_or_else(|| DEFAULT_DISTRICTS_PATH.to_string())
            .into();

        Ok(Self {
            bot_token,
            admin_id: ChatId(admin_id),
            port,
            clinics_path,
            districts_path,
            resilience: ResilienceConfig::default(),
            retry: RetryPolicy::default(),
        })
    }
}
