//! Environment configuration.

use std::env;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CONSOLE_POLL: Duration = Duration::from_secs(3);
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// URI shown to the operator when no front-end is attached.
    pub server_uri: String,
    pub monitor_interval: Duration,
    pub console_poll: Duration,
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_uri: default_server_uri(DEFAULT_HOST, DEFAULT_PORT),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            console_poll: DEFAULT_CONSOLE_POLL,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let host = env_string_opt("CODER_RELAY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = env_parse_opt("CODER_RELAY_PORT").unwrap_or(DEFAULT_PORT);
        let server_uri = env_string_opt("CODER_RELAY_SERVER_URI")
            .unwrap_or_else(|| default_server_uri(&host, port));

        Self {
            server_uri,
            host,
            port,
            monitor_interval: env_millis_opt("CODER_RELAY_MONITOR_INTERVAL_MS")
                .unwrap_or(DEFAULT_MONITOR_INTERVAL),
            console_poll: env_millis_opt("CODER_RELAY_CONSOLE_POLL_MS")
                .unwrap_or(DEFAULT_CONSOLE_POLL),
            log_filter: env_string_opt("CODER_RELAY_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_server_uri(host: &str, port: u16) -> String {
    format!("tcp://{host}:{port}")
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

fn env_millis_opt(key: &str) -> Option<Duration> {
    env_parse_opt::<u64>(key)
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}
