use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
    pub username: Option<String>,
    pub password_command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListConfig {
    pub page_size: usize,
}

/// Poll cadence, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
    pub idle_interval_ms: u64,
    pub fast_window_ms: u64,
    pub min_spacing_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            fast_interval_ms: default_fast_interval_ms(),
            slow_interval_ms: default_slow_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            fast_window_ms: default_fast_window_ms(),
            min_spacing_ms: default_min_spacing_ms(),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub list: ListConfig,
    pub poll: PollConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    server: Option<RawServerConfig>,
    #[serde(default)]
    list: RawListConfig,
    #[serde(default)]
    poll: RawPollConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServerConfig {
    base_url: Option<String>,
    #[serde(default = "default_profile_name")]
    name: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password_command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawListConfig {
    #[serde(default = "default_page_size")]
    page_size: usize,
}

impl Default for RawListConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPollConfig {
    #[serde(default = "default_fast_interval_ms")]
    fast_interval_ms: u64,
    #[serde(default = "default_slow_interval_ms")]
    slow_interval_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    idle_interval_ms: u64,
    #[serde(default = "default_fast_window_ms")]
    fast_window_ms: u64,
    #[serde(default = "default_min_spacing_ms")]
    min_spacing_ms: u64,
}

impl Default for RawPollConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: default_fast_interval_ms(),
            slow_interval_ms: default_slow_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            fast_window_ms: default_fast_window_ms(),
            min_spacing_ms: default_min_spacing_ms(),
        }
    }
}

fn default_profile_name() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

pub fn default_page_size() -> usize {
    10
}

fn default_fast_interval_ms() -> u64 {
    1000
}

fn default_slow_interval_ms() -> u64 {
    3000
}

fn default_idle_interval_ms() -> u64 {
    10_000
}

fn default_fast_window_ms() -> u64 {
    5000
}

fn default_min_spacing_ms() -> u64 {
    800
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let server = raw
            .server
            .ok_or_else(|| ConfigError::Parse("missing [server] section".to_string()))?;
        let base_url = server
            .base_url
            .ok_or_else(|| ConfigError::Parse("missing base_url in [server]".to_string()))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Parse(format!(
                "base_url '{}' must start with http:// or https://",
                base_url
            )));
        }
        if server.timeout_secs == 0 {
            return Err(ConfigError::Parse(
                "timeout_secs must be greater than 0 in [server]".to_string(),
            ));
        }
        if server.username.is_some() != server.password_command.is_some() {
            return Err(ConfigError::Parse(
                "username and password_command must be set together in [server]".to_string(),
            ));
        }

        if raw.list.page_size == 0 {
            return Err(ConfigError::Parse(
                "page_size must be greater than 0 in [list]".to_string(),
            ));
        }

        let poll = raw.poll;
        for (name, value) in [
            ("fast_interval_ms", poll.fast_interval_ms),
            ("slow_interval_ms", poll.slow_interval_ms),
            ("idle_interval_ms", poll.idle_interval_ms),
            ("min_spacing_ms", poll.min_spacing_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Parse(format!(
                    "{} must be greater than 0 in [poll]",
                    name
                )));
            }
        }

        Ok(Config {
            server: ServerConfig {
                name: server.name,
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(server.timeout_secs),
                username: server.username,
                password_command: server.password_command,
            },
            list: ListConfig {
                page_size: raw.list.page_size,
            },
            poll: PollConfig {
                fast_interval_ms: poll.fast_interval_ms,
                slow_interval_ms: poll.slow_interval_ms,
                idle_interval_ms: poll.idle_interval_ms,
                fast_window_ms: poll.fast_window_ms,
                min_spacing_ms: poll.min_spacing_ms,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_config(extra: &str) -> String {
        format!(
            r#"
[server]
base_url = "http://127.0.0.1:5000/"

{extra}
"#
        )
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = Config::parse(&server_config("")).unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.server.name, "default");
        assert_eq!(config.server.timeout, Duration::from_secs(30));
        assert!(config.server.username.is_none());
        assert_eq!(config.list.page_size, 10);
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.poll.min_spacing_ms, 800);
        assert_eq!(config.poll.idle_interval_ms, 10_000);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[server]
base_url = "https://mail.example.com"
name = "work"
timeout_secs = 5
username = "me"
password_command = "echo secret"

[list]
page_size = 25

[poll]
fast_interval_ms = 500
slow_interval_ms = 2000
idle_interval_ms = 20000
fast_window_ms = 0
min_spacing_ms = 100
"#,
        )
        .unwrap();

        assert_eq!(config.server.name, "work");
        assert_eq!(config.server.username.as_deref(), Some("me"));
        assert_eq!(config.list.page_size, 25);
        assert_eq!(config.poll.fast_interval_ms, 500);
        assert_eq!(config.poll.fast_window_ms, 0);
    }

    #[test]
    fn test_missing_server_section() {
        let err = Config::parse("[list]\npage_size = 10").unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("[server]"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_unknown_key_errors() {
        let err = Config::parse(&server_config("[list]\nrows = 3")).unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("unknown field"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_rejects_zero_page_size_and_intervals() {
        assert!(Config::parse(&server_config("[list]\npage_size = 0")).is_err());
        let err = Config::parse(&server_config("[poll]\nslow_interval_ms = 0")).unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("slow_interval_ms"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_rejects_bad_scheme_and_half_auth() {
        let err = Config::parse("[server]\nbase_url = \"ftp://x\"").unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("http://"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }

        let err = Config::parse(
            "[server]\nbase_url = \"http://x\"\nusername = \"me\"",
        )
        .unwrap_err();
        match err {
            ConfigError::Parse(msg) => assert!(msg.contains("together"), "got: {}", msg),
            _ => panic!("expected parse error"),
        }
    }
}
