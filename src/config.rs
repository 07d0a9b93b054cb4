use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Outbound client settings. No retries are ever configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    None,
    #[serde(alias = "in-memory")]
    Memory,
    #[serde(alias = "sqlite")]
    EmbeddedFile,
    #[serde(alias = "mysql")]
    RelationalRemote,
}

impl CacheMode {
    /// Parse a backend selector, falling back to `None` for unknown values
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("No cache provider found for type '{}', caching disabled", value);
            CacheMode::None
        })
    }
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(CacheMode::None),
            "memory" | "in-memory" => Ok(CacheMode::Memory),
            "sqlite" | "embedded-file" => Ok(CacheMode::EmbeddedFile),
            "mysql" | "relational-remote" => Ok(CacheMode::RelationalRemote),
            other => Err(format!("unknown cache mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub sqlite_file: PathBuf,
    pub mysql: MySqlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::Memory,
            sqlite_file: PathBuf::from("data/cache.db"),
            mysql: MySqlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub port: u16,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            password: None,
            database: None,
            port: 3306,
        }
    }
}

/// Fully specified connection settings for the remote store
#[derive(Debug, Clone)]
pub struct MySqlCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl MySqlConfig {
    /// Returns `None` when any required value is missing
    pub fn credentials(&self) -> Option<MySqlCredentials> {
        Some(MySqlCredentials {
            host: self.host.clone()?,
            user: self.user.clone()?,
            password: self.password.clone()?,
            database: self.database.clone()?,
            port: self.port,
        })
    }
}

/// Tracing setup, always taken from flags/environment so it is ready before the config loads
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

/// Environment-style settings, each flag falling back to its variable
#[derive(clap::Args, Debug, Clone)]
pub struct EnvArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "CACHE_MODE", default_value = "memory")]
    pub cache_mode: String,

    #[arg(long, env = "SQLITE_FILE", default_value = "data/cache.db")]
    pub sqlite_file: PathBuf,

    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    #[arg(long, env = "MYSQL_USER")]
    pub mysql_user: Option<String>,

    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: Option<String>,

    #[arg(long, env = "MYSQL_DATABASE")]
    pub mysql_database: Option<String>,

    #[arg(long, env = "MYSQL_PORT", default_value_t = 3306)]
    pub mysql_port: u16,

    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub upstream_timeout: Duration,

    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub upstream_connect_timeout: Duration,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl EnvArgs {
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from flags and environment variables
    pub fn from_env(args: &EnvArgs) -> Result<Self> {
        let config = Config {
            server: ServerConfig {
                host: args.host.clone(),
                port: args.port,
            },
            upstream: UpstreamConfig {
                timeout: args.upstream_timeout,
                connect_timeout: args.upstream_connect_timeout,
            },
            cache: CacheConfig {
                mode: CacheMode::parse_lenient(&args.cache_mode),
                sqlite_file: args.sqlite_file.clone(),
                mysql: MySqlConfig {
                    host: args.mysql_host.clone(),
                    user: args.mysql_user.clone(),
                    password: args.mysql_password.clone(),
                    database: args.mysql_database.clone(),
                    port: args.mysql_port,
                },
            },
            metrics: MetricsConfig {
                enabled: args.metrics_port.is_some(),
                port: args.metrics_port.unwrap_or(9090),
                ..MetricsConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be zero");
        }

        if self.upstream.timeout.is_zero() || self.upstream.connect_timeout.is_zero() {
            anyhow::bail!("Upstream timeouts must be greater than zero");
        }

        if self.metrics.enabled && self.metrics.port == self.server.port {
            anyhow::bail!("Metrics port {} collides with the proxy port", self.metrics.port);
        }

        // An incomplete remote store setup is not fatal, the factory falls back to no caching
        if self.cache.mode == CacheMode::RelationalRemote && self.cache.mysql.credentials().is_none() {
            warn!(
                "Missing settings for the MySQL cache provider. \
                 Required: MYSQL_HOST, MYSQL_USER, MYSQL_PASSWORD, MYSQL_DATABASE"
            );
        }

        Ok(())
    }
}

/// Parse durations such as `30`, `30s`, `5m` or `1h`
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let (num, multiplier) = if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else {
        (s, 1)
    };

    let num: u64 = num
        .trim()
        .parse()
        .map_err(|e| format!("invalid duration '{}': {}", s, e))?;
    let secs = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("invalid duration '{}': too large", s))?;
    Ok(Duration::from_secs(secs))
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
