// Command line / environment configuration and its validated, immutable form.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const MIN_POLL_INTERVAL_MS: u64 = 200;
const MAX_POLL_INTERVAL_MS: u64 = 5000;

/// Command line arguments for fluxim-server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// API token used to authenticate against the upstream generation service.
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Base URL of the upstream generation API.
    #[arg(long, env = "REPLICATE_API_BASE", default_value = "https://api.replicate.com/v1")]
    pub api_base: String,

    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "FLUXIM_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    pub host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Accepted passwords, joined by the separator.
    #[arg(long, env = "PASSWORDS", default_value = "", hide_env_values = true)]
    pub passwords: String,

    #[arg(long, env = "PASSWORDS_SEP", default_value = ",")]
    pub passwords_sep: String,

    /// Directory served as static files at `/`.
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    /// Directory receiving generated images.
    #[arg(long, env = "OUTPUT_DIR", default_value = "public/replicate")]
    pub output_dir: PathBuf,

    /// Delete generated images older than this many hours. 0 or less disables purging.
    #[arg(long, env = "PURGE_IMAGES_OLDER_THAN", default_value_t = 0, allow_negative_numbers = true)]
    pub purge_older_than: i64,

    /// Seconds between purge sweeps.
    #[arg(long, env = "PURGE_INTERVAL_SECS", default_value_t = 3600)]
    pub purge_interval: u64,

    /// Locale used to format log timestamps (e.g. pl-PL, en-US).
    #[arg(long, env = "LOG_LOCALE", default_value = "pl-PL")]
    pub locale: String,

    /// File receiving appended log lines.
    #[arg(long, env = "LOG_FILE", default_value = "fluxim2.log")]
    pub log_file: PathBuf,

    /// Prefix of generated file names.
    #[arg(long, env = "FILE_PREFIX", default_value = "fluxim2")]
    pub file_prefix: String,

    /// Embed provenance text into PNG outputs.
    #[arg(long, env = "EMBED_METADATA", action = clap::ArgAction::SetTrue)]
    pub embed_metadata: bool,

    /// Log at DEBUG level.
    #[arg(long, env = "DEBUG_LOG", action = clap::ArgAction::SetTrue)]
    pub debug: bool,

    /// Upper bound in seconds for one upstream run, including polling and downloads. 0 disables it.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 600)]
    pub upstream_timeout: u64,

    /// Milliseconds between prediction status polls.
    #[arg(long, env = "UPSTREAM_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("REPLICATE_API_TOKEN is not set")]
    MissingApiToken,
    #[error("file prefix '{0}' must be non-empty and contain only letters, digits, '-' or '_'")]
    InvalidFilePrefix(String),
    #[error("password separator must not be empty")]
    EmptyPasswordSeparator,
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create upstream client: {0}")]
    UpstreamClient(String),
}

/// Settings shared read-only by the dispatcher, writer and purge task.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_token: String,
    pub api_base: String,
    pub host: String,
    pub port: u16,
    pub passwords: Vec<String>,
    pub public_dir: PathBuf,
    pub output_dir: PathBuf,
    pub purge_older_than_hours: i64,
    pub purge_interval: Duration,
    pub locale: String,
    pub log_file: PathBuf,
    pub file_prefix: String,
    pub embed_metadata: bool,
    pub debug: bool,
    pub upstream_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl TryFrom<AppConfig> for RelayConfig {
    type Error = ConfigError;

    fn try_from(config: AppConfig) -> Result<Self, Self::Error> {
        let api_token = config
            .api_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingApiToken)?;

        if config.passwords_sep.is_empty() {
            return Err(ConfigError::EmptyPasswordSeparator);
        }
        let passwords = config
            .passwords
            .split(config.passwords_sep.as_str())
            .filter(|password| !password.is_empty())
            .map(str::to_string)
            .collect();

        if config.file_prefix.is_empty()
            || !config
                .file_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidFilePrefix(config.file_prefix));
        }

        Ok(Self {
            api_token,
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            host: config.host,
            port: config.port,
            passwords,
            public_dir: config.public_dir,
            output_dir: config.output_dir,
            purge_older_than_hours: config.purge_older_than,
            purge_interval: Duration::from_secs(config.purge_interval.max(1)),
            locale: config.locale,
            log_file: config.log_file,
            file_prefix: config.file_prefix,
            embed_metadata: config.embed_metadata,
            debug: config.debug,
            upstream_timeout: (config.upstream_timeout > 0)
                .then(|| Duration::from_secs(config.upstream_timeout)),
            poll_interval: Duration::from_millis(
                config
                    .poll_interval_ms
                    .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
            ),
        })
    }
}

impl RelayConfig {
    /// Creates the output directory if it does not exist yet.
    pub fn prepare_output_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| ConfigError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_app_config() -> AppConfig {
    AppConfig {
        api_token: Some("r8_test".into()),
        api_base: "https://api.replicate.com/v1/".into(),
        host: "localhost".into(),
        port: 3000,
        passwords: "alpha,beta".into(),
        passwords_sep: ",".into(),
        public_dir: "public".into(),
        output_dir: "public/replicate".into(),
        purge_older_than: 0,
        purge_interval: 3600,
        locale: "pl-PL".into(),
        log_file: "fluxim2.log".into(),
        file_prefix: "fluxim2".into(),
        embed_metadata: false,
        debug: false,
        upstream_timeout: 600,
        poll_interval_ms: 1000,
    }
}
