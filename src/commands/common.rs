//! Arguments and setup shared by every subcommand.

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use github_exporter::Result;
use github_exporter::config::{Config, ConfigOverrides, OptionalMetric};
use ohno::IntoAppError;
use std::fs;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Configuration sources shared by all subcommands.
///
/// Flags and environment variables take precedence over the configuration file.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to configuration file (.toml, .yml, .yaml or .json)
    #[arg(long, short = 'c', value_name = "PATH", env = "GITHUB_EXPORTER_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Base URL of the GitHub API [default: https://api.github.com]
    #[arg(long, value_name = "URL", env = "API_URL", help_heading = "Targets")]
    pub api_url: Option<String>,

    /// Repositories to collect, as comma-separated owner/name pairs
    #[arg(long = "repo", value_name = "OWNER/NAME", env = "REPOS", value_delimiter = ',', help_heading = "Targets")]
    pub repositories: Vec<String>,

    /// Organisations whose repositories are collected
    #[arg(long = "org", value_name = "ORG", env = "ORGS", value_delimiter = ',', help_heading = "Targets")]
    pub organisations: Vec<String>,

    /// Users whose repositories are collected
    #[arg(long = "user", value_name = "USER", env = "USERS", value_delimiter = ',', help_heading = "Targets")]
    pub users: Vec<String>,

    /// Optional metrics to collect: pulls, releases, commits, members
    #[arg(long = "metric", value_name = "METRIC", env = "OPTIONAL_METRICS", value_delimiter = ',', ignore_case = true, help_heading = "Targets")]
    pub optional_metrics: Vec<OptionalMetric>,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true, help_heading = "Authentication")]
    pub github_token: Option<String>,

    /// File holding the GitHub token
    #[arg(long, value_name = "PATH", env = "GITHUB_TOKEN_FILE", help_heading = "Authentication")]
    pub github_token_file: Option<Utf8PathBuf>,

    /// Authenticate as a GitHub App installation
    #[arg(long, env = "GITHUB_APP", help_heading = "Authentication")]
    pub github_app: bool,

    /// Path to the GitHub App's private key
    #[arg(long, value_name = "PATH", env = "GITHUB_APP_KEY_PATH", help_heading = "Authentication")]
    pub github_app_key_path: Option<Utf8PathBuf>,

    /// GitHub App id
    #[arg(long, value_name = "ID", env = "GITHUB_APP_ID", help_heading = "Authentication")]
    pub github_app_id: Option<u64>,

    /// GitHub App installation id
    #[arg(long, value_name = "ID", env = "GITHUB_APP_INSTALLATION_ID", help_heading = "Authentication")]
    pub github_app_installation_id: Option<u64>,

    /// Refresh the installation token when the reported limit drops below this [default: 15000]
    #[arg(long, value_name = "LIMIT", env = "GITHUB_RATE_LIMIT", help_heading = "Authentication")]
    pub github_rate_limit: Option<u64>,

    /// Maximum number of requests in flight [default: 16]
    #[arg(long, value_name = "COUNT", help_heading = "Requests")]
    pub max_concurrency: Option<usize>,

    /// Per-request timeout in seconds [default: 10]
    #[arg(long, value_name = "SECONDS", help_heading = "Requests")]
    pub request_timeout: Option<u64>,
}

impl CommonArgs {
    /// Initialize logging and produce the validated configuration.
    pub fn prepare(&self) -> Result<Config> {
        init_logging(self.log_level);
        self.load_config()
    }

    /// Load the configuration file and overlay flags and environment variables.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_overrides(self.overrides())?;
        config.validate()?;
        Ok(config)
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            repositories: self.repositories.clone(),
            organisations: self.organisations.clone(),
            users: self.users.clone(),
            token: self.github_token.clone(),
            token_file: self.github_token_file.clone(),
            github_app: self.github_app,
            app_key_path: self.github_app_key_path.clone(),
            app_id: self.github_app_id,
            app_installation_id: self.github_app_installation_id,
            rate_limit_floor: self.github_rate_limit,
            max_concurrency: self.max_concurrency,
            request_timeout_secs: self.request_timeout,
            optional_metrics: self.optional_metrics.clone(),
        }
    }
}

/// Initialize logger based on log level
fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}

/// Replace `path` with `contents` so readers never see a partially written file.
pub fn write_atomically(path: &Utf8Path, contents: &str) -> Result<()> {
    let file_name = path.file_name().into_app_err_with(|| format!("output path {path} has no file name"))?;
    let staging = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&staging, contents).into_app_err_with(|| format!("writing {staging}"))?;
    fs::rename(&staging, path).into_app_err_with(|| format!("replacing {path}"))?;
    Ok(())
}
