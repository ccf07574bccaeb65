use crate::Result;
use crate::config::OptionalMetric;
use crate::harvest::RepoKey;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use url::Url;

/// Public GitHub API endpoint
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Installation tokens are refreshed when the reported hourly limit drops below this value.
const DEFAULT_RATE_LIMIT_FLOOR: u64 = 15_000;

/// GitHub caps `per_page` at 100.
const MAX_PER_PAGE: u32 = 100;

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_rate_limit_floor() -> u64 {
    DEFAULT_RATE_LIMIT_FLOOR
}

const fn default_max_concurrency() -> usize {
    16
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_per_page() -> u32 {
    MAX_PER_PAGE
}

fn default_user_agent() -> String {
    concat!("github-exporter/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Credentials of a GitHub App installation used to mint short-lived tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppAuthConfig {
    /// Path to the App's PEM-encoded RSA private key
    pub key_path: Utf8PathBuf,

    pub app_id: u64,

    pub installation_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the REST API, e.g. `https://api.github.com` or `https://ghe.example.com/api/v3`
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Explicit repositories in `owner/name` form
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Organisations whose repositories are all harvested
    #[serde(default)]
    pub organisations: Vec<String>,

    /// Users whose repositories are all harvested
    #[serde(default)]
    pub users: Vec<String>,

    /// Static access token
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// File holding an access token, used when no static token is given
    #[serde(default)]
    pub token_file: Option<Utf8PathBuf>,

    /// GitHub App credentials; when present, installation tokens take precedence over static tokens
    #[serde(default)]
    pub github_app: Option<AppAuthConfig>,

    /// Refresh the installation token when the reported limit is below this value
    #[serde(default = "default_rate_limit_floor")]
    pub rate_limit_floor: u64,

    /// Maximum number of requests in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page size requested from listing endpoints
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Sub-resource metrics to harvest in addition to the repository basics
    #[serde(default)]
    pub optional_metrics: BTreeSet<OptionalMetric>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            repositories: Vec::new(),
            organisations: Vec::new(),
            users: Vec::new(),
            token: None,
            token_file: None,
            github_app: None,
            rate_limit_floor: default_rate_limit_floor(),
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            per_page: default_per_page(),
            optional_metrics: BTreeSet::new(),
            user_agent: default_user_agent(),
        }
    }
}

/// Values supplied on the command line or through the environment.
///
/// Every populated field replaces the corresponding value from the configuration file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub repositories: Vec<String>,
    pub organisations: Vec<String>,
    pub users: Vec<String>,
    pub token: Option<String>,
    pub token_file: Option<Utf8PathBuf>,
    pub github_app: bool,
    pub app_key_path: Option<Utf8PathBuf>,
    pub app_id: Option<u64>,
    pub app_installation_id: Option<u64>,
    pub rate_limit_floor: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub optional_metrics: Vec<OptionalMetric>,
}

impl Config {
    /// Load configuration from a file, or use defaults when no file is given
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading exporter configuration from {path}"))?;

        let extension = path.extension().unwrap_or_default();
        let config: Self = match extension {
            "toml" => toml::from_str(&text).into_app_err_with(|| format!("parsing TOML configuration from {path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(&text).into_app_err_with(|| format!("parsing YAML configuration from {path}"))?,
            "json" => serde_json::from_str(&text).into_app_err_with(|| format!("parsing JSON configuration from {path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        Ok(config)
    }

    /// Overlay command-line and environment values onto this configuration.
    ///
    /// List entries are trimmed and empty entries dropped, so `REPOS="a/b, c/d,"` yields two repositories.
    ///
    /// # Errors
    ///
    /// Returns an error if App authentication is requested without all of its parameters
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(api_url) = overrides.api_url {
            self.api_url = api_url;
        }

        if let Some(list) = clean_list(overrides.repositories) {
            self.repositories = list;
        }

        if let Some(list) = clean_list(overrides.organisations) {
            self.organisations = list;
        }

        if let Some(list) = clean_list(overrides.users) {
            self.users = list;
        }

        if overrides.token.is_some() {
            self.token = overrides.token;
        }

        if overrides.token_file.is_some() {
            self.token_file = overrides.token_file;
        }

        if overrides.github_app {
            let (Some(key_path), Some(app_id), Some(installation_id)) =
                (overrides.app_key_path, overrides.app_id, overrides.app_installation_id)
            else {
                bail!("GitHub App authentication requires a key path, an app id and an installation id");
            };

            self.github_app = Some(AppAuthConfig {
                key_path,
                app_id,
                installation_id,
            });
        }

        if let Some(floor) = overrides.rate_limit_floor {
            self.rate_limit_floor = floor;
        }

        if let Some(max) = overrides.max_concurrency {
            self.max_concurrency = max;
        }

        if let Some(secs) = overrides.request_timeout_secs {
            self.request_timeout_secs = secs;
        }

        if !overrides.optional_metrics.is_empty() {
            self.optional_metrics = overrides.optional_metrics.into_iter().collect();
        }

        Ok(())
    }

    /// Check the configuration for values the harvester cannot work with
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value found
    pub fn validate(&self) -> Result<()> {
        let _ = self.api_base()?;

        for repo in &self.repositories {
            let _ = RepoKey::parse(repo)?;
        }

        if self.max_concurrency == 0 {
            bail!("max_concurrency must be at least 1");
        }

        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }

        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            bail!("per_page must be between 1 and {MAX_PER_PAGE}, got {}", self.per_page);
        }

        Ok(())
    }

    /// The API base URL, normalized to end with a slash so relative joins keep any path prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL does not parse or cannot carry a path
    pub fn api_base(&self) -> Result<Url> {
        let mut text = self.api_url.trim().to_string();
        if !text.ends_with('/') {
            text.push('/');
        }

        let url = Url::parse(&text).into_app_err_with(|| format!("parsing API URL '{}'", self.api_url))?;
        if url.cannot_be_a_base() {
            bail!("API URL '{}' cannot be used as a base URL", self.api_url);
        }

        Ok(url)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn wants(&self, metric: OptionalMetric) -> bool {
        self.optional_metrics.contains(&metric)
    }

    /// Resolve the static credential: the inline token if set, otherwise the trimmed contents of the token file.
    ///
    /// # Errors
    ///
    /// Returns an error if the token file cannot be read
    pub fn static_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Some(token.to_string()));
        }

        let Some(path) = &self.token_file else {
            return Ok(None);
        };

        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading token file {path}"))?;
        let token = text.trim();
        if token.is_empty() {
            bail!("token file {path} is empty");
        }

        Ok(Some(token.to_string()))
    }
}

fn clean_list(list: Vec<String>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = list
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if cleaned.is_empty() { None } else { Some(cleaned) }
}
