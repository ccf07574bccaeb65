//! Export GitHub repository, organisation and rate-limit data as Prometheus metrics.
//!
//! # Overview
//!
//! `github-exporter` polls the GitHub REST API (or a GitHub Enterprise deployment) for the
//! repositories of the configured organisations and users, plus any explicitly listed
//! repositories, and renders what it found as a Prometheus text exposition.
//!
//! # Quick Start
//!
//! Scrape once and print the metrics:
//!
//! ```bash
//! GITHUB_TOKEN=... github-exporter scrape --org rust-lang --repo tokio-rs/tokio
//! ```
//!
//! Rewrite a file for the node exporter's textfile collector every five minutes:
//!
//! ```bash
//! github-exporter poll --org rust-lang --interval 300 -o /var/lib/node_exporter/github.prom
//! ```
//!
//! # Configuration
//!
//! Settings come from an optional configuration file (`--config`), overridden by flags and
//! environment variables:
//!
//! | Variable                     | Meaning                                             |
//! |------------------------------|-----------------------------------------------------|
//! | `API_URL`                    | Base API URL, default `https://api.github.com`      |
//! | `REPOS`                      | Comma-separated `owner/name` pairs                  |
//! | `ORGS`                       | Comma-separated organisations                       |
//! | `USERS`                      | Comma-separated users                               |
//! | `OPTIONAL_METRICS`           | Any of `pulls`, `releases`, `commits`, `members`    |
//! | `GITHUB_TOKEN`               | Personal access token                               |
//! | `GITHUB_TOKEN_FILE`          | File holding the token                              |
//! | `GITHUB_APP`                 | `true` to authenticate as a GitHub App installation |
//! | `GITHUB_APP_KEY_PATH`        | The App's private key                               |
//! | `GITHUB_APP_ID`              | The App id                                          |
//! | `GITHUB_APP_INSTALLATION_ID` | The installation id                                 |
//! | `GITHUB_RATE_LIMIT`          | Installation token refresh floor, default 15000     |
//!
//! A TOML configuration file looks like this:
//!
//! ```toml
//! api_url = "https://api.github.com"
//! organisations = ["acme"]
//! repositories = ["octocat/hello-world"]
//! optional_metrics = ["pulls", "releases"]
//! max_concurrency = 16
//! request_timeout_secs = 10
//! ```
//!
//! # Metrics
//!
//! - `github_repo_stars`, `github_repo_forks`, `github_repo_watchers`, `github_repo_size_kb`,
//!   `github_repo_open_issues`: always exported, labelled with `repo`, `user`, `private`, `fork`,
//!   `archived`, `license` and `language`
//! - `github_repo_pull_request_count`, `github_repo_releases`, `github_repo_release_downloads`,
//!   `github_repo_commit_count`: exported when the matching optional metric is enabled
//! - `github_org_members`, `github_org_collaborators`, `github_org_pending_invitations`: exported
//!   with the `members` optional metric
//! - `github_rate_limit`, `github_rate_remaining`, `github_rate_reset`
//! - `github_exporter_scrape_errors`, `github_exporter_last_scrape_success`

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use github_exporter::Result;

mod commands;

use crate::commands::{PollArgs, ScrapeArgs, ValidateArgs, poll, scrape, validate_config};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "github-exporter", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scrape cycle and print the metrics
    Scrape(Box<ScrapeArgs>),
    /// Run scrape cycles on a fixed interval, rewriting an output file after each
    Poll(Box<PollArgs>),
    /// Validate the configuration without contacting the API
    Validate(Box<ValidateArgs>),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        Command::Scrape(args) => scrape(args).await,
        Command::Poll(args) => poll(args).await,
        Command::Validate(args) => validate_config(args),
    }
}
