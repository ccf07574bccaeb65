use crate::Result;
use crate::harvest::{OrganisationMetrics, RepositoryMetrics, Snapshot};
use core::fmt::Write;
use ohno::IntoAppError;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

#[derive(Debug, Clone, Copy)]
struct Gauge {
    name: &'static str,
    help: &'static str,
}

const fn gauge(name: &'static str, help: &'static str) -> Gauge {
    Gauge { name, help }
}

const REPO_STARS: Gauge = gauge("github_repo_stars", "Total number of Stars for given repository");
const REPO_OPEN_ISSUES: Gauge = gauge("github_repo_open_issues", "Total number of open issues for given repository");
const REPO_PULL_REQUESTS: Gauge = gauge("github_repo_pull_request_count", "Total number of pull requests for given repository");
const REPO_COMMITS: Gauge = gauge("github_repo_commit_count", "Total number of commits for given repository");
const REPO_WATCHERS: Gauge = gauge("github_repo_watchers", "Total number of watchers/subscribers for given repository");
const REPO_FORKS: Gauge = gauge("github_repo_forks", "Total number of forks for given repository");
const REPO_SIZE: Gauge = gauge("github_repo_size_kb", "Size in KB for given repository");
const REPO_RELEASES: Gauge = gauge("github_repo_releases", "Number of releases for a repository");
const REPO_RELEASE_DOWNLOADS: Gauge = gauge("github_repo_release_downloads", "Download count for a given release");
const ORG_MEMBERS: Gauge = gauge("github_org_members", "Number of members in an organisation");
const ORG_COLLABORATORS: Gauge = gauge("github_org_collaborators", "Number outside collaborators in an organisation");
const ORG_PENDING_INVITATIONS: Gauge = gauge("github_org_pending_invitations", "Number of pending invitations");
const RATE_LIMIT: Gauge = gauge("github_rate_limit", "Number of API queries allowed in a 60 minute window");
const RATE_REMAINING: Gauge = gauge("github_rate_remaining", "Number of API queries remaining in the current window");
const RATE_RESET: Gauge = gauge(
    "github_rate_reset",
    "The time at which the current rate limit window resets in UTC epoch seconds",
);
const SCRAPE_ERRORS: Gauge = gauge(
    "github_exporter_scrape_errors",
    "Number of targets that could not be collected in the last scrape",
);
const LAST_SCRAPE_SUCCESS: Gauge = gauge(
    "github_exporter_last_scrape_success",
    "Whether the last scrape completed (1) or was aborted (0)",
);

const REPO_LABELS: &[&str] = &["repo", "user", "private", "fork", "archived", "license", "language"];
const RELEASE_LABELS: &[&str] = &[
    "repo",
    "user",
    "private",
    "fork",
    "archived",
    "license",
    "language",
    "release",
    "name",
    "created_at",
];
const ORG_LABELS: &[&str] = &["organisation"];

/// Label values in the order of the family's label names, and the gauge value.
type Sample = (Vec<String>, i64);

/// A registry holding one snapshot's worth of gauges.
#[derive(Debug, Default)]
struct Exposition {
    registry: Registry,
}

impl Exposition {
    /// Register `gauge` with `samples`; families without samples are left out.
    fn family(&self, gauge: Gauge, label_names: &[&str], samples: Vec<Sample>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let vec = IntGaugeVec::new(Opts::new(gauge.name, gauge.help), label_names)
            .into_app_err_with(|| format!("defining metric {}", gauge.name))?;

        for (values, value) in samples {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            vec.get_metric_with_label_values(&values)
                .into_app_err_with(|| format!("labelling metric {}", gauge.name))?
                .set(value);
        }

        self.registry
            .register(Box::new(vec))
            .into_app_err_with(|| format!("registering metric {}", gauge.name))
    }

    fn single(&self, gauge: Gauge, value: i64) -> Result<()> {
        self.family(gauge, &[], vec![(Vec::new(), value)])
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .into_app_err("encoding metrics")?;

        writer.write_str(&String::from_utf8(buffer).into_app_err("encoding metrics")?)?;
        Ok(())
    }
}

/// Render `snapshot` as a Prometheus text exposition.
///
/// Families without samples are left out. Optional sub-metrics that were not collected for a
/// repository produce no sample for it.
pub fn generate<W: Write>(snapshot: &Snapshot, writer: &mut W) -> Result<()> {
    let repos = &snapshot.repositories;
    let exposition = Exposition::default();

    exposition.family(REPO_STARS, REPO_LABELS, per_repo(repos, |m| Some(m.repository.stargazers_count)))?;
    exposition.family(REPO_OPEN_ISSUES, REPO_LABELS, per_repo(repos, |m| Some(m.open_issues())))?;
    exposition.family(REPO_PULL_REQUESTS, REPO_LABELS, per_repo(repos, |m| m.open_pulls))?;
    exposition.family(REPO_COMMITS, REPO_LABELS, per_repo(repos, |m| m.commit_count))?;
    exposition.family(REPO_WATCHERS, REPO_LABELS, per_repo(repos, |m| Some(m.repository.subscribers_count)))?;
    exposition.family(REPO_FORKS, REPO_LABELS, per_repo(repos, |m| Some(m.repository.forks_count)))?;
    exposition.family(REPO_SIZE, REPO_LABELS, per_repo(repos, |m| Some(m.repository.size)))?;
    exposition.family(
        REPO_RELEASES,
        REPO_LABELS,
        per_repo(repos, |m| m.releases.as_ref().map(|r| r.len() as u64)),
    )?;

    let downloads: Vec<Sample> = repos
        .iter()
        .flat_map(|m| {
            m.releases.iter().flatten().flat_map(move |release| {
                release.assets.iter().map(move |asset| {
                    let created_at = asset.created_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                    let mut values = repo_label_values(m);
                    values.extend([release.tag_name.clone(), asset.name.clone(), created_at]);
                    (values, to_sample(asset.download_count))
                })
            })
        })
        .collect();
    exposition.family(REPO_RELEASE_DOWNLOADS, RELEASE_LABELS, downloads)?;

    let orgs = &snapshot.organisations;
    exposition.family(ORG_MEMBERS, ORG_LABELS, per_org(orgs, |o| o.members))?;
    exposition.family(ORG_COLLABORATORS, ORG_LABELS, per_org(orgs, |o| o.outside_collaborators))?;
    exposition.family(ORG_PENDING_INVITATIONS, ORG_LABELS, per_org(orgs, |o| o.pending_invitations))?;

    if let Some(rate) = &snapshot.rate_limit {
        exposition.single(RATE_LIMIT, to_sample(rate.limit))?;
        exposition.single(RATE_REMAINING, to_sample(rate.remaining))?;
        exposition.single(RATE_RESET, rate.reset.timestamp())?;
    }

    exposition.single(SCRAPE_ERRORS, to_sample(snapshot.scrape_errors as u64))?;
    exposition.single(LAST_SCRAPE_SUCCESS, 1)?;

    exposition.encode(writer)
}

/// Render the exposition of an aborted scrape: only the scrape-health gauge, set to 0.
pub fn generate_failure<W: Write>(writer: &mut W) -> Result<()> {
    let exposition = Exposition::default();
    exposition.single(LAST_SCRAPE_SUCCESS, 0)?;
    exposition.encode(writer)
}

fn per_repo(repos: &[RepositoryMetrics], value: impl Fn(&RepositoryMetrics) -> Option<u64>) -> Vec<Sample> {
    repos
        .iter()
        .filter_map(|m| value(m).map(|v| (repo_label_values(m), to_sample(v))))
        .collect()
}

fn per_org(orgs: &[OrganisationMetrics], value: impl Fn(&OrganisationMetrics) -> Option<u64>) -> Vec<Sample> {
    orgs.iter()
        .filter_map(|o| value(o).map(|v| (vec![o.name.clone()], to_sample(v))))
        .collect()
}

/// Values for [`REPO_LABELS`].
fn repo_label_values(m: &RepositoryMetrics) -> Vec<String> {
    let repo = &m.repository;
    vec![
        repo.name.clone(),
        repo.owner.login.clone(),
        repo.private.to_string(),
        repo.fork.to_string(),
        repo.archived.to_string(),
        repo.license.as_ref().map(|l| l.key.clone()).unwrap_or_default(),
        repo.language.clone().unwrap_or_default(),
    ]
}

fn to_sample(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::{License, Owner, RateLimitSnapshot, Release, ReleaseAsset, Repository};
    use chrono::DateTime;

    fn repository() -> Repository {
        Repository {
            name: "widgets".to_string(),
            owner: Owner { login: "acme".to_string() },
            private: false,
            fork: true,
            archived: false,
            license: Some(License { key: "mit".to_string() }),
            language: Some("Rust".to_string()),
            stargazers_count: 42,
            forks_count: 7,
            open_issues_count: 5,
            subscribers_count: 3,
            size: 1024,
        }
    }

    fn render(snapshot: &Snapshot) -> String {
        let mut out = String::new();
        generate(snapshot, &mut out).unwrap();
        out
    }

    /// The value of the `family` sample carrying every label in `labels`.
    fn sample<'a>(out: &'a str, family: &str, labels: &[(&str, &str)]) -> Option<&'a str> {
        out.lines()
            .filter(|line| line.split(['{', ' ']).next() == Some(family))
            .find(|line| labels.iter().all(|(k, v)| line.contains(&format!("{k}=\"{v}\""))))
            .and_then(|line| line.rsplit(' ').next())
    }

    const WIDGETS: &[(&str, &str)] = &[
        ("repo", "widgets"),
        ("user", "acme"),
        ("private", "false"),
        ("fork", "true"),
        ("archived", "false"),
        ("license", "mit"),
        ("language", "Rust"),
    ];

    #[test]
    fn test_basic_repository_metrics() {
        let snapshot = Snapshot {
            repositories: vec![RepositoryMetrics {
                repository: repository(),
                open_pulls: None,
                releases: None,
                commit_count: None,
            }],
            organisations: Vec::new(),
            rate_limit: Some(RateLimitSnapshot {
                limit: 5000,
                remaining: 4000,
                reset: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
            }),
            scrape_errors: 2,
        };

        let out = render(&snapshot);

        assert!(out.contains("# HELP github_repo_stars Total number of Stars for given repository\n# TYPE github_repo_stars gauge\n"));
        assert_eq!(sample(&out, "github_repo_stars", WIDGETS), Some("42"));
        assert_eq!(sample(&out, "github_repo_open_issues", WIDGETS), Some("5"));
        assert_eq!(sample(&out, "github_repo_watchers", WIDGETS), Some("3"));
        assert_eq!(sample(&out, "github_repo_forks", WIDGETS), Some("7"));
        assert_eq!(sample(&out, "github_repo_size_kb", WIDGETS), Some("1024"));
        assert!(out.contains("github_rate_limit 5000\n"));
        assert!(out.contains("github_rate_remaining 4000\n"));
        assert!(out.contains("github_rate_reset 1704067200\n"));
        assert!(out.contains("github_exporter_scrape_errors 2\n"));
        assert!(out.contains("github_exporter_last_scrape_success 1\n"));

        // Not collected, so not exported.
        assert!(!out.contains("github_repo_pull_request_count"));
        assert!(!out.contains("github_repo_releases"));
        assert!(!out.contains("github_org_members"));
    }

    #[test]
    fn test_optional_metrics() {
        let snapshot = Snapshot {
            repositories: vec![RepositoryMetrics {
                repository: repository(),
                open_pulls: Some(2),
                releases: Some(vec![Release {
                    name: Some("First".to_string()),
                    tag_name: "v1.0.0".to_string(),
                    created_at: None,
                    assets: vec![ReleaseAsset {
                        name: "widgets.tar.gz".to_string(),
                        download_count: 12,
                        created_at: DateTime::from_timestamp(1_704_067_200, 0),
                    }],
                }]),
                commit_count: Some(99),
            }],
            organisations: vec![OrganisationMetrics {
                name: "acme".to_string(),
                members: Some(4),
                outside_collaborators: None,
                pending_invitations: Some(1),
            }],
            rate_limit: None,
            scrape_errors: 0,
        };

        let out = render(&snapshot);

        assert_eq!(sample(&out, "github_repo_open_issues", WIDGETS), Some("3"));
        assert_eq!(sample(&out, "github_repo_pull_request_count", WIDGETS), Some("2"));
        assert_eq!(sample(&out, "github_repo_commit_count", WIDGETS), Some("99"));
        assert_eq!(sample(&out, "github_repo_releases", WIDGETS), Some("1"));

        let mut asset = WIDGETS.to_vec();
        asset.extend([
            ("release", "v1.0.0"),
            ("name", "widgets.tar.gz"),
            ("created_at", "2024-01-01T00:00:00+00:00"),
        ]);
        assert_eq!(sample(&out, "github_repo_release_downloads", &asset), Some("12"));

        assert!(out.contains("github_org_members{organisation=\"acme\"} 4\n"));
        assert!(out.contains("github_org_pending_invitations{organisation=\"acme\"} 1\n"));
        assert!(!out.contains("github_org_collaborators"));
        assert!(!out.contains("github_rate_limit"));
    }

    #[test]
    fn test_families_are_contiguous() {
        let mut other = repository();
        other.name = "gadgets".to_string();

        let snapshot = Snapshot {
            repositories: [repository(), other]
                .into_iter()
                .map(|repository| RepositoryMetrics {
                    repository,
                    open_pulls: None,
                    releases: None,
                    commit_count: None,
                })
                .collect(),
            organisations: Vec::new(),
            rate_limit: None,
            scrape_errors: 0,
        };

        let out = render(&snapshot);
        let stars: Vec<_> = out
            .lines()
            .enumerate()
            .filter(|(_, l)| l.starts_with("github_repo_stars{"))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(stars.len(), 2);
        assert_eq!(stars[1], stars[0] + 1);
        assert_eq!(out.matches("# TYPE github_repo_stars gauge").count(), 1);
    }

    #[test]
    fn test_label_values_are_escaped() {
        let mut repo = repository();
        repo.name = "we\"ird\\name".to_string();
        repo.language = Some("multi\nline".to_string());

        let snapshot = Snapshot {
            repositories: vec![RepositoryMetrics {
                repository: repo,
                open_pulls: None,
                releases: None,
                commit_count: None,
            }],
            ..Snapshot::default()
        };

        let out = render(&snapshot);
        assert!(out.contains(r#"repo="we\"ird\\name""#));
        assert!(out.contains(r#"language="multi\nline""#));
    }

    #[test]
    fn test_failure_exposition() {
        let mut out = String::new();
        generate_failure(&mut out).unwrap();
        assert_eq!(
            out,
            "# HELP github_exporter_last_scrape_success Whether the last scrape completed (1) or was aborted (0)\n\
             # TYPE github_exporter_last_scrape_success gauge\n\
             github_exporter_last_scrape_success 0\n"
        );
    }
}
