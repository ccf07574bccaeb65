use crate::config::OptionalMetric;
use crate::harvest::{ProcessedKeys, RateLimitSnapshot, Record, Release, RepoKey, Repository, Roster, TargetKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Everything collected for one repository.
///
/// Optional sub-metrics are `None` when they are not enabled or could not be collected completely
/// in this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryMetrics {
    pub repository: Repository,
    pub open_pulls: Option<u64>,
    pub releases: Option<Vec<Release>>,
    pub commit_count: Option<u64>,
}

impl RepositoryMetrics {
    /// Open issues, excluding pull requests when their count is known.
    #[must_use]
    pub fn open_issues(&self) -> u64 {
        self.open_pulls
            .map_or(self.repository.open_issues_count, |pulls| self.repository.open_issues_count.saturating_sub(pulls))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganisationMetrics {
    pub name: String,
    pub members: Option<u64>,
    pub outside_collaborators: Option<u64>,
    pub pending_invitations: Option<u64>,
}

/// The complete, deduplicated result of one scrape cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Sorted by owner, then name
    pub repositories: Vec<RepositoryMetrics>,
    pub organisations: Vec<OrganisationMetrics>,
    pub rate_limit: Option<RateLimitSnapshot>,

    /// Soft errors hit while collecting this snapshot
    pub scrape_errors: usize,
}

type Identity = (String, String);

/// Merges decoded records into a [`Snapshot`].
///
/// Repositories are deduplicated on first sight. Sub-resource records are grouped by the
/// repository or organisation they belong to.
#[derive(Debug, Default)]
pub struct Aggregator {
    optional_metrics: BTreeSet<OptionalMetric>,
    organisations: Vec<String>,
    keys: ProcessedKeys,
    repositories: Vec<Repository>,
    pulls: HashMap<Identity, HashSet<u64>>,
    releases: HashMap<Identity, Vec<Release>>,
    commits: HashMap<Identity, HashSet<String>>,
    rosters: HashMap<(String, Roster), u64>,
    incomplete: HashSet<TargetKind>,
    errors: usize,
}

impl Aggregator {
    #[must_use]
    pub fn new(optional_metrics: &BTreeSet<OptionalMetric>, organisations: &[String]) -> Self {
        Self {
            optional_metrics: optional_metrics.clone(),
            organisations: organisations.to_vec(),
            ..Self::default()
        }
    }

    /// Add records, dropping repositories already seen in this cycle.
    pub fn add(&mut self, records: impl IntoIterator<Item = Record>) {
        for record in records {
            match record {
                Record::Repository(repo) => {
                    if self.keys.admit(&repo.key()) {
                        self.repositories.push(repo);
                    }
                }
                Record::PullRequest(key, pr) => {
                    let _ = self.pulls.entry(key.identity()).or_default().insert(pr.number);
                }
                Record::Release(key, release) => self.releases.entry(key.identity()).or_default().push(release),
                Record::Commit(key, commit) => {
                    let _ = self.commits.entry(key.identity()).or_default().insert(commit.sha);
                }
                Record::Member(org, roster, _) => *self.rosters.entry((org.into_string(), roster)).or_default() += 1,
            }
        }
    }

    /// Whether a repository with this key was already collected in this cycle.
    #[must_use]
    pub fn has_collected(&self, key: &RepoKey) -> bool {
        self.keys.seen(key)
    }

    /// Keys of the repositories collected so far, in the order they were first seen.
    #[must_use]
    pub fn repository_keys(&self) -> Vec<RepoKey> {
        self.repositories.iter().map(Repository::key).collect()
    }

    /// Note that a target's data is missing or partial, so its metric is not exported.
    pub fn mark_incomplete(&mut self, kind: TargetKind) {
        let _ = self.incomplete.insert(kind);
    }

    /// Count a soft error against the cycle.
    pub const fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Add `records` and produce the snapshot.
    #[must_use]
    pub fn aggregate(mut self, records: Vec<Record>, rate_limit: Option<RateLimitSnapshot>) -> Snapshot {
        self.add(records);
        self.finish(rate_limit)
    }

    #[must_use]
    pub fn finish(mut self, rate_limit: Option<RateLimitSnapshot>) -> Snapshot {
        let mut repositories: Vec<_> = core::mem::take(&mut self.repositories)
            .into_iter()
            .map(|repository| self.repository_metrics(repository))
            .collect();
        repositories.sort_by_cached_key(|m| m.repository.key().identity());

        let organisations = if self.optional_metrics.contains(&OptionalMetric::Members) {
            self.organisations.iter().map(|org| self.organisation_metrics(org)).collect()
        } else {
            Vec::new()
        };

        Snapshot {
            repositories,
            organisations,
            rate_limit,
            scrape_errors: self.errors,
        }
    }

    fn repository_metrics(&mut self, repository: Repository) -> RepositoryMetrics {
        let key = repository.key();
        let identity = key.identity();

        let open_pulls = self
            .complete(OptionalMetric::Pulls, TargetKind::Pulls(key.clone()))
            .then(|| self.pulls.get(&identity).map_or(0, |numbers| numbers.len() as u64));

        let releases = self
            .complete(OptionalMetric::Releases, TargetKind::Releases(key.clone()))
            .then(|| self.releases.remove(&identity).unwrap_or_default());

        let commit_count = self
            .complete(OptionalMetric::Commits, TargetKind::Commits(key))
            .then(|| self.commits.get(&identity).map_or(0, |shas| shas.len() as u64));

        RepositoryMetrics {
            repository,
            open_pulls,
            releases,
            commit_count,
        }
    }

    fn organisation_metrics(&self, org: &str) -> OrganisationMetrics {
        let count = |roster: Roster, kind: TargetKind| {
            (!self.incomplete.contains(&kind)).then(|| self.rosters.get(&(org.to_string(), roster)).copied().unwrap_or(0))
        };

        OrganisationMetrics {
            name: org.to_string(),
            members: count(Roster::Members, TargetKind::Members(Box::from(org))),
            outside_collaborators: count(Roster::OutsideCollaborators, TargetKind::OutsideCollaborators(Box::from(org))),
            pending_invitations: count(Roster::PendingInvitations, TargetKind::Invitations(Box::from(org))),
        }
    }

    fn complete(&self, metric: OptionalMetric, kind: TargetKind) -> bool {
        self.optional_metrics.contains(&metric) && !self.incomplete.contains(&kind)
    }
}
