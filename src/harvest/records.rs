use crate::Result;
use crate::harvest::{RepoKey, Shape, Sniffer, TargetKind};
use chrono::{DateTime, Utc};
use ohno::{IntoAppError, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct License {
    pub key: String,
}

/// The repository fields exported as metrics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,

    /// Includes open pull requests
    #[serde(default)]
    pub open_issues_count: u64,

    /// Watchers in the UI sense; `watchers_count` is a legacy alias of the star count
    #[serde(default)]
    pub subscribers_count: u64,

    /// Size in KB
    #[serde(default)]
    pub size: u64,
}

impl Repository {
    #[must_use]
    pub fn key(&self) -> RepoKey {
        RepoKey::new(&self.owner.login, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Release {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// An organisation member, outside collaborator or invitee.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    /// Invitations by e-mail have no login
    #[serde(default)]
    pub login: Option<String>,
}

/// Which organisation roster a [`Member`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Roster {
    Members,
    OutsideCollaborators,
    PendingInvitations,
}

/// A decoded domain entity, tagged with what it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Repository(Repository),
    PullRequest(RepoKey, PullRequest),
    Release(RepoKey, Release),
    Commit(RepoKey, Commit),
    Member(Box<str>, Roster, Member),
}

/// Decode a response body for `kind` into records.
///
/// The sniffer decides between one object and an array. For repository listings it also decides
/// whether the body actually holds commits, which are then attributed to the repository in their
/// `url`.
///
/// # Errors
///
/// Returns an error if the body does not decode under the sniffed shape.
pub fn decode(sniffer: &dyn Sniffer, kind: &TargetKind, body: &[u8]) -> Result<Vec<Record>> {
    let shape = sniffer.shape(body);

    match kind {
        TargetKind::Repository(_) | TargetKind::OrganisationRepos(_) | TargetKind::UserRepos(_) => {
            if sniffer.is_commit(body) {
                decode_as::<Commit>(shape, body)?
                    .into_iter()
                    .map(|commit| {
                        let key = commit.url.as_deref().and_then(RepoKey::from_api_url);
                        match key {
                            Some(key) => Ok(Record::Commit(key, commit)),
                            None => Err(ohno::app_err!("commit {} carries no repository URL", commit.sha)),
                        }
                    })
                    .collect()
            } else {
                Ok(decode_as::<Repository>(shape, body)?.into_iter().map(Record::Repository).collect())
            }
        }
        TargetKind::Pulls(repo) => Ok(decode_as::<PullRequest>(shape, body)?
            .into_iter()
            .map(|pr| Record::PullRequest(repo.clone(), pr))
            .collect()),
        TargetKind::Releases(repo) => Ok(decode_as::<Release>(shape, body)?
            .into_iter()
            .map(|release| Record::Release(repo.clone(), release))
            .collect()),
        TargetKind::Commits(repo) => Ok(decode_as::<Commit>(shape, body)?
            .into_iter()
            .map(|commit| Record::Commit(repo.clone(), commit))
            .collect()),
        TargetKind::Members(org) => decode_roster(org, Roster::Members, shape, body),
        TargetKind::OutsideCollaborators(org) => decode_roster(org, Roster::OutsideCollaborators, shape, body),
        TargetKind::Invitations(org) => decode_roster(org, Roster::PendingInvitations, shape, body),
        TargetKind::RateLimit => bail!("rate limit responses are read from headers, not decoded"),
    }
}

fn decode_roster(org: &str, roster: Roster, shape: Shape, body: &[u8]) -> Result<Vec<Record>> {
    Ok(decode_as::<Member>(shape, body)?
        .into_iter()
        .map(|member| Record::Member(Box::from(org), roster, member))
        .collect())
}

fn decode_as<T: DeserializeOwned>(shape: Shape, body: &[u8]) -> Result<Vec<T>> {
    match shape {
        Shape::Array => serde_json::from_slice::<Vec<T>>(body).into_app_err("decoding JSON array"),
        Shape::Single => serde_json::from_slice::<T>(body)
            .map(|item| vec![item])
            .into_app_err("decoding JSON object"),
    }
}
