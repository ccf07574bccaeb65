use crate::Result;
use crate::config::{Config, OptionalMetric};
use crate::harvest::RepoKey;
use core::fmt::{Display, Formatter};
use ohno::IntoAppError;
use url::Url;

/// What a target's response is expected to contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A single explicitly configured repository
    Repository(RepoKey),

    /// All repositories of an organisation
    OrganisationRepos(Box<str>),

    /// All repositories of a user
    UserRepos(Box<str>),

    /// Open pull requests of a repository
    Pulls(RepoKey),

    Releases(RepoKey),

    Commits(RepoKey),

    /// Members of an organisation
    Members(Box<str>),

    /// Outside collaborators of an organisation
    OutsideCollaborators(Box<str>),

    /// Pending invitations of an organisation
    Invitations(Box<str>),

    RateLimit,
}

/// One page-addressable API endpoint.
///
/// Targets are never mutated once issued; pagination derives new targets from an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    url: Url,
    kind: TargetKind,
    page: u32,
    last_page: Option<u32>,
}

impl Target {
    #[must_use]
    pub const fn new(kind: TargetKind, url: Url) -> Self {
        Self {
            url,
            kind,
            page: 1,
            last_page: None,
        }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn kind(&self) -> &TargetKind {
        &self.kind
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// The last page index, known once the target has been through pagination.
    #[must_use]
    pub const fn last_page(&self) -> Option<u32> {
        self.last_page
    }

    #[must_use]
    pub const fn is_expanded(&self) -> bool {
        self.last_page.is_some()
    }

    /// Copy of this target with the last page recorded.
    #[must_use]
    pub fn with_last_page(&self, last_page: u32) -> Self {
        Self {
            last_page: Some(last_page),
            ..self.clone()
        }
    }

    /// Copy of this target addressing `page`, keeping every other query parameter.
    #[must_use]
    pub fn for_page(&self, page: u32, last_page: u32) -> Self {
        let retained: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != "page")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.url.clone();
        let _ = url
            .query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("page", &page.to_string());

        Self {
            url,
            kind: self.kind.clone(),
            page,
            last_page: Some(last_page),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Turns configured identifiers into base request targets.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    base: Url,
    per_page: String,
}

impl TargetResolver {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            base: config.api_base()?,
            per_page: config.per_page.to_string(),
        })
    }

    /// Listing targets for every configured organisation and user.
    pub fn listings(&self, config: &Config) -> Result<Vec<Target>> {
        let mut targets = Vec::with_capacity(config.organisations.len() + config.users.len());

        for org in &config.organisations {
            let url = self.endpoint(&["orgs", org, "repos"], &[])?;
            targets.push(Target::new(TargetKind::OrganisationRepos(Box::from(org.as_str())), url));
        }

        for user in &config.users {
            let url = self.endpoint(&["users", user, "repos"], &[])?;
            targets.push(Target::new(TargetKind::UserRepos(Box::from(user.as_str())), url));
        }

        Ok(targets)
    }

    /// Targets for the explicitly configured repositories, with their keys.
    pub fn explicit_repositories(&self, config: &Config) -> Result<Vec<(RepoKey, Target)>> {
        config
            .repositories
            .iter()
            .map(|repo| {
                let key = RepoKey::parse(repo)?;
                let url = self.plain_endpoint(&["repos", key.owner(), key.name()])?;
                Ok((key.clone(), Target::new(TargetKind::Repository(key), url)))
            })
            .collect()
    }

    /// Sub-resource targets of one repository for the enabled optional metrics.
    pub fn repository_details(&self, repo: &RepoKey, config: &Config) -> Result<Vec<Target>> {
        let mut targets = Vec::new();

        if config.wants(OptionalMetric::Pulls) {
            let url = self.endpoint(&["repos", repo.owner(), repo.name(), "pulls"], &[("state", "open")])?;
            targets.push(Target::new(TargetKind::Pulls(repo.clone()), url));
        }

        if config.wants(OptionalMetric::Releases) {
            let url = self.endpoint(&["repos", repo.owner(), repo.name(), "releases"], &[])?;
            targets.push(Target::new(TargetKind::Releases(repo.clone()), url));
        }

        if config.wants(OptionalMetric::Commits) {
            let url = self.endpoint(&["repos", repo.owner(), repo.name(), "commits"], &[])?;
            targets.push(Target::new(TargetKind::Commits(repo.clone()), url));
        }

        Ok(targets)
    }

    /// Membership targets of one organisation.
    pub fn organisation_details(&self, org: &str) -> Result<Vec<Target>> {
        Ok(vec![
            Target::new(TargetKind::Members(Box::from(org)), self.endpoint(&["orgs", org, "members"], &[])?),
            Target::new(
                TargetKind::OutsideCollaborators(Box::from(org)),
                self.endpoint(&["orgs", org, "outside_collaborators"], &[])?,
            ),
            Target::new(TargetKind::Invitations(Box::from(org)), self.endpoint(&["orgs", org, "invitations"], &[])?),
        ])
    }

    pub fn rate_limit(&self) -> Result<Target> {
        Ok(Target::new(TargetKind::RateLimit, self.plain_endpoint(&["rate_limit"])?))
    }

    /// A listing endpoint, always carrying `per_page`.
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.plain_endpoint(segments)?;
        let _ = url
            .query_pairs_mut()
            .extend_pairs(query.iter().copied())
            .append_pair("per_page", &self.per_page);
        Ok(url)
    }

    fn plain_endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        let _ = url
            .path_segments_mut()
            .ok()
            .into_app_err_with(|| format!("API URL '{}' cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            api_url: "https://ghe.example.com/api/v3".to_string(),
            organisations: vec!["acme".to_string()],
            users: vec!["octocat".to_string()],
            repositories: vec!["acme/widgets".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn test_resolve_repositories() {
        let config = config();
        let resolver = TargetResolver::new(&config).unwrap();
        let mut targets = resolver.listings(&config).unwrap();
        let explicit = resolver.explicit_repositories(&config).unwrap();
        assert_eq!(explicit[0].0, RepoKey::new("acme", "widgets"));
        targets.extend(explicit.into_iter().map(|(_, target)| target));

        let urls: Vec<_> = targets.iter().map(|t| t.url().as_str().to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://ghe.example.com/api/v3/orgs/acme/repos?per_page=100",
                "https://ghe.example.com/api/v3/users/octocat/repos?per_page=100",
                "https://ghe.example.com/api/v3/repos/acme/widgets",
            ]
        );

        assert_eq!(targets[0].kind(), &TargetKind::OrganisationRepos(Box::from("acme")));
        assert_eq!(targets[2].kind(), &TargetKind::Repository(RepoKey::new("acme", "widgets")));
        assert!(targets.iter().all(|t| t.page() == 1 && !t.is_expanded()));
    }

    #[test]
    fn test_resolve_details_follow_allow_list() {
        let mut config = config();
        let resolver = TargetResolver::new(&config).unwrap();
        let repo = RepoKey::new("acme", "widgets");

        assert!(resolver.repository_details(&repo, &config).unwrap().is_empty());

        let _ = config.optional_metrics.insert(OptionalMetric::Pulls);
        let _ = config.optional_metrics.insert(OptionalMetric::Commits);
        let targets = resolver.repository_details(&repo, &config).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(
            targets[0].url().as_str(),
            "https://ghe.example.com/api/v3/repos/acme/widgets/pulls?state=open&per_page=100"
        );
        assert_eq!(targets[1].kind(), &TargetKind::Commits(repo));
    }

    #[test]
    fn test_resolve_organisation_details() {
        let config = config();
        let resolver = TargetResolver::new(&config).unwrap();
        let targets = resolver.organisation_details("acme").unwrap();

        let paths: Vec<_> = targets.iter().map(|t| t.url().path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/api/v3/orgs/acme/members",
                "/api/v3/orgs/acme/outside_collaborators",
                "/api/v3/orgs/acme/invitations",
            ]
        );
    }

    #[test]
    fn test_rate_limit_target() {
        let resolver = TargetResolver::new(&Config::default()).unwrap();
        assert_eq!(resolver.rate_limit().unwrap().url().as_str(), "https://api.github.com/rate_limit");
    }

    #[test]
    fn test_for_page_keeps_other_parameters() {
        let url = Url::parse("https://api.github.com/orgs/acme/repos?per_page=100").unwrap();
        let target = Target::new(TargetKind::OrganisationRepos(Box::from("acme")), url);

        let page3 = target.for_page(3, 5);
        assert_eq!(page3.url().as_str(), "https://api.github.com/orgs/acme/repos?per_page=100&page=3");
        assert_eq!(page3.page(), 3);
        assert_eq!(page3.last_page(), Some(5));
        assert_eq!(page3.kind(), target.kind());

        // Re-paging replaces rather than appends.
        let page4 = page3.for_page(4, 5);
        assert_eq!(page4.url().as_str(), "https://api.github.com/orgs/acme/repos?per_page=100&page=4");

        // The source target is untouched.
        assert_eq!(target.page(), 1);
        assert!(!target.is_expanded());
    }
}
