use crate::Result;
use core::fmt::{Display, Formatter};
use ohno::bail;
use serde::Serialize;

/// The `(owner, name)` identity of a repository.
///
/// Equality is exact; use [`RepoKey::identity`] for the case-insensitive form GitHub itself applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RepoKey {
    owner: Box<str>,
    name: Box<str>,
}

impl RepoKey {
    #[must_use]
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: Box::from(owner),
            name: Box::from(name),
        }
    }

    /// Parse an `owner/name` pair.
    pub fn parse(text: &str) -> Result<Self> {
        let Some((owner, name)) = text.trim().split_once('/') else {
            bail!("invalid repository '{text}': expected 'owner/name'");
        };

        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{text}': expected 'owner/name'");
        }

        Ok(Self::new(owner, name))
    }

    /// Extract the repository from an API URL such as `https://api.github.com/repos/acme/widgets/commits/abc`.
    #[must_use]
    pub fn from_api_url(url: &str) -> Option<Self> {
        let mut segments = url.split('/').skip_while(|s| *s != "repos").skip(1);
        let owner = segments.next().filter(|s| !s.is_empty())?;
        let name = segments.next().filter(|s| !s.is_empty())?;
        Some(Self::new(owner, name))
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased `(owner, name)`, the key under which repositories are deduplicated.
    #[must_use]
    pub fn identity(&self) -> (String, String) {
        (self.owner.to_lowercase(), self.name.to_lowercase())
    }
}

impl Display for RepoKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
