use crate::Result;
use crate::harvest::{FetchOutcome, Fetcher, Target};
use ohno::{IntoAppError, app_err, bail};
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

const LOG_TARGET: &str = " paginator";

/// Largest page count accepted from a `Link` header.
const MAX_PAGES: u32 = 10_000;

/// Pattern to extract the `rel="last"` entry of a `Link` header
static LAST_LINK_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"<([^>]*)>\s*;\s*rel="?last"?"#).expect("invalid regex"));

/// Read the last page number from a `Link` header.
///
/// Returns `Ok(None)` when the header has no `rel="last"` entry, meaning there is only one page.
///
/// # Errors
///
/// Returns an error if the `last` entry exists but its URL or page number cannot be parsed, or if
/// the page number is above the accepted page count.
pub fn last_page(link: &str) -> Result<Option<u32>> {
    let Some(captures) = LAST_LINK_REGEX.captures(link) else {
        return Ok(None);
    };

    let raw = captures.get(1).map_or("", |m| m.as_str());
    let url = Url::parse(raw).into_app_err_with(|| format!("invalid 'last' link URL '{raw}'"))?;

    let Some(page) = url.query_pairs().find(|(k, _)| k == "page").map(|(_, v)| v.into_owned()) else {
        bail!("'last' link '{raw}' has no page parameter");
    };

    let page = page
        .parse::<u32>()
        .into_app_err_with(|| format!("invalid page number '{page}' in 'last' link"))?;

    if page == 0 {
        bail!("invalid page number 0 in 'last' link");
    }

    if page > MAX_PAGES {
        bail!("page count {page} in 'last' link exceeds the limit of {MAX_PAGES}");
    }

    Ok(Some(page))
}

/// Expands base targets into one target per page.
#[derive(Debug, Clone)]
pub struct Paginator {
    fetcher: Fetcher,
}

impl Paginator {
    #[must_use]
    pub const fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Probe every target not yet expanded and add a target for each further page.
    ///
    /// Targets come back grouped by their base target, in input order, pages ascending. Targets
    /// that were already expanded pass through untouched, so expanding twice yields the same list.
    /// A target whose probe fails or returns 404 is dropped. A malformed `last` link leaves the
    /// target as a single page.
    ///
    /// # Errors
    ///
    /// Returns an error if any probe hits the API rate limit.
    pub async fn expand(&self, targets: Vec<Target>) -> Result<Vec<Target>> {
        let mut groups: Vec<Vec<Target>> = Vec::with_capacity(targets.len());
        let mut pending: HashMap<Target, Vec<usize>> = HashMap::new();
        let mut probes = Vec::new();

        for target in targets {
            let slot = groups.len();
            if target.is_expanded() {
                groups.push(vec![target]);
            } else {
                groups.push(Vec::new());
                let slots = pending.entry(target.clone()).or_default();
                if slots.is_empty() {
                    probes.push(target);
                }
                slots.push(slot);
            }
        }

        if probes.is_empty() {
            return Ok(groups.into_iter().flatten().collect());
        }

        log::debug!(target: LOG_TARGET, "probing {} targets for pagination", probes.len());

        for result in self.fetcher.fetch_all(probes).await {
            if result.is_rate_limited() {
                return Err(result
                    .error()
                    .unwrap_or_else(|| app_err!("rate limit exceeded while probing {}", result.target())));
            }

            let (target, outcome) = result.into_parts();
            let FetchOutcome::Success { link, .. } = outcome else {
                log::debug!(target: LOG_TARGET, "dropping {target}: it could not be fetched");
                continue;
            };

            let pages = pages_for(&target, link.as_deref());
            for slot in pending.remove(&target).unwrap_or_default() {
                if let Some(group) = groups.get_mut(slot) {
                    group.clone_from(&pages);
                }
            }
        }

        Ok(groups.into_iter().flatten().collect())
    }
}

fn pages_for(target: &Target, link: Option<&str>) -> Vec<Target> {
    let last = match link.map(last_page).transpose() {
        Ok(last) => last.flatten().unwrap_or(1),
        Err(e) => {
            log::warn!(target: LOG_TARGET, "treating {target} as a single page: {e:#}");
            1
        }
    };

    if last > 1 {
        log::debug!(target: LOG_TARGET, "{target} has {last} pages");
    }

    let mut pages = vec![target.with_last_page(last)];
    pages.extend((2..=last).map(|page| target.for_page(page, last)));
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use crate::config::Config;
    use crate::harvest::TargetKind;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GITHUB_LINK: &str = r#"<https://api.github.com/organizations/1/repos?per_page=100&page=2>; rel="next", <https://api.github.com/organizations/1/repos?per_page=100&page=7>; rel="last""#;

    fn paginator() -> Paginator {
        let fetcher = Fetcher::new(Arc::new(Credential::anonymous()), &Config::default()).unwrap();
        Paginator::new(fetcher)
    }

    fn target(server: &MockServer, route: &str) -> Target {
        let url = Url::parse(&format!("{}{route}?per_page=100", server.uri())).unwrap();
        Target::new(TargetKind::OrganisationRepos(Box::from("acme")), url)
    }

    #[test]
    fn test_last_page() {
        assert_eq!(last_page(GITHUB_LINK).unwrap(), Some(7));
        assert_eq!(
            last_page(r#"<https://api.github.com/x?page=3&per_page=100>; rel="last""#).unwrap(),
            Some(3)
        );
    }

    #[test]
    fn test_last_page_absent() {
        assert_eq!(last_page("").unwrap(), None);
        assert_eq!(
            last_page(r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=1>; rel="first""#).unwrap(),
            None
        );
    }

    #[test]
    fn test_last_page_malformed() {
        assert!(last_page(r#"<https://api.github.com/x?page=abc>; rel="last""#).is_err());
        assert!(last_page(r#"<https://api.github.com/x?page=-1>; rel="last""#).is_err());
        assert!(last_page(r#"<https://api.github.com/x?page=0>; rel="last""#).is_err());
        assert!(last_page(r#"<https://api.github.com/x>; rel="last""#).is_err());
        assert!(last_page(r#"<not a url>; rel="last""#).is_err());
    }

    #[test]
    fn test_last_page_limit() {
        assert_eq!(last_page(r#"<https://api.github.com/x?page=10000>; rel="last""#).unwrap(), Some(10_000));
        assert!(last_page(r#"<https://api.github.com/x?page=10001>; rel="last""#).is_err());
        assert!(last_page(r#"<https://api.github.com/x?page=4294967295>; rel="last""#).is_err());
    }

    #[tokio::test]
    async fn test_expand_adds_pages() {
        let mock_server = MockServer::start().await;
        let link = format!(r#"<{}/orgs/acme/repos?per_page=100&page=3>; rel="last""#, mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]").insert_header("link", link.as_str()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = target(&mock_server, "/orgs/acme/repos");
        let expanded = paginator().expand(vec![base.clone()]).await.unwrap();

        let pages: Vec<_> = expanded.iter().map(Target::page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(expanded.iter().all(|t| t.last_page() == Some(3)));
        assert_eq!(expanded[0].url(), base.url());
        assert!(expanded[2].url().as_str().ends_with("/orgs/acme/repos?per_page=100&page=3"));
    }

    #[tokio::test]
    async fn test_expand_is_idempotent() {
        let mock_server = MockServer::start().await;
        let link = format!(r#"<{}/orgs/acme/repos?per_page=100&page=2>; rel="last""#, mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]").insert_header("link", link.as_str()))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/single"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let paginator = paginator();
        let once = paginator
            .expand(vec![target(&mock_server, "/orgs/acme/repos"), target(&mock_server, "/single")])
            .await
            .unwrap();
        let requests_after_first = mock_server.received_requests().await.unwrap().len();

        let twice = paginator.expand(once.clone()).await.unwrap();

        assert_eq!(once.len(), 3);
        assert_eq!(once, twice);
        assert_eq!(mock_server.received_requests().await.unwrap().len(), requests_after_first);
    }

    #[tokio::test]
    async fn test_expand_keeps_input_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]").set_delay(core::time::Duration::from_millis(50)))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let a = target(&mock_server, "/a");
        let b = target(&mock_server, "/b");
        let expanded = paginator().expand(vec![a.clone(), b.clone()]).await.unwrap();

        assert_eq!(expanded[0].url(), a.url());
        assert_eq!(expanded[1].url(), b.url());
    }

    #[tokio::test]
    async fn test_malformed_last_link_falls_back_to_single_page() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[]")
                    .insert_header("link", r#"<https://api.github.com/x?page=lots>; rel="last""#),
            )
            .mount(&mock_server)
            .await;

        let expanded = paginator().expand(vec![target(&mock_server, "/orgs/acme/repos")]).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].last_page(), Some(1));
    }

    #[tokio::test]
    async fn test_oversized_last_link_falls_back_to_single_page() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/orgs/acme/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("[]")
                    .insert_header("link", r#"<https://api.github.com/x?page=4294967295>; rel="last""#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let expanded = paginator().expand(vec![target(&mock_server, "/orgs/acme/repos")]).await.unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].page(), 1);
        assert_eq!(expanded[0].last_page(), Some(1));
    }

    #[tokio::test]
    async fn test_failed_probe_drops_target() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/fine"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let fine = target(&mock_server, "/fine");
        let expanded = paginator()
            .expand(vec![target(&mock_server, "/missing"), target(&mock_server, "/broken"), fine.clone()])
            .await
            .unwrap();

        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].url(), fine.url());
    }

    #[tokio::test]
    async fn test_rate_limited_probe_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
            .mount(&mock_server)
            .await;

        assert!(paginator().expand(vec![target(&mock_server, "/limited")]).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_targets_are_probed_once() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/same"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let same = target(&mock_server, "/same");
        let expanded = paginator().expand(vec![same.clone(), same]).await.unwrap();
        assert_eq!(expanded.len(), 2);
    }
}
