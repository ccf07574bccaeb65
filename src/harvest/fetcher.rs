use crate::Result;
use crate::auth::Credential;
use crate::config::Config;
use crate::harvest::{RateLimitSnapshot, Target, Throttler};
use bytes::Bytes;
use ohno::app_err;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use std::sync::Arc;
use tokio::sync::mpsc;

const LOG_TARGET: &str = "   fetcher";

/// How a single request ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// 2xx with the full body read
    Success {
        body: Bytes,
        link: Option<String>,
        rate_limit: Option<RateLimitSnapshot>,
    },

    /// 404: the name is wrong or not visible to the current credential
    NotFound,

    /// 429, or 403 with no remaining quota
    RateLimited(Option<RateLimitSnapshot>),

    /// Transport failure or any other unexpected status
    Failed(ohno::AppError),

    /// Never sent because the fetch round was halted by a rate limit
    Aborted,
}

/// The result of one physical request.
#[derive(Debug)]
pub struct FetchResult {
    target: Target,
    status: Option<StatusCode>,
    outcome: FetchOutcome,
}

impl FetchResult {
    #[must_use]
    pub const fn new(target: Target, status: Option<StatusCode>, outcome: FetchOutcome) -> Self {
        Self { target, status, outcome }
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[must_use]
    pub const fn outcome(&self) -> &FetchOutcome {
        &self.outcome
    }

    #[must_use]
    pub fn into_parts(self) -> (Target, FetchOutcome) {
        (self.target, self.outcome)
    }

    /// Whether this result should stop the rest of the cycle.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.outcome, FetchOutcome::RateLimited(_) | FetchOutcome::Aborted)
    }

    /// A descriptive error for any non-success outcome.
    #[must_use]
    pub fn error(&self) -> Option<ohno::AppError> {
        match &self.outcome {
            FetchOutcome::Success { .. } => None,
            FetchOutcome::NotFound => Some(app_err!(
                "{} returned 404; ensure the repository, organisation or user name is correct and visible to the configured credential",
                self.target
            )),
            FetchOutcome::RateLimited(_) => Some(app_err!("{} was rejected: API rate limit exceeded", self.target)),
            FetchOutcome::Failed(e) => Some(app_err!("fetching {}: {e:#}", self.target)),
            FetchOutcome::Aborted => Some(app_err!("{} was not fetched because the API rate limit was exceeded", self.target)),
        }
    }
}

/// Issues GET requests with the current credential and bounded concurrency.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    credential: Arc<Credential>,
    max_concurrency: usize,
}

impl Fetcher {
    pub fn new(credential: Arc<Credential>, config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            credential,
            max_concurrency: config.max_concurrency,
        })
    }

    #[must_use]
    pub const fn credential(&self) -> &Arc<Credential> {
        &self.credential
    }

    /// Fetch a single target, leaving it to the caller to report failures.
    pub async fn fetch(&self, target: Target) -> FetchResult {
        fetch_one(&self.client, self.credential.header(), target).await
    }

    /// Fetch every target, returning exactly one result per target in completion order.
    ///
    /// Per-target failures are reported in their result and never fail the whole round. The first
    /// rate-limited response halts the round: requests not yet started come back as
    /// [`FetchOutcome::Aborted`].
    pub async fn fetch_all(&self, targets: Vec<Target>) -> Vec<FetchResult> {
        let expected = targets.len();
        if expected == 0 {
            return Vec::new();
        }

        log::debug!(target: LOG_TARGET, "fetching {expected} targets, at most {} at a time", self.max_concurrency);

        // Read once so the whole round uses the same credential.
        let auth = self.credential.header();
        let throttler = Throttler::new(self.max_concurrency);
        let (tx, mut rx) = mpsc::channel(expected);

        for target in targets {
            let tx = tx.clone();
            let client = self.client.clone();
            let auth = auth.clone();
            let throttler = Arc::clone(&throttler);

            drop(tokio::spawn(async move {
                let result = match throttler.acquire().await {
                    Some(_permit) => {
                        let result = fetch_one(&client, auth, target).await;
                        if result.is_rate_limited() {
                            throttler.halt();
                        }
                        result
                    }
                    None => FetchResult::new(target, None, FetchOutcome::Aborted),
                };

                let _ = tx.send(result).await;
            }));
        }

        drop(tx);

        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            log_outcome(&result);
            results.push(result);
            if results.len() == expected {
                break;
            }
        }

        if results.len() < expected {
            log::error!(target: LOG_TARGET, "{} of {expected} fetches ended without reporting a result", expected - results.len());
        }

        results
    }
}

async fn fetch_one(client: &reqwest::Client, auth: Option<HeaderValue>, target: Target) -> FetchResult {
    let mut request = client.get(target.url().clone()).header(ACCEPT, "application/vnd.github+json");
    if let Some(auth) = auth {
        request = request.header(AUTHORIZATION, auth);
    }

    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            let outcome = FetchOutcome::Failed(app_err!("request failed: {e}"));
            return FetchResult::new(target, None, outcome);
        }
    };

    let status = resp.status();
    let rate_limit = RateLimitSnapshot::from_headers(resp.headers());

    if status.is_success() {
        let link = header_string(resp.headers(), LINK);
        let outcome = match resp.bytes().await {
            Ok(body) => FetchOutcome::Success { body, link, rate_limit },
            Err(e) => FetchOutcome::Failed(app_err!("reading response body failed: {e}")),
        };
        return FetchResult::new(target, Some(status), outcome);
    }

    let outcome = if is_rate_limit_response(status, resp.headers()) {
        FetchOutcome::RateLimited(rate_limit)
    } else if status == StatusCode::NOT_FOUND {
        FetchOutcome::NotFound
    } else {
        FetchOutcome::Failed(app_err!("unexpected HTTP status {status}"))
    };

    FetchResult::new(target, Some(status), outcome)
}

/// 429 always means rate limited; 403 only when the quota is exhausted, since GitHub also
/// answers 403 for permission problems.
fn is_rate_limit_response(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }

    status == StatusCode::FORBIDDEN && header_string(headers, "x-ratelimit-remaining").as_deref() == Some("0")
}

fn header_string(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers.get(name)?.to_str().ok().map(|s| s.trim().to_string())
}

fn log_outcome(result: &FetchResult) {
    let status = result.status.map_or_else(|| "-".to_string(), |s| s.as_u16().to_string());

    match &result.outcome {
        FetchOutcome::Success { body, .. } => {
            log::debug!(target: LOG_TARGET, "fetched {} ({status}, {} bytes)", result.target, body.len());
        }
        FetchOutcome::Aborted => {
            log::debug!(target: LOG_TARGET, "skipped {} after rate limit", result.target);
        }
        FetchOutcome::RateLimited(_) => {
            if let Some(e) = result.error() {
                log::error!(target: LOG_TARGET, "{e:#}");
            }
        }
        FetchOutcome::NotFound | FetchOutcome::Failed(_) => {
            if let Some(e) = result.error() {
                log::warn!(target: LOG_TARGET, "{e:#}");
            }
        }
    }
}
