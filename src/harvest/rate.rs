use crate::Result;
use crate::auth::TokenIssuer;
use crate::harvest::{FetchOutcome, Fetcher, Target};
use chrono::{DateTime, Utc};
use ohno::EnrichableExt;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::sync::Arc;

const LOG_TARGET: &str = "      rate";

/// Quota reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    /// Requests allowed per window
    pub limit: u64,

    /// Requests left in the current window
    pub remaining: u64,

    /// When the current window resets
    pub reset: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// Read the `X-RateLimit-*` headers; `None` unless all three are present and numeric.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<u64>().ok();

        let limit = number("x-ratelimit-limit")?;
        let remaining = number("x-ratelimit-remaining")?;
        let reset = DateTime::from_timestamp(i64::try_from(number("x-ratelimit-reset")?).ok()?, 0)?;

        Some(Self { limit, remaining, reset })
    }
}

/// What a quota probe found out.
#[derive(Debug)]
enum Probe {
    /// The deployment does not do rate limiting, or does not say
    Disabled,

    Limits(RateLimitSnapshot),

    /// The credential was rejected outright
    Unauthorized,

    /// The probe itself failed; the quota is unknown
    Unavailable,
}

/// Checks the remaining quota before each cycle and refreshes installation tokens.
///
/// The credential moves `VALID -> REFRESHING -> VALID` when the reported limit is under the floor,
/// or `REFRESHING -> FAILED` when no new token can be obtained, which aborts the cycle. Refresh only
/// ever happens here, synchronously, at the start of a cycle.
#[derive(Debug)]
pub struct RateMonitor {
    fetcher: Fetcher,
    probe: Target,
    floor: u64,
    issuer: Option<Arc<dyn TokenIssuer>>,
}

impl RateMonitor {
    #[must_use]
    pub fn new(fetcher: Fetcher, probe: Target, floor: u64, issuer: Option<Arc<dyn TokenIssuer>>) -> Self {
        Self {
            fetcher,
            probe,
            floor,
            issuer,
        }
    }

    /// Probe the quota, refreshing the credential first if it is due.
    ///
    /// Returns the latest quota, or `None` when the deployment does not report one.
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh was due and failed.
    pub async fn check_and_refresh(&self) -> Result<Option<RateLimitSnapshot>> {
        let probe = self.probe().await;

        let Some(issuer) = &self.issuer else {
            return Ok(snapshot_of(probe));
        };

        let due = match &probe {
            Probe::Limits(snapshot) => snapshot.limit < self.floor,
            Probe::Unauthorized => true,
            Probe::Disabled | Probe::Unavailable => false,
        };

        if !due {
            return Ok(snapshot_of(probe));
        }

        log::info!(target: LOG_TARGET, "refreshing installation token (reported {probe:?}, floor {})", self.floor);

        let token = issuer
            .issue()
            .await
            .map_err(|e| e.enrich_with(|| "refreshing the installation token".to_string()))?;
        self.fetcher.credential().replace(&token)?;

        let refreshed = self.probe().await;
        if let Probe::Limits(snapshot) = &refreshed
            && snapshot.limit < self.floor
        {
            log::warn!(
                target: LOG_TARGET,
                "limit is still {} after refreshing the token, below the floor of {}",
                snapshot.limit,
                self.floor
            );
        }

        Ok(snapshot_of(refreshed))
    }

    async fn probe(&self) -> Probe {
        let result = self.fetcher.fetch(self.probe.clone()).await;
        let status = result.status();

        match result.into_parts().1 {
            FetchOutcome::Success {
                rate_limit: Some(snapshot), ..
            }
            | FetchOutcome::RateLimited(Some(snapshot)) => {
                log::debug!(
                    target: LOG_TARGET,
                    "limit {}, remaining {}, resets at {}",
                    snapshot.limit,
                    snapshot.remaining,
                    snapshot.reset
                );
                Probe::Limits(snapshot)
            }
            FetchOutcome::Success { rate_limit: None, .. } => {
                log::warn!(target: LOG_TARGET, "rate limit response carried no X-RateLimit headers");
                Probe::Disabled
            }
            FetchOutcome::NotFound => {
                log::info!(target: LOG_TARGET, "rate limiting is not enabled on this API");
                Probe::Disabled
            }
            FetchOutcome::Failed(_) if status == Some(StatusCode::UNAUTHORIZED) => {
                log::warn!(target: LOG_TARGET, "credential was rejected by the rate limit endpoint");
                Probe::Unauthorized
            }
            FetchOutcome::Failed(e) => {
                log::warn!(target: LOG_TARGET, "unable to obtain rate limit data: {e:#}");
                Probe::Unavailable
            }
            FetchOutcome::RateLimited(None) | FetchOutcome::Aborted => {
                log::warn!(target: LOG_TARGET, "rate limit endpoint refused the request without reporting limits");
                Probe::Unavailable
            }
        }
    }
}

fn snapshot_of(probe: Probe) -> Option<RateLimitSnapshot> {
    match probe {
        Probe::Limits(snapshot) => Some(snapshot),
        Probe::Disabled | Probe::Unauthorized | Probe::Unavailable => None,
    }
}
