use crate::Result;
use crate::auth::{Credential, InstallationTokenIssuer, TokenIssuer};
use crate::config::{Config, OptionalMetric};
use crate::harvest::{Aggregator, FetchOutcome, Fetcher, Paginator, PrefixSniffer, RateMonitor, Record, Snapshot, Sniffer, Target, TargetResolver, decode};
use ohno::{EnrichableExt, app_err};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

const LOG_TARGET: &str = " harvester";

/// Runs scrape cycles: rate gate, resolution, pagination, fetching, decoding and aggregation.
///
/// Cycles are serialised; a second call to [`Harvester::scrape`] waits for the one in flight.
#[derive(Debug)]
pub struct Harvester {
    config: Config,
    resolver: TargetResolver,
    paginator: Paginator,
    fetcher: Fetcher,
    rate: RateMonitor,
    sniffer: Arc<dyn Sniffer>,
    cycle: Mutex<()>,
}

impl Harvester {
    /// Create a harvester, loading the GitHub App key when App auth is configured.
    pub fn new(config: Config) -> Result<Self> {
        let issuer: Option<Arc<dyn TokenIssuer>> = match &config.github_app {
            Some(app) => Some(Arc::new(InstallationTokenIssuer::new(
                app,
                &config.api_base()?,
                config.request_timeout(),
                &config.user_agent,
            )?)),
            None => None,
        };

        Self::with_parts(config, issuer, Arc::new(PrefixSniffer))
    }

    /// Create a harvester with an explicit token issuer and body sniffer.
    ///
    /// With an issuer the credential starts out empty and the first cycle's rate gate obtains a
    /// token. Without one, the static token or token file is used as is.
    pub fn with_parts(config: Config, issuer: Option<Arc<dyn TokenIssuer>>, sniffer: Arc<dyn Sniffer>) -> Result<Self> {
        config.validate()?;

        let token = if issuer.is_some() { None } else { config.static_token()? };
        let credential = Arc::new(Credential::new(token.as_deref())?);

        let resolver = TargetResolver::new(&config)?;
        let fetcher = Fetcher::new(credential, &config)?;
        let rate = RateMonitor::new(fetcher.clone(), resolver.rate_limit()?, config.rate_limit_floor, issuer);

        Ok(Self {
            paginator: Paginator::new(fetcher.clone()),
            config,
            resolver,
            fetcher,
            rate,
            sniffer,
            cycle: Mutex::new(()),
        })
    }

    /// Run one scrape cycle.
    ///
    /// Per-target failures are logged, counted in [`Snapshot::scrape_errors`] and leave the
    /// affected data out of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential could not be refreshed or the API rate limit was hit.
    pub async fn scrape(&self) -> Result<Snapshot> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();

        log::info!(target: LOG_TARGET, "starting scrape cycle");

        let rate_limit = self
            .rate
            .check_and_refresh()
            .await
            .map_err(|e| e.enrich_with(|| "scrape cycle aborted before fetching".to_string()))?;

        let mut aggregator = Aggregator::new(&self.config.optional_metrics, &self.config.organisations);

        let listings = self.resolver.listings(&self.config)?;
        let records = self.collect(listings, &mut aggregator).await?;
        aggregator.add(records);

        // Explicit repositories a listing already returned are not fetched again.
        let mut explicit = Vec::new();
        for (key, target) in self.resolver.explicit_repositories(&self.config)? {
            if aggregator.has_collected(&key) {
                log::info!(target: LOG_TARGET, "skipping {key}: already collected from an organisation or user listing");
            } else {
                explicit.push(target);
            }
        }

        let records = self.collect(explicit, &mut aggregator).await?;
        aggregator.add(records);

        let mut details = Vec::new();
        for key in aggregator.repository_keys() {
            details.extend(self.resolver.repository_details(&key, &self.config)?);
        }

        if self.config.wants(OptionalMetric::Members) {
            for org in &self.config.organisations {
                details.extend(self.resolver.organisation_details(org)?);
            }
        }

        let records = self.collect(details, &mut aggregator).await?;
        aggregator.add(records);

        let snapshot = aggregator.finish(rate_limit);

        log::info!(
            target: LOG_TARGET,
            "scrape cycle collected {} repositories with {} errors in {:.3}s",
            snapshot.repositories.len(),
            snapshot.scrape_errors,
            start.elapsed().as_secs_f64()
        );

        Ok(snapshot)
    }

    /// Paginate, fetch and decode `targets`.
    ///
    /// Records come back in page order. Soft failures mark the target incomplete.
    async fn collect(&self, targets: Vec<Target>, aggregator: &mut Aggregator) -> Result<Vec<Record>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let requested: Vec<_> = targets.iter().map(|t| t.kind().clone()).collect();
        let pages = self.paginator.expand(targets).await?;

        let paged: HashSet<_> = pages.iter().map(Target::kind).collect();
        let dropped: Vec<_> = requested.into_iter().filter(|kind| !paged.contains(kind)).collect();
        for kind in dropped {
            aggregator.record_error();
            aggregator.mark_incomplete(kind);
        }

        let order: HashMap<_, _> = pages.iter().enumerate().map(|(i, t)| (t.url().clone(), i)).collect();
        let mut results = self.fetcher.fetch_all(pages).await;
        results.sort_by_key(|r| order.get(r.target().url()).copied().unwrap_or(usize::MAX));

        if let Some(limited) = results.iter().find(|r| r.is_rate_limited()) {
            return Err(limited
                .error()
                .unwrap_or_else(|| app_err!("API rate limit exceeded"))
                .enrich_with(|| "scrape cycle aborted".to_string()));
        }

        let mut records = Vec::new();
        for result in results {
            let (target, outcome) = result.into_parts();
            let FetchOutcome::Success { body, .. } = outcome else {
                aggregator.record_error();
                aggregator.mark_incomplete(target.kind().clone());
                continue;
            };

            match decode(self.sniffer.as_ref(), target.kind(), &body) {
                Ok(decoded) => records.extend(decoded),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "could not decode {target}: {e:#}");
                    aggregator.record_error();
                    aggregator.mark_incomplete(target.kind().clone());
                }
            }
        }

        Ok(records)
    }
}
