//! The harvesting pipeline.
//!
//! Configured identifiers become [`Target`]s, the [`Paginator`] expands them into one target per
//! page, the [`Fetcher`] issues the requests with bounded concurrency, [`decode`] turns bodies into
//! [`Record`]s and the [`Aggregator`] merges them into a deduplicated [`Snapshot`]. The
//! [`RateMonitor`] gates every cycle and refreshes installation tokens. [`Harvester`] ties it all
//! together.

mod aggregate;
mod dedup;
mod fetcher;
mod harvester;
mod paginator;
mod rate;
mod records;
mod repo_key;
mod sniffer;
mod target;
mod throttler;

pub use aggregate::{Aggregator, OrganisationMetrics, RepositoryMetrics, Snapshot};
pub use dedup::ProcessedKeys;
pub use fetcher::{FetchOutcome, FetchResult, Fetcher};
pub use harvester::Harvester;
pub use paginator::{Paginator, last_page};
pub use rate::{RateLimitSnapshot, RateMonitor};
pub use records::{Commit, License, Member, Owner, PullRequest, Record, Release, ReleaseAsset, Repository, Roster, decode};
pub use repo_key::RepoKey;
pub use sniffer::{PrefixSniffer, SchemaSniffer, Shape, Sniffer};
pub use target::{Target, TargetKind, TargetResolver};
pub use throttler::Throttler;
