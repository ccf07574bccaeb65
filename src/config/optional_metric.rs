use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Sub-resource metrics that are only harvested when explicitly enabled.
///
/// Each one costs at least one extra request per repository (or per organisation for
/// [`OptionalMetric::Members`]), so they are opt-in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display, EnumString, EnumIter, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OptionalMetric {
    /// Open pull requests per repository
    Pulls,

    /// Releases and their asset download counts per repository
    Releases,

    /// Commit count per repository
    Commits,

    /// Members, outside collaborators and pending invitations per organisation
    Members,
}
