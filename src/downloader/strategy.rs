//! Ordered acquisition strategies

use std::fmt;

use crate::types::ItemId;

/// Kind of artifact a strategy fetches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// Source archive, unpacked after download
    Source,
    /// Rendered document (PDF)
    Rendered,
}

/// Which version of the item a strategy targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetVersion {
    /// The queued version
    Exact,
    /// The version before the queued one
    Previous,
}

/// One step of the fallback chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Strategy {
    /// Artifact to fetch
    pub artifact: Artifact,
    /// Version to fetch it for
    pub version: TargetVersion,
}

/// Fallback chain, tried in order until one succeeds
pub const STRATEGIES: [Strategy; 4] = [
    Strategy {
        artifact: Artifact::Source,
        version: TargetVersion::Exact,
    },
    Strategy {
        artifact: Artifact::Rendered,
        version: TargetVersion::Exact,
    },
    Strategy {
        artifact: Artifact::Source,
        version: TargetVersion::Previous,
    },
    Strategy {
        artifact: Artifact::Rendered,
        version: TargetVersion::Previous,
    },
];

impl Strategy {
    /// Item this strategy fetches for `item`, `None` when it does not apply
    pub fn target(&self, item: &ItemId) -> Option<ItemId> {
        match self.version {
            TargetVersion::Exact => Some(item.clone()),
            TargetVersion::Previous => item.previous(),
        }
    }
}

/// Applicable strategies for `item` with their targets, in order
pub fn plan(item: &ItemId) -> Vec<(Strategy, ItemId)> {
    STRATEGIES
        .iter()
        .filter_map(|strategy| strategy.target(item).map(|target| (*strategy, target)))
        .collect()
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artifact = match self.artifact {
            Artifact::Source => "source",
            Artifact::Rendered => "rendered",
        };
        match self.version {
            TargetVersion::Exact => f.write_str(artifact),
            TargetVersion::Previous => write!(f, "{artifact}-previous"),
        }
    }
}
