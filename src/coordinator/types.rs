//! Public types for the tier coordinator.

use serde::Deserialize;
use thiserror::Error;

/// One of the three storage tiers.
///
/// Parses from the canonical names and from the short labels admin tooling
/// uses (`sdcs`, `redis`, `db`):
///
/// ```
/// use tiered_cache::Tier;
///
/// assert_eq!("sdcs".parse::<Tier>().unwrap(), Tier::Local);
/// assert_eq!("Redis".parse::<Tier>().unwrap(), Tier::Distributed);
/// assert_eq!("db".parse::<Tier>().unwrap(), Tier::Durable);
/// assert!("coordinator".parse::<Tier>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Bounded in-process LRU
    Local,
    /// Shared Redis cache
    Distributed,
    /// SQL system of record
    Durable,
}

impl Tier {
    /// Metric/log label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Distributed => "distributed",
            Self::Durable => "durable",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown tier '{0}' (expected local/sdcs, distributed/redis or durable/db)")]
pub struct ParseTierError(pub String);

impl std::str::FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "sdcs" => Ok(Self::Local),
            "distributed" | "redis" => Ok(Self::Distributed),
            "durable" | "db" => Ok(Self::Durable),
            _ => Err(ParseTierError(s.to_string())),
        }
    }
}

/// Which fast tier is consulted first on reads (and written last on writes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOrder {
    /// Local LRU, then Redis
    #[default]
    LocalFirst,
    /// Redis, then local LRU
    DistributedFirst,
}

impl TierOrder {
    /// `(first, second)` fast tiers for this order.
    #[must_use]
    pub fn fast_tiers(&self) -> (Tier, Tier) {
        match self {
            Self::LocalFirst => (Tier::Local, Tier::Distributed),
            Self::DistributedFirst => (Tier::Distributed, Tier::Local),
        }
    }
}

/// Detailed result of a write-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Durable store and both fast tiers accepted the write
    Complete,
    /// Durable write succeeded but at least one fast tier rejected it
    DurableOnly,
    /// Durable write failed; no fast tier was touched
    Failed,
}

impl WriteOutcome {
    /// Only a fully propagated write counts as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the record reached the system of record.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "Complete"),
            Self::DurableOnly => write!(f, "DurableOnly"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_aliases() {
        for (name, tier) in [
            ("local", Tier::Local),
            ("SDCS", Tier::Local),
            ("distributed", Tier::Distributed),
            (" redis ", Tier::Distributed),
            ("durable", Tier::Durable),
            ("DB", Tier::Durable),
        ] {
            assert_eq!(name.parse::<Tier>().unwrap(), tier, "{name}");
        }
    }

    #[test]
    fn test_tier_parse_unknown() {
        let err = "memcached".parse::<Tier>().unwrap_err();
        assert_eq!(err, ParseTierError("memcached".into()));
    }

    #[test]
    fn test_tier_display_roundtrips() {
        for tier in [Tier::Local, Tier::Distributed, Tier::Durable] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_order_default_and_fast_tiers() {
        assert_eq!(TierOrder::default(), TierOrder::LocalFirst);
        assert_eq!(TierOrder::LocalFirst.fast_tiers(), (Tier::Local, Tier::Distributed));
        assert_eq!(TierOrder::DistributedFirst.fast_tiers(), (Tier::Distributed, Tier::Local));
    }

    #[test]
    fn test_tier_order_deserialize() {
        let order: TierOrder = serde_json::from_str("\"distributed_first\"").unwrap();
        assert_eq!(order, TierOrder::DistributedFirst);
    }

    #[test]
    fn test_write_outcome() {
        assert!(WriteOutcome::Complete.is_success());
        assert!(!WriteOutcome::DurableOnly.is_success());
        assert!(WriteOutcome::DurableOnly.is_durable());
        assert!(!WriteOutcome::Failed.is_durable());
        assert_eq!(WriteOutcome::DurableOnly.to_string(), "DurableOnly");
    }
}
