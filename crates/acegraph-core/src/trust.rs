//! # Trust Map
//!
//! Directional trusts between directory domains, recorded while sources are
//! processed and read by later stages. Shared between workers as a `DashMap`.

use crate::GraphError;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;

/// Direction of a trust as stored in `trustDirection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrustDirection {
    Disabled,
    Incoming,
    Outgoing,
    Bidirectional,
}

impl TrustDirection {
    #[must_use]
    pub fn is_incoming(self) -> bool {
        matches!(self, Self::Incoming | Self::Bidirectional)
    }

    #[must_use]
    pub fn is_outgoing(self) -> bool {
        matches!(self, Self::Outgoing | Self::Bidirectional)
    }
}

impl TryFrom<i64> for TrustDirection {
    type Error = GraphError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Incoming),
            2 => Ok(Self::Outgoing),
            3 => Ok(Self::Bidirectional),
            other => Err(GraphError::InvalidValue {
                attribute: "trustDirection".to_string(),
                reason: format!("{other} is not a trust direction"),
            }),
        }
    }
}

impl fmt::Display for TrustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disabled => "disabled",
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Bidirectional => "bidirectional",
        };
        f.write_str(text)
    }
}

/// Trusting and trusted domain, by lower-cased DNS name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrustPair {
    pub source: String,
    pub target: String,
}

impl TrustPair {
    #[must_use]
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_lowercase(),
            target: target.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustInfo {
    pub direction: TrustDirection,
    /// Raw `trustAttributes` flags.
    pub attributes: u32,
}

/// Concurrent map of every trust seen.
#[derive(Debug, Default)]
pub struct TrustMap {
    trusts: DashMap<TrustPair, TrustInfo>,
}

impl TrustMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trust. A later record for the same pair replaces the earlier.
    pub fn record(&self, pair: TrustPair, info: TrustInfo) {
        tracing::debug!(
            source = %pair.source,
            target = %pair.target,
            direction = %info.direction,
            "recorded trust"
        );
        self.trusts.insert(pair, info);
    }

    #[must_use]
    pub fn get(&self, pair: &TrustPair) -> Option<TrustInfo> {
        self.trusts.get(pair).map(|entry| *entry.value())
    }

    /// Snapshot sorted by pair.
    #[must_use]
    pub fn entries(&self) -> Vec<(TrustPair, TrustInfo)> {
        let mut entries: Vec<_> = self
            .trusts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trusts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trusts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_from_raw_value() {
        assert_eq!(TrustDirection::try_from(3).expect("valid"), TrustDirection::Bidirectional);
        assert!(TrustDirection::Bidirectional.is_incoming());
        assert!(!TrustDirection::Incoming.is_outgoing());
        assert!(TrustDirection::try_from(7).is_err());
    }

    #[test]
    fn pairs_are_case_insensitive() {
        let map = TrustMap::new();
        map.record(
            TrustPair::new("CORP.example", "partner.example"),
            TrustInfo {
                direction: TrustDirection::Outgoing,
                attributes: 8,
            },
        );
        let info = map
            .get(&TrustPair::new("corp.EXAMPLE", "PARTNER.example"))
            .expect("recorded");
        assert_eq!(info.direction, TrustDirection::Outgoing);
        assert_eq!(map.entries().len(), 1);
    }
}
