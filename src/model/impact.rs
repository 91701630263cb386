//! Impact types: which clients a change reaches and how they are doing.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Status;

/// The fact that one client is impacted by one change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedClient {
    pub id: i64,
    pub client_id: i64,
    pub affected_endpoint_id: i64,
    pub healing_status: Status,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// Derived health of a client with respect to one endpoint it consumes.
///
/// Never stored; computed from impact records and their action items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Health {
    Healthy,

    /// A planned change (ticket) will break or alter this dependency.
    PossibleFutureDegradation,

    /// A merged change (PR) has already altered this dependency.
    Degraded,
}

impl Health {
    pub fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::PossibleFutureDegradation => "possible future degradation",
            Self::Degraded => "degraded",
        }
    }

    /// Severity order: degraded beats possible future degradation beats healthy.
    pub fn worst(self, other: Self) -> Self {
        fn rank(h: Health) -> u8 {
            match h {
                Health::Healthy => 0,
                Health::PossibleFutureDegradation => 1,
                Health::Degraded => 2,
            }
        }
        if rank(other) > rank(self) { other } else { self }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_prefers_degraded() {
        assert_eq!(
            Health::PossibleFutureDegradation.worst(Health::Degraded),
            Health::Degraded
        );
        assert_eq!(
            Health::Degraded.worst(Health::Healthy),
            Health::Degraded
        );
        assert_eq!(
            Health::Healthy.worst(Health::PossibleFutureDegradation),
            Health::PossibleFutureDegradation
        );
    }
}
