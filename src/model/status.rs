//! Lifecycle status shared by changes, impact records, action items and branches.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Where a row stands in its lifecycle.
///
/// One vocabulary is shared across tables. Not every table reaches every
/// value: `Failed` only comes out of onboarding, `Updated` only out of
/// re-reported changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    InProgress,
    Updated,
    Completed,
    Failed,
}

impl Status {
    /// The value stored in the database and shown on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inprogress",
            Self::Updated => "updated",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the reconciliation engine still has work to do on a change
    /// in this status.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Updated)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "inprogress" | "in-progress" => Ok(Self::InProgress),
            "updated" => Ok(Self::Updated),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownValue::new("status", s)),
        }
    }
}

/// A stored or user-supplied string that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value}")]
pub struct UnknownValue {
    what: &'static str,
    value: String,
}

impl UnknownValue {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        for status in [
            Status::Pending,
            Status::InProgress,
            Status::Updated,
            Status::Completed,
            Status::Failed,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn accepts_hyphenated_in_progress() {
        assert_eq!("In-Progress".parse::<Status>().unwrap(), Status::InProgress);
    }

    #[test]
    fn rejects_unknown_status() {
        let err = "done".parse::<Status>().unwrap_err();
        assert_eq!(err.to_string(), "unknown status: done");
    }

    #[test]
    fn only_pending_and_updated_are_open() {
        assert!(Status::Pending.is_open());
        assert!(Status::Updated.is_open());
        assert!(!Status::Completed.is_open());
        assert!(!Status::InProgress.is_open());
        assert!(!Status::Failed.is_open());
    }
}
