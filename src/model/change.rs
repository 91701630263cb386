//! Change types: reported interface changes against registered endpoints.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{ActionKind, Health, Status, status::UnknownValue};

/// Whether a change breaks existing consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Breaking,
    NonBreaking,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breaking => "breaking",
            Self::NonBreaking => "nonbreaking",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "breaking" => Ok(Self::Breaking),
            "nonbreaking" | "non-breaking" => Ok(Self::NonBreaking),
            _ => Err(UnknownValue::new("change kind", s)),
        }
    }
}

/// The system that reported a change.
///
/// Everything that varies by origin (which remediation tasks to spawn,
/// how an unhealed impact is labelled) is answered here, so a new origin
/// is a one-place change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// A JIRA ticket describing a planned change. Not live yet.
    JiraTicket,

    /// A merged GitHub pull request. Already live.
    GithubPr,
}

impl ChangeOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JiraTicket => "jiraticket",
            Self::GithubPr => "githubpr",
        }
    }

    /// Remediation tasks spawned for every client impacted by a change
    /// from this origin.
    ///
    /// A planned change needs a human pinged as well as a tracker ticket;
    /// a merged PR is remediated by generating a patch PR.
    pub fn action_kinds(self) -> &'static [ActionKind] {
        match self {
            Self::JiraTicket => &[ActionKind::Email, ActionKind::JiraTicket],
            Self::GithubPr => &[ActionKind::GithubPr],
        }
    }

    /// How a client with unhealed impact from this origin is reported.
    pub fn unhealed_health(self) -> Health {
        match self {
            Self::JiraTicket => Health::PossibleFutureDegradation,
            Self::GithubPr => Health::Degraded,
        }
    }
}

impl fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOrigin {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jiraticket" | "jira-ticket" => Ok(Self::JiraTicket),
            "githubpr" | "github-pr" => Ok(Self::GithubPr),
            _ => Err(UnknownValue::new("change origin", s)),
        }
    }
}

/// One logical change reported against one endpoint.
///
/// Identity is (endpoint, origin, origin id, kind): the same endpoint can be
/// flagged independently by a ticket and by a PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedEndpoint {
    pub id: i64,
    pub endpoint_id: i64,
    pub kind: ChangeKind,

    /// Accumulated across repeated reports, one report per line.
    pub description: String,

    /// Accumulated across repeated reports, one report per line.
    pub reason: String,

    pub status: Status,
    pub origin: ChangeOrigin,
    pub origin_id: String,
    pub origin_url: Option<String>,
    pub specification_before: Option<String>,
    pub specification_after: Option<String>,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// A change notification as delivered by a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub url: String,
    pub method: String,
    pub kind: ChangeKind,
    pub description: String,
    pub reason: String,
    pub origin: ChangeOrigin,
    pub origin_id: String,
    pub origin_url: Option<String>,
    pub specification_after: Option<String>,
}
