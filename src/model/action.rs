//! Action item types: remediation tasks spawned for impacted clients.
//!
//! One item per (impacted client, action kind). Items move through their
//! status under external control; the engine only ever creates them or
//! flags them `updated` when the underlying change is re-reported.

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Status, status::UnknownValue};

/// What kind of remediation a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Email,
    JiraTicket,
    GithubPr,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::JiraTicket => "jiraticket",
            Self::GithubPr => "githubpr",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "jiraticket" | "jira-ticket" => Ok(Self::JiraTicket),
            "githubpr" | "github-pr" => Ok(Self::GithubPr),
            _ => Err(UnknownValue::new("action kind", s)),
        }
    }
}

/// A single remediation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub id: i64,
    pub affected_client_id: i64,
    pub kind: ActionKind,
    pub status: Status,

    /// Append-only log, one `"<timestamp> : <comment>"` line per update.
    pub comments: Option<String>,

    pub meta: ActionItemMeta,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// Artifacts created outside ADAPT while remediating an item.
///
/// Stored as JSON in the `meta_data` column. Artifacts are scoped under the
/// affected client because they live in the client's project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientArtifacts>,
}

/// Remediation artifacts in the affected client's GitHub and JIRA projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_project: Option<PullRequestRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jira_project: Option<TicketRef>,
}

/// A pull request opened against the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRef {
    pub pr_id: Option<String>,
    pub pr_url: Option<String>,
}

/// A ticket filed in the client's tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRef {
    pub ticket_id: Option<String>,
    pub ticket_url: Option<String>,
}

impl ActionItemMeta {
    /// Merges reported artifacts into the stored ones.
    ///
    /// Each sub-object present in `update` replaces the stored one; absent
    /// sub-objects leave the stored ones alone.
    pub fn merge(&mut self, update: ClientArtifacts) {
        let client = self.client.get_or_insert_with(ClientArtifacts::default);
        if let Some(github) = update.github_project {
            client.github_project = Some(github);
        }
        if let Some(jira) = update.jira_project {
            client.jira_project = Some(jira);
        }
    }

    /// The pull request recorded for this item, if any.
    pub fn pull_request(&self) -> Option<&PullRequestRef> {
        self.client.as_ref()?.github_project.as_ref()
    }

    /// The ticket recorded for this item, if any.
    pub fn ticket(&self) -> Option<&TicketRef> {
        self.client.as_ref()?.jira_project.as_ref()
    }
}

/// An external update to an action item. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct ActionItemUpdate {
    /// Appended to the comment log with a timestamp.
    pub comment: Option<String>,

    /// Merged into the stored metadata.
    pub artifacts: Option<ClientArtifacts>,

    /// Set as-is. Any status may follow any status.
    pub status: Option<Status>,
}
