//! Registry types: who exposes which endpoints and who consumes them.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Status;

/// A tracked source repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub url: String,
    pub name: Option<String>,
    pub guid: Option<String>,
    pub jira_instance_url: Option<String>,
    pub jira_project_key: Option<String>,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// A branch of a repository. Owns at most one service and one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: i64,
    pub repository_id: i64,
    pub branch: String,

    /// Display name of the deployable built from this branch.
    pub name: Option<String>,

    /// Stable external identifier, assigned at registration.
    pub guid: String,

    pub jira_instance_url: Option<String>,
    pub jira_project_key: Option<String>,

    /// File extensions considered when the branch is onboarded.
    pub included_extensions: Vec<String>,

    /// Onboarding status.
    pub status: Status,

    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// Descriptive branch metadata, used only for reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchProfile {
    pub name: Option<String>,
    pub guid: Option<String>,
    pub jira_instance_url: Option<String>,
    pub jira_project_key: Option<String>,
}

/// A deployable exposing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub branch_id: i64,
    pub port: u16,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// A deployable consuming endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub branch_id: i64,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// One (service, URL template, HTTP method) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: i64,
    pub service_id: i64,
    pub url: String,

    /// Always upper-case.
    pub method: String,

    pub description: String,

    /// Serialized interface fragment. Opaque here.
    pub specification: Option<String>,

    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// What happened when a client was linked to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new consumer edge was recorded.
    Linked { endpoint_id: i64 },

    /// The edge already existed.
    AlreadyLinked { endpoint_id: i64 },

    /// The endpoint is not registered yet; nothing was recorded.
    /// Happens when a client is onboarded before the service it calls.
    EndpointMissing,
}
