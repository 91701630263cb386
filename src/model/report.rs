//! Read-side projections: joined views handed to remediators and reports.

use serde::{Deserialize, Serialize};

use super::{
    ActionItem, ActionKind, AffectedEndpoint, Branch, ChangeOrigin, Client, Endpoint, Health,
    PullRequestRef, Repository, Service, Status, TicketRef,
};

/// Where a branch lives and how it is tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchContext {
    pub name: Option<String>,
    pub guid: String,
    pub repository_url: String,
    pub branch: String,
    pub jira_instance_url: Option<String>,
    pub jira_project_key: Option<String>,
}

/// An action item with everything a remediator needs to act on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemDetail {
    pub item: ActionItem,

    /// The change that spawned the item.
    pub change: AffectedEndpoint,

    pub endpoint_url: String,
    pub endpoint_method: String,

    /// The branch whose service exposes the changed endpoint.
    pub originating: BranchContext,

    pub affected_client_id: i64,
    pub healing_status: Status,

    /// The branch whose client consumes the changed endpoint.
    pub client: BranchContext,

    /// Where remediation happens, for item kinds that target a project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RemediationTarget>,
}

/// Project coordinates for a remediation, on both sides of the dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RemediationTarget {
    #[serde(rename_all = "camelCase")]
    GithubProject {
        origin_repository: String,
        origin_branch: String,

        /// Set when the change came from a PR.
        origin_pr_id: Option<String>,
        origin_pr_url: Option<String>,

        client_repository: String,
        client_branch: String,

        /// The patch PR opened against the client, once recorded.
        client_pr: Option<PullRequestRef>,
    },

    #[serde(rename_all = "camelCase")]
    JiraProject {
        origin_instance_url: Option<String>,
        origin_project_key: Option<String>,

        /// Set when the change came from a ticket.
        origin_ticket_id: Option<String>,
        origin_ticket_url: Option<String>,

        client_instance_url: Option<String>,
        client_project_key: Option<String>,

        /// The ticket filed against the client, once recorded.
        client_ticket: Option<TicketRef>,
    },
}

impl ActionItemDetail {
    /// Assembles the view and derives the remediation target from the
    /// item kind.
    pub fn assemble(
        item: ActionItem,
        change: AffectedEndpoint,
        endpoint: (String, String),
        originating: BranchContext,
        healing_status: Status,
        client: BranchContext,
    ) -> Self {
        let target = match item.kind {
            ActionKind::GithubPr => {
                let from_pr = change.origin == ChangeOrigin::GithubPr;
                Some(RemediationTarget::GithubProject {
                    origin_repository: originating.repository_url.clone(),
                    origin_branch: originating.branch.clone(),
                    origin_pr_id: from_pr.then(|| change.origin_id.clone()),
                    origin_pr_url: change.origin_url.clone().filter(|_| from_pr),
                    client_repository: client.repository_url.clone(),
                    client_branch: client.branch.clone(),
                    client_pr: item.meta.pull_request().cloned(),
                })
            }
            ActionKind::JiraTicket => {
                let from_ticket = change.origin == ChangeOrigin::JiraTicket;
                Some(RemediationTarget::JiraProject {
                    origin_instance_url: originating.jira_instance_url.clone(),
                    origin_project_key: originating.jira_project_key.clone(),
                    origin_ticket_id: from_ticket.then(|| change.origin_id.clone()),
                    origin_ticket_url: change.origin_url.clone().filter(|_| from_ticket),
                    client_instance_url: client.jira_instance_url.clone(),
                    client_project_key: client.jira_project_key.clone(),
                    client_ticket: item.meta.ticket().cloned(),
                })
            }
            ActionKind::Email => None,
        };

        let (endpoint_url, endpoint_method) = endpoint;
        Self {
            affected_client_id: item.affected_client_id,
            item,
            change,
            endpoint_url,
            endpoint_method,
            originating,
            healing_status,
            client,
            target,
        }
    }
}

/// A repository with everything registered beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryTree {
    pub repository: Repository,
    pub branches: Vec<BranchTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchTree {
    pub branch: Branch,
    pub services: Vec<ServiceTree>,
    pub clients: Vec<ClientTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTree {
    pub service: Service,
    pub exposed_endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTree {
    pub client: Client,
    pub consumed_endpoints: Vec<Endpoint>,
}

/// A service and the derived health of every consumer of its endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub service_id: i64,
    pub port: u16,
    pub branch: BranchContext,
    pub endpoints: Vec<EndpointHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointHealth {
    pub endpoint_id: i64,
    pub url: String,
    pub method: String,
    pub description: String,
    pub consumers: Vec<ConsumerHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerHealth {
    pub client_id: i64,
    pub branch: BranchContext,
    pub health: Health,

    /// The change behind a non-healthy status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ChangeRef>,

    /// Artifacts of the open remediation tasks.
    pub actions: Vec<ArtifactLink>,
}

/// Where a change was reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRef {
    pub affected_endpoint_id: i64,
    pub origin: ChangeOrigin,
    pub origin_id: String,
    pub origin_url: Option<String>,
}

/// An externally created artifact of an open action item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactLink {
    pub action_item_id: i64,
    pub kind: ActionKind,
    pub status: Status,
    pub id: Option<String>,
    pub url: Option<String>,
}
