//! Applying an onboarding document to the registry.
//!
//! A document describes one branch of one repository: the service it runs
//! (port and exposed endpoints), the endpoints it calls, and descriptive
//! metadata. The whole document is applied in one transaction.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::model::{Branch, BranchProfile, LinkOutcome, Status};
use crate::storage::{Result, Storage, StorageError, registry};

/// Project description produced by analysing a branch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OnboardingDocument {
    pub project_name: Option<String>,
    pub guid: Option<String>,
    pub jira_instance_url: Option<String>,
    pub jira_project_key: Option<String>,

    /// Required when the document exposes endpoints.
    pub port: Option<Port>,

    pub exposed_endpoints: Vec<EndpointDecl>,
    pub consumed_endpoints: Vec<EndpointDecl>,
}

/// A port as analysers write it: a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Text(String),
}

impl Port {
    fn resolve(&self) -> Result<u16> {
        match self {
            Self::Number(port) => Ok(*port),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| StorageError::InvalidInput(format!("invalid port: {text}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDecl {
    pub endpoint: String,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodDecl {
    pub method: String,

    #[serde(default)]
    pub description: String,

    /// Free-form; stored as JSON text, or verbatim when already a string.
    #[serde(default)]
    pub specification: Option<serde_json::Value>,
}

impl MethodDecl {
    fn specification_text(&self) -> Option<String> {
        match self.specification.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(text.clone()),
            value => Some(value.to_string()),
        }
    }
}

/// What applying a document did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingReport {
    pub branch_id: i64,
    pub service_id: Option<i64>,
    pub client_id: Option<i64>,
    pub endpoints: usize,
    pub linked: usize,
    pub already_linked: usize,

    /// Consumed routes with no registered endpoint yet.
    pub skipped: Vec<String>,
}

impl OnboardingDocument {
    /// Project-level metadata. The document guid identifies the project, so
    /// it lands on the repository.
    fn repository_profile(&self) -> BranchProfile {
        BranchProfile {
            guid: self.guid.clone(),
            ..self.branch_profile()
        }
    }

    /// Branch metadata. Each branch keeps the guid assigned at registration.
    fn branch_profile(&self) -> BranchProfile {
        BranchProfile {
            name: self.project_name.clone(),
            guid: None,
            jira_instance_url: self.jira_instance_url.clone(),
            jira_project_key: self.jira_project_key.clone(),
        }
    }
}

/// Applies `document` to a registered branch.
///
/// On success the branch is marked `completed`. If applying fails nothing
/// from the document is kept, the branch is marked `failed` and the error is
/// returned.
pub fn onboard(
    storage: &mut Storage,
    repository_url: &str,
    branch: &str,
    document: &OnboardingDocument,
) -> Result<OnboardingReport> {
    let target = storage.branch(repository_url, branch)?;

    match apply(storage, &target, document) {
        Ok(report) => {
            storage.set_branch_status(target.id, Status::Completed)?;
            info!(
                repository = repository_url,
                branch,
                endpoints = report.endpoints,
                linked = report.linked,
                skipped = report.skipped.len(),
                "branch onboarded"
            );
            Ok(report)
        }
        Err(e) => {
            error!(repository = repository_url, branch, error = %e, "onboarding failed");
            if let Err(mark) = storage.set_branch_status(target.id, Status::Failed) {
                warn!(error = %mark, "could not mark branch failed");
            }
            Err(e)
        }
    }
}

fn apply(
    storage: &mut Storage,
    branch: &Branch,
    document: &OnboardingDocument,
) -> Result<OnboardingReport> {
    let tx = storage.transaction()?;
    let mut report = OnboardingReport {
        branch_id: branch.id,
        ..OnboardingReport::default()
    };

    let repository_profile = document.repository_profile();
    registry::update_repository_profile(&tx, branch.repository_id, &repository_profile)?;
    registry::update_branch_profile(&tx, branch.id, &document.branch_profile())?;

    if !document.exposed_endpoints.is_empty() {
        let port = document
            .port
            .as_ref()
            .ok_or_else(|| {
                StorageError::InvalidInput("a port is required to expose endpoints".into())
            })?
            .resolve()?;
        let service = registry::find_or_create_service(&tx, branch.id, port)?;
        report.service_id = Some(service.id);

        for decl in &document.exposed_endpoints {
            for method in &decl.methods {
                registry::upsert_endpoint(
                    &tx,
                    service.id,
                    &decl.endpoint,
                    &method.method,
                    &method.description,
                    method.specification_text().as_deref(),
                )?;
                report.endpoints += 1;
            }
        }
    }

    if !document.consumed_endpoints.is_empty() {
        let client = registry::find_or_create_client(&tx, branch.id)?;
        report.client_id = Some(client.id);

        for decl in &document.consumed_endpoints {
            for method in &decl.methods {
                match registry::link_consumer(&tx, client.id, &decl.endpoint, &method.method)? {
                    LinkOutcome::Linked { .. } => report.linked += 1,
                    LinkOutcome::AlreadyLinked { .. } => report.already_linked += 1,
                    LinkOutcome::EndpointMissing => report.skipped.push(format!(
                        "{} {}",
                        method.method.to_ascii_uppercase(),
                        decl.endpoint
                    )),
                }
            }
        }
    }

    tx.commit()?;
    Ok(report)
}
