//! Registry commands: repository registration, onboarding, endpoint lookup.

use std::fs;
use std::path::Path;

use clap::Subcommand;

use crate::onboard::{self, OnboardingDocument};
use crate::storage::{Storage, StorageError};

use super::format::{format_branch, format_endpoint, format_onboarding};
use super::{PageArgs, print_json};

#[derive(Debug, Subcommand)]
pub enum RepoCommand {
    /// Register a repository and its first branch.
    Add {
        /// Repository URL, e.g. `https://github.com/acme/users`.
        url: String,

        /// Branch to track.
        #[arg(long, default_value = "master")]
        branch: String,

        /// File extensions analysed on this branch (e.g. `.go`). Repeatable.
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// Track another branch of a registered repository.
    AddBranch {
        /// Repository URL.
        url: String,

        branch: String,

        /// File extensions analysed on this branch. Repeatable.
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },

    /// Print repositories with their branches, services, clients and
    /// endpoints as JSON.
    List {
        #[command(flatten)]
        page: PageArgs,
    },
}

pub(super) fn cmd_add(
    storage: &mut Storage,
    url: &str,
    branch: &str,
    extensions: &[String],
) -> Result<(), String> {
    let (repository, branch) = storage
        .register_repository(url, branch, extensions)
        .map_err(|e| match e {
            StorageError::RepositoryAlreadyExists(_) => e.to_string(),
            e => format!("failed to register repository: {e}"),
        })?;

    println!("{}", format_branch(&repository.url, &branch));
    Ok(())
}

pub(super) fn cmd_add_branch(
    storage: &Storage,
    url: &str,
    branch: &str,
    extensions: &[String],
) -> Result<(), String> {
    let repository = storage.repository_by_url(url).map_err(|e| e.to_string())?;
    let branch = storage
        .register_branch(repository.id, branch, extensions)
        .map_err(|e| format!("failed to register branch: {e}"))?;

    println!("{}", format_branch(&repository.url, &branch));
    Ok(())
}

pub(super) fn cmd_list(storage: &Storage, page: &PageArgs) -> Result<(), String> {
    let repositories = storage
        .list_repositories(page.to_page())
        .map_err(|e| format!("failed to list repositories: {e}"))?;
    print_json(&repositories)
}

pub(super) fn cmd_onboard(
    storage: &mut Storage,
    repository: &str,
    branch: &str,
    document: &Path,
) -> Result<(), String> {
    let contents = fs::read_to_string(document)
        .map_err(|e| format!("failed to read {}: {e}", document.display()))?;
    let document: OnboardingDocument = serde_json::from_str(&contents)
        .map_err(|e| format!("invalid onboarding document {}: {e}", document.display()))?;

    let report = onboard::onboard(storage, repository, branch, &document)
        .map_err(|e| format!("onboarding {repository}@{branch} failed: {e}"))?;

    println!("{}", format_onboarding(&report));
    Ok(())
}

pub(super) fn cmd_endpoint(
    storage: &Storage,
    url: &str,
    method: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let endpoints = storage
        .find_endpoints(url, method)
        .map_err(|e| format!("failed to look up endpoint: {e}"))?;

    if json {
        return print_json(&endpoints);
    }
    if endpoints.is_empty() {
        return Err(match method {
            Some(m) => format!("endpoint not found: {} {url}", m.to_ascii_uppercase()),
            None => format!("endpoint not found: {url}"),
        });
    }
    for endpoint in &endpoints {
        println!("{}", format_endpoint(endpoint));
        let consumers = storage
            .consumers_of(endpoint.id)
            .map_err(|e| format!("failed to load consumers: {e}"))?;
        for client in &consumers {
            let health = storage
                .client_health(client.id, endpoint.id)
                .map_err(|e| format!("failed to derive health: {e}"))?;
            println!("  consumed by client #{} [{health}]", client.id);
        }
    }
    Ok(())
}
