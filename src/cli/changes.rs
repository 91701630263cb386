//! Change commands: ingestion, the change ledger, healing status, health.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;

use crate::model::{AffectedClient, AffectedEndpoint, ChangeKind, ChangeOrigin, ChangeReport};
use crate::storage::Storage;

use super::format::format_change;
use super::{PageArgs, StatusArg, print_json};

/// A reported interface change.
#[derive(Debug, Args)]
pub struct NotifyArgs {
    /// Endpoint URL template, e.g. `/users/{id}`.
    url: String,

    /// HTTP method (case-insensitive).
    #[arg(long)]
    method: String,

    #[arg(long, value_enum)]
    kind: ChangeKindArg,

    /// What changed.
    #[arg(long)]
    description: String,

    /// Why it changed.
    #[arg(long, default_value = "")]
    reason: String,

    /// Where the change was detected.
    #[arg(long, value_enum)]
    origin: OriginArg,

    /// Ticket key or pull request number at the origin.
    #[arg(long)]
    origin_id: String,

    #[arg(long)]
    origin_url: Option<String>,

    /// The endpoint's specification once the change lands.
    #[arg(long)]
    spec_after: Option<String>,
}

/// CLI-facing change kind, mapped to the domain `ChangeKind`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChangeKindArg {
    Breaking,
    NonBreaking,
}

/// CLI-facing change origin, mapped to the domain `ChangeOrigin`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OriginArg {
    JiraTicket,
    GithubPr,
}

impl NotifyArgs {
    pub(super) fn to_domain(&self) -> ChangeReport {
        ChangeReport {
            url: self.url.clone(),
            method: self.method.clone(),
            kind: match self.kind {
                ChangeKindArg::Breaking => ChangeKind::Breaking,
                ChangeKindArg::NonBreaking => ChangeKind::NonBreaking,
            },
            description: self.description.clone(),
            reason: self.reason.clone(),
            origin: match self.origin {
                OriginArg::JiraTicket => ChangeOrigin::JiraTicket,
                OriginArg::GithubPr => ChangeOrigin::GithubPr,
            },
            origin_id: self.origin_id.clone(),
            origin_url: self.origin_url.clone(),
            specification_after: self.spec_after.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ImpactCommand {
    /// Set the healing status of an affected client.
    Heal {
        /// Affected client id.
        id: i64,

        #[arg(value_enum)]
        status: StatusArg,
    },
}

/// Record a change and print its id.
pub(super) fn cmd_notify(storage: &mut Storage, args: &NotifyArgs) -> Result<(), String> {
    let change = storage
        .notify(&args.to_domain())
        .map_err(|e| e.to_string())?;

    println!("{}", change.id);
    eprintln!("{}", format_change(&change));
    Ok(())
}

pub(super) fn cmd_changes(
    storage: &Storage,
    status: Option<StatusArg>,
    page: &PageArgs,
) -> Result<(), String> {
    let changes = storage
        .list_changes(status.map(StatusArg::to_domain), page.to_page())
        .map_err(|e| format!("failed to list changes: {e}"))?;
    print_json(&changes)
}

/// A change with the impact records it produced.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeView {
    change: AffectedEndpoint,
    affected_clients: Vec<AffectedClient>,
}

pub(super) fn cmd_change(storage: &Storage, id: i64) -> Result<(), String> {
    let change = storage.change(id).map_err(|e| e.to_string())?;
    let affected_clients = storage
        .affected_clients_of(id)
        .map_err(|e| format!("failed to load affected clients: {e}"))?;
    print_json(&ChangeView {
        change,
        affected_clients,
    })
}

pub(super) fn cmd_heal(storage: &Storage, id: i64, status: StatusArg) -> Result<(), String> {
    let record = storage
        .set_healing_status(id, status.to_domain())
        .map_err(|e| e.to_string())?;

    println!(
        "affected client #{} [{}]",
        record.id, record.healing_status
    );
    Ok(())
}

pub(super) fn cmd_health(storage: &Storage) -> Result<(), String> {
    let report = storage
        .health_report()
        .map_err(|e| format!("failed to derive health: {e}"))?;
    print_json(&report)
}
