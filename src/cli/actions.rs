//! Action item commands for remediators: list, show and update.

use clap::{Args, Subcommand, ValueEnum};

use crate::model::{ActionItemUpdate, ActionKind, ClientArtifacts, PullRequestRef, TicketRef};
use crate::storage::Storage;

use super::format::format_action_item;
use super::{PageArgs, StatusArg, print_json};

#[derive(Debug, Subcommand)]
pub enum ActionsCommand {
    /// Print action items with their change and both sides of the dependency
    /// as JSON, ordered by id.
    List {
        /// Only items of this kind.
        #[arg(long = "type", value_enum)]
        kind: Option<ActionKindArg>,

        /// Only items with this propagation status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Print one action item as JSON.
    Show {
        /// Action item id.
        id: i64,
    },

    /// Record progress on an action item.
    Update {
        /// Action item id.
        id: i64,

        /// Appended to the comment log with a timestamp.
        #[arg(long)]
        comment: Option<String>,

        /// New propagation status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[command(flatten)]
        artifacts: ArtifactArgs,
    },
}

/// CLI-facing action kind, mapped to the domain `ActionKind`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ActionKindArg {
    Email,
    JiraTicket,
    GithubPr,
}

impl ActionKindArg {
    fn to_domain(self) -> ActionKind {
        match self {
            Self::Email => ActionKind::Email,
            Self::JiraTicket => ActionKind::JiraTicket,
            Self::GithubPr => ActionKind::GithubPr,
        }
    }
}

/// Artifacts created in the client's project.
#[derive(Debug, Args)]
pub struct ArtifactArgs {
    /// Patch pull request id.
    #[arg(long)]
    github_pr_id: Option<String>,

    #[arg(long)]
    github_pr_url: Option<String>,

    /// Ticket key, e.g. `ORD-12`.
    #[arg(long)]
    jira_ticket_id: Option<String>,

    #[arg(long)]
    jira_ticket_url: Option<String>,
}

impl ArtifactArgs {
    /// The metadata update, or `None` when no artifact flag was given.
    fn to_domain(&self) -> Option<ClientArtifacts> {
        let github_project = (self.github_pr_id.is_some() || self.github_pr_url.is_some())
            .then(|| PullRequestRef {
                pr_id: self.github_pr_id.clone(),
                pr_url: self.github_pr_url.clone(),
            });
        let jira_project = (self.jira_ticket_id.is_some() || self.jira_ticket_url.is_some())
            .then(|| TicketRef {
                ticket_id: self.jira_ticket_id.clone(),
                ticket_url: self.jira_ticket_url.clone(),
            });

        if github_project.is_none() && jira_project.is_none() {
            return None;
        }
        Some(ClientArtifacts {
            github_project,
            jira_project,
        })
    }
}

pub(super) fn cmd_list(
    storage: &Storage,
    kind: Option<ActionKindArg>,
    status: Option<StatusArg>,
    page: &PageArgs,
) -> Result<(), String> {
    let items = storage
        .list_action_items(
            kind.map(ActionKindArg::to_domain),
            status.map(StatusArg::to_domain),
            page.to_page(),
        )
        .map_err(|e| format!("failed to list action items: {e}"))?;
    print_json(&items)
}

pub(super) fn cmd_show(storage: &Storage, id: i64) -> Result<(), String> {
    let item = storage.action_item(id).map_err(|e| e.to_string())?;
    print_json(&item)
}

pub(super) fn cmd_update(
    storage: &mut Storage,
    id: i64,
    comment: Option<String>,
    status: Option<StatusArg>,
    artifacts: &ArtifactArgs,
) -> Result<(), String> {
    let update = ActionItemUpdate {
        comment,
        artifacts: artifacts.to_domain(),
        status: status.map(StatusArg::to_domain),
    };
    let item = storage
        .update_action_item(id, update)
        .map_err(|e| e.to_string())?;

    println!("{}", format_action_item(&item));
    Ok(())
}
