//! CLI interface for ADAPT.
//!
//! Every subcommand is one-shot: arguments in, output out. Listings print
//! JSON to stdout; mutations print a one-line summary. `reconcile` is the
//! long-running engine.

mod actions;
mod changes;
mod format;
mod registry;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::config::Config;
use crate::model::{Page, Status};
use crate::reconcile::Reconciler;
use crate::storage::Storage;

use actions::ActionsCommand;
use changes::{ImpactCommand, NotifyArgs};
use format::format_tick;
use registry::RepoCommand;

/// ADAPT: propagate API changes to the services that consume them.
#[derive(Debug, Parser)]
#[command(name = "adapt", version, after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Database file. Overrides `ADAPT_DB` and the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: from a reported change to a healed client
  1. adapt repo add https://github.com/acme/users --ext .go
     adapt repo add https://github.com/acme/orders --ext .go
  2. adapt onboard --repo https://github.com/acme/users users.json
     adapt onboard --repo https://github.com/acme/orders orders.json
  3. adapt notify /users/{id} --method GET --kind breaking \
       --description "id becomes a UUID" --origin github-pr --origin-id 42
  4. adapt reconcile --once
  5. adapt actions list --type github-pr --status pending
  6. adapt actions update 1 --github-pr-id 7 --status completed
     adapt impact heal 1 completed"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register repositories and branches, list the registry.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Apply an onboarding document to a registered branch.
    ///
    /// Marks the branch completed, or failed if the document cannot be
    /// applied. Consumed endpoints that are not registered yet are skipped.
    Onboard {
        /// Repository URL.
        #[arg(long)]
        repo: String,

        #[arg(long, default_value = "master")]
        branch: String,

        /// Onboarding document (JSON).
        document: PathBuf,
    },

    /// Look up endpoints by URL template.
    Endpoint {
        url: String,

        /// Narrow to one HTTP method.
        #[arg(long)]
        method: Option<String>,

        /// Print JSON instead of one line per endpoint.
        #[arg(long)]
        json: bool,
    },

    /// Report a change to an endpoint. Prints the change id.
    Notify(NotifyArgs),

    /// Print reported changes as JSON.
    Changes {
        /// Only changes with this status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Print one change and its affected clients as JSON.
    Change {
        /// Change id, as printed by `notify`.
        id: i64,
    },

    /// Propagate open changes to their consumers.
    ///
    /// Runs until interrupted unless `--once` is given.
    Reconcile {
        /// Run a single tick and exit.
        #[arg(long)]
        once: bool,
    },

    /// List and update remediation tasks.
    Actions {
        #[command(subcommand)]
        command: ActionsCommand,
    },

    /// Update impact records.
    Impact {
        #[command(subcommand)]
        command: ImpactCommand,
    },

    /// Print every service's consumers with their derived health as JSON.
    Health,
}

/// CLI-facing status, mapped to the domain `Status`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Pending,
    InProgress,
    Updated,
    Completed,
    Failed,
}

impl StatusArg {
    fn to_domain(self) -> Status {
        match self {
            Self::Pending => Status::Pending,
            Self::InProgress => Status::InProgress,
            Self::Updated => Status::Updated,
            Self::Completed => Status::Completed,
            Self::Failed => Status::Failed,
        }
    }
}

/// Pagination flags shared by listings.
#[derive(Debug, Args)]
pub struct PageArgs {
    /// Page number, starting at 1.
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Items per page.
    #[arg(long, default_value_t = Page::DEFAULT_SIZE)]
    size: u32,
}

impl PageArgs {
    fn to_page(&self) -> Page {
        Page::new(self.page, self.size)
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config) -> Result<(), String> {
    let cli = Cli::parse();
    let database = config.resolve_database(cli.db.as_deref())?;

    // Opened per command; the engine opens its own session per tick.
    let storage = || open(&database);

    match cli.command {
        Command::Repo { command } => match command {
            RepoCommand::Add {
                url,
                branch,
                extensions,
            } => registry::cmd_add(&mut storage()?, &url, &branch, &extensions),
            RepoCommand::AddBranch {
                url,
                branch,
                extensions,
            } => registry::cmd_add_branch(&storage()?, &url, &branch, &extensions),
            RepoCommand::List { page } => registry::cmd_list(&storage()?, &page),
        },
        Command::Onboard {
            repo,
            branch,
            document,
        } => registry::cmd_onboard(&mut storage()?, &repo, &branch, &document),
        Command::Endpoint { url, method, json } => {
            registry::cmd_endpoint(&storage()?, &url, method.as_deref(), json)
        }
        Command::Notify(args) => changes::cmd_notify(&mut storage()?, &args),
        Command::Changes { status, page } => changes::cmd_changes(&storage()?, status, &page),
        Command::Change { id } => changes::cmd_change(&storage()?, id),
        Command::Reconcile { once } => cmd_reconcile(config, database.clone(), once),
        Command::Actions { command } => match command {
            ActionsCommand::List { kind, status, page } => {
                actions::cmd_list(&storage()?, kind, status, &page)
            }
            ActionsCommand::Show { id } => actions::cmd_show(&storage()?, id),
            ActionsCommand::Update {
                id,
                comment,
                status,
                artifacts,
            } => actions::cmd_update(&mut storage()?, id, comment, status, &artifacts),
        },
        Command::Impact { command } => match command {
            ImpactCommand::Heal { id, status } => changes::cmd_heal(&storage()?, id, status),
        },
        Command::Health => changes::cmd_health(&storage()?),
    }
}

fn open(database: &Path) -> Result<Storage, String> {
    Storage::open(database)
        .map_err(|e| format!("failed to open database {}: {e}", database.display()))
}

fn cmd_reconcile(config: &Config, database: PathBuf, once: bool) -> Result<(), String> {
    let reconciler = Reconciler::new(database, config.poll_interval());
    if !once {
        reconciler.run();
    }

    let tick = reconciler
        .tick()
        .map_err(|e| format!("reconciliation failed: {e}"))?;
    println!("{}", format_tick(&tick));
    Ok(())
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize: {e}"))?;
    println!("{json}");
    Ok(())
}
