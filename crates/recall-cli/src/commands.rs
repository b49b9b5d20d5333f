//! Subcommands and their dispatch.

use anyhow::{bail, Result};
use clap::Subcommand;
use recall_core::{
    AccessRequestStatus, Category, Coordinator, QueryOptions, SearchAllOptions, SharingMode,
};
use serde_json::{json, Value};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List instances visible for querying
    Instances {
        /// Include instances whose heartbeat is stale
        #[arg(long)]
        include_stale: bool,
    },
    /// Print the whole registry document, stopped instances included
    Registry,
    /// Remove registry entries without a heartbeat for over a day
    Prune,
    /// Publish this instance's entry once
    Heartbeat,
    /// Publish this instance and keep its heartbeat alive until interrupted
    Run,
    /// Set this instance's label
    Label { name: String },
    /// Set what this instance shares with peers
    Sharing {
        /// none, read or full
        #[arg(value_parser = parse_mode)]
        mode: SharingMode,
        /// Shared categories
        #[arg(long, value_delimiter = ',', value_parser = parse_category)]
        types: Vec<Category>,
    },
    /// Read one category from another instance
    Query {
        instance: String,
        category: String,
        /// Full-text search term
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Search one category across every sharing instance
    Search {
        query: String,
        #[arg(long, value_parser = parse_category)]
        scope: Category,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Pull records from an instance that shares with full mode
    Extract {
        instance: String,
        category: String,
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<String>>,
    },
    /// Show an instance's registry metadata
    Stats { instance: String },
    /// Mark local records as sensitive
    Lock {
        #[arg(value_parser = parse_category)]
        category: Category,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove sensitive marks from local records
    Unlock {
        #[arg(value_parser = parse_category)]
        category: Category,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show locked ids and pending request counts
    Locks,
    /// Manage access requests for locked records
    #[command(subcommand)]
    Request(RequestCommand),
}

#[derive(Subcommand, Debug)]
pub enum RequestCommand {
    /// Record a request from another instance
    Create {
        /// Requesting instance id
        #[arg(long)]
        requester: String,
        /// Requesting instance label
        #[arg(long, default_value = "")]
        requester_label: String,
        #[arg(value_parser = parse_category)]
        category: Category,
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Approve a pending request
    Approve {
        id: String,
        #[arg(long, default_value = "owner")]
        by: String,
    },
    /// Deny a pending request
    Deny {
        id: String,
        #[arg(long, default_value = "owner")]
        by: String,
    },
    /// List requests, optionally by status
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<AccessRequestStatus>,
    },
}

fn parse_category(s: &str) -> std::result::Result<Category, String> {
    Category::parse(s).map_err(|e| e.to_string())
}

fn parse_mode(s: &str) -> std::result::Result<SharingMode, String> {
    SharingMode::from_str(s).ok_or_else(|| format!("unknown sharing mode '{s}' (none, read, full)"))
}

fn parse_status(s: &str) -> std::result::Result<AccessRequestStatus, String> {
    AccessRequestStatus::from_str(s)
        .ok_or_else(|| format!("unknown status '{s}' (pending, approved, denied)"))
}

/// Run a one-shot command and return its JSON output.
pub fn execute(coordinator: &Coordinator, command: Command) -> Result<Value> {
    let registry = coordinator.registry();
    let query = coordinator.query();
    let sensitive = coordinator.sensitive();

    let output = match command {
        Command::Instances { include_stale } => {
            json!(query.discover_instances(include_stale))
        }
        Command::Registry => json!(registry.get_registry()),
        Command::Prune => json!({ "pruned": registry.prune_stale()? }),
        Command::Heartbeat => json!(registry.heartbeat()?),
        Command::Run => bail!("'run' is handled by the main loop"),
        Command::Label { name } => json!(registry.set_label(&name)?),
        Command::Sharing { mode, types } => json!(registry.set_sharing(mode, types)?),
        Command::Query {
            instance,
            category,
            query: term,
            limit,
        } => {
            let options = QueryOptions { query: term, limit };
            json!(query.query(&instance, &category, &options)?)
        }
        Command::Search {
            query: term,
            scope,
            limit,
        } => {
            let options = SearchAllOptions { scope, limit };
            json!(query.search_all(&term, &options))
        }
        Command::Extract {
            instance,
            category,
            ids,
        } => json!(query.extract_for_import(&instance, &category, ids.as_deref())?),
        Command::Stats { instance } => json!(query.get_instance_stats(&instance)?),
        Command::Lock { category, ids } => {
            json!({ "locked": sensitive.lock_records(category, ids.as_slice())? })
        }
        Command::Unlock { category, ids } => {
            json!({ "unlocked": sensitive.unlock_records(category, ids.as_slice())? })
        }
        Command::Locks => {
            let mut ids = serde_json::Map::new();
            for category in Category::ALL {
                let locked = sensitive.get_locked_ids(category)?;
                if !locked.is_empty() {
                    ids.insert(category.as_str().to_string(), json!(locked));
                }
            }
            json!({ "summary": sensitive.get_summary()?, "ids": ids })
        }
        Command::Request(request) => execute_request(coordinator, request)?,
    };
    Ok(output)
}

fn execute_request(coordinator: &Coordinator, command: RequestCommand) -> Result<Value> {
    let sensitive = coordinator.sensitive();
    let output = match command {
        RequestCommand::Create {
            requester,
            requester_label,
            category,
            ids,
            reason,
        } => json!(sensitive.create_access_request(
            &requester,
            &requester_label,
            category,
            ids.as_slice(),
            reason.as_deref(),
        )?),
        RequestCommand::Approve { id, by } => json!(sensitive.approve_request(&id, &by)?),
        RequestCommand::Deny { id, by } => json!(sensitive.deny_request(&id, &by)?),
        RequestCommand::List { status } => json!(sensitive.list_access_requests(status)?),
    };
    Ok(output)
}
