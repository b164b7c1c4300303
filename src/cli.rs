//! CLI struct definitions for the warden command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "warden",
    version = env!("CARGO_PKG_VERSION"),
    about = "Records with ownership and contributor access lists, managed through a component-driven CRUD service over a local SQLite store."
)]
pub(crate) struct Cli {
    /// Project directory holding `.warden/` (default: nearest ancestor that has one).
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Config file (default: `.warden/warden.toml`).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(flatten)]
    pub caller: CallerArgs,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

/// Who the command acts as.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct CallerArgs {
    /// Act as this user id.
    #[clap(long, global = true)]
    pub user: Option<String>,
    /// Act as a system process.
    #[clap(long, global = true)]
    pub system: bool,
    /// Grant the caller a role (repeatable), e.g. `--as-role admin`.
    #[clap(long = "as-role", global = true)]
    pub roles: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create `.warden/` with a default config and an empty record store.
    Init {
        /// Overwrite an existing config file.
        #[clap(long)]
        force: bool,
    },
    /// Create, read, update, delete, finish and search records.
    #[clap(subcommand)]
    Record(RecordCommand),
    /// Administrative owner/contributor edits.
    #[clap(subcommand)]
    Access(AccessCommand),
    /// Service plugins known to the configuration.
    #[clap(subcommand)]
    Plugins(PluginsCommand),
    /// Show the configured component pipeline.
    Components,
    /// Show the store's audit log.
    Audit {
        /// Only the last N events.
        #[clap(long)]
        tail: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum RecordCommand {
    /// Create a record from a JSON payload (`-` reads stdin).
    Create {
        payload: String,
        /// Project that owns the new record.
        #[clap(long)]
        project: Option<String>,
        /// Service the record is created through.
        #[clap(long)]
        service: Option<String>,
    },
    /// Read a record by id or pid.
    Read {
        id: String,
        #[clap(long)]
        include_deleted: bool,
    },
    /// Replace a record's validated data with a JSON payload (`-` reads stdin).
    Update {
        id: String,
        payload: String,
        #[clap(long)]
        service: Option<String>,
    },
    /// Soft-delete a record.
    Delete { id: String },
    /// Mark a record finished.
    Finish { id: String },
    /// Search records page by page.
    Search(SearchArgs),
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct SearchArgs {
    #[clap(long)]
    pub page: Option<i64>,
    #[clap(long)]
    pub size: Option<i64>,
    #[clap(long)]
    pub include_deleted: bool,
    #[clap(long)]
    pub service: Option<String>,
    #[clap(long)]
    pub finished: Option<bool>,
    /// Only records created by this user id.
    #[clap(long)]
    pub user: Option<String>,
    /// Agent descriptor, e.g. `user:5` or `project:abc`.
    #[clap(long)]
    pub agent: Option<String>,
    /// `owner` or `contributor`.
    #[clap(long)]
    pub role: Option<String>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum AccessCommand {
    /// Add an agent to a record's owners or contributors.
    Add(AccessEditArgs),
    /// Remove an agent from a record's owners or contributors.
    Remove(AccessEditArgs),
    /// List a record's owners and contributors.
    List { id: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct AccessEditArgs {
    pub id: String,
    /// Agent descriptor, e.g. `user:5`.
    pub agent: String,
    /// `owner` or `contributor`.
    #[clap(long, default_value = "owner")]
    pub role: String,
}

#[derive(Subcommand, Debug)]
pub(crate) enum PluginsCommand {
    /// List configured service plugins.
    List,
}
