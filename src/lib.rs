//! Warden: records with ownership and contributor access lists.
//!
//! Records are JSON documents stored in a local SQLite database. Each one
//! carries an access object with two agent lists, `owned_by` and
//! `contributed_by`, where an agent is a typed reference such as `user:5` or
//! `project:<id>`.
//!
//! # Architecture
//!
//! [`core::service::RecordService`] runs every operation through the same
//! phases: load, authorize ([`core::policy`]), validate ([`core::validation`]),
//! run the component pipeline ([`core::component`], [`plugins`]), persist
//! ([`core::store`]) and wrap the result ([`core::results`]).
//!
//! All database writes route through [`core::broker::DbBroker`] for
//! serialization (in-process lock) and audit logging (`broker.events.jsonl`).
//!
//! # Examples
//!
//! ```bash
//! warden init
//! warden --user 7 record create '{"id": "my-record", "metadata": {"title": "T"}}' --project p1
//! warden --user 7 record search --role owner --agent project:p1
//! warden --user 1 --as-role admin access add my-record user:5 --role contributor
//! ```

pub mod core;
pub mod plugins;

mod cli;

use crate::cli::{
    AccessCommand, CallerArgs, Cli, Command, OutputFormat, PluginsCommand, RecordCommand,
};
use crate::core::access::{AccessRole, RecordAccess};
use crate::core::agent::{AgentId, AgentRegistry};
use crate::core::broker::DbBroker;
use crate::core::component::CallContext;
use crate::core::config::{CONFIG_FILE_NAME, DEFAULT_CONFIG_TOML, ServiceConfig};
use crate::core::error::WardenError;
use crate::core::identity::Identity;
use crate::core::output;
use crate::core::pagination::SearchParams;
use crate::core::results::{ItemResult, ListResult};
use crate::core::service::RecordService;
use crate::core::store::SqliteRecordStore;
use crate::core::time;
use clap::Parser;
use colored::Colorize;
use serde_json::{Value, json};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Per-project state directory.
pub const WARDEN_DIR: &str = ".warden";
/// Store root (database and audit log) inside [`WARDEN_DIR`].
pub const DATA_DIR: &str = "data";

/// Log to stderr, filtered by `WARDEN_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("WARDEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn find_warden_root(start_dir: &Path) -> Result<PathBuf, WardenError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(WARDEN_DIR).is_dir() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(WardenError::ConfigError(
                "'.warden' directory not found in current or parent directories. Run `warden init` first.".to_string(),
            ));
        }
    }
}

fn config_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => root.join(WARDEN_DIR).join(CONFIG_FILE_NAME),
    }
}

fn caller_identity(args: &CallerArgs) -> Identity {
    let mut identity = match &args.user {
        Some(id) => Identity::user(AgentId::parse(id)),
        None => Identity::anonymous(),
    };
    identity.system = args.system;
    for role in &args.roles {
        identity = identity.with_role(role);
    }
    identity
}

/// Payload argument: inline JSON, or `-` for stdin.
fn read_payload(raw: &str) -> Result<Value, WardenError> {
    if raw == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(serde_json::from_str(&buf)?);
    }
    Ok(serde_json::from_str(raw)?)
}

/// Wire config, SQLite store and agent loaders into a service for `root`.
pub fn open_service(
    root: &Path,
    config: Option<&Path>,
    actor: &str,
) -> Result<RecordService, WardenError> {
    let config = ServiceConfig::load_or_default(&config_path(root, config))?;
    let store = SqliteRecordStore::open(&root.join(WARDEN_DIR).join(DATA_DIR))?
        .with_access_field(&config.access_field)
        .with_actor(actor);

    let mut agents = AgentRegistry::default();
    let load_project = store.project_loader();
    agents.register_loader("project", move |id| load_project(id));

    RecordService::from_config(&config, Box::new(store), Arc::new(agents))
}

fn init_project(
    root: &Path,
    config: Option<&Path>,
    force: bool,
    format: OutputFormat,
) -> Result<(), WardenError> {
    let warden_dir = root.join(WARDEN_DIR);
    fs::create_dir_all(&warden_dir)?;

    let config_file = config_path(root, config);
    let wrote_config = force || !config_file.exists();
    if wrote_config {
        fs::write(&config_file, DEFAULT_CONFIG_TOML)?;
    }
    let store = SqliteRecordStore::open(&warden_dir.join(DATA_DIR))?;
    tracing::info!(root = %root.display(), "warden initialized");

    match format {
        OutputFormat::Json => print_json(&time::command_envelope(
            "init",
            "ok",
            json!({
                "config": config_file.display().to_string(),
                "config_written": wrote_config,
                "db": store.db_path().display().to_string(),
            }),
        ))?,
        OutputFormat::Text => {
            let verb = if wrote_config { "wrote" } else { "kept" };
            println!("{} {}", verb.green(), config_file.display());
            println!("{} {}", "store".green(), store.db_path().display());
        }
    }
    Ok(())
}

pub fn run() -> Result<(), WardenError> {
    let Cli {
        root,
        config,
        caller,
        format,
        command,
    } = Cli::parse();
    let identity = caller_identity(&caller);

    let root = match root {
        Some(root) => root,
        None if matches!(command, Command::Init { .. }) => std::env::current_dir()?,
        None => find_warden_root(&std::env::current_dir()?)?,
    };

    if let Command::Init { force } = command {
        return init_project(&root, config.as_deref(), force, format);
    }

    let service = open_service(&root, config.as_deref(), &identity.to_string())?;
    match command {
        Command::Init { .. } => Ok(()),
        Command::Record(cmd) => run_record(&service, &identity, cmd, format),
        Command::Access(cmd) => run_access(&service, &identity, cmd, format),
        Command::Plugins(PluginsCommand::List) => {
            let plugins = service.list_plugin_services();
            match format {
                OutputFormat::Json => print_json(&time::command_envelope(
                    "plugins.list",
                    "ok",
                    json!({ "plugins": plugins }),
                )),
                OutputFormat::Text => {
                    if plugins.is_empty() {
                        println!("{}", "no service plugins configured".dimmed());
                    }
                    for plugin in &plugins {
                        println!(
                            "{}  {}",
                            plugin["id"].as_str().unwrap_or_default().cyan(),
                            output::compact_line(&plugin["metadata"].to_string(), 60)
                        );
                    }
                    Ok(())
                }
            }
        }
        Command::Components => {
            let names = service.pipeline().names();
            match format {
                OutputFormat::Json => print_json(&time::command_envelope(
                    "components",
                    "ok",
                    json!({ "components": names }),
                )),
                OutputFormat::Text => {
                    for (pos, name) in names.iter().enumerate() {
                        println!("{:>2}. {}", pos + 1, name);
                    }
                    Ok(())
                }
            }
        }
        Command::Audit { tail } => {
            let broker = DbBroker::new(&root.join(WARDEN_DIR).join(DATA_DIR));
            let mut events = broker.read_events()?;
            if let Some(n) = tail {
                let skip = events.len().saturating_sub(n);
                events.drain(..skip);
            }
            match format {
                OutputFormat::Json => print_json(&time::command_envelope(
                    "audit",
                    "ok",
                    json!({ "events": events }),
                )),
                OutputFormat::Text => {
                    for event in &events {
                        let status = if event.status == "success" {
                            event.status.green()
                        } else {
                            event.status.red()
                        };
                        println!(
                            "{} {:<16} {:<8} {} {}",
                            event.ts,
                            event.op,
                            status,
                            event.actor,
                            event.intent_ref.as_deref().unwrap_or("-").dimmed()
                        );
                    }
                    Ok(())
                }
            }
        }
    }
}

fn run_record(
    service: &RecordService,
    identity: &Identity,
    cmd: RecordCommand,
    format: OutputFormat,
) -> Result<(), WardenError> {
    match cmd {
        RecordCommand::Create {
            payload,
            project,
            service: via,
        } => {
            let context = CallContext {
                project_id: project.as_deref().map(AgentId::parse),
                service: via,
                access_edit: None,
            };
            let item = service.create(identity, &read_payload(&payload)?, &context)?;
            emit_item("record.create", &item, format)
        }
        RecordCommand::Read { id, include_deleted } => {
            let item = service.read_with(identity, &id, include_deleted)?;
            emit_item("record.read", &item, format)
        }
        RecordCommand::Update {
            id,
            payload,
            service: via,
        } => {
            let context = CallContext {
                service: via,
                ..CallContext::default()
            };
            let item = service.update(identity, &id, &read_payload(&payload)?, &context)?;
            emit_item("record.update", &item, format)
        }
        RecordCommand::Delete { id } => {
            service.delete(identity, &id)?;
            match format {
                OutputFormat::Json => print_json(&time::command_envelope(
                    "record.delete",
                    "ok",
                    json!({ "id": id }),
                )),
                OutputFormat::Text => {
                    println!("{} {}", "deleted".yellow(), id);
                    Ok(())
                }
            }
        }
        RecordCommand::Finish { id } => {
            let item = service.finish(identity, &id)?;
            emit_item("record.finish", &item, format)
        }
        RecordCommand::Search(args) => {
            let params = SearchParams {
                page: args.page,
                size: args.size,
                include_deleted: args.include_deleted,
                service: args.service,
                finished: args.finished,
                user: args.user,
                agent: args.agent,
                role: args.role,
            };
            let list = service.search(identity, params)?;
            match format {
                OutputFormat::Json => {
                    let mut extra = list.to_value();
                    if let Value::Object(map) = &mut extra {
                        map.insert("page".to_string(), json!(list.pagination().page));
                        map.insert("size".to_string(), json!(list.pagination().size));
                    }
                    print_json(&time::command_envelope("record.search", "ok", extra))
                }
                OutputFormat::Text => {
                    print_list(&list);
                    Ok(())
                }
            }
        }
    }
}

fn run_access(
    service: &RecordService,
    identity: &Identity,
    cmd: AccessCommand,
    format: OutputFormat,
) -> Result<(), WardenError> {
    let (id, item, cmd_name) = match cmd {
        AccessCommand::List { id } => {
            let access = service.admin_list_agents(identity, &id)?;
            return match format {
                OutputFormat::Json => print_json(&time::command_envelope(
                    "access.list",
                    "ok",
                    json!({ "id": id, "access": access }),
                )),
                OutputFormat::Text => {
                    let access = RecordAccess::from_value(service.agents(), &access);
                    print_access(&access);
                    Ok(())
                }
            };
        }
        AccessCommand::Add(args) => {
            let role: AccessRole = args.role.parse()?;
            let agent = service.agents().parse_descriptor(&args.agent)?;
            let item = service.admin_add_agent(identity, &args.id, role, agent)?;
            (args.id, item, "access.add")
        }
        AccessCommand::Remove(args) => {
            let role: AccessRole = args.role.parse()?;
            let agent = service.agents().parse_descriptor(&args.agent)?;
            let item = service.admin_remove_agent(identity, &args.id, role, agent)?;
            (args.id, item, "access.remove")
        }
    };
    tracing::debug!(record = %id, cmd = cmd_name, "access command done");
    emit_item(cmd_name, &item, format)
}

fn print_json(value: &Value) -> Result<(), WardenError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit_item(cmd: &str, item: &ItemResult, format: OutputFormat) -> Result<(), WardenError> {
    match format {
        OutputFormat::Json => print_json(&time::command_envelope(
            cmd,
            "ok",
            json!({ "record": item.to_value() }),
        )),
        OutputFormat::Text => {
            print_item(item);
            Ok(())
        }
    }
}

fn descriptors(access: &RecordAccess, role: AccessRole) -> Vec<String> {
    access.list(role).iter().map(|a| a.to_string()).collect()
}

fn print_access(access: &RecordAccess) {
    println!(
        "{:<12} {}",
        "owners".bold(),
        output::agent_cell(&descriptors(access, AccessRole::Owner), 80)
    );
    println!(
        "{:<12} {}",
        "contributors".bold(),
        output::agent_cell(&descriptors(access, AccessRole::Contributor), 80)
    );
}

fn print_item(item: &ItemResult) {
    let record = item.record();
    println!("{:<12} {}", "id".bold(), record.id().cyan());
    println!("{:<12} {}", "pid".bold(), record.pid().unwrap_or("-"));
    println!("{:<12} {}", "service".bold(), record.service().unwrap_or("-"));
    println!(
        "{:<12} {}",
        "user".bold(),
        record.user_id().map(|u| u.to_string()).unwrap_or_else(|| "-".to_string())
    );
    let status = match (record.is_deleted(), record.is_finished()) {
        (true, _) => "deleted".red(),
        (false, true) => "finished".green(),
        (false, false) => "open".yellow(),
    };
    println!("{:<12} {}", "status".bold(), status);
    print_access(&record.peek_access());
    if let Some(metadata) = record.metadata() {
        println!(
            "{:<12} {}",
            "metadata".bold(),
            output::compact_line(&metadata.to_string(), 80)
        );
    }
}

fn print_list(list: &ListResult) {
    for item in list.items() {
        let record = item.record();
        let access = record.peek_access();
        println!(
            "{}  {:<20} {:<30} {}",
            record.id().cyan(),
            record.pid().unwrap_or("-"),
            output::agent_cell(&descriptors(&access, AccessRole::Owner), 30),
            output::agent_cell(&descriptors(&access, AccessRole::Contributor), 30)
        );
    }
    let pagination = list.pagination();
    println!(
        "{}",
        format!(
            "page {} ({} per page), {} of {} records",
            pagination.page,
            pagination.size,
            list.len(),
            list.total()
        )
        .dimmed()
    );
}
