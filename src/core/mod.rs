//! Core modules: the access model, the record service and its collaborators.
//!
//! Storage goes through [`store::RecordStore`]; the SQLite implementation routes
//! every write through [`broker::DbBroker`] for serialization and audit logging.

pub mod access;
pub mod admin;
pub mod agent;
pub mod broker;
pub mod component;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod links;
pub mod memory_store;
pub mod output;
pub mod pagination;
pub mod policy;
pub mod record;
pub mod registry;
pub mod results;
pub mod schemas;
pub mod service;
pub mod store;
pub mod time;
pub mod validation;
