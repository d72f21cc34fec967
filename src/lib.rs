//! tgmonitor-rs library crate: Message Parser, Deduplication Engine,
//! Link-Validation Batch Engine, and Query & Statistics Layer, exposed via
//! the REST API in [`api`].

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logger;
pub mod parser;
pub mod store;
pub mod subsystems;
pub mod time;
pub mod validate;
