//! # ai-deploy - incremental file sync and database provisioning engine
//!
//! Deploys a source tree to a local or remote destination, applying file
//! mappings and running ordered SQL scripts and JSON seed data against a
//! single or multi-tenant database, all gated by a persistent trust cache
//! that makes repeat runs touch only what changed.

#![warn(dead_code)]

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod ignore;
pub mod logging;
pub mod orchestrator;
pub mod seed;
pub mod sql;
pub mod sync;
pub mod template;
pub mod types;

pub use error::DeployError;
pub use orchestrator::{run, DeploySummaryResult};

// vim: ts=4
