//! Declarative machine provisioning.
//!
//! A blueprint file declares rules (packages, clones, directories, secrets,
//! SSH host keys, apt keyrings, asdf tools, Homebrew formulas and Ollama
//! models). Each run parses the blueprint, orders rules by their `after:`
//! dependencies, diffs the persisted status against the declaration and
//! then executes install rules plus synthesized uninstalls for anything
//! that is no longer declared.
//!
//! The public API is organised into layers:
//!
//! - **[`blueprint`]** and **[`resolver`]**: parse and order rules
//! - **[`handlers`]**: per-kind `up`/`down` with status bookkeeping
//! - **[`status`]**: the persisted record of applied resources
//! - **[`engine`]**: plan and apply a whole blueprint
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod blueprint;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod git;
pub mod handlers;
pub mod logging;
pub mod operations;
pub mod platform;
pub mod record;
pub mod resolver;
pub mod secret;
pub mod session;
pub mod status;
