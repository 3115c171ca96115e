//! Infrastructure layer for Loanflow.
//!
//! Contains implementations of the repository traits defined in `loanflow-core`
//! (SQLite storage with embedded migrations) and the data directory and
//! `config.toml` loaders.

pub mod config;
pub mod sqlite;
