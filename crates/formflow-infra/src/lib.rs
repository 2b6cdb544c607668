//! Infrastructure layer for Formflow.
//!
//! Contains implementations of the ports defined in `formflow-core`:
//! SQLite repositories (split reader/writer pool in WAL mode), the
//! reqwest-backed webhook transport, and the TOML configuration loader.

pub mod config;
pub mod http;
pub mod sqlite;
