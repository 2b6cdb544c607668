//! Shared domain types for Formflow.
//!
//! This crate contains the domain types of the automation engine: webhooks,
//! automations and their steps, execution records, system events, global
//! configuration, and the associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod automation;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod webhook;
