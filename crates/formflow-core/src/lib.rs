//! Business logic and repository traits for Formflow.
//!
//! This crate holds the automation engine (execution engine, webhook invoker,
//! condition evaluation, payload templates), the audit event logger, and the
//! registry services that validate webhook and automation definitions.
//! Storage and HTTP are reached only through the traits in [`repository`] and
//! [`automation::transport`]; formflow-infra provides the implementations.

pub mod automation;
pub mod event;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;
