//! Automation execution: engine, webhook invoker, and their helpers.

pub mod checkpoint;
pub mod condition;
pub mod engine;
pub mod invoker;
pub mod retry;
pub mod template;
pub mod transport;
