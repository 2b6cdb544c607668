//! REST API request handlers.

pub mod automation;
pub mod event;
pub mod execution;
pub mod webhook;
