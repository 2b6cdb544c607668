//! Custom axum extractors.

pub mod origin;
pub mod payload;
pub mod query;
