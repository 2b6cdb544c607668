//! Audit event logging.

pub mod logger;
