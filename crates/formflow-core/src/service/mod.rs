//! Registry services (use cases) for webhook and automation definitions.
//!
//! Services validate definitions at write time and delegate persistence to
//! the repository traits. The execution engine reads definitions directly
//! and never writes through these services.

pub mod automation;
pub mod webhook;
