//! Command and query handlers.

pub mod billing;
