//! HTTP adapters - axum routers, DTOs, and error mapping.

pub mod billing;
