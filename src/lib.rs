//! meetdash: personal-dashboard sync server for a meetings provider.
//!
//! The crate is organized around the OAuth token lifecycle (`auth`), the
//! idempotent sync engine (`sync`), its storage (`db`), the provider API
//! client (`provider`), the recurring scheduler (`scheduler`), and the REST
//! surface (`http`).

pub mod auth;
pub mod config;
pub mod db;
pub mod http;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod sync;
