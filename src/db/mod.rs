//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: row types written and read by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `meetdash::db` — we re-export the
//! repository API and row models for convenience.

pub mod model;
pub mod repo;

pub use model::{NewMeeting, StoredMeeting};
pub use repo::*;
