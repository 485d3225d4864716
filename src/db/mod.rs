//! Credential store: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: typed account entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `tw_harvester::db` — we re-export the
//! repository API and the account entity for convenience.

pub mod model;
pub mod repo;

pub use model::Account;
pub use repo::*;
