//! # Domain Module
//!
//! Core types for query authorization: call keys, permission table, query
//! wire format, guardian sets, configuration and errors.

pub mod call_key;
pub mod config;
pub mod errors;
pub mod guardian_set;
pub mod permissions;
pub mod query;

pub use call_key::*;
pub use config::*;
pub use errors::*;
pub use guardian_set::GuardianSet;
pub use permissions::{PermissionEntry, PermissionTable};
pub use query::*;
