//! # Service Layer
//!
//! Loading, authorization and guardian set resolution built on the domain types.

pub mod authorizer;
pub mod guardian;
pub mod loader;
pub mod store;

pub use authorizer::{authorize, AuthorizedQuery};
pub use guardian::{
    fetch_current_guardian_set, fetch_guardian_set_with_timeout, resolve_guardian_set,
    RESOLVER_TIMEOUT,
};
pub use loader::{load_permissions, parse_permissions};
pub use store::{PermissionStore, PermissionWatcher};
