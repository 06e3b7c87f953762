//! # CCQ Query Authorization
//!
//! Authorization core for the cross-chain query gateway.
//!
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Purpose
//!
//! Decide whether an API key may run a signed cross-chain query, and read the
//! guardian set whose signatures vouch for query responses:
//! - Canonical call keys identify one contract function on one chain
//! - Permission tables map API keys to the call keys they may execute
//! - The authorizer checks every call in a request, all or nothing
//! - The resolver reads the current guardian set from the core bridge
//!
//! ## Guarantees
//!
//! | Guarantee | Description |
//! |-----------|-------------|
//! | Canonical keys | Hex case and address padding never change a key |
//! | Fail-fast loading | One bad entry rejects the whole permissions file |
//! | All or nothing | One unpermitted call rejects the whole request |
//! | Atomic reload | Readers see the old table or the new one, never a mix |
//! | Bounded resolution | Guardian set lookups give up after 5 seconds |
//!
//! ## Module Structure
//!
//! ```text
//! ccq-query-auth/
//! ├── domain/          # CallKey, PermissionTable, QueryRequest, GuardianSet, errors
//! ├── ports/           # ContractCaller
//! ├── adapters/        # JSON-RPC eth_call client
//! └── service/         # loader, authorizer, store + watcher, guardian resolver
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::JsonRpcContractCaller;
pub use domain::{
    contract_address_from_bytes, encode_eth_call_key, parse_contract_address, parse_selector,
    AuthConfig, AuthorizationError, CallDescriptor, CallKey, CallKeyError, ChainQuery,
    ConfigError, DecodeError, GuardianSet, PermissionEntry, PermissionError, PermissionTable,
    QueryRequest, QueryType, ResolverError, SignedQueryRequest, ValidationError,
};
pub use ports::{ContractCaller, MockContractCaller};
pub use service::{
    authorize, fetch_current_guardian_set, fetch_guardian_set_with_timeout, load_permissions,
    parse_permissions, resolve_guardian_set, AuthorizedQuery, PermissionStore, PermissionWatcher,
    RESOLVER_TIMEOUT,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
