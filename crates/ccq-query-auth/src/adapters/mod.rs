//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits.

mod json_rpc;

pub use json_rpc::JsonRpcContractCaller;
