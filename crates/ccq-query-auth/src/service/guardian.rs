//! # Guardian Set Resolver
//!
//! Reads the current guardian set from the core bridge contract:
//! `getCurrentGuardianSetIndex()` followed by `getGuardianSet(index)`.
//!
//! Nothing is cached. Every call returns the state as of the latest block.

use std::time::Duration;

use alloy_primitives::Address;
use alloy_sol_types::SolCall;
use tracing::{debug, info, warn};

use crate::adapters::JsonRpcContractCaller;
use crate::domain::{parse_contract_address, GuardianSet, ResolverError, DEFAULT_RESOLVER_TIMEOUT_SECS};
use crate::ports::outbound::ContractCaller;

mod abi {
    #![allow(missing_docs)]

    alloy_sol_types::sol! {
        interface ICoreBridge {
            struct GuardianSetRecord {
                address[] keys;
                uint32 expirationTime;
            }

            function getCurrentGuardianSetIndex() external view returns (uint32);
            function getGuardianSet(uint32 index) external view returns (GuardianSetRecord memory);
        }
    }
}

use abi::ICoreBridge;

const CURRENT_INDEX_METHOD: &str = "getCurrentGuardianSetIndex";
const GUARDIAN_SET_METHOD: &str = "getGuardianSet";

/// Deadline for [`fetch_current_guardian_set`], connection included.
pub const RESOLVER_TIMEOUT: Duration = Duration::from_secs(DEFAULT_RESOLVER_TIMEOUT_SECS);

/// Fetch the current guardian set through `rpc_url`.
///
/// The whole operation, connecting included, is bounded by [`RESOLVER_TIMEOUT`].
/// A guardian set with no keys is reported as [`ResolverError::ContractCall`]
/// rather than returned, since it can never reach quorum.
pub async fn fetch_current_guardian_set(
    rpc_url: &str,
    core_bridge_address: &str,
) -> Result<GuardianSet, ResolverError> {
    fetch_guardian_set_with_timeout(rpc_url, core_bridge_address, RESOLVER_TIMEOUT).await
}

/// [`fetch_current_guardian_set`] with a caller-chosen deadline.
pub async fn fetch_guardian_set_with_timeout(
    rpc_url: &str,
    core_bridge_address: &str,
    timeout: Duration,
) -> Result<GuardianSet, ResolverError> {
    let core_bridge = parse_contract_address(core_bridge_address)?;
    let caller = JsonRpcContractCaller::connect(rpc_url, timeout)?;
    resolve_guardian_set(&caller, core_bridge, timeout).await
}

/// Resolve the current guardian set through any [`ContractCaller`].
///
/// Same rules as [`fetch_current_guardian_set`], including the empty set error.
pub async fn resolve_guardian_set<C>(
    caller: &C,
    core_bridge: Address,
    timeout: Duration,
) -> Result<GuardianSet, ResolverError>
where
    C: ContractCaller + ?Sized,
{
    match tokio::time::timeout(timeout, read_guardian_set(caller, core_bridge)).await {
        Ok(Ok(set)) => {
            info!(
                core_bridge = %core_bridge,
                index = set.index,
                guardians = set.len(),
                "Resolved guardian set"
            );
            Ok(set)
        }
        Ok(Err(e)) => {
            warn!(core_bridge = %core_bridge, error = %e, "Guardian set resolution failed");
            Err(e)
        }
        Err(_) => {
            warn!(core_bridge = %core_bridge, ?timeout, "Guardian set resolution timed out");
            Err(ResolverError::Timeout(timeout))
        }
    }
}

async fn read_guardian_set<C>(caller: &C, core_bridge: Address) -> Result<GuardianSet, ResolverError>
where
    C: ContractCaller + ?Sized,
{
    let raw = caller
        .call(
            core_bridge,
            CURRENT_INDEX_METHOD,
            ICoreBridge::getCurrentGuardianSetIndexCall {}.abi_encode(),
        )
        .await?;
    let index = ICoreBridge::getCurrentGuardianSetIndexCall::abi_decode_returns(&raw, true)
        .map_err(|e| decode_error(CURRENT_INDEX_METHOD, e))?
        ._0;
    debug!(core_bridge = %core_bridge, index, "Current guardian set index");

    let raw = caller
        .call(
            core_bridge,
            GUARDIAN_SET_METHOD,
            ICoreBridge::getGuardianSetCall { index }.abi_encode(),
        )
        .await?;
    let record = ICoreBridge::getGuardianSetCall::abi_decode_returns(&raw, true)
        .map_err(|e| decode_error(GUARDIAN_SET_METHOD, e))?
        ._0;

    if record.keys.is_empty() {
        return Err(ResolverError::ContractCall {
            method: GUARDIAN_SET_METHOD,
            reason: format!("guardian set {index} has no keys"),
        });
    }

    Ok(GuardianSet {
        index,
        keys: record.keys,
    })
}

fn decode_error(method: &'static str, e: alloy_sol_types::Error) -> ResolverError {
    ResolverError::ContractCall {
        method,
        reason: format!("unexpected return data: {e}"),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ports::outbound::MockContractCaller;

    /// ABI-encoded `getCurrentGuardianSetIndex()` return value.
    pub fn encode_index(index: u32) -> Vec<u8> {
        ICoreBridge::getCurrentGuardianSetIndexCall::abi_encode_returns(&(index,))
    }

    /// ABI-encoded `getGuardianSet(uint32)` return value.
    pub fn encode_set(keys: Vec<Address>) -> Vec<u8> {
        let record = ICoreBridge::GuardianSetRecord {
            keys,
            expirationTime: 0,
        };
        ICoreBridge::getGuardianSetCall::abi_encode_returns(&(record,))
    }

    /// Mock core bridge answering both calls.
    pub fn mock_bridge(index: u32, keys: Vec<Address>) -> MockContractCaller {
        MockContractCaller::default()
            .with_response(
                ICoreBridge::getCurrentGuardianSetIndexCall::SELECTOR,
                encode_index(index),
            )
            .with_response(ICoreBridge::getGuardianSetCall::SELECTOR, encode_set(keys))
    }
}
