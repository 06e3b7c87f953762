//! # Outbound Ports
//!
//! Traits for external dependencies. The guardian set resolver only needs to
//! make read-only contract calls; the transport behind it is an adapter.

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::domain::ResolverError;

/// Read-only contract caller - outbound port.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Execute `data` against `contract` at the latest block and return the raw result.
    ///
    /// `method` names the call for error reporting.
    async fn call(
        &self,
        contract: Address,
        method: &'static str,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ResolverError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Mock contract caller answering by function selector.
#[derive(Clone, Default)]
pub struct MockContractCaller {
    /// Responses keyed by the first four bytes of call data.
    pub responses: std::collections::HashMap<[u8; 4], Vec<u8>>,
    /// Delay applied before every answer.
    pub delay: Option<std::time::Duration>,
    /// Fail every call as unreachable?
    pub unreachable: bool,
}

impl MockContractCaller {
    /// Register the response for a selector.
    pub fn with_response(mut self, selector: [u8; 4], response: Vec<u8>) -> Self {
        self.responses.insert(selector, response);
        self
    }
}

#[async_trait]
impl ContractCaller for MockContractCaller {
    async fn call(
        &self,
        _contract: Address,
        method: &'static str,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ResolverError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(ResolverError::Connection {
                rpc_url: "mock://".to_string(),
                reason: "Mock failure".to_string(),
            });
        }

        let mut selector = [0u8; 4];
        if data.len() >= 4 {
            selector.copy_from_slice(&data[..4]);
        }
        self.responses
            .get(&selector)
            .cloned()
            .ok_or_else(|| ResolverError::ContractCall {
                method,
                reason: "execution reverted".to_string(),
            })
    }
}
