//! JSON-RPC Contract Caller Adapter
//!
//! Implements the `ContractCaller` port with `eth_call` over HTTP.
//! Transport failures are reported as connection errors. Anything the node
//! answers with that is not a usable result is a contract call error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ResolverError;
use crate::ports::outbound::ContractCaller;

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct CallParams {
    to: String,
    data: String,
}

/// `eth_call` client for one RPC endpoint.
pub struct JsonRpcContractCaller {
    http_client: reqwest::Client,
    rpc_url: reqwest::Url,
    timeout: Duration,
    request_id: AtomicU64,
}

impl JsonRpcContractCaller {
    /// Create a client for `rpc_url`. Every request is bounded by `timeout`.
    pub fn connect(rpc_url: &str, timeout: Duration) -> Result<Self, ResolverError> {
        let connection_error = |reason: String| ResolverError::Connection {
            rpc_url: rpc_url.to_string(),
            reason,
        };

        let url = reqwest::Url::parse(rpc_url).map_err(|e| connection_error(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(connection_error(format!("unsupported scheme {}", url.scheme())));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Self {
            http_client,
            rpc_url: url,
            timeout,
            request_id: AtomicU64::new(1),
        })
    }

    fn classify(&self, method: &'static str, e: reqwest::Error) -> ResolverError {
        if e.is_connect() || e.is_builder() {
            ResolverError::Connection {
                rpc_url: self.rpc_url.to_string(),
                reason: e.to_string(),
            }
        } else if e.is_timeout() {
            ResolverError::Timeout(self.timeout)
        } else {
            ResolverError::ContractCall {
                method,
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ContractCaller for JsonRpcContractCaller {
    async fn call(
        &self,
        contract: Address,
        method: &'static str,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ResolverError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_call",
            params: (
                CallParams {
                    to: format!("0x{}", hex::encode(contract.as_slice())),
                    data: format!("0x{}", hex::encode(&data)),
                },
                "latest",
            ),
            id,
        };

        debug!(rpc_url = %self.rpc_url, method, id, "Sending eth_call");

        let response = self
            .http_client
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(method, e))?;

        // The node answered, so a bad status is not a connectivity problem.
        if !response.status().is_success() {
            return Err(ResolverError::ContractCall {
                method,
                reason: format!("HTTP status {}", response.status()),
            });
        }

        let rpc_response: JsonRpcResponse<String> = response
            .json()
            .await
            .map_err(|e| self.classify(method, e))?;

        if let Some(error) = rpc_response.error {
            return Err(ResolverError::ContractCall {
                method,
                reason: format!("RPC error {}: {}", error.code, error.message),
            });
        }

        let result = rpc_response.result.ok_or_else(|| ResolverError::ContractCall {
            method,
            reason: "RPC response missing result".to_string(),
        })?;

        hex::decode(result.strip_prefix("0x").unwrap_or(&result)).map_err(|e| {
            ResolverError::ContractCall {
                method,
                reason: format!("invalid hex result: {e}"),
            }
        })
    }
}
