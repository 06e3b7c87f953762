//! # Query Authorizer
//!
//! Decides whether an API key may run every call in a signed query request.
//! Pure over the permission table: no I/O, no locks, no suspension points.
//!
//! ## Flow
//!
//! ```text
//! api key ──lookup──→ PermissionEntry        (InvalidApiKey)
//! payload ──decode──→ QueryRequest           (MalformedRequest)
//!         ──validate─→ ok                    (InvalidRequest)
//! for each per-chain query:
//!     EthCall?                               (UnsupportedQueryType)
//!     for each call: to → address            (AddressParse)
//!                    data[..4] → selector    (CallDataTooShort)
//!                    call key ∈ allowed?     (CallNotAuthorized)
//! ```
//!
//! The request signature is not verified here.

use alloy_primitives::Selector;
use tracing::debug;

use crate::domain::{
    contract_address_from_bytes, AuthorizationError, CallDescriptor, ChainQuery, PermissionEntry,
    PermissionTable, QueryRequest, SignedQueryRequest, SELECTOR_LEN,
};

/// A request that passed authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizedQuery {
    /// User the API key belongs to.
    pub user_name: String,
    /// Decoded request, ready for dispatch.
    pub request: QueryRequest,
    /// Total number of calls checked.
    pub call_count: usize,
}

/// Authorize `signed` for `api_key` against `table`.
///
/// Every call in every sub-query must be permitted; a single failure rejects
/// the whole request.
pub fn authorize(
    api_key: &str,
    signed: &SignedQueryRequest,
    table: &PermissionTable,
) -> Result<AuthorizedQuery, AuthorizationError> {
    let Some(entry) = table.get(api_key) else {
        debug!("Rejected query request with unknown api key");
        return Err(AuthorizationError::InvalidApiKey);
    };

    let result = decode_and_check(entry, &signed.query_request);
    match &result {
        Ok(authorized) => debug!(
            user = %entry.user_name(),
            per_chain_queries = authorized.request.per_chain_queries.len(),
            calls = authorized.call_count,
            "Authorized query request"
        ),
        Err(AuthorizationError::CallNotAuthorized { call_key }) => debug!(
            user = %entry.user_name(),
            call_key = %call_key,
            "Api key requested an unauthorized call"
        ),
        Err(e) => debug!(
            user = %entry.user_name(),
            reason = e.reason_code(),
            error = %e,
            "Rejected query request"
        ),
    }
    result
}

fn decode_and_check(entry: &PermissionEntry, payload: &[u8]) -> Result<AuthorizedQuery, AuthorizationError> {
    let request = QueryRequest::decode(payload)?;
    request.validate()?;

    let mut call_count = 0;
    for pcq in &request.per_chain_queries {
        match &pcq.query {
            ChainQuery::EthCall(q) => {
                for call in &q.call_data {
                    check_eth_call(entry, pcq.chain_id, &call.to, &call.data)?;
                    call_count += 1;
                }
            }
            ChainQuery::EthCallByTimestamp(_)
            | ChainQuery::EthCallWithFinality(_)
            | ChainQuery::SolanaAccount(_) => {
                return Err(AuthorizationError::UnsupportedQueryType {
                    chain_id: pcq.chain_id,
                    query_type: pcq.query.query_type().name(),
                });
            }
        }
    }

    Ok(AuthorizedQuery {
        user_name: entry.user_name().to_string(),
        request,
        call_count,
    })
}

fn check_eth_call(
    entry: &PermissionEntry,
    chain_id: u16,
    to: &[u8],
    data: &[u8],
) -> Result<(), AuthorizationError> {
    let contract = contract_address_from_bytes(to).map_err(AuthorizationError::AddressParse)?;
    if data.len() < SELECTOR_LEN {
        return Err(AuthorizationError::CallDataTooShort { len: data.len() });
    }
    // Arguments after the selector are not part of the permission.
    let selector = Selector::from_slice(&data[..SELECTOR_LEN]);

    let call_key = CallDescriptor::eth_call(chain_id, contract, selector).call_key();
    if !entry.is_allowed(&call_key) {
        return Err(AuthorizationError::CallNotAuthorized { call_key });
    }
    Ok(())
}
