//! # Domain Errors
//!
//! Error types for the query authorization core, grouped by who sees them:
//!
//! | Type | Raised by | Recoverable |
//! |------|-----------|-------------|
//! | [`PermissionError`] | permission loader | no, fatal at load time |
//! | [`AuthorizationError`] | query authorizer | yes, per request |
//! | [`ResolverError`] | guardian set resolver | yes, caller decides retry |

use std::time::Duration;
use thiserror::Error;

use super::call_key::CallKey;

/// Canonical key codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallKeyError {
    /// Contract address is not valid hex or not a 20-byte EVM address.
    #[error("invalid contract address \"{value}\": {reason}")]
    InvalidAddress {
        /// Offending input.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Function selector is not valid hex or not exactly four bytes.
    #[error("invalid function selector \"{value}\": {reason}")]
    InvalidSelector {
        /// Offending input.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// String does not have the canonical `tag:chain:address:selector` shape.
    #[error("malformed call key \"{0}\"")]
    MalformedKey(String),

    /// Call key tag is not a known call type.
    #[error("unknown call key tag \"{0}\"")]
    UnknownTag(String),
}

/// Permission file errors. Any of these aborts the load; no partial table is produced.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// File could not be read.
    #[error("failed to read permissions file \"{path}\": {source}")]
    Read {
        /// Permissions file path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File is not a valid permissions document.
    #[error("failed to parse permissions file \"{path}\": {source}")]
    Parse {
        /// Permissions file path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A user entry has no API key.
    #[error("user \"{user}\" in permissions file \"{path}\" has an empty API key")]
    EmptyApiKey {
        /// User name.
        user: String,
        /// Permissions file path.
        path: String,
    },

    /// Two users share an API key (compared case-insensitively).
    #[error("API key \"{api_key}\" in permissions file \"{path}\" is a duplicate")]
    DuplicateApiKey {
        /// Normalized API key.
        api_key: String,
        /// Permissions file path.
        path: String,
    },

    /// Allowed call carries an invalid contract address.
    #[error("invalid contract address \"{value}\" for user \"{user}\" in permissions file \"{path}\": {source}")]
    InvalidContractAddress {
        /// Offending address string.
        value: String,
        /// User name.
        user: String,
        /// Permissions file path.
        path: String,
        /// Codec error.
        source: CallKeyError,
    },

    /// Allowed call carries an invalid function selector.
    #[error("invalid eth call \"{value}\" for user \"{user}\" in permissions file \"{path}\": {source}")]
    InvalidSelector {
        /// Offending selector string.
        value: String,
        /// User name.
        user: String,
        /// Permissions file path.
        path: String,
        /// Codec error.
        source: CallKeyError,
    },

    /// Allowed call uses a tag other than `ethCall`.
    #[error("unsupported call type \"{tag}\" for user \"{user}\" in permissions file \"{path}\"")]
    UnsupportedCallType {
        /// Tag found in the declaration.
        tag: String,
        /// User name.
        user: String,
        /// Permissions file path.
        path: String,
    },

    /// Same canonical call declared twice for one user.
    #[error("\"{call_key}\" is a duplicate allowed call for user \"{user}\" in permissions file \"{path}\"")]
    DuplicateAllowedCall {
        /// Canonical key declared twice.
        call_key: CallKey,
        /// User name.
        user: String,
        /// Permissions file path.
        path: String,
    },
}

/// Query wire decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input ended before a field was complete.
    #[error("unexpected end of input while reading {field}")]
    Truncated {
        /// Field being read.
        field: &'static str,
    },

    /// Envelope version is not supported.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(u8),

    /// Query type byte is not a known query type.
    #[error("unknown query type {0}")]
    UnknownQueryType(u8),

    /// Bytes left over after a complete structure.
    #[error("{count} trailing bytes after {context}")]
    TrailingBytes {
        /// Structure that was decoded.
        context: &'static str,
        /// Number of unread bytes.
        count: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("field {field} is not valid utf-8")]
    InvalidUtf8 {
        /// Field being read.
        field: &'static str,
    },
}

/// Structural validation errors for a decoded query request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Request carries no per-chain queries.
    #[error("request does not contain any per chain queries")]
    NoPerChainQueries,

    /// A repeated field exceeds the one-byte count of the wire format.
    #[error("too many {what}: {count}, at most 255 allowed")]
    TooMany {
        /// Repeated field.
        what: &'static str,
        /// Actual count.
        count: usize,
    },

    /// Chain id zero is reserved.
    #[error("chain id must be larger than zero")]
    InvalidChainId,

    /// Block id is not a `0x`-prefixed hex number or hash.
    #[error("invalid block id \"{0}\", must be a hex number or hash starting with 0x")]
    InvalidBlockId(String),

    /// Eth query carries no call data.
    #[error("eth query on chain {chain_id} does not contain any call data")]
    NoCallData {
        /// Chain of the offending query.
        chain_id: u16,
    },

    /// A call data item has an empty payload.
    #[error("call data {index} on chain {chain_id} is empty")]
    EmptyCallData {
        /// Chain of the offending query.
        chain_id: u16,
        /// Position of the call within the query.
        index: usize,
    },

    /// Finality is neither `finalized` nor `safe`.
    #[error("invalid finality \"{0}\", must be \"finalized\" or \"safe\"")]
    InvalidFinality(String),

    /// Call target is not a 20-byte address; the wire format has no room for it.
    #[error("call target must be a 20-byte address, got {len} bytes")]
    InvalidCallTarget {
        /// Actual target length.
        len: usize,
    },

    /// Target timestamp must be set.
    #[error("target timestamp may not be zero")]
    ZeroTimestamp,

    /// Solana commitment is not `finalized`.
    #[error("invalid commitment \"{0}\", must be \"finalized\"")]
    InvalidCommitment(String),

    /// Solana query carries no accounts.
    #[error("solana query does not contain any accounts")]
    NoAccounts,

    /// Data slice offset set without a length.
    #[error("data slice offset may not be set if data slice length is zero")]
    DataSliceOffsetWithoutLength,
}

/// Per-request authorization failures.
///
/// None of these are fatal to the service: the request is rejected and the
/// caller gets [`AuthorizationError::reason_code`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    /// API key is not in the permission table.
    #[error("invalid api key")]
    InvalidApiKey,

    /// Payload could not be decoded.
    #[error("failed to unmarshal request: {0}")]
    MalformedRequest(#[from] DecodeError),

    /// Payload decoded but is structurally invalid.
    #[error("failed to validate request: {0}")]
    InvalidRequest(#[from] ValidationError),

    /// Per-chain query variant the authorizer cannot check.
    #[error("unsupported query type {query_type} on chain {chain_id}")]
    UnsupportedQueryType {
        /// Chain of the offending query.
        chain_id: u16,
        /// Name of the query variant.
        query_type: &'static str,
    },

    /// Call target is not a 20-byte EVM address.
    #[error("failed to parse contract address: {0}")]
    AddressParse(CallKeyError),

    /// Call data shorter than a function selector.
    #[error("eth call data must be at least four bytes, got {len}")]
    CallDataTooShort {
        /// Actual call data length.
        len: usize,
    },

    /// Caller is not permitted to make this call.
    #[error("call \"{call_key}\" not authorized")]
    CallNotAuthorized {
        /// Canonical key of the rejected call.
        call_key: CallKey,
    },
}

impl AuthorizationError {
    /// Stable reason code for rejection responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidApiKey => "invalid_api_key",
            Self::MalformedRequest(_) => "malformed_request",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedQueryType { .. } => "unsupported_query_type",
            Self::AddressParse(_) => "address_parse_error",
            Self::CallDataTooShort { .. } => "call_data_too_short",
            Self::CallNotAuthorized { .. } => "call_not_authorized",
        }
    }
}

/// Guardian set resolution failures.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Endpoint unreachable or URL unusable.
    #[error("failed to connect to {rpc_url}: {reason}")]
    Connection {
        /// Endpoint that was dialed.
        rpc_url: String,
        /// Transport error.
        reason: String,
    },

    /// Contract call failed, reverted, or returned unexpected data.
    #[error("error requesting {method}: {reason}")]
    ContractCall {
        /// Contract method being called.
        method: &'static str,
        /// Failure detail.
        reason: String,
    },

    /// Core bridge address is not a valid EVM address.
    #[error("invalid core bridge address: {0}")]
    InvalidContractAddress(#[from] CallKeyError),

    /// Deadline elapsed before both reads completed.
    #[error("guardian set resolution timed out after {0:?}")]
    Timeout(Duration),
}

impl ResolverError {
    /// True when the endpoint could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// True when the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
