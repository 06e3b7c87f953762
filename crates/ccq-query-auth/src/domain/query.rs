//! # Query Request Wire Format
//!
//! Decoding, encoding and structural validation of cross-chain query requests.
//! All integers are big-endian; strings and byte fields carry a `u32` length.
//! Call targets are fixed-width EVM addresses.
//!
//! ```text
//! QueryRequest  := version:u8 nonce:u32 count:u8 PerChainQuery{count}
//! PerChainQuery := chain_id:u16 query_type:u8 len:u32 body[len]
//! CallData      := to[20] data_len:u32 data[data_len]
//! ```

use serde::{Deserialize, Serialize};

use super::call_key::ADDRESS_LEN;
use super::errors::{DecodeError, ValidationError};

/// Current envelope version.
pub const MSG_VERSION: u8 = 1;

/// Maximum count of any repeated field (one-byte counts on the wire).
pub const MAX_REPEATED: usize = u8::MAX as usize;

const SOLANA_ACCOUNT_LEN: usize = 32;

/// Wire tag of a per-chain query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryType {
    /// `eth_call` at a block id.
    EthCall = 1,
    /// `eth_call` at the block matching a timestamp.
    EthCallByTimestamp = 2,
    /// `eth_call` once a block reaches a finality level.
    EthCallWithFinality = 3,
    /// Solana account read.
    SolanaAccount = 4,
}

impl TryFrom<u8> for QueryType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::EthCall),
            2 => Ok(Self::EthCallByTimestamp),
            3 => Ok(Self::EthCallWithFinality),
            4 => Ok(Self::SolanaAccount),
            other => Err(DecodeError::UnknownQueryType(other)),
        }
    }
}

impl QueryType {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EthCall => "ethCall",
            Self::EthCallByTimestamp => "ethCallByTimestamp",
            Self::EthCallWithFinality => "ethCallWithFinality",
            Self::SolanaAccount => "solAccount",
        }
    }
}

/// Decoded query request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    /// Client nonce.
    pub nonce: u32,
    /// Sub-queries, in request order.
    pub per_chain_queries: Vec<PerChainQuery>,
}

/// One sub-query against one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PerChainQuery {
    /// Wormhole chain id.
    pub chain_id: u16,
    /// Query body.
    pub query: ChainQuery,
}

/// Query body variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainQuery {
    /// See [`EthCallQueryRequest`].
    EthCall(EthCallQueryRequest),
    /// See [`EthCallByTimestampQueryRequest`].
    EthCallByTimestamp(EthCallByTimestampQueryRequest),
    /// See [`EthCallWithFinalityQueryRequest`].
    EthCallWithFinality(EthCallWithFinalityQueryRequest),
    /// See [`SolanaAccountQueryRequest`].
    SolanaAccount(SolanaAccountQueryRequest),
}

impl ChainQuery {
    /// Wire tag of this variant.
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::EthCall(_) => QueryType::EthCall,
            Self::EthCallByTimestamp(_) => QueryType::EthCallByTimestamp,
            Self::EthCallWithFinality(_) => QueryType::EthCallWithFinality,
            Self::SolanaAccount(_) => QueryType::SolanaAccount,
        }
    }
}

/// A single contract call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCallData {
    /// Target contract. Exactly 20 bytes once decoded.
    pub to: Vec<u8>,
    /// ABI call data: selector followed by arguments.
    pub data: Vec<u8>,
}

/// `eth_call` batch at a block id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCallQueryRequest {
    /// Block number or hash, `0x`-prefixed hex.
    pub block_id: String,
    /// Calls to make.
    pub call_data: Vec<EthCallData>,
}

/// `eth_call` batch at the block for a timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCallByTimestampQueryRequest {
    /// Target timestamp in microseconds.
    pub target_timestamp: u64,
    /// Optional hint for the target block.
    pub target_block_id_hint: String,
    /// Optional hint for the following block.
    pub following_block_id_hint: String,
    /// Calls to make.
    pub call_data: Vec<EthCallData>,
}

/// `eth_call` batch that waits for finality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCallWithFinalityQueryRequest {
    /// Block number or hash, `0x`-prefixed hex.
    pub block_id: String,
    /// `finalized` or `safe`.
    pub finality: String,
    /// Calls to make.
    pub call_data: Vec<EthCallData>,
}

/// Solana account read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolanaAccountQueryRequest {
    /// Commitment level, only `finalized` is accepted.
    pub commitment: String,
    /// Minimum slot the node must have processed.
    pub min_context_slot: u64,
    /// Offset into account data.
    pub data_slice_offset: u64,
    /// Length of account data to return, zero for all.
    pub data_slice_length: u64,
    /// Account public keys.
    pub accounts: Vec<[u8; 32]>,
}

/// Signed request envelope as received from a client.
///
/// The signature is carried through untouched; nothing in this crate verifies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQueryRequest {
    /// Encoded [`QueryRequest`].
    #[serde(rename = "bytes", with = "hex_bytes")]
    pub query_request: Vec<u8>,
    /// Client signature over the request.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedQueryRequest {
    /// Wrap an encoded request and its signature.
    pub fn new(query_request: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            query_request,
            signature,
        }
    }
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(D::Error::custom)
    }
}

// =============================================================================
// Decoding
// =============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.bytes.len() - self.pos < len {
            return Err(DecodeError::Truncated { field });
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2, field)?);
        Ok(u16::from_be_bytes(buf))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, field)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn bytes(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.u32(field)? as usize;
        let raw = self.take(len, field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    fn finish(self, context: &'static str) -> Result<(), DecodeError> {
        let count = self.bytes.len() - self.pos;
        if count > 0 {
            return Err(DecodeError::TrailingBytes { context, count });
        }
        Ok(())
    }
}

impl QueryRequest {
    /// Decode a request from its wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let version = reader.u8("version")?;
        if version != MSG_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let nonce = reader.u32("nonce")?;
        let count = reader.u8("per chain query count")?;

        let mut per_chain_queries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            per_chain_queries.push(decode_per_chain_query(&mut reader)?);
        }
        reader.finish("query request")?;

        Ok(Self {
            nonce,
            per_chain_queries,
        })
    }
}

fn decode_per_chain_query(reader: &mut Reader<'_>) -> Result<PerChainQuery, DecodeError> {
    let chain_id = reader.u16("chain id")?;
    let query_type = QueryType::try_from(reader.u8("query type")?)?;
    let body = reader.bytes("per chain query body")?;

    let mut body = Reader::new(&body);
    let query = match query_type {
        QueryType::EthCall => ChainQuery::EthCall(EthCallQueryRequest {
            block_id: body.string("block id")?,
            call_data: decode_call_data(&mut body)?,
        }),
        QueryType::EthCallByTimestamp => {
            ChainQuery::EthCallByTimestamp(EthCallByTimestampQueryRequest {
                target_timestamp: body.u64("target timestamp")?,
                target_block_id_hint: body.string("target block id hint")?,
                following_block_id_hint: body.string("following block id hint")?,
                call_data: decode_call_data(&mut body)?,
            })
        }
        QueryType::EthCallWithFinality => {
            ChainQuery::EthCallWithFinality(EthCallWithFinalityQueryRequest {
                block_id: body.string("block id")?,
                finality: body.string("finality")?,
                call_data: decode_call_data(&mut body)?,
            })
        }
        QueryType::SolanaAccount => {
            let commitment = body.string("commitment")?;
            let min_context_slot = body.u64("min context slot")?;
            let data_slice_offset = body.u64("data slice offset")?;
            let data_slice_length = body.u64("data slice length")?;
            let count = body.u8("account count")?;
            let mut accounts = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let mut account = [0u8; SOLANA_ACCOUNT_LEN];
                account.copy_from_slice(body.take(SOLANA_ACCOUNT_LEN, "account")?);
                accounts.push(account);
            }
            ChainQuery::SolanaAccount(SolanaAccountQueryRequest {
                commitment,
                min_context_slot,
                data_slice_offset,
                data_slice_length,
                accounts,
            })
        }
    };
    body.finish("per chain query")?;

    Ok(PerChainQuery { chain_id, query })
}

fn decode_call_data(reader: &mut Reader<'_>) -> Result<Vec<EthCallData>, DecodeError> {
    let count = reader.u8("call data count")?;
    let mut calls = Vec::with_capacity(count as usize);
    for _ in 0..count {
        calls.push(EthCallData {
            to: reader.take(ADDRESS_LEN, "call data to")?.to_vec(),
            data: reader.bytes("call data")?,
        });
    }
    Ok(calls)
}

// =============================================================================
// Encoding
// =============================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    fn count(&mut self, what: &'static str, count: usize) -> Result<(), ValidationError> {
        let count = u8::try_from(count).map_err(|_| ValidationError::TooMany { what, count })?;
        self.u8(count);
        Ok(())
    }
}

impl QueryRequest {
    /// Encode to the wire form.
    ///
    /// Fails only when a repeated field does not fit its one-byte count.
    pub fn encode(&self) -> Result<Vec<u8>, ValidationError> {
        let mut w = Writer::new();
        w.u8(MSG_VERSION);
        w.u32(self.nonce);
        w.count("per chain queries", self.per_chain_queries.len())?;
        for pcq in &self.per_chain_queries {
            w.u16(pcq.chain_id);
            w.u8(pcq.query.query_type() as u8);
            w.bytes(&encode_chain_query(&pcq.query)?);
        }
        Ok(w.buf)
    }
}

fn encode_chain_query(query: &ChainQuery) -> Result<Vec<u8>, ValidationError> {
    let mut w = Writer::new();
    match query {
        ChainQuery::EthCall(q) => {
            w.bytes(q.block_id.as_bytes());
            encode_call_data(&mut w, &q.call_data)?;
        }
        ChainQuery::EthCallByTimestamp(q) => {
            w.u64(q.target_timestamp);
            w.bytes(q.target_block_id_hint.as_bytes());
            w.bytes(q.following_block_id_hint.as_bytes());
            encode_call_data(&mut w, &q.call_data)?;
        }
        ChainQuery::EthCallWithFinality(q) => {
            w.bytes(q.block_id.as_bytes());
            w.bytes(q.finality.as_bytes());
            encode_call_data(&mut w, &q.call_data)?;
        }
        ChainQuery::SolanaAccount(q) => {
            w.bytes(q.commitment.as_bytes());
            w.u64(q.min_context_slot);
            w.u64(q.data_slice_offset);
            w.u64(q.data_slice_length);
            w.count("accounts", q.accounts.len())?;
            for account in &q.accounts {
                w.buf.extend_from_slice(account);
            }
        }
    }
    Ok(w.buf)
}

fn encode_call_data(w: &mut Writer, calls: &[EthCallData]) -> Result<(), ValidationError> {
    w.count("call data", calls.len())?;
    for call in calls {
        if call.to.len() != ADDRESS_LEN {
            return Err(ValidationError::InvalidCallTarget { len: call.to.len() });
        }
        w.buf.extend_from_slice(&call.to);
        w.bytes(&call.data);
    }
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

impl QueryRequest {
    /// Check the structural rules of a decoded request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.per_chain_queries.is_empty() {
            return Err(ValidationError::NoPerChainQueries);
        }
        check_count("per chain queries", self.per_chain_queries.len())?;
        self.per_chain_queries.iter().try_for_each(PerChainQuery::validate)
    }
}

impl PerChainQuery {
    /// Check the structural rules of one sub-query.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chain_id == 0 {
            return Err(ValidationError::InvalidChainId);
        }
        match &self.query {
            ChainQuery::EthCall(q) => {
                validate_block_id(&q.block_id)?;
                validate_call_data(self.chain_id, &q.call_data)
            }
            ChainQuery::EthCallByTimestamp(q) => {
                if q.target_timestamp == 0 {
                    return Err(ValidationError::ZeroTimestamp);
                }
                for hint in [&q.target_block_id_hint, &q.following_block_id_hint] {
                    if !hint.is_empty() {
                        validate_block_id(hint)?;
                    }
                }
                validate_call_data(self.chain_id, &q.call_data)
            }
            ChainQuery::EthCallWithFinality(q) => {
                validate_block_id(&q.block_id)?;
                if q.finality != "finalized" && q.finality != "safe" {
                    return Err(ValidationError::InvalidFinality(q.finality.clone()));
                }
                validate_call_data(self.chain_id, &q.call_data)
            }
            ChainQuery::SolanaAccount(q) => {
                if q.commitment != "finalized" {
                    return Err(ValidationError::InvalidCommitment(q.commitment.clone()));
                }
                if q.accounts.is_empty() {
                    return Err(ValidationError::NoAccounts);
                }
                check_count("accounts", q.accounts.len())?;
                if q.data_slice_length == 0 && q.data_slice_offset != 0 {
                    return Err(ValidationError::DataSliceOffsetWithoutLength);
                }
                Ok(())
            }
        }
    }
}

fn validate_block_id(block_id: &str) -> Result<(), ValidationError> {
    let digits = block_id.strip_prefix("0x").unwrap_or_default();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidBlockId(block_id.to_string()));
    }
    Ok(())
}

fn validate_call_data(chain_id: u16, calls: &[EthCallData]) -> Result<(), ValidationError> {
    if calls.is_empty() {
        return Err(ValidationError::NoCallData { chain_id });
    }
    check_count("call data", calls.len())?;
    for (index, call) in calls.iter().enumerate() {
        if call.to.len() != ADDRESS_LEN {
            return Err(ValidationError::InvalidCallTarget { len: call.to.len() });
        }
        if call.data.is_empty() {
            return Err(ValidationError::EmptyCallData { chain_id, index });
        }
    }
    Ok(())
}

fn check_count(what: &'static str, count: usize) -> Result<(), ValidationError> {
    if count > MAX_REPEATED {
        return Err(ValidationError::TooMany { what, count });
    }
    Ok(())
}
