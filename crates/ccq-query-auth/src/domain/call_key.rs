//! # Canonical Call Keys
//!
//! A call key is the normalized string form of a [`CallDescriptor`]. The
//! permission loader and the query authorizer both build keys through this
//! module, so "the same call" means the same thing on both sides.
//!
//! ## Format
//!
//! ```text
//! ethCall:<chain>:<address>:<selector>
//!    │       │        │          └─ 8 lowercase hex chars, no 0x
//!    │       │        └─ 40 lowercase hex chars, no 0x
//!    │       └─ decimal chain id
//!    └─ call type tag, versions the format
//! ```
//!
//! New call types get a new tag, so keys from different call types never collide.
//! Changing this format changes what every loaded permission file means.

use std::fmt;

use alloy_primitives::{Address, Selector};
use serde::Serialize;

use super::errors::CallKeyError;

/// Tag for EVM `eth_call` descriptors.
pub const ETH_CALL_TAG: &str = "ethCall";

/// Length of an EVM address.
pub const ADDRESS_LEN: usize = 20;

/// Length of a universal (left-padded) address.
pub const UNIVERSAL_ADDRESS_LEN: usize = 32;

/// Length of a function selector.
pub const SELECTOR_LEN: usize = 4;

/// One permitted or requested call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallDescriptor {
    /// EVM view call, identified by chain, contract and function selector.
    EthCall {
        /// Wormhole chain id.
        chain: u16,
        /// Target contract.
        contract: Address,
        /// First four bytes of the call data.
        selector: Selector,
    },
}

impl CallDescriptor {
    /// Build an eth call descriptor.
    pub fn eth_call(chain: u16, contract: Address, selector: Selector) -> Self {
        Self::EthCall {
            chain,
            contract,
            selector,
        }
    }

    /// Encode the canonical key.
    pub fn call_key(&self) -> CallKey {
        match self {
            Self::EthCall {
                chain,
                contract,
                selector,
            } => CallKey(format!(
                "{}:{}:{}:{}",
                ETH_CALL_TAG,
                chain,
                hex::encode(contract.as_slice()),
                hex::encode(selector.as_slice())
            )),
        }
    }
}

/// Canonical key of a call, used for set membership.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CallKey(String);

impl CallKey {
    /// Wrap a string already known to be canonical.
    #[cfg(test)]
    pub(crate) fn from_canonical(key: String) -> Self {
        Self(key)
    }

    /// Key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a canonical key back into its descriptor.
    ///
    /// Only the exact canonical form is accepted: lowercase hex, no `0x`,
    /// full-length address and selector.
    pub fn parse(key: &str) -> Result<CallDescriptor, CallKeyError> {
        let malformed = || CallKeyError::MalformedKey(key.to_string());

        let mut parts = key.split(':');
        let (Some(tag), Some(chain), Some(contract), Some(selector), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed());
        };

        match tag {
            ETH_CALL_TAG => {
                if !is_canonical_hex(contract, ADDRESS_LEN) || !is_canonical_hex(selector, SELECTOR_LEN) {
                    return Err(malformed());
                }
                if chain.is_empty() || !chain.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                let chain: u16 = chain.parse().map_err(|_| malformed())?;
                let contract = parse_contract_address(contract)?;
                let selector = parse_selector(selector)?;
                let descriptor = CallDescriptor::eth_call(chain, contract, selector);
                // Rejects e.g. a zero-padded chain id that would re-encode differently.
                if descriptor.call_key().as_str() != key {
                    return Err(malformed());
                }
                Ok(descriptor)
            }
            other => Err(CallKeyError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CallKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode the canonical key for an eth call given as strings.
///
/// Hex inputs are accepted with or without `0x` and in any case.
pub fn encode_eth_call_key(chain: u16, contract: &str, selector: &str) -> Result<CallKey, CallKeyError> {
    let contract = parse_contract_address(contract)?;
    let selector = parse_selector(selector)?;
    Ok(CallDescriptor::eth_call(chain, contract, selector).call_key())
}

/// Parse a hex contract address.
///
/// Accepts a 20-byte address or a 32-byte universal address whose upper
/// 12 bytes are zero.
pub fn parse_contract_address(input: &str) -> Result<Address, CallKeyError> {
    let bytes = hex::decode(strip_hex_prefix(input.trim())).map_err(|e| CallKeyError::InvalidAddress {
        value: input.to_string(),
        reason: e.to_string(),
    })?;
    address_from_bytes(&bytes).map_err(|reason| CallKeyError::InvalidAddress {
        value: input.to_string(),
        reason,
    })
}

/// Convert a raw call target to an EVM address. Must be exactly 20 bytes;
/// the universal-address padding accepted by [`parse_contract_address`] is not.
pub fn contract_address_from_bytes(bytes: &[u8]) -> Result<Address, CallKeyError> {
    if bytes.len() != ADDRESS_LEN {
        return Err(CallKeyError::InvalidAddress {
            value: hex::encode(bytes),
            reason: format!("has an invalid length of {} bytes, must be 20 bytes", bytes.len()),
        });
    }
    Ok(Address::from_slice(bytes))
}

/// Parse a hex function selector. Must be exactly four bytes.
pub fn parse_selector(input: &str) -> Result<Selector, CallKeyError> {
    let bytes = hex::decode(strip_hex_prefix(input.trim())).map_err(|e| CallKeyError::InvalidSelector {
        value: input.to_string(),
        reason: e.to_string(),
    })?;
    if bytes.len() != SELECTOR_LEN {
        return Err(CallKeyError::InvalidSelector {
            value: input.to_string(),
            reason: format!("has an invalid length of {} bytes, must be four bytes", bytes.len()),
        });
    }
    Ok(Selector::from_slice(&bytes))
}

fn address_from_bytes(bytes: &[u8]) -> Result<Address, String> {
    match bytes.len() {
        ADDRESS_LEN => Ok(Address::from_slice(bytes)),
        UNIVERSAL_ADDRESS_LEN => {
            let (padding, address) = bytes.split_at(UNIVERSAL_ADDRESS_LEN - ADDRESS_LEN);
            if padding.iter().any(|b| *b != 0) {
                return Err("32-byte address is not a left-padded EVM address".to_string());
            }
            Ok(Address::from_slice(address))
        }
        len => Err(format!("has an invalid length of {len} bytes, must be 20 or 32 bytes")),
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn is_canonical_hex(s: &str, byte_len: usize) -> bool {
    s.len() == byte_len * 2 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
