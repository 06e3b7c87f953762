//! Guardian set as read from the core bridge contract.

use alloy_primitives::Address;
use serde::Serialize;

/// Guardian public addresses and the index identifying their version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardianSet {
    /// Guardian set index.
    pub index: u32,
    /// Guardian addresses, in contract order.
    pub keys: Vec<Address>,
}

impl GuardianSet {
    /// Number of guardians.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the set has no guardians.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Signatures needed for a response to be trusted: more than two thirds.
    pub fn quorum(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        (self.keys.len() * 2) / 3 + 1
    }

    /// Position of a guardian in the set.
    pub fn key_index(&self, key: &Address) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }
}
