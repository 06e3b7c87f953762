//! # Permission Loader
//!
//! Turns a permissions document into a [`PermissionTable`]. Loading is
//! all-or-nothing: the first bad entry aborts with an error naming the file,
//! the user and the offending value.
//!
//! ```json
//! {
//!   "Permissions": [
//!     {
//!       "userName": "Test User",
//!       "apiKey": "my_secret_key",
//!       "allowedCalls": [
//!         {
//!           "ethCall": {
//!             "chain": 2,
//!             "contractAddress": "0xB4FBF271143F4FBf7B91A5ded31805e42b2208d6",
//!             "call": "0x06fdde03"
//!           }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{
    parse_contract_address, parse_selector, CallDescriptor, PermissionEntry, PermissionError,
    PermissionTable,
};

#[derive(Debug, Deserialize)]
struct PermissionsDocument {
    #[serde(rename = "Permissions")]
    permissions: Vec<UserConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserConfig {
    user_name: String,
    api_key: String,
    #[serde(default)]
    allowed_calls: Vec<AllowedCallConfig>,
}

/// One allowed-call declaration. Exactly one tag is expected; unknown tags
/// are collected so they can be reported by name.
#[derive(Debug, Deserialize)]
struct AllowedCallConfig {
    #[serde(rename = "ethCall")]
    eth_call: Option<EthCallConfig>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EthCallConfig {
    chain: u16,
    contract_address: String,
    call: String,
}

enum AllowedCall {
    EthCall(EthCallConfig),
}

impl AllowedCallConfig {
    /// Resolve the declaration to its call type, or the unrecognized tag.
    fn into_call(self) -> Result<AllowedCall, String> {
        if let Some(tag) = self.other.into_keys().next() {
            return Err(tag);
        }
        match self.eth_call {
            Some(eth_call) => Ok(AllowedCall::EthCall(eth_call)),
            None => Err(String::from("<none>")),
        }
    }
}

/// Load the permissions file at `path`.
pub fn load_permissions(path: impl AsRef<Path>) -> Result<PermissionTable, PermissionError> {
    let path = path.as_ref();
    let source = path.display().to_string();

    let contents = std::fs::read_to_string(path).map_err(|e| PermissionError::Read {
        path: source.clone(),
        source: e,
    })?;

    let table = parse_permissions(&contents, &source)?;
    info!(
        path = %source,
        api_keys = table.len(),
        "Loaded permissions"
    );
    Ok(table)
}

/// Build a table from an in-memory document. `source` names it in errors.
pub fn parse_permissions(contents: &str, source: &str) -> Result<PermissionTable, PermissionError> {
    let document: PermissionsDocument =
        serde_json::from_str(contents).map_err(|e| PermissionError::Parse {
            path: source.to_string(),
            source: e,
        })?;

    let mut table = PermissionTable::empty();
    for user in document.permissions {
        let api_key = user.api_key.to_lowercase();
        if api_key.trim().is_empty() {
            return Err(PermissionError::EmptyApiKey {
                user: user.user_name,
                path: source.to_string(),
            });
        }
        if table.contains_normalized(&api_key) {
            return Err(PermissionError::DuplicateApiKey {
                api_key,
                path: source.to_string(),
            });
        }

        let mut allowed_calls = HashSet::with_capacity(user.allowed_calls.len());
        for declaration in user.allowed_calls {
            let call = declaration
                .into_call()
                .map_err(|tag| PermissionError::UnsupportedCallType {
                    tag,
                    user: user.user_name.clone(),
                    path: source.to_string(),
                })?;

            let descriptor = match call {
                AllowedCall::EthCall(eth_call) => {
                    let contract = parse_contract_address(&eth_call.contract_address).map_err(|e| {
                        PermissionError::InvalidContractAddress {
                            value: eth_call.contract_address.clone(),
                            user: user.user_name.clone(),
                            path: source.to_string(),
                            source: e,
                        }
                    })?;
                    let selector = parse_selector(&eth_call.call).map_err(|e| {
                        PermissionError::InvalidSelector {
                            value: eth_call.call.clone(),
                            user: user.user_name.clone(),
                            path: source.to_string(),
                            source: e,
                        }
                    })?;
                    CallDescriptor::eth_call(eth_call.chain, contract, selector)
                }
            };

            let call_key = descriptor.call_key();
            if allowed_calls.contains(&call_key) {
                return Err(PermissionError::DuplicateAllowedCall {
                    call_key,
                    user: user.user_name,
                    path: source.to_string(),
                });
            }
            allowed_calls.insert(call_key);
        }

        debug!(
            user = %user.user_name,
            allowed_calls = allowed_calls.len(),
            "Parsed permissions for user"
        );
        table.insert(PermissionEntry::new(user.user_name, api_key, allowed_calls));
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{encode_eth_call_key, CallKeyError};
    use std::io::Write;

    const TOKEN: &str = "0xB4FBF271143F4FBf7B91A5ded31805e42b2208d6";

    fn doc(users: &str) -> String {
        format!(r#"{{"Permissions": [{users}]}}"#)
    }

    fn user(name: &str, key: &str, calls: &str) -> String {
        format!(r#"{{"userName": "{name}", "apiKey": "{key}", "allowedCalls": [{calls}]}}"#)
    }

    fn eth_call(chain: u16, address: &str, call: &str) -> String {
        format!(r#"{{"ethCall": {{"chain": {chain}, "contractAddress": "{address}", "call": "{call}"}}}}"#)
    }

    #[test]
    fn test_parse_valid_document() {
        let contents = doc(&[
            user("alice", "ABC123", &eth_call(2, TOKEN, "0x06fdde03")),
            user(
                "bob",
                "def456",
                &[eth_call(2, TOKEN, "06fdde03"), eth_call(4, TOKEN, "18160ddd")].join(","),
            ),
        ]
        .join(","));

        let table = parse_permissions(&contents, "inline").unwrap();
        assert_eq!(table.len(), 2);

        let alice = table.get("abc123").unwrap();
        assert_eq!(alice.user_name(), "alice");
        assert_eq!(alice.api_key(), "abc123");
        assert!(alice.is_allowed(&encode_eth_call_key(2, TOKEN, "06fdde03").unwrap()));

        let bob = table.get("DEF456").unwrap();
        assert_eq!(bob.allowed_call_count(), 2);
    }

    #[test]
    fn test_user_without_calls() {
        let table = parse_permissions(
            &doc(r#"{"userName": "nobody", "apiKey": "k"}"#),
            "inline",
        )
        .unwrap();
        assert_eq!(table.get("k").unwrap().allowed_call_count(), 0);
    }

    #[test]
    fn test_duplicate_api_key_differing_in_case() {
        let contents = doc(&[user("alice", "ABC123", ""), user("mallory", "abc123", "")].join(","));
        let err = parse_permissions(&contents, "perms.json").unwrap_err();
        match err {
            PermissionError::DuplicateApiKey { api_key, path } => {
                assert_eq!(api_key, "abc123");
                assert_eq!(path, "perms.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_allowed_call() {
        // Same call spelled two different ways.
        let calls = [eth_call(2, TOKEN, "0x06FDDE03"), eth_call(2, &TOKEN.to_lowercase(), "06fdde03")].join(",");
        let err = parse_permissions(&doc(&user("alice", "ABC123", &calls)), "perms.json").unwrap_err();
        match err {
            PermissionError::DuplicateAllowedCall { call_key, user, .. } => {
                assert_eq!(
                    call_key.as_str(),
                    "ethCall:2:b4fbf271143f4fbf7b91a5ded31805e42b2208d6:06fdde03"
                );
                assert_eq!(user, "alice");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_call_on_different_chains_is_not_duplicate() {
        let calls = [eth_call(2, TOKEN, "06fdde03"), eth_call(3, TOKEN, "06fdde03")].join(",");
        let table = parse_permissions(&doc(&user("alice", "ABC123", &calls)), "inline").unwrap();
        assert_eq!(table.get("abc123").unwrap().allowed_call_count(), 2);
    }

    #[test]
    fn test_invalid_selector_length() {
        let err = parse_permissions(
            &doc(&user("alice", "ABC123", &eth_call(2, TOKEN, "06fdde"))),
            "perms.json",
        )
        .unwrap_err();
        match err {
            PermissionError::InvalidSelector { value, source, .. } => {
                assert_eq!(value, "06fdde");
                assert!(matches!(source, CallKeyError::InvalidSelector { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_contract_address() {
        let err = parse_permissions(
            &doc(&user("alice", "ABC123", &eth_call(2, "0xnothex", "06fdde03"))),
            "perms.json",
        )
        .unwrap_err();
        assert!(matches!(err, PermissionError::InvalidContractAddress { .. }));
        let msg = err.to_string();
        assert!(msg.contains("0xnothex"));
        assert!(msg.contains("alice"));
        assert!(msg.contains("perms.json"));
    }

    #[test]
    fn test_unsupported_call_type() {
        let calls = r#"{"solAccount": {"chain": 1, "account": "abc"}}"#;
        let err = parse_permissions(&doc(&user("alice", "ABC123", calls)), "perms.json").unwrap_err();
        match err {
            PermissionError::UnsupportedCallType { tag, user, .. } => {
                assert_eq!(tag, "solAccount");
                assert_eq!(user, "alice");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_call_declaration() {
        let err = parse_permissions(&doc(&user("alice", "ABC123", "{}")), "perms.json").unwrap_err();
        assert!(matches!(err, PermissionError::UnsupportedCallType { .. }));
    }

    #[test]
    fn test_empty_api_key() {
        let err = parse_permissions(&doc(&user("alice", "  ", "")), "perms.json").unwrap_err();
        assert!(matches!(err, PermissionError::EmptyApiKey { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_permissions("{not json", "perms.json").unwrap_err();
        assert!(matches!(err, PermissionError::Parse { .. }));
        assert!(err.to_string().contains("perms.json"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", doc(&user("alice", "ABC123", &eth_call(2, TOKEN, "06fdde03")))).unwrap();

        let table = load_permissions(file.path()).unwrap();
        assert!(table.get("abc123").is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_permissions("/nonexistent/ccq/permissions.json").unwrap_err();
        assert!(matches!(err, PermissionError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/ccq/permissions.json"));
    }
}
