//! # Authorization Flow Tests
//!
//! Permissions file on disk through to authorization decisions, including
//! reloads while requests are being authorized.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use ccq_query_auth::domain::{encode_eth_call_key, EthCallData, EthCallQueryRequest, PerChainQuery};
use ccq_query_auth::{
    load_permissions, parse_permissions, AuthorizationError, ChainQuery, PermissionError,
    PermissionStore, PermissionWatcher, QueryRequest, SignedQueryRequest,
};

const TOKEN: &str = "b4fbf271143f4fbf7b91a5ded31805e42b2208d6";
const NAME: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
const TOTAL_SUPPLY: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];

fn user(name: &str, api_key: &str, calls: &[(u16, &str, &str)]) -> serde_json::Value {
    let calls: Vec<_> = calls
        .iter()
        .map(|(chain, contract, call)| {
            serde_json::json!({"ethCall": {
                "chain": chain,
                "contractAddress": contract,
                "call": call,
            }})
        })
        .collect();
    serde_json::json!({"userName": name, "apiKey": api_key, "allowedCalls": calls})
}

fn permissions_json(users: Vec<serde_json::Value>) -> String {
    serde_json::json!({ "Permissions": users }).to_string()
}

fn write_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn alice_file() -> tempfile::NamedTempFile {
    write_file(&permissions_json(vec![user(
        "alice",
        "ABC123",
        &[(
            2,
            "0x000000000000000000000000B4FBF271143F4FBF7B91A5DED31805E42B2208D6",
            "0x06FDDE03",
        )],
    )]))
}

fn eth_call(chain_id: u16, data: &[u8]) -> PerChainQuery {
    PerChainQuery {
        chain_id,
        query: ChainQuery::EthCall(EthCallQueryRequest {
            block_id: "0x28d9630".to_string(),
            call_data: vec![EthCallData {
                to: hex::decode(TOKEN).unwrap(),
                data: data.to_vec(),
            }],
        }),
    }
}

fn signed(queries: Vec<PerChainQuery>) -> SignedQueryRequest {
    let request = QueryRequest {
        nonce: 42,
        per_chain_queries: queries,
    };
    SignedQueryRequest::new(request.encode().unwrap(), vec![0u8; 65])
}

#[test]
fn test_alice_scenario() {
    let file = alice_file();
    let table = load_permissions(file.path()).unwrap();

    let ok = ccq_query_auth::authorize("abc123", &signed(vec![eth_call(2, &NAME)]), &table).unwrap();
    assert_eq!(ok.user_name, "alice");
    assert_eq!(ok.request.nonce, 42);

    let err = ccq_query_auth::authorize("abc123", &signed(vec![eth_call(3, &NAME)]), &table).unwrap_err();
    assert!(matches!(err, AuthorizationError::CallNotAuthorized { .. }));

    let err = ccq_query_auth::authorize("xyz", &signed(vec![eth_call(2, &NAME)]), &table).unwrap_err();
    assert!(matches!(err, AuthorizationError::InvalidApiKey));
}

#[test]
fn test_request_rejected_when_any_call_is_unpermitted() {
    let file = alice_file();
    let table = load_permissions(file.path()).unwrap();

    let request = signed(vec![eth_call(2, &NAME), eth_call(2, &TOTAL_SUPPLY)]);
    let err = ccq_query_auth::authorize("ABC123", &request, &table).unwrap_err();
    match err {
        AuthorizationError::CallNotAuthorized { call_key } => {
            assert_eq!(call_key.as_str(), format!("ethCall:2:{TOKEN}:18160ddd"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_signed_request_from_json_envelope() {
    let file = alice_file();
    let table = load_permissions(file.path()).unwrap();

    let encoded = signed(vec![eth_call(2, &NAME)]);
    let json = serde_json::json!({
        "bytes": hex::encode(&encoded.query_request),
        "signature": format!("0x{}", hex::encode(&encoded.signature)),
    });
    let envelope: SignedQueryRequest = serde_json::from_value(json).unwrap();
    assert_eq!(envelope, encoded);
    assert!(ccq_query_auth::authorize("abc123", &envelope, &table).is_ok());
}

type GeneratedCall = (u16, [u8; 20], [u8; 4]);

fn arb_users() -> impl Strategy<Value = BTreeMap<String, BTreeSet<GeneratedCall>>> {
    let call = (any::<u16>(), prop::array::uniform20(any::<u8>()), prop::array::uniform4(any::<u8>()));
    prop::collection::btree_map("[a-z0-9]{1,16}", prop::collection::btree_set(call, 0..6), 1..8)
}

fn generated_user(index: usize, api_key: &str, calls: &BTreeSet<GeneratedCall>, upper: bool) -> serde_json::Value {
    let calls: Vec<_> = calls
        .iter()
        .map(|(chain, contract, selector)| {
            let contract = hex::encode(contract);
            let contract = if upper { contract.to_uppercase() } else { contract };
            serde_json::json!({"ethCall": {
                "chain": chain,
                "contractAddress": format!("0x{contract}"),
                "call": hex::encode(selector),
            }})
        })
        .collect();
    let api_key = if upper { api_key.to_uppercase() } else { api_key.to_string() };
    serde_json::json!({"userName": format!("user{index}"), "apiKey": api_key, "allowedCalls": calls})
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_loading_is_deterministic(users in arb_users(), upper in any::<bool>()) {
        let documents: Vec<_> = users
            .iter()
            .enumerate()
            .map(|(i, (api_key, calls))| generated_user(i, api_key, calls, upper))
            .collect();
        let file = write_file(&permissions_json(documents.clone()));

        let first = load_permissions(file.path()).unwrap();
        let second = load_permissions(file.path()).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), users.len());

        // User order in the file does not change the table.
        let reversed = documents.into_iter().rev().collect();
        let reordered = parse_permissions(&permissions_json(reversed), "reordered.json").unwrap();
        prop_assert_eq!(&first, &reordered);

        for (api_key, calls) in &users {
            let entry = first.get(api_key).unwrap();
            prop_assert_eq!(entry.allowed_call_count(), calls.len());
            for (chain, contract, selector) in calls {
                let key = encode_eth_call_key(*chain, &hex::encode(contract), &hex::encode(selector)).unwrap();
                prop_assert!(entry.is_allowed(&key));
            }
        }
    }
}

#[test]
fn test_invalid_file_produces_no_table() {
    let file = write_file(&permissions_json(vec![
        user("alice", "ABC123", &[(2, TOKEN, "06fdde03")]),
        user("bob", "abc123", &[]),
    ]));
    let err = load_permissions(file.path()).unwrap_err();
    assert!(matches!(err, PermissionError::DuplicateApiKey { .. }));

    let err = load_permissions(std::path::Path::new("/nonexistent/permissions.json")).unwrap_err();
    assert!(matches!(err, PermissionError::Read { .. }));
}

#[test]
fn test_store_reload_changes_decisions() {
    let file = alice_file();
    let store = PermissionStore::open(file.path()).unwrap();
    let request = signed(vec![eth_call(2, &TOTAL_SUPPLY)]);
    assert!(store.authorize("abc123", &request).is_err());

    std::fs::write(
        file.path(),
        permissions_json(vec![user("alice", "ABC123", &[(2, TOKEN, "18160ddd")])]),
    )
    .unwrap();
    store.reload().unwrap();
    assert!(store.authorize("abc123", &request).is_ok());

    // A broken file keeps the table that was in effect.
    std::fs::write(file.path(), "{\"Permissions\": [").unwrap();
    assert!(store.reload().is_err());
    assert!(store.authorize("abc123", &request).is_ok());
}

#[tokio::test]
async fn test_watcher_reload_under_load() {
    let file = alice_file();
    let store = Arc::new(PermissionStore::open(file.path()).unwrap());
    let watcher = PermissionWatcher::spawn(Arc::clone(&store), Duration::from_millis(25));

    let reader_store = Arc::clone(&store);
    let reader = tokio::task::spawn_blocking(move || {
        let request = signed(vec![eth_call(2, &NAME)]);
        for _ in 0..2000 {
            let table = reader_store.snapshot();
            // alice exists in every version of the file.
            assert!(table.get("abc123").is_some());
            let _ = ccq_query_auth::authorize("abc123", &request, &table);
        }
    });

    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(
        file.path(),
        permissions_json(vec![user("alice", "ABC123", &[(2, TOKEN, "18160ddd")])]),
    )
    .unwrap();

    let total_supply = signed(vec![eth_call(2, &TOTAL_SUPPLY)]);
    let mut reloaded = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if store.authorize("abc123", &total_supply).is_ok() {
            reloaded = true;
            break;
        }
    }

    reader.await.unwrap();
    watcher.shutdown().await;
    assert!(reloaded);
}
