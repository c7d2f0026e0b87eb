//! Verify classification and unwrapping against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Each vector file lists named cases with their inputs and the expected
//! result. Unwrapped nodes are compared as parsed JSON, so formatting in the
//! vector bodies does not matter.

use restcall_core::classify::classify;
use restcall_core::error::Fault;
use restcall_core::keypath;
use restcall_core::DecodeError;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[test]
fn classify_test_vectors() {
    let raw = include_str!("../../test-vectors/classify.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let body = case["body"].as_str().unwrap();
        let key_path = case["key_path"].as_str();
        let expected = &case["expected"];

        let fault = Fault::Status { code: status };
        let err = classify(&fault, Some(body.as_bytes()), key_path);

        assert_eq!(err.kind(), expected["kind"].as_str().unwrap(), "{name}: kind");
        assert_eq!(
            err.status_code().map(u64::from),
            expected["code"].as_u64(),
            "{name}: code"
        );
        assert_eq!(err.message(), expected["message"].as_str(), "{name}: message");

        // Pure: the same input classifies the same way again.
        let again = classify(&fault, Some(body.as_bytes()), key_path);
        assert_eq!(again.to_string(), err.to_string(), "{name}: deterministic");
    }
}

// ---------------------------------------------------------------------------
// Unwrapping
// ---------------------------------------------------------------------------

#[test]
fn keypath_test_vectors() {
    let raw = include_str!("../../test-vectors/keypath.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let body = case["body"].as_str().unwrap();
        let key_path = case["key_path"].as_str();

        let decoded = keypath::decode::<Value>(body.as_bytes(), key_path);
        match case["error"].as_str() {
            None => {
                assert_eq!(decoded.unwrap(), case["expected"], "{name}: node");
            }
            Some("missing_key_path") => {
                assert!(
                    matches!(decoded, Err(DecodeError::MissingKeyPath(_))),
                    "{name}: expected missing key path, got {decoded:?}"
                );
            }
            Some("invalid_json") => {
                assert!(
                    matches!(decoded, Err(DecodeError::InvalidJson(_))),
                    "{name}: expected invalid json, got {decoded:?}"
                );
            }
            Some(other) => panic!("{name}: unknown error kind {other}"),
        }
    }
}
