//! End-to-end exercises of the six concrete scenarios and the archival/
//! revocation properties from SPEC_FULL.md §8, driven through the public
//! `upload`/`ops` entry points against the in-memory driver.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hub_core::driver::memory::MemoryDriver;
use hub_core::driver::{Driver, ObjectKey, WriteStream};
use hub_core::ops::{self, ListFilesRequest};
use hub_core::proof::AllowAllProofChecker;
use hub_core::revocation::RevocationClock;
use hub_core::token::envelope::{EnvelopeHeader, EnvelopePayload, RawScopeEntry};
use hub_core::token::HubUrlPolicy;
use hub_core::upload::{self, UploadRequest};
use hub_core::{HubConfig, HubError, ValidationError};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Vec<u8> {
    s.as_bytes()
        .chunks(2)
        .map(|chunk| {
            let hi = (chunk[0] as char).to_digit(16).unwrap();
            let lo = (chunk[1] as char).to_digit(16).unwrap();
            ((hi << 4) | lo) as u8
        })
        .collect()
}

fn make_token(payload: &EnvelopePayload, signing_key: &SigningKey) -> String {
    let header = EnvelopeHeader {
        alg: "ES256K".to_string(),
        typ: Some("JWT".to_string()),
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    let signing_input = format!("{header_b64}.{payload_b64}");
    let digest = Sha256::digest(signing_input.as_bytes());
    let signature: Signature = signing_key.sign_prehash(&digest).unwrap();
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    format!("{signing_input}.{sig_b64}")
}

struct Identity {
    principal: String,
    signing_key: SigningKey,
}

fn new_identity() -> Identity {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);
    let iss = hex_encode(verifying_key.to_encoded_point(true).as_bytes());
    let principal = hub_core::Principal::from_public_key_bytes(&hex_decode(&iss));
    Identity {
        principal: principal.as_str().to_string(),
        signing_key,
    }
}

fn token_for(identity: &Identity, iat: i64, scopes: Vec<RawScopeEntry>) -> String {
    let verifying_key = VerifyingKey::from(&identity.signing_key);
    let iss = hex_encode(verifying_key.to_encoded_point(true).as_bytes());
    let payload = EnvelopePayload {
        iss,
        iat,
        exp: None,
        gaia_challenge: None,
        hub_url: None,
        salt: None,
        association_token: None,
        scopes,
    };
    make_token(&payload, &identity.signing_key)
}

fn policy() -> HubUrlPolicy<'static> {
    HubUrlPolicy {
        server_name: "localhost",
        valid_hub_urls: &[],
        require_correct_hub_url: false,
    }
}

fn harness() -> (Arc<dyn Driver>, RevocationClock, HubConfig) {
    let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
    let revocation = RevocationClock::new(driver.clone(), 64);
    let config = HubConfig {
        read_url_prefix: "https://read.example.com".to_string(),
        ..Default::default()
    };
    (driver, revocation, config)
}

/// Scenario 1: a write-prefix scope that covers the path succeeds and the
/// returned URL carries the principal/path suffix.
#[tokio::test]
async fn scenario_1_prefix_scope_grants_write() {
    let (driver, revocation, config) = harness();
    let identity = new_identity();
    let token = token_for(
        &identity,
        100,
        vec![RawScopeEntry {
            scope: "putFilePrefix".to_string(),
            domain: "foo/".to_string(),
        }],
    );

    let body: WriteStream = Box::pin(&b"hello"[..]);
    let url = upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {token}"),
            content_type: Some("text/plain"),
            content_length: Some(5),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap();

    assert!(url.ends_with(&format!("/{}/foo/bar", identity.principal)));
}

/// Scenario 2: a scope covering a disjoint prefix rejects the same write.
#[tokio::test]
async fn scenario_2_mismatched_prefix_scope_is_rejected() {
    let (driver, revocation, config) = harness();
    let identity = new_identity();
    let token = token_for(
        &identity,
        100,
        vec![RawScopeEntry {
            scope: "putFilePrefix".to_string(),
            domain: "bar/".to_string(),
        }],
    );

    let body: WriteStream = Box::pin(&b"hello"[..]);
    let err = upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {token}"),
            content_type: Some("text/plain"),
            content_length: Some(5),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HubError::Validation(ValidationError::ScopeDenied)));
}

/// Scenario 3: a declared Content-Length over the ceiling is rejected
/// before any driver call, and no object is left behind.
#[tokio::test]
async fn scenario_3_declared_length_over_ceiling_rejected_before_driver_call() {
    let (driver, revocation, mut config) = harness();
    config.max_file_upload_size_bytes = 30 * 1024 * 1024;
    let identity = new_identity();
    let token = token_for(&identity, 100, vec![]);

    let body: WriteStream = Box::pin(&b"hello"[..]);
    let err = upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {token}"),
            content_type: Some("text/plain"),
            content_length: Some(31_457_281),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HubError::PayloadTooLarge(_)));
    let stat = driver
        .perform_stat(ObjectKey {
            storage_top_level: identity.principal,
            path: "foo/bar".to_string(),
        })
        .await
        .unwrap();
    assert!(!stat.exists);
}

/// Scenario 4: a declared length of 10 against an actual 1000-byte stream
/// overflows mid-write and no object is left at the target path.
#[tokio::test]
async fn scenario_4_observed_overflow_past_declared_length_leaves_no_object() {
    let (driver, revocation, config) = harness();
    let identity = new_identity();
    let token = token_for(&identity, 100, vec![]);

    let body: WriteStream = Box::pin(std::io::Cursor::new(vec![0u8; 1000]));
    let err = upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {token}"),
            content_type: Some("text/plain"),
            content_length: Some(10),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HubError::PayloadTooLarge(_)));
    let stat = driver
        .perform_stat(ObjectKey {
            storage_top_level: identity.principal,
            path: "foo/bar".to_string(),
        })
        .await
        .unwrap();
    assert!(!stat.exists);
}

/// Scenario 5: writing the same path twice under an archival scope leaves
/// exactly one canonical object and one `.history.` sibling; listing with
/// the archival scope hides the sibling, listing without it shows both.
#[tokio::test]
async fn scenario_5_archival_round_trip_visibility() {
    let (driver, revocation, config) = harness();
    let identity = new_identity();
    let archival_token = token_for(
        &identity,
        100,
        vec![RawScopeEntry {
            scope: "putFileArchivalPrefix".to_string(),
            domain: "foo/".to_string(),
        }],
    );
    let plain_token = token_for(&identity, 100, vec![]);

    for _ in 0..2 {
        let body: WriteStream = Box::pin(&b"x"[..]);
        upload::handle_request(
            UploadRequest {
                principal: &identity.principal,
                path: "foo/bar",
                authorization_header: &format!("Bearer {archival_token}"),
                content_type: Some("text/plain"),
                content_length: Some(1),
            },
            body,
            &driver,
            &revocation,
            &AllowAllProofChecker,
            policy(),
            &config,
            1_000,
        )
        .await
        .unwrap();
    }

    let archival_view = ops::handle_list(
        ListFilesRequest {
            principal: &identity.principal,
            authorization_header: &format!("Bearer {archival_token}"),
            page: None,
            stat: false,
        },
        &driver,
        &revocation,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap();
    let archival_names: Vec<String> = archival_view
        .entries
        .into_iter()
        .flatten()
        .map(|e| e.name)
        .collect();
    assert_eq!(archival_names, vec!["foo/bar"]);

    let full_view = ops::handle_list(
        ListFilesRequest {
            principal: &identity.principal,
            authorization_header: &format!("Bearer {plain_token}"),
            page: None,
            stat: false,
        },
        &driver,
        &revocation,
        policy(),
        &config,
        1_000,
    )
    .await
    .unwrap();
    let mut full_names: Vec<String> = full_view.entries.into_iter().flatten().map(|e| e.name).collect();
    full_names.sort();
    assert_eq!(full_names.len(), 2);
    assert!(full_names.contains(&"foo/bar".to_string()));
    assert!(full_names.iter().any(|n| n.contains(".history.")));
}

/// Scenario 6: `authBump(P, 1000)` rejects a token with `iat=999` and
/// accepts one with `iat=1001`.
#[tokio::test]
async fn scenario_6_revocation_bump_rejects_stale_iat_accepts_fresh_iat() {
    let (driver, revocation, config) = harness();
    let identity = new_identity();
    let bump_token = token_for(&identity, 1, vec![]);

    ops::handle_revoke_all(
        &identity.principal,
        &format!("Bearer {bump_token}"),
        1_000,
        &revocation,
        policy(),
        &config,
        2_000,
    )
    .await
    .unwrap();

    let stale_token = token_for(&identity, 999, vec![]);
    let body: WriteStream = Box::pin(&b"x"[..]);
    let err = upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {stale_token}"),
            content_type: Some("text/plain"),
            content_length: Some(1),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        2_000,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HubError::Validation(ValidationError::Revoked)));

    let fresh_token = token_for(&identity, 1_001, vec![]);
    let body: WriteStream = Box::pin(&b"x"[..]);
    upload::handle_request(
        UploadRequest {
            principal: &identity.principal,
            path: "foo/bar",
            authorization_header: &format!("Bearer {fresh_token}"),
            content_type: Some("text/plain"),
            content_length: Some(1),
        },
        body,
        &driver,
        &revocation,
        &AllowAllProofChecker,
        policy(),
        &config,
        2_000,
    )
    .await
    .unwrap();
}

/// URL rewrite idempotence as an end-to-end property: rewriting the same
/// driver-native URL twice through the public pipeline entry point is a
/// no-op the second time.
#[tokio::test]
async fn url_rewrite_idempotence_end_to_end() {
    let once = upload::rewrite_url("mem://p/foo/bar", "mem://", "https://read.example.com");
    let twice = upload::rewrite_url(&once, "mem://", "https://read.example.com");
    assert_eq!(once, twice);
}
