//! Integration tests for the signed proxy protocol over real HTTP:
//! data server on one side, remote proxy client on the other.

mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::keccak256;
use k256::ecdsa::SigningKey;

use common::MockChain;
use oracle_mining_client::chain::Chain;
use oracle_mining_client::config::Config;
use oracle_mining_client::crypto;
use oracle_mining_client::db::codec::{self, RequestPayload};
use oracle_mining_client::db::{keys, DataProxy, RemoteProxy};
use oracle_mining_client::server::DataServerOps;

fn signer() -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[31] = 1;
    SigningKey::from_slice(&bytes).unwrap()
}

fn intruder() -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[31] = 2;
    SigningKey::from_slice(&bytes).unwrap()
}

fn server_config() -> Config {
    let address = crypto::address_hex(crypto::address_of(&signer()));
    Config::from_json(&format!(
        "{{\"publicAddress\": \"{address}\", \
          \"dataServer\": {{\"listenHost\": \"127.0.0.1\", \"listenPort\": 0}}, \
          \"trackers\": {{\"sleepCycle\": 1}}}}"
    ))
    .unwrap()
}

async fn start_server() -> (tempfile::TempDir, Arc<DataServerOps>, u16) {
    let dir = tempfile::tempdir().unwrap();
    let store = common::open_store(&dir);
    let chain = Arc::new(MockChain::new()) as Arc<dyn Chain>;
    let ds = Arc::new(DataServerOps::new(&server_config(), store, chain).unwrap());
    ds.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), ds.ready())
        .await
        .expect("server became ready");
    let port = ds.local_addr().unwrap().port();
    (dir, ds, port)
}

fn signed_frame(key: &SigningKey, timestamp: i64, request_keys: Vec<String>) -> Vec<u8> {
    let digest = keccak256(codec::encode_signed_portion(timestamp, &request_keys, &[]));
    let signature = crypto::sign_digest(key, digest).unwrap().to_vec();
    codec::encode_request(&RequestPayload {
        timestamp,
        keys: request_keys,
        values: Vec::new(),
        signature,
    })
    .unwrap()
}

async fn post_raw(port: u16, frame: Vec<u8>) -> codec::ResponsePayload {
    let client = reqwest::Client::new();
    let body = client
        .post(format!("http://127.0.0.1:{port}/"))
        .header("content-type", "application/octet-stream")
        .body(frame)
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    codec::decode_response(&body).unwrap()
}

fn unix_now() -> i64 {
    common::now() as i64
}

#[tokio::test]
async fn test_remote_proxy_read_and_write_round_trip() {
    let (_dir, ds, port) = start_server().await;
    let proxy = RemoteProxy::new(signer(), "127.0.0.1", port).unwrap();

    // The trackers populated the snapshot keys during the ready cycle.
    let gas = proxy.get(keys::GAS_PRICE).await.unwrap();
    assert!(gas.is_some());
    let status = proxy.get(keys::DISPUTE_STATUS).await.unwrap().unwrap();
    assert_eq!(status, b"0x1");

    // Scratch write comes back prefixed with the signer address.
    proxy.put("note", b"hello").await.unwrap();
    let prefixed = format!("{}-note", crypto::address_hex(proxy.address()));
    let read_back = proxy.get(&prefixed).await.unwrap().unwrap();
    assert_eq!(read_back, b"hello");

    ds.stop().await;
}

#[tokio::test]
async fn test_replay_of_identical_bytes_rejected() {
    let (_dir, ds, port) = start_server().await;
    let frame = signed_frame(&signer(), unix_now(), vec![keys::GAS_PRICE.to_string()]);

    let first = post_raw(port, frame.clone()).await;
    assert!(first.error.is_empty(), "first request failed: {}", first.error);

    // Same bytes again, still inside the validity window.
    let second = post_raw(port, frame).await;
    assert!(second.error.contains("replayed"), "got: {}", second.error);

    ds.stop().await;
}

#[tokio::test]
async fn test_expired_signature_rejected() {
    let (_dir, ds, port) = start_server().await;
    // Signed three seconds ago with a two second validity threshold.
    let frame = signed_frame(&signer(), unix_now() - 3, vec![keys::GAS_PRICE.to_string()]);
    let resp = post_raw(port, frame).await;
    assert!(resp.error.contains("expired"), "got: {}", resp.error);
    ds.stop().await;
}

#[tokio::test]
async fn test_unwhitelisted_signer_rejected() {
    let (_dir, ds, port) = start_server().await;
    let frame = signed_frame(&intruder(), unix_now(), vec![keys::GAS_PRICE.to_string()]);
    let resp = post_raw(port, frame).await;
    assert!(resp.error.contains("Unauthorized"), "got: {}", resp.error);
    ds.stop().await;
}

#[tokio::test]
async fn test_garbage_body_answered_with_error_payload() {
    let (_dir, ds, port) = start_server().await;
    let resp = post_raw(port, b"definitely not a frame".to_vec()).await;
    assert!(!resp.error.is_empty());
    ds.stop().await;
}

#[tokio::test]
async fn test_only_root_path_served() {
    let (_dir, ds, port) = start_server().await;
    let client = reqwest::Client::new();
    let status = client
        .post(format!("http://127.0.0.1:{port}/other"))
        .body(Vec::<u8>::new())
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    ds.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (_dir, ds, _port) = start_server().await;
    assert!(ds.is_running());
    ds.stop().await;
    assert!(!ds.is_running());
    // A second stop changes nothing and does not hang.
    tokio::time::timeout(Duration::from_secs(2), ds.stop())
        .await
        .expect("second stop returned");
    assert!(!ds.is_running());
}
