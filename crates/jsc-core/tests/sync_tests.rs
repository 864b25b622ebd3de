//! Software list sync against a throwaway HTTP endpoint.

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use jsc_core::deploy;
use jsc_core::protocol::ErrorCode;
use jsc_test_utils::TestAssembly;

use common::{open_session, write_recipe};

#[derive(Debug, Clone)]
struct Request {
    head: String,
    body: String,
}

/// Answer every request with `status` and record what was received.
async fn endpoint(status: u16) -> (String, Arc<Mutex<Vec<Request>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/software-list", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let request = read_request(&mut stream).await;
            log.lock().unwrap().push(request);
            let reply = format!(
                "HTTP/1.1 {status} Whatever\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (url, seen)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> Request {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up mid-request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Request {
        head,
        body: String::from_utf8_lossy(&buf[head_end..]).into_owned(),
    }
}

#[test_log::test(tokio::test)]
async fn test_sync_without_deploy_posts_empty_list() {
    let (url, seen) = endpoint(200).await;
    let assembly = TestAssembly::with_sync(&url, "sekrit");
    let (mut client, _) = open_session(&assembly).await;

    client.sync().await.unwrap();
    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].head.starts_with("POST /software-list "));
    assert!(
        requests[0]
            .head
            .to_ascii_lowercase()
            .contains("authorization: session-key sekrit")
    );
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body, serde_json::json!({ "package": {}, "gd": {} }));
}

#[test_log::test(tokio::test)]
async fn test_deploy_syncs_once() {
    let (url, seen) = endpoint(200).await;
    let assembly = TestAssembly::with_sync(&url, "k");
    let recipe = TempDir::new().unwrap();
    write_recipe(recipe.path(), "name demo\npackage nginx\n", &[]);

    let (mut client, _) = open_session(&assembly).await;
    let before = seen.lock().unwrap().len();
    deploy::deploy(&mut client, &recipe.path().to_string_lossy(), false)
        .await
        .unwrap();
    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), before + 1);
    let body: serde_json::Value = serde_json::from_str(&requests[before].body).unwrap();
    assert_eq!(body["package"]["nginx"]["version"], "1.0-1");
    assert!(client.status().await.unwrap().is_synced);

    // Already synced: nothing is posted.
    client.sync().await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), before + 1);
}

#[test_log::test(tokio::test)]
async fn test_rejected_sync() {
    let (url, _) = endpoint(503).await;
    let assembly = TestAssembly::with_sync(&url, "k");
    let (mut client, sink) = open_session(&assembly).await;

    let err = client.sync().await.unwrap_err();
    assert_eq!(
        err.rpc_error().unwrap().code,
        ErrorCode::SyncServerFailed.code()
    );

    // Best-effort sync after a clean only warns.
    client
        .clean(&jsc_core::api::CleanParams::default())
        .await
        .unwrap();
    assert!(sink.stderr_text().contains("software list sync failed"));
}
