//! Message routing: dispatch over request kinds, settings persistence,
//! page-context queries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use yourls_relay::gateway::{ApiOutcome, Success};
use yourls_relay::gateway::http::ApiGateway;
use yourls_relay::menu::SHORTEN_MENU_ID;
use yourls_relay::messages::{DetachedPage, PageContext, Reply, Request, Router, TabRef};
use yourls_relay::settings::{MemorySettingsStore, Settings, SettingsStore};

/// Page context answering from fixed strings, scoped to tab 1.
struct FakePage;

#[async_trait]
impl PageContext for FakePage {
    async fn selection(&self, tab: Option<TabRef>) -> String {
        match tab {
            Some(TabRef { id: 1 }) => "selected words".to_string(),
            _ => String::new(),
        }
    }

    async fn link_target(&self, tab: Option<TabRef>) -> String {
        match tab {
            Some(TabRef { id: 1 }) => "https://example.com/focused".to_string(),
            _ => String::new(),
        }
    }
}

/// Helper: consume one HTTP request (head plus Content-Length body).
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + len {
                return;
            }
        }
    }
}

/// Helper: serve `count` requests with the same canned 200 body.
async fn mock_server(body: &'static str, count: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        for _ in 0..count {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        }
    });
    port
}

fn expect_success(reply: Reply) -> Success {
    match reply {
        Reply::Api(ApiOutcome::Success(success)) => success,
        other => panic!("expected success, got {other:?}"),
    }
}

fn router_with(store: Arc<MemorySettingsStore>) -> Router {
    Router::new(ApiGateway::new().unwrap(), store, Arc::new(FakePage))
}

#[tokio::test]
async fn shorten_link_uses_stored_settings() {
    let port = mock_server("http://sho.rt/x\n", 1).await;
    let store = Arc::new(MemorySettingsStore::new(Settings::new(
        format!("http://127.0.0.1:{port}/"),
        "sig",
    )));
    let router = router_with(store);

    let reply = router
        .handle_value(json!({"method": "shortenLink", "url": "https://example.com"}))
        .await;

    let success = expect_success(reply);
    assert_eq!(success.extracted_value, "http://sho.rt/x");
}

#[tokio::test]
async fn shorten_link_with_unconfigured_store_fails_cleanly() {
    let router = router_with(Arc::new(MemorySettingsStore::default()));

    let reply = router
        .handle(Request::ShortenLink {
            url: "https://example.com".to_string(),
            keyword: None,
        })
        .await;

    let failure = match reply {
        Reply::Api(ApiOutcome::Failure(failure)) => failure,
        other => panic!("expected failure, got {other:?}"),
    };
    assert_eq!(failure.message, "Error: Server returned status 0 ()");
}

#[tokio::test]
async fn version_success_persists_settings() {
    let port = mock_server("<result><version>1.9.2</version></result>", 1).await;
    let store = Arc::new(MemorySettingsStore::default());
    let router = router_with(Arc::clone(&store));

    let reply = router
        .handle_value(json!({
            "method": "version",
            "settings": {"api": format!("http://127.0.0.1:{port}"), "signature": "sig", "maxwait": "3"}
        }))
        .await;

    let success = expect_success(reply);
    assert_eq!(success.extracted_value, "1.9.2");
    assert_eq!(store.save_count(), 1);

    let saved = store.load().await.unwrap();
    assert_eq!(saved.api_base_url, format!("http://127.0.0.1:{port}"));
    assert_eq!(saved.signature_token, "sig");
    assert_eq!(saved.timeout_secs(), 3);
}

#[tokio::test]
async fn version_with_odd_maxwait_still_checks_server() {
    let port = mock_server("<result><version>1.9.2</version></result>", 1).await;
    let store = Arc::new(MemorySettingsStore::default());
    let router = router_with(Arc::clone(&store));

    let reply = router
        .handle_value(json!({
            "method": "version",
            "settings": {"api": format!("http://127.0.0.1:{port}"), "signature": "sig", "maxwait": true}
        }))
        .await;

    assert_eq!(expect_success(reply).extracted_value, "1.9.2");
    let saved = store.load().await.unwrap();
    assert_eq!(saved.timeout, None);
    assert_eq!(saved.timeout_secs(), 5);
}

#[tokio::test]
async fn version_failure_does_not_persist() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let store = Arc::new(MemorySettingsStore::default());
    let router = router_with(Arc::clone(&store));

    let reply = router
        .handle(Request::Version {
            settings: Settings::new(format!("http://127.0.0.1:{port}"), "sig"),
        })
        .await;

    assert!(matches!(reply, Reply::Api(ApiOutcome::Failure(_))));
    assert_eq!(store.save_count(), 0);
    assert_eq!(store.load().await.unwrap(), Settings::default());
}

#[tokio::test]
async fn selection_and_link_target_come_from_page() {
    let router = router_with(Arc::new(MemorySettingsStore::default()));

    let selection = router
        .handle_value(json!({"method": "getSelectionInTab", "tab": {"id": 1}}))
        .await;
    assert_eq!(
        selection,
        Reply::Selection {
            selection: "selected words".to_string()
        }
    );

    let legacy = router
        .handle_value(json!({"method": "getSelection", "tab": {"id": 1}}))
        .await;
    assert_eq!(legacy, selection);

    let link = router
        .handle_value(json!({"method": "getLinkTarget", "tab": {"id": 1}}))
        .await;
    assert_eq!(
        serde_json::to_value(&link).unwrap(),
        json!({"linkTarget": "https://example.com/focused"})
    );

    let other_tab = router
        .handle_value(json!({"method": "getLinkTarget", "tab": {"id": 2}}))
        .await;
    assert_eq!(
        other_tab,
        Reply::LinkTarget {
            link_target: String::new()
        }
    );
}

#[tokio::test]
async fn detached_page_answers_empty() {
    let router = Router::new(
        ApiGateway::new().unwrap(),
        Arc::new(MemorySettingsStore::default()),
        Arc::new(DetachedPage),
    );

    let reply = router.handle_value(json!({"method": "getSelectionInTab"})).await;
    assert_eq!(
        reply,
        Reply::Selection {
            selection: String::new()
        }
    );
}

#[tokio::test]
async fn unknown_method_is_unhandled() {
    let router = router_with(Arc::new(MemorySettingsStore::default()));

    let reply = router.handle_value(json!({"method": "openPopup"})).await;
    assert_eq!(
        reply,
        Reply::Unhandled {
            unhandled: Some("openPopup".to_string())
        }
    );
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({"unhandled": "openPopup"})
    );

    let missing = router.handle_value(json!({"url": "https://example.com"})).await;
    assert_eq!(missing, Reply::Unhandled { unhandled: None });
}

#[tokio::test]
async fn known_method_with_bad_payload_is_rejected() {
    let router = router_with(Arc::new(MemorySettingsStore::default()));

    let reply = router.handle_value(json!({"method": "shortenLink"})).await;
    let error = match reply {
        Reply::Rejected { error } => error,
        other => panic!("expected rejection, got {other:?}"),
    };
    assert!(error.starts_with("malformed request:"), "{error}");
}

#[test]
fn router_registers_shorten_menu_once() {
    let router = router_with(Arc::new(MemorySettingsStore::default()));
    let items = router.menus().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, SHORTEN_MENU_ID);
    assert_eq!(items[0].title, "Shorten URL");
}
