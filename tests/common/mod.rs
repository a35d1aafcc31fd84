#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use users_api::config::AppConfig;
use users_api::{app_with_config, UserStore};

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: UserStore,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Serve a freshly seeded store on an unused local port
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Like `spawn`, with the development config adjusted first
    pub async fn spawn_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::development();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = port;
        configure(&mut config);

        let listener = tokio::net::TcpListener::bind(config.server.bind_addr())
            .await
            .context("failed to bind test port")?;

        let store = UserStore::seeded();
        let app = app_with_config(store.clone(), &config);
        let handle = tokio::spawn(async move {
            users_api::serve(listener, app, &config.server, std::future::pending::<()>()).await;
        });

        Ok(Self { port, base_url, store, handle })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Drive the router directly, returning status and decoded envelope
pub async fn send(store: &UserStore, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let app = app_with_config(store.clone(), &AppConfig::development());

    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .expect("valid request");

    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };

    (status, json)
}

/// Id of the only record in a freshly seeded store
pub async fn seed_id(store: &UserStore) -> String {
    let users = store.find_all().await;
    assert_eq!(users.len(), 1, "expected only the seed record");
    users[0].id.clone()
}
