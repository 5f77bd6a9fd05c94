use super::*;
use crate::Config;
use crate::controller::test_helpers::{FakeProvider, fast_config, wait_for_terminal};
use crate::storage::MemoryStore;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

mod system;

/// Router over a fresh controller, plus handles for assertions
struct TestApp {
    router: Router,
    controller: Arc<JobController>,
    store: MemoryStore,
}

impl TestApp {
    fn new(provider: FakeProvider) -> Self {
        Self::with_config(fast_config(2), provider)
    }

    fn with_config(config: Config, provider: FakeProvider) -> Self {
        let store = MemoryStore::new();
        let controller = Arc::new(
            JobController::new(config.clone(), Arc::new(store.clone()), Arc::new(provider))
                .unwrap(),
        );
        let router = create_router(controller.clone(), Arc::new(config));
        Self {
            router,
            controller,
            store,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn wait_for_terminal(&self) {
        wait_for_terminal(&self.controller).await;
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_stops_on_shutdown_signal() {
    let mut config = fast_config(2);
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // OS-assigned port
    let config = Arc::new(config);
    let controller = Arc::new(
        JobController::new(
            (*config).clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(FakeProvider::new(1)),
        )
        .unwrap(),
    );

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(start_api_server_with_shutdown(
        controller,
        config,
        async move {
            rx.await.ok();
        },
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_headers_present_when_enabled() {
    let app = TestApp::new(FakeProvider::new(1));

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_headers_absent_when_disabled() {
    let mut config = fast_config(2);
    config.api.cors_enabled = false;
    let app = TestApp::with_config(config, FakeProvider::new(1));

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_specific_origin() {
    let layer_origins = vec!["http://allowed.example".to_string()];
    let mut config = fast_config(2);
    config.api.cors_origins = layer_origins;
    let app = TestApp::with_config(config, FakeProvider::new(1));

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://allowed.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://allowed.example"
    );
}
