use super::*;
use axum::http::header;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new(FakeProvider::new(1));

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_openapi_endpoint() {
    let app = TestApp::new(FakeProvider::new(1));

    let response = app.get("/openapi.json").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["paths"]["/scrape"].is_object());
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let app = TestApp::new(FakeProvider::new(1));
    let response = app.get("/swagger-ui/").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = fast_config(2);
    config.api.swagger_ui = false;
    let app = TestApp::with_config(config, FakeProvider::new(1));
    let response = app.get("/swagger-ui/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_stream_is_sse() {
    let app = TestApp::new(FakeProvider::new(1));

    let response = app.get("/events").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
}

#[tokio::test]
async fn test_event_stream_delivers_job_events() {
    use futures::StreamExt;

    let app = TestApp::new(FakeProvider::new(1));
    let response = app.get("/events").await;
    let mut stream = response.into_body().into_data_stream();

    app.controller
        .start(crate::types::JobRequest::new(["A"], ["x"]))
        .await
        .unwrap();

    let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let chunk = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(chunk.contains("event: job_started"), "{chunk}");
    assert!(chunk.contains("\"type\":\"job_started\""), "{chunk}");

    app.wait_for_terminal().await;
}
