// tests/api_http.rs
//
// HTTP-level tests for the trigger Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use common::{cat, FakeFeed, Listing, RecordingSink};
use feed_snapshot::api::{create_router, AppState};
use feed_snapshot::ingest::config::PipelineConfig;
use feed_snapshot::ingest::coordinator::{FAILURE_MESSAGE, SUCCESS_MESSAGE};
use feed_snapshot::ingest::retry::RetryPolicy;
use feed_snapshot::InvocationResponse;
use feed_snapshot::RunCoordinator;
use tower::ServiceExt as _; // for `oneshot`

const BODY_LIMIT: usize = 1024 * 1024;

fn state_for(feed: FakeFeed, categories: &[&str]) -> (AppState, Arc<RecordingSink>) {
    let cfg = PipelineConfig {
        categories: categories.iter().map(|c| cat(c)).collect(),
        ..PipelineConfig::default()
    };
    let sink = Arc::new(RecordingSink::default());
    let mut fanout = cfg.fanout();
    fanout.retry = RetryPolicy::new(2, Duration::from_millis(1));
    let coordinator = RunCoordinator::new(Arc::new(feed), sink.clone(), fanout);
    (AppState::with_coordinator(cfg, coordinator), sink)
}

async fn post_run(state: AppState) -> (StatusCode, InvocationResponse) {
    let req = Request::builder()
        .method("POST")
        .uri("/run")
        .body(Body::empty())
        .expect("build POST /run");
    let resp = create_router(state).oneshot(req).await.expect("oneshot /run");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("parse run json"))
}

#[tokio::test]
async fn health_returns_ok() {
    let (state, _) = state_for(FakeFeed::new(), &[]);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = create_router(state).oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn run_success_is_200_with_message() {
    let feed = FakeFeed::new()
        .listing("top", Listing::Ids(vec![1, 2]))
        .story(1)
        .story(2);
    let (state, sink) = state_for(feed, &["top"]);

    let (status, body) = post_run(state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status_code, 200);
    assert_eq!(body.message, SUCCESS_MESSAGE);
    assert_eq!(sink.keys().len(), 1);
}

#[tokio::test]
async fn run_with_failed_category_is_500() {
    let feed = FakeFeed::new()
        .listing("top", Listing::Ids(vec![1]))
        .listing("new", Listing::Http500)
        .story(1);
    let (state, sink) = state_for(feed, &["top", "new"]);

    let (status, body) = post_run(state).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.status_code, 500);
    assert_eq!(body.message, FAILURE_MESSAGE);
    assert_eq!(sink.keys().len(), 1);
}

#[tokio::test]
async fn get_on_run_is_not_allowed() {
    let (state, _) = state_for(FakeFeed::new(), &[]);
    let req = Request::builder()
        .uri("/run")
        .body(Body::empty())
        .unwrap();
    let resp = create_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
