// End-to-end tests for feedtally
//
// Drive the HTTP router with in-process backends, then flush the day and check
// what reached the durable sink.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate};
use feedtally_cache::MemoryCache;
use feedtally_config::{CacheBackendKind, FlushTrigger, RuntimeConfig, SinkBackendKind};
use feedtally_core::FixedClock;
use feedtally_flush::FlushOutcome;
use feedtally_server::{build_pipeline, router, AppState, Pipeline};
use feedtally_sink::MemorySink;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    app: Router,
    pipeline: Pipeline,
    clock: Arc<FixedClock>,
    sink: Arc<MemorySink>,
}

fn harness(trigger: FlushTrigger) -> Harness {
    let mut config = RuntimeConfig::default();
    config.cache.backend = CacheBackendKind::Memory;
    config.sink.backend = SinkBackendKind::Memory;
    config.flush.trigger = trigger;
    config.flush.page_size = 2;
    config.flush.drain_interval_ms = 0;

    let cache = Arc::new(MemoryCache::new());
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(FixedClock::at("2024-03-01T09:00:00+00:00").unwrap());

    let pipeline = build_pipeline(&config, cache, sink.clone(), clock.clone());
    let app = router(AppState::new(
        pipeline.clone(),
        config.request.max_payload_bytes,
    ));

    Harness {
        app,
        pipeline,
        clock,
        sink,
    }
}

async fn record(app: &Router, body: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/recordop")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn march(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

#[tokio::test]
async fn test_ingest_then_flush_previous_day() {
    let h = harness(FlushTrigger::Interval);

    for body in [
        r#"{"user_id":"u1","source":3,"video_id":"v1","show_count":2,"video_wait_time":4}"#,
        r#"{"user_id":"u1","source":3,"video_id":"v1","tap_count":1,"watch_count":5,"video_wait_time":9,"is_complete_show":1}"#,
        r#"{"user_id":"u2","source":1,"video_id":"v7","share_count":1}"#,
        r#"{"user_id":"u3","source":2,"video_id":"v9","download_count":2,"return_count":1}"#,
    ] {
        let (status, envelope) = record(&h.app, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["err_code"], 0);
    }

    // Nothing is written while the day is still open.
    assert!(h.sink.records().is_empty());

    h.clock.advance(Duration::hours(16));
    let report = h.pipeline.coordinator.run_previous_day().await;

    assert_eq!(report.day, march(1));
    assert_eq!(report.outcome, FlushOutcome::Completed);
    assert_eq!(report.users_seen, 3);
    assert_eq!(report.records_written, 3);
    // Three users with a page size of two.
    assert_eq!(report.pages_drained, 2);

    let records = h.sink.records();
    assert_eq!(records.len(), 3);

    let u1 = records.iter().find(|r| r.user_id == "u1").unwrap();
    assert_eq!(u1.source, 3);
    assert_eq!(u1.video_id, "v1");
    assert_eq!(u1.show_count, 2);
    assert_eq!(u1.tap_count, 1);
    assert_eq!(u1.watch_count, 5);
    assert_eq!(u1.video_wait_time, 9);
    assert!(u1.is_complete_show);
    assert_eq!(u1.day, march(1));

    let u3 = records.iter().find(|r| r.user_id == "u3").unwrap();
    assert_eq!(u3.download_count, 2);
    assert_eq!(u3.return_count, 1);
}

#[tokio::test]
async fn test_day_is_flushed_once() {
    let h = harness(FlushTrigger::Interval);
    record(&h.app, r#"{"user_id":"u1","source":1,"video_id":"v1"}"#).await;

    h.clock.advance(Duration::days(1));
    let first = h.pipeline.coordinator.run_previous_day().await;
    let second = h.pipeline.coordinator.run_previous_day().await;

    assert_eq!(first.records_written, 1);
    assert!(second.is_skipped());
    assert_eq!(h.sink.records().len(), 1);
}

#[tokio::test]
async fn test_today_is_not_flushed_with_yesterday() {
    let h = harness(FlushTrigger::Interval);
    record(&h.app, r#"{"user_id":"u1","source":1,"video_id":"v1"}"#).await;

    h.clock.advance(Duration::days(1));
    record(&h.app, r#"{"user_id":"u2","source":1,"video_id":"v2"}"#).await;

    h.pipeline.coordinator.run_previous_day().await;

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, "u1");

    // The later day flushes on its own turn.
    h.clock.advance(Duration::days(1));
    let report = h.pipeline.coordinator.run_previous_day().await;
    assert_eq!(report.day, march(2));
    assert_eq!(report.records_written, 1);
}

#[tokio::test]
async fn test_rejected_requests_leave_no_trace() {
    let h = harness(FlushTrigger::Interval);

    let (status, envelope) = record(&h.app, r#"{"user_id":"u1","source":1}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope["status"], 0);
    assert_eq!(envelope["err_code"], 1000);

    let (status, _) = record(&h.app, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.clock.advance(Duration::days(1));
    let report = h.pipeline.coordinator.run_previous_day().await;
    assert_eq!(report.users_seen, 0);
    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn test_traffic_trigger_flushes_after_ingest() {
    let h = harness(FlushTrigger::Traffic);
    record(
        &h.app,
        r#"{"user_id":"u1","source":1,"video_id":"v1","show_count":1}"#,
    )
    .await;

    // The next day's first request launches the flush for the day before.
    h.clock.advance(Duration::days(1));
    record(&h.app, r#"{"user_id":"u2","source":1,"video_id":"v2"}"#).await;

    for _ in 0..100 {
        if !h.sink.records().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, "u1");
    assert_eq!(records[0].day, march(1));
}

#[tokio::test]
async fn test_forced_flush_recovers_rejected_batch() {
    let h = harness(FlushTrigger::Interval);
    record(
        &h.app,
        r#"{"user_id":"u1","source":1,"video_id":"v1","tap_count":4}"#,
    )
    .await;

    h.clock.advance(Duration::days(1));
    h.sink.fail_next_batches(1);
    let first = h.pipeline.coordinator.run_previous_day().await;
    assert_eq!(first.records_unsent, 1);
    assert!(h.pipeline.coordinator.run(march(1)).await.is_skipped());

    let retry = h.pipeline.coordinator.run_forced(march(1)).await;
    assert_eq!(retry.outcome, FlushOutcome::Completed);

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tap_count, 4);
    assert_eq!(records[0].day, march(1));
}
