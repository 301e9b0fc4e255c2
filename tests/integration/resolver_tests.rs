//! Integration tests for image resolution
//!
//! These drive the resolver against a mock image server to verify tier
//! selection: descriptor-first, probe-fallback, degraded fallback.

use curio::config::UserAgentConfig;
use curio::fetch::{build_http_client, BackoffPolicy, Scheduler, SchedulerLimits};
use curio::model::{ImageRef, ImageStatus};
use curio::resolve::Resolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The sender must stay alive for the test; dropping it reads as cancellation
fn test_resolver() -> (Resolver, watch::Sender<bool>) {
    let client = build_http_client(&UserAgentConfig {
        crawler_name: "CurioTest".to_string(),
        crawler_version: "1.0".to_string(),
        contact_url: "https://example.com/about".to_string(),
        contact_email: "test@example.com".to_string(),
    })
    .expect("Failed to build client");

    let (tx, rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        client,
        SchedulerLimits {
            concurrency_limit: 4,
            per_host_min_interval: Duration::from_millis(5),
        },
        BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 1),
        rx,
    );
    (Resolver::new(Arc::new(scheduler)), tx)
}

#[tokio::test]
async fn test_probe_selects_highest_servable_tier() {
    let server = MockServer::start().await;

    // full is gone; medium and thumbnail are servable
    Mock::given(path("/img/full.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/img/medium.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/img/thumb.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let image = ImageRef::new(vec![
        format!("{}/img/thumb.jpg", server.uri()),
        format!("{}/img/medium.jpg", server.uri()),
        format!("{}/img/full.jpg", server.uri()),
    ]);

    let (resolver, _cancel) = test_resolver();
    let resolved = resolver.resolve("test", image).await;

    assert_eq!(resolved.status, ImageStatus::Resolved);
    assert!(!resolved.degraded);
    assert_eq!(
        resolved.resolved_url.as_deref(),
        Some(format!("{}/img/medium.jpg", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_no_servable_tier_degrades_to_lowest_candidate() {
    let server = MockServer::start().await;
    // nothing mounted: every probe 404s

    let image = ImageRef::new(vec![
        format!("{}/img/thumb.jpg", server.uri()),
        format!("{}/img/full.jpg", server.uri()),
    ]);

    let (resolver, _cancel) = test_resolver();
    let resolved = resolver.resolve("test", image).await;

    assert_eq!(resolved.status, ImageStatus::Resolved);
    assert!(resolved.degraded);
    assert_eq!(
        resolved.resolved_url.as_deref(),
        Some(format!("{}/img/thumb.jpg", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_descriptor_names_the_maximum_directly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/iiif/ab12/info.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"@context": "http://iiif.io/api/image/2/context.json", "width": 4000, "height": 3000}"#,
        ))
        .mount(&server)
        .await;

    let image = ImageRef::new(vec![format!(
        "{}/iiif/ab12/full/600,/0/default.jpg",
        server.uri()
    )]);

    let (resolver, _cancel) = test_resolver();
    let resolved = resolver.resolve("test", image).await;

    assert_eq!(resolved.status, ImageStatus::Resolved);
    assert!(!resolved.degraded);
    assert_eq!(
        resolved.resolved_url.as_deref(),
        Some(format!("{}/iiif/ab12/full/full/0/default.jpg", server.uri()).as_str())
    );

    // the descriptor answered, so no tier probing happened
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_blogger_size_segment_walks_the_ladder() {
    let server = MockServer::start().await;

    // only s1600 and below exist; s0 (original) is not servable
    for size in ["s320", "s640", "s1024", "s1600"] {
        Mock::given(path(format!("/img/b/{}/photo.jpg", size)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
    }

    let image = ImageRef::new(vec![format!("{}/img/b/s320/photo.jpg", server.uri())]);

    let (resolver, _cancel) = test_resolver();
    let resolved = resolver.resolve("test", image).await;

    assert_eq!(resolved.status, ImageStatus::Resolved);
    assert!(!resolved.degraded);
    assert_eq!(
        resolved.resolved_url.as_deref(),
        Some(format!("{}/img/b/s1600/photo.jpg", server.uri()).as_str())
    );
}
