//! Event bus behavior, independent of a running crawl.

use std::time::Duration;
use tokio::time::timeout;

use sitehound::events::EventBusError;
use sitehound::{CrawlEvent, CrawlEventBus, PageResult, ShutdownReason};

#[tokio::test]
async fn publish_with_no_subscribers_reports_the_drop() {
    let bus = CrawlEventBus::new(16);
    assert_eq!(bus.subscriber_count(), 0);
    assert!(!bus.has_subscribers());

    let result = bus.publish(CrawlEvent::started(
        "crawl-1".to_string(),
        "https://example.com/".to_string(),
        2,
    ));
    assert_eq!(result, Err(EventBusError::NoSubscribers));
    assert_eq!(bus.metrics().events_failed, 1);
}

#[tokio::test]
async fn subscribers_receive_published_events() {
    let bus = CrawlEventBus::new(16);
    let mut receiver = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 1);

    let reached = bus
        .publish(CrawlEvent::started(
            "crawl-1".to_string(),
            "https://example.com/".to_string(),
            3,
        ))
        .unwrap();
    assert_eq!(reached, 1);

    let event = timeout(Duration::from_millis(100), receiver.recv())
        .await
        .expect("timed out")
        .expect("closed");
    match event {
        CrawlEvent::Started { seed_url, max_depth, .. } => {
            assert_eq!(seed_url, "https://example.com/");
            assert_eq!(max_depth, 3);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let bus = CrawlEventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    let result = PageResult::minimal(
        "https://example.com/page".to_string(),
        200,
        "text/html".to_string(),
    );
    let reached = bus.publish(CrawlEvent::page(result)).unwrap();
    assert_eq!(reached, 2);

    for receiver in [&mut first, &mut second] {
        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timed out")
            .expect("closed");
        assert!(matches!(event, CrawlEvent::Page { .. }));
    }
}

#[tokio::test]
async fn shutdown_delivers_a_final_event_and_refuses_more() {
    let bus = CrawlEventBus::new(16);
    let mut receiver = bus.subscribe();

    bus.shutdown(ShutdownReason::CrawlCompleted);
    assert!(bus.is_shut_down());

    let event = timeout(Duration::from_millis(100), receiver.recv())
        .await
        .expect("timed out")
        .expect("closed");
    assert!(matches!(
        event,
        CrawlEvent::Shutdown {
            reason: ShutdownReason::CrawlCompleted,
            ..
        }
    ));

    let result = bus.publish(CrawlEvent::error(
        "https://example.com/x".to_string(),
        "late".to_string(),
    ));
    assert_eq!(result, Err(EventBusError::ShutDown));

    // Repeated shutdown is a no-op, not a second event.
    bus.shutdown(ShutdownReason::Cancelled);
    assert!(
        timeout(Duration::from_millis(50), receiver.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn metrics_count_published_events() {
    let bus = CrawlEventBus::new(16);
    let _receiver = bus.subscribe();
    for i in 0..4 {
        bus.publish(CrawlEvent::request(format!("https://h.test/{i}"), 0, 0))
            .unwrap();
    }
    let metrics = bus.metrics();
    assert_eq!(metrics.events_published, 4);
    assert_eq!(metrics.events_failed, 0);
    assert_eq!(metrics.active_subscribers, 1);
}
