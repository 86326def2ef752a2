//! Timing behaviour of running collectors, driven by a paused clock

use std::time::Duration;

use host_monitor::service::MonitorService;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_memory_alert_reaches_email() {
    let disk = MockCollector::healthy("disk_space");
    // second invocation (t=120) reports high memory usage
    let memory = MockCollector::unhealthy_on("memory", &[1]);
    let email = MockNotifier::new("email");

    let config = ConfigBuilder::new()
        .default_interval(60)
        .collector("disk_space", None)
        .collector("memory", Some(120))
        .notifier("email")
        .build();

    let service =
        MonitorService::with_plugins(config, collectors(&[&disk, &memory]), notifiers(&[&email]));
    service.start().await.unwrap();

    advance_secs(1).await;
    assert_eq!((disk.calls(), memory.calls()), (1, 1));
    assert!(email.batches().is_empty());

    advance_secs(60).await;
    assert_eq!((disk.calls(), memory.calls()), (2, 1));
    assert!(email.batches().is_empty());

    advance_secs(60).await;
    assert_eq!((disk.calls(), memory.calls()), (3, 2));

    let batches = email.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].collector, "memory");
    assert!(!batches[0][0].healthy);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_collector_is_retried_on_next_tick() {
    let disk = MockCollector::hanging_on("disk_space", &[0]);
    let email = MockNotifier::new("email");

    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("disk_space", Some(60))
            .notifier("email")
            .build(),
        collectors(&[&disk]),
        notifiers(&[&email]),
    );
    service.start().await.unwrap();

    // the first invocation is abandoned at t=30
    advance_secs(31).await;
    assert_eq!(disk.calls(), 1);
    assert!(email.batches().is_empty());

    advance_secs(30).await;
    assert_eq!(disk.calls(), 2);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_collector_does_not_delay_others() {
    let disk = MockCollector::hanging_on("disk_space", &[0, 1, 2, 3]);
    let memory = MockCollector::healthy("memory");

    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("disk_space", Some(5))
            .collector("memory", Some(5))
            .build(),
        collectors(&[&disk, &memory]),
        vec![],
    );
    service.start().await.unwrap();

    advance_secs(29).await;
    assert_eq!(memory.calls(), 6);
    assert_eq!(disk.calls(), 1);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_collect_timeout() {
    let disk = MockCollector::hanging_on("disk_space", &[0]);

    let service = MonitorService::with_plugins(
        ConfigBuilder::new().collector("disk_space", Some(20)).build(),
        collectors(&[&disk]),
        vec![],
    )
    .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
    service.start().await.unwrap();

    // abandoned at t=5, next tick at t=20
    advance_secs(19).await;
    assert_eq!(disk.calls(), 1);
    advance_secs(2).await;
    assert_eq!(disk.calls(), 2);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_every_unhealthy_batch_is_dispatched() {
    let memory = MockCollector::unhealthy_on("memory", &[0, 2, 3]);
    let email = MockNotifier::new("email");

    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("memory", Some(10))
            .notifier("email")
            .build(),
        collectors(&[&memory]),
        notifiers(&[&email]),
    );
    service.start().await.unwrap();

    advance_secs(35).await;
    assert_eq!(memory.calls(), 4);
    assert_eq!(email.batches().len(), 3);

    service.stop().await;
}
