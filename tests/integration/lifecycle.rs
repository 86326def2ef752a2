//! Startup and shutdown of the monitor service
//!
//! These tests verify the lifecycle guarantees:
//! - Startup stages abort on the first fatal error
//! - No loop survives a failed startup
//! - Shutdown drains every loop and releases every plugin exactly once

use assert_matches::assert_matches;
use host_monitor::{
    error::StartupError,
    service::{MonitorService, ServiceState},
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn test_stop_with_three_collectors() {
    let disk = MockCollector::healthy("disk_space");
    let memory = MockCollector::healthy("memory");
    let load = MockCollector::healthy("load");
    let email = MockNotifier::new("email");

    let config = ConfigBuilder::new()
        .collector("disk_space", None)
        .collector("memory", Some(30))
        .collector("load", Some(10))
        .notifier("email")
        .build();

    let service = MonitorService::with_plugins(
        config,
        collectors(&[&disk, &memory, &load]),
        notifiers(&[&email]),
    );
    service.start().await.unwrap();
    assert_eq!(
        service.scheduled_collectors(),
        vec!["disk_space", "load", "memory"]
    );

    advance_secs(95).await;
    service.stop().await;

    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(service.scheduled_collectors().is_empty());

    let calls = [disk.calls(), memory.calls(), load.calls()];
    assert_eq!(calls, [2, 4, 10]);

    advance_secs(600).await;
    assert_eq!([disk.calls(), memory.calls(), load.calls()], calls);

    for collector in [&disk, &memory, &load] {
        assert_eq!(collector.cleanups(), 1);
    }
    assert_eq!(email.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_double_stop_is_a_no_op() {
    let memory = MockCollector::healthy("memory");
    let email = MockNotifier::new("email");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new().collector("memory", None).notifier("email").build(),
        collectors(&[&memory]),
        notifiers(&[&email]),
    );

    service.start().await.unwrap();
    service.stop().await;
    service.stop().await;

    assert_eq!(service.state(), ServiceState::Stopped);
    assert_eq!(memory.cleanups(), 1);
    assert_eq!(email.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stop_calls_drain_once() {
    let memory = MockCollector::healthy("memory");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new().collector("memory", None).build(),
        collectors(&[&memory]),
        vec![],
    );
    service.start().await.unwrap();

    tokio::join!(service.stop(), service.stop());

    assert_eq!(service.state(), ServiceState::Stopped);
    assert_eq!(memory.cleanups(), 1);
}

#[tokio::test]
async fn test_duplicate_registration_is_fatal() {
    let first = MockCollector::healthy("memory");
    let second = MockCollector::healthy("memory");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new().collector("memory", None).build(),
        collectors(&[&first, &second]),
        vec![],
    );

    let err = service.start().await.unwrap_err();
    assert_matches!(err, StartupError::Registration(_));
    assert_eq!(service.state(), ServiceState::Stopped);
    assert_eq!(first.calls() + second.calls(), 0);
}

#[tokio::test]
async fn test_empty_name_is_fatal() {
    let nameless = MockNotifier::new("");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new().build(),
        vec![],
        notifiers(&[&nameless]),
    );

    assert_matches!(
        service.start().await,
        Err(StartupError::Registration(_))
    );
}

#[tokio::test(start_paused = true)]
async fn test_notifier_config_error_leaves_no_loop_behind() {
    let memory = MockCollector::healthy("memory");
    let webhook = MockNotifier::rejecting("webhook");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("memory", None)
            .notifier("webhook")
            .build(),
        collectors(&[&memory]),
        notifiers(&[&webhook]),
    );

    let err = service.start().await.unwrap_err();
    assert_matches!(&err, StartupError::Config { plugin, .. } if plugin == "webhook");
    assert!(err.to_string().contains("missing 'url'"));

    advance_secs(300).await;
    assert_eq!(memory.calls(), 0);
    assert!(service.scheduled_collectors().is_empty());
    assert_eq!(memory.cleanups(), 1);
    assert_eq!(webhook.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_interval_fails_whole_startup() {
    let disk = MockCollector::healthy("disk_space");
    let memory = MockCollector::healthy("memory");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .default_interval(-1)
            .collector("disk_space", Some(60))
            .collector("memory", None)
            .build(),
        collectors(&[&disk, &memory]),
        vec![],
    );

    assert_matches!(
        service.start().await,
        Err(StartupError::InvalidInterval { collector, seconds: -1 }) if collector == "memory"
    );

    // disk_space had a valid interval but must not have been started
    advance_secs(120).await;
    assert_eq!(disk.calls(), 0);
    assert_eq!(service.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_enabled_but_unregistered_is_skipped() {
    let memory = MockCollector::healthy("memory");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("memory", None)
            .collector("gpu_temperature", None)
            .notifier("pager")
            .build(),
        collectors(&[&memory]),
        vec![],
    );

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);
    assert_eq!(service.scheduled_collectors(), vec!["memory"]);

    service.stop().await;
}

#[tokio::test]
async fn test_disabled_collector_is_not_scheduled() {
    let memory = MockCollector::healthy("memory");
    let disk = MockCollector::healthy("disk_space");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector("memory", None)
            .disabled_collector("disk_space")
            .build(),
        collectors(&[&memory, &disk]),
        vec![],
    );

    service.start().await.unwrap();
    assert_eq!(service.scheduled_collectors(), vec!["memory"]);
    assert!(disk.settings.lock().is_none());

    service.stop().await;
}

#[tokio::test]
async fn test_settings_reach_the_plugin() {
    let disk = MockCollector::healthy("disk_space");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new()
            .collector_with_settings(
                "disk_space",
                serde_json::json!({ "paths": [{ "path": "/", "threshold_gb": 5 }] }),
            )
            .build(),
        collectors(&[&disk]),
        vec![],
    );

    service.start().await.unwrap();

    let settings = disk.settings.lock().clone().unwrap();
    assert_eq!(settings["paths"][0]["threshold_gb"], 5);

    service.stop().await;
}

#[tokio::test]
async fn test_missing_settings_are_passed_as_empty_map() {
    let memory = MockCollector::healthy("memory");
    let service = MonitorService::with_plugins(
        ConfigBuilder::new().collector("memory", None).build(),
        collectors(&[&memory]),
        vec![],
    );

    service.start().await.unwrap();
    assert_eq!(memory.settings.lock().clone(), Some(Default::default()));
    service.stop().await;
}
