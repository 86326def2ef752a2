//! End-to-end delivery through the built-in HTTP notifiers

use std::time::Duration;

use host_monitor::{notifiers, service::MonitorService};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::helpers::*;

async fn wait_for_requests(server: &MockServer, expected: usize) -> Vec<Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= expected {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("expected {expected} request(s) to reach the mock server");
}

#[tokio::test]
async fn test_unhealthy_result_posted_to_webhook_and_discord() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "issues": [{ "collector": "memory", "healthy": false }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_partial_json(serde_json::json!({
            "content": "<@1234> 1 issue(s) detected"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let memory = MockCollector::unhealthy_on("memory", &[0]);
    let config = ConfigBuilder::new()
        .collector("memory", Some(3600))
        .notifier_with_settings(
            "webhook",
            serde_json::json!({ "url": format!("{}/hook", mock_server.uri()) }),
        )
        .notifier_with_settings(
            "discord",
            serde_json::json!({
                "url": format!("{}/discord", mock_server.uri()),
                "user_id": "1234"
            }),
        )
        .build();

    let service = MonitorService::with_plugins(config, collectors(&[&memory]), notifiers::builtin());
    service.start().await.unwrap();

    let requests = wait_for_requests(&mock_server, 2).await;
    assert_eq!(requests.len(), 2);

    service.stop().await;
}

#[tokio::test]
async fn test_webhook_failure_does_not_block_discord() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let memory = MockCollector::unhealthy_on("memory", &[0]);
    let config = ConfigBuilder::new()
        .collector("memory", Some(3600))
        .notifier_with_settings(
            "discord",
            serde_json::json!({ "url": format!("{}/discord", mock_server.uri()) }),
        )
        .notifier_with_settings(
            "webhook",
            serde_json::json!({ "url": format!("{}/hook", mock_server.uri()) }),
        )
        .build();

    let service = MonitorService::with_plugins(config, collectors(&[&memory]), notifiers::builtin());
    service.start().await.unwrap();

    let requests = wait_for_requests(&mock_server, 2).await;
    let mut paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    paths.sort();
    assert_eq!(paths, vec!["/discord", "/hook"]);

    service.stop().await;
}

#[tokio::test]
async fn test_healthy_results_send_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let memory = MockCollector::healthy("memory");
    let config = ConfigBuilder::new()
        .collector("memory", Some(3600))
        .notifier_with_settings(
            "webhook",
            serde_json::json!({ "url": format!("{}/hook", mock_server.uri()) }),
        )
        .build();

    let service = MonitorService::with_plugins(config, collectors(&[&memory]), notifiers::builtin());
    service.start().await.unwrap();

    for _ in 0..20 {
        if memory.calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(memory.calls(), 1);

    service.stop().await;
}

#[tokio::test]
async fn test_invalid_webhook_url_aborts_start() {
    let memory = MockCollector::healthy("memory");
    let config = ConfigBuilder::new()
        .collector("memory", Some(60))
        .notifier_with_settings("webhook", serde_json::json!({ "url": "not a url" }))
        .build();

    let service = MonitorService::with_plugins(config, collectors(&[&memory]), notifiers::builtin());
    assert!(service.start().await.is_err());
    assert_eq!(memory.calls(), 0);
}
