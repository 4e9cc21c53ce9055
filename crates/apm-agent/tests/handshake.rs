// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use apm_agent::collector::{connect_attempt, CollectorError, Outcome};
use mockito::Server;
use serde_json::json;

use common::{client, handshake_config, method_query, request_json, return_value, INVOKE_PATH};

#[tokio::test]
async fn redirect_host_receives_connect() {
    let mut entry = Server::new_async().await;
    let mut redirected = Server::new_async().await;

    let preconnect = entry
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("preconnect"))
        .match_request(|request| {
            request_json(request) == Some(json!([{"high_security": false}]))
        })
        .with_body(return_value(&json!({ "redirect_host": redirected.host_with_port() })))
        .create_async()
        .await;
    let stray_connect = entry
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .expect(0)
        .create_async()
        .await;
    let connect = redirected
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .match_request(|request| {
            request_json(request).is_some_and(|body| {
                body[0]["app_name"] == json!(["checkout"])
                    && body[0]["identifier"] == "checkout"
                    && body[0].get("security_policies").is_none()
            })
        })
        .with_body(return_value(&json!({
            "agent_run_id": "run-abc",
            "max_payload_size_in_bytes": 250_000,
            "request_headers_map": {"X-Meta": "xyz"},
            "event_harvest_config": {
                "report_period_ms": 5000,
                "harvest_limits": {"span_event_data": 100}
            }
        })))
        .create_async()
        .await;

    let session = connect_attempt(&client(), &handshake_config(&entry.host_with_port()), 1)
        .await
        .expect("handshake succeeds");

    assert_eq!(session.run_id.as_str(), "run-abc");
    assert_eq!(session.collector_host, redirected.host_with_port());
    assert_eq!(session.max_payload_size, 250_000);
    assert_eq!(session.request_headers["X-Meta"], "xyz");
    assert_eq!(session.event_harvest.report_period_ms, 5000);
    assert_eq!(session.event_harvest.harvest_limits.span_event_data, Some(100));
    assert_eq!(session.generation, 1);

    preconnect.assert_async().await;
    connect.assert_async().await;
    stray_connect.assert_async().await;
}

#[tokio::test]
async fn unknown_required_policy_stops_before_connect() {
    let mut server = Server::new_async().await;
    let _preconnect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("preconnect"))
        .match_request(|request| {
            request_json(request).is_some_and(|body| body[0]["security_policies_token"] == "token")
        })
        .with_body(return_value(&json!({
            "security_policies": {
                "record_sql": {"enabled": false, "required": true},
                "brand_new_policy": {"enabled": true, "required": true}
            }
        })))
        .create_async()
        .await;
    let connect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .expect(0)
        .create_async()
        .await;

    let mut config = handshake_config(&server.host_with_port());
    config.security_policies_token = Some("token".to_string());
    let err = connect_attempt(&client(), &config, 1).await.unwrap_err();

    match &err {
        CollectorError::UnknownRequiredPolicies(names) => {
            assert_eq!(names, &vec!["brand_new_policy".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.outcome(), Outcome::Disconnect);
    connect.assert_async().await;
}

#[tokio::test]
async fn accepted_policies_are_echoed_on_connect() {
    let mut server = Server::new_async().await;
    let _preconnect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("preconnect"))
        .with_body(return_value(&json!({
            "security_policies": {
                "record_sql": {"enabled": false, "required": false},
                "custom_events": {"enabled": true, "required": false}
            }
        })))
        .create_async()
        .await;
    let connect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .match_request(|request| {
            request_json(request).is_some_and(|body| {
                body[0]["security_policies"]
                    == json!({
                        "record_sql": {"enabled": false},
                        "custom_events": {"enabled": true}
                    })
            })
        })
        .with_body(return_value(&json!({"agent_run_id": "run-1"})))
        .create_async()
        .await;

    let mut config = handshake_config(&server.host_with_port());
    config.security_policies_token = Some("token".to_string());
    let session = connect_attempt(&client(), &config, 3).await.unwrap();

    assert_eq!(session.security_policies.is_enabled("record_sql"), Some(false));
    connect.assert_async().await;
}

#[tokio::test]
async fn connect_rejection_is_classified() {
    let mut server = Server::new_async().await;
    let _preconnect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("preconnect"))
        .with_body(return_value(&json!({})))
        .create_async()
        .await;
    let _connect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .with_status(410)
        .create_async()
        .await;

    let err = connect_attempt(&client(), &handshake_config(&server.host_with_port()), 1)
        .await
        .unwrap_err();
    assert_eq!(err.outcome(), Outcome::Disconnect);
}

#[tokio::test]
async fn connect_without_run_id_fails() {
    let mut server = Server::new_async().await;
    let _preconnect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("preconnect"))
        .with_body(return_value(&json!({"redirect_host": ""})))
        .create_async()
        .await;
    let _connect = server
        .mock("POST", INVOKE_PATH)
        .match_query(method_query("connect"))
        .with_body(return_value(&json!({"agent_run_id": ""})))
        .create_async()
        .await;

    let err = connect_attempt(&client(), &handshake_config(&server.host_with_port()), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::MissingRunId));
}
