// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the collector integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use apm_agent::collector::{
    CollectorClient, ConnectPayload, EventHarvestConfig, HandshakeConfig, SupportedPolicies,
    TransportOptions,
};
use mockito::{Matcher, Request};
use serde_json::Value;

pub const LICENSE_KEY: &str = "0123456789abcdef0123456789abcdef01234567";
pub const INVOKE_PATH: &str = "/agent_listener/invoke_raw_method";

/// Client talking plaintext HTTP to a local mock collector.
pub fn client() -> CollectorClient {
    client_with_timeout(Duration::from_secs(5))
}

pub fn client_with_timeout(timeout: Duration) -> CollectorClient {
    let options = TransportOptions {
        allow_plaintext: true,
        timeout,
        ..TransportOptions::default()
    };
    CollectorClient::new(LICENSE_KEY, &options).expect("client should build")
}

pub fn handshake_config(collector_host: &str) -> HandshakeConfig {
    HandshakeConfig {
        collector_host: collector_host.to_string(),
        security_policies_token: None,
        high_security: false,
        supported_policies: SupportedPolicies::default(),
        connect_payload: ConnectPayload {
            pid: 4242,
            language: "rust".to_string(),
            agent_version: "0.1.0".to_string(),
            host: "test-host".to_string(),
            display_host: "test-host".to_string(),
            app_name: vec!["checkout".to_string()],
            identifier: "checkout".to_string(),
            high_security: false,
            labels: Vec::new(),
            metadata: BTreeMap::new(),
            security_policies: None,
            event_harvest_config: EventHarvestConfig::default(),
        },
    }
}

/// Matches the query string of an invoke for `method`.
pub fn method_query(method: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("method".into(), method.into()),
        Matcher::UrlEncoded("marshal_format".into(), "json".into()),
        Matcher::UrlEncoded("protocol_version".into(), "17".into()),
        Matcher::UrlEncoded("license_key".into(), LICENSE_KEY.into()),
    ])
}

/// Decodes a gzip request body as JSON.
pub fn request_json(request: &Request) -> Option<Value> {
    let body = request.body().ok()?;
    let raw = decompress_gzip(body)?;
    serde_json::from_slice(&raw).ok()
}

/// Gunzips a request body as received by the mock collector.
pub fn decompress_gzip(body: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(body);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).ok()?;
    Some(decompressed)
}

pub fn return_value(value: &Value) -> String {
    serde_json::json!({ "return_value": value }).to_string()
}
