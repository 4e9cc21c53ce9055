// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport for collector commands.
//!
//! Every command is a single POST to `/agent_listener/invoke_raw_method`
//! with the method, license key, protocol version and run id carried in the
//! query string and a gzip-compressed JSON body.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE,
    USER_AGENT,
};
use reqwest::{Client, Url};
use tracing::{debug, enabled, trace, Level};

use crate::collector::command::OutboundCommand;
use crate::collector::compress::{CompressorPool, DEFAULT_POOL_SIZE};
use crate::collector::error::CollectorError;
use crate::collector::outcome::Outcome;

const INVOKE_PATH: &str = "/agent_listener/invoke_raw_method";
const MARSHAL_FORMAT: &str = "json";
const REDACTED: &str = "<redacted>";

/// Anything able to deliver an [`OutboundCommand`] to the collector.
///
/// Returns the raw response body on [`Outcome::Success`] and an error
/// classifying the failure otherwise. Implemented by [`CollectorClient`] and
/// by test doubles.
#[async_trait]
pub trait CollectorTransport: Send + Sync {
    async fn invoke(&self, command: OutboundCommand) -> Result<Vec<u8>, CollectorError>;
}

/// Options governing how the HTTP client is constructed.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Use `http://` instead of `https://`. Only meant for local test
    /// collectors.
    pub allow_plaintext: bool,
    /// Deadline for a whole request, connect to last body byte.
    pub timeout: Duration,
    /// Proxy URL for collector traffic.
    pub https_proxy: Option<String>,
    /// Maximum number of concurrent compressions.
    pub compressor_pool_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            allow_plaintext: false,
            timeout: Duration::from_secs(20),
            https_proxy: None,
            compressor_pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Production [`CollectorTransport`] backed by a shared `reqwest::Client`.
pub struct CollectorClient {
    http: Client,
    license_key: String,
    scheme: &'static str,
    user_agent: HeaderValue,
    compressors: CompressorPool,
}

impl CollectorClient {
    pub fn new(
        license_key: impl Into<String>,
        options: &TransportOptions,
    ) -> Result<Self, CollectorError> {
        let http = build_http_client(options)?;
        let user_agent = HeaderValue::from_str(&crate::user_agent())
            .map_err(|e| CollectorError::ClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            license_key: license_key.into(),
            scheme: if options.allow_plaintext {
                "http"
            } else {
                "https"
            },
            user_agent,
            compressors: CompressorPool::new(options.compressor_pool_size, Compression::default()),
        })
    }

    /// Builds the invoke URL for `command`. Exposed for diagnostics; the
    /// license key appears in clear in the returned URL.
    pub fn invoke_url(&self, command: &OutboundCommand) -> Result<Url, CollectorError> {
        let mut url = Url::parse(&format!(
            "{}://{}{INVOKE_PATH}",
            self.scheme, command.collector_host
        ))
        .map_err(|_| CollectorError::InvalidUrl(command.collector_host.clone()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("license_key", &self.license_key)
                .append_pair("marshal_format", MARSHAL_FORMAT)
                .append_pair("method", command.command.as_str())
                .append_pair("protocol_version", &crate::PROTOCOL_VERSION.to_string());
            if let Some(run_id) = &command.run_id {
                query.append_pair("run_id", run_id.as_str());
            }
        }
        Ok(url)
    }

    fn request_headers(&self, command: &OutboundCommand) -> Result<HeaderMap, CollectorError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &command.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CollectorError::InvalidHeader(name.clone()))?;
            if is_required_header(&name) {
                continue;
            }
            let value = HeaderValue::from_str(value)
                .map_err(|_| CollectorError::InvalidHeader(name.to_string()))?;
            headers.insert(name, value);
        }
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity, deflate"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        Ok(headers)
    }
}

#[async_trait]
impl CollectorTransport for CollectorClient {
    async fn invoke(&self, command: OutboundCommand) -> Result<Vec<u8>, CollectorError> {
        let size = command.payload.len();
        if size > command.max_payload_size {
            debug!(
                method = %command.command,
                size,
                max = command.max_payload_size,
                "payload exceeds maximum size, not sending"
            );
            return Err(CollectorError::PayloadTooLarge {
                size,
                max: command.max_payload_size,
            });
        }

        let url = self.invoke_url(&command)?;
        let headers = self.request_headers(&command)?;
        let body = self
            .compressors
            .compress(&command.payload)
            .await
            .map_err(CollectorError::Compression)?;

        if enabled!(Level::TRACE) {
            trace!(
                method = %command.command,
                url = %redact_url(&url),
                headers = ?redact_headers(&headers),
                body = %payload_preview(&command.payload),
                "collector request"
            );
        } else {
            debug!(
                method = %command.command,
                host = %command.collector_host,
                uncompressed_len = size,
                compressed_len = body.len(),
                "collector request"
            );
        }

        let response = self.http.post(url).headers(headers).body(body).send().await?;
        let status = response.status();

        if Outcome::from_status(i64::from(status.as_u16())).is_success() {
            let bytes = response.bytes().await?;
            debug!(
                method = %command.command,
                status = %status,
                body_len = bytes.len(),
                "collector response"
            );
            return Ok(bytes.to_vec());
        }

        let bytes = response.bytes().await.unwrap_or_default();
        let body = truncate_preview_text(String::from_utf8_lossy(&bytes));
        debug!(
            method = %command.command,
            status = %status,
            body = %body,
            "collector rejected request"
        );
        Err(CollectorError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

fn build_http_client(options: &TransportOptions) -> Result<Client, CollectorError> {
    let mut builder = Client::builder()
        .timeout(options.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(90)));
    if let Some(proxy) = &options.https_proxy {
        let proxy = reqwest::Proxy::https(proxy)
            .map_err(|e| CollectorError::ClientBuild(format!("invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| CollectorError::ClientBuild(e.to_string()))
}

fn is_required_header(name: &HeaderName) -> bool {
    name == ACCEPT_ENCODING
        || name == CONTENT_TYPE
        || name == USER_AGENT
        || name == CONTENT_ENCODING
}

/// Returns the invoke URL with the license key masked, for logging.
fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if key == "license_key" {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Returns a redacted view of request headers suitable for trace logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "x-license-key", "proxy-authorization"];

    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_string()
            } else {
                value
                    .to_str()
                    .map(ToString::to_string)
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (name, display)
        })
        .collect()
}

fn payload_preview(payload: &[u8]) -> String {
    truncate_preview_text(String::from_utf8_lossy(payload))
}

fn truncate_preview_text(text: Cow<'_, str>) -> String {
    const MAX_CHARS: usize = 1024;
    let mut chars = text.chars();
    let mut preview: String = chars.by_ref().take(MAX_CHARS).collect();
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::command::{Command, RunId};
    use std::collections::HashMap;
    use tracing_test::traced_test;

    fn client() -> CollectorClient {
        CollectorClient::new(
            "secret-key",
            &TransportOptions {
                allow_plaintext: true,
                ..TransportOptions::default()
            },
        )
        .unwrap()
    }

    fn command(headers: &[(&str, &str)]) -> OutboundCommand {
        OutboundCommand {
            command: Command::MetricData,
            collector_host: "localhost:8080".to_string(),
            run_id: RunId::new("run-7"),
            payload: b"[]".to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<HashMap<_, _>>(),
            max_payload_size: 10,
        }
    }

    #[test]
    fn invoke_url_carries_protocol_parameters() {
        let url = client().invoke_url(&command(&[])).unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), INVOKE_PATH);
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["license_key"], "secret-key");
        assert_eq!(query["marshal_format"], "json");
        assert_eq!(query["method"], "metric_data");
        assert_eq!(query["protocol_version"], "17");
        assert_eq!(query["run_id"], "run-7");
    }

    #[test]
    fn pre_session_url_has_no_run_id() {
        let command = OutboundCommand::pre_session(Command::Preconnect, "localhost", Vec::new());
        let url = client().invoke_url(&command).unwrap();
        assert!(url.query_pairs().all(|(key, _)| key != "run_id"));
    }

    #[test]
    fn https_is_used_by_default() {
        let client = CollectorClient::new("k", &TransportOptions::default()).unwrap();
        let url = client.invoke_url(&command(&[])).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn redacted_url_hides_license_key() {
        let url = client().invoke_url(&command(&[])).unwrap();
        let redacted = redact_url(&url);
        assert!(!redacted.contains("secret-key"));
        assert!(redacted.contains("license_key=%3Credacted%3E"));
        assert!(redacted.contains("method=metric_data"));
    }

    #[test]
    fn caller_headers_never_override_protocol_headers() {
        let headers = client()
            .request_headers(&command(&[
                ("Content-Encoding", "identity"),
                ("user-agent", "spoofed"),
                ("X-Request-Metadata", "abc"),
            ]))
            .unwrap();
        assert_eq!(headers[CONTENT_ENCODING], "gzip");
        assert_eq!(headers[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(headers[ACCEPT_ENCODING], "identity, deflate");
        assert_eq!(headers[USER_AGENT], crate::user_agent().as_str());
        assert_eq!(headers["x-request-metadata"], "abc");
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let err = client()
            .request_headers(&command(&[("bad header", "x")]))
            .unwrap_err();
        assert!(matches!(err, CollectorError::InvalidHeader(_)));
        assert_eq!(err.outcome(), Outcome::Dropped);
    }

    #[tokio::test]
    #[traced_test]
    async fn oversized_payload_is_rejected_before_sending() {
        let mut command = command(&[]);
        command.payload = vec![b'x'; 11];
        let err = client().invoke(command).await.unwrap_err();
        assert!(matches!(
            err,
            CollectorError::PayloadTooLarge { size: 11, max: 10 }
        ));
        assert!(logs_contain("payload exceeds maximum size"));
        assert!(!logs_contain("collector request"));
    }

    #[test]
    fn long_previews_are_truncated() {
        let preview = truncate_preview_text(Cow::Owned("a".repeat(2000)));
        assert_eq!(preview.chars().count(), 1025);
        assert!(preview.ends_with('…'));
    }
}
