// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery channel to the trace edge intake.
//!
//! [`TraceEdgeClient`] sends opaque payload bytes to the trace and stats
//! endpoints with a bounded synchronous retry policy. Outcome
//! classification: transport errors and 5xx responses are retriable, 2xx is
//! success, everything else is fatal and returns immediately. The per-call
//! timeout and the inter-retry delay are process-wide constants; a
//! short-lived invocation gains nothing from exotic backoff curves.
//!
//! Retries may cause duplicate delivery of the same trace identity: the
//! channel does not dedupe and neither does the intake. Favoring delivery
//! over exactness is an accepted, caller-visible trade-off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::codec;
use crate::config::ForwarderConfig;
use crate::error::ForwardError;
use crate::payload::TracePayload;
use crate::stats::StatsPayload;

/// Per-attempt request timeout.
pub const TRACE_EDGE_TIMEOUT: Duration = Duration::from_secs(5);
/// Fixed delay between retry attempts.
pub const TRACE_EDGE_RETRY_INTERVAL: Duration = Duration::from_secs(1);

const TRACES_ENDPOINT: &str = "/api/v0.2/traces";
const STATS_ENDPOINT: &str = "/api/v0.2/stats";

const USER_AGENT: &str = concat!("datadog-trace-forwarder/", env!("CARGO_PKG_VERSION"));

/// Errors raised while delivering a payload.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A trace payload with zero traces was handed to delivery. Caller-logic
    /// error, rejected before any network I/O.
    #[error("no traces in payload")]
    EmptyTracePayload,

    /// Connection, DNS, TLS, or timeout failure before an HTTP status was
    /// obtained.
    #[error("transport error sending to {url}: {message}")]
    Transport { url: String, message: String },

    /// The intake answered with a non-2xx status.
    #[error("request to {url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// The retry budget was spent; wraps the last underlying cause.
    #[error("failed to deliver payload to {url} after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DeliveryError::Transport { .. } => true,
            DeliveryError::Status { status, .. } => (500..600).contains(status),
            DeliveryError::EmptyTracePayload | DeliveryError::RetriesExhausted { .. } => false,
        }
    }
}

/// An opaque byte buffer ready for transmission. Immutable once constructed.
#[derive(Clone, Debug)]
pub struct DeliveryPayload {
    pub created_at: SystemTime,
    pub bytes: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub url: String,
}

impl DeliveryPayload {
    pub fn new(bytes: Vec<u8>, headers: HashMap<String, String>, url: String) -> Self {
        DeliveryPayload {
            created_at: SystemTime::now(),
            bytes,
            headers,
            url,
        }
    }
}

/// Transport seam: one POST of a payload, returning the HTTP status code or
/// a transport-level error. Implementations must be safe for concurrent
/// reuse; the production implementation holds a keep-alive connection pool.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, payload: &DeliveryPayload) -> Result<u16, DeliveryError>;
}

/// Production transport backed by a reusable `reqwest` client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds the client with the fixed per-call timeout. The certificate
    /// verification toggle exists for controlled test and debug
    /// environments; production use always verifies.
    pub fn new(accept_invalid_certs: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(TRACE_EDGE_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(ReqwestTransport { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, payload: &DeliveryPayload) -> Result<u16, DeliveryError> {
        let mut request = self.client.post(&payload.url);
        for (name, value) in &payload.headers {
            request = request.header(name, value);
        }
        let response = request
            .body(payload.bytes.clone())
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                url: payload.url.clone(),
                message: e.to_string(),
            })?;
        Ok(response.status().as_u16())
    }
}

/// Client for the trace edge intake: one endpoint for trace payload bytes,
/// one for statistics payload bytes, both authenticated with the same API
/// key header.
pub struct TraceEdgeClient {
    trace_url: String,
    stats_url: String,
    api_key: String,
    retry_client_errors: bool,
    transport: Arc<dyn Transport>,
}

impl TraceEdgeClient {
    pub fn new(config: &ForwarderConfig) -> Result<Self, ForwardError> {
        let transport = ReqwestTransport::new(config.accept_invalid_certs)
            .map_err(|e| ForwardError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Builds a client over a caller-supplied transport. Used by tests and
    /// by hosts that bring their own connection pool.
    pub fn with_transport(config: &ForwarderConfig, transport: Arc<dyn Transport>) -> Self {
        TraceEdgeClient {
            trace_url: format!("{}{}", config.root_url, TRACES_ENDPOINT),
            stats_url: format!("{}{}", config.root_url, STATS_ENDPOINT),
            api_key: config.api_key.clone(),
            retry_client_errors: config.retry_client_errors,
            transport,
        }
    }

    /// Serializes and sends a trace payload.
    ///
    /// A payload with zero traces is rejected before any network call.
    pub async fn send_traces(
        &self,
        payload: &TracePayload,
        max_retries: u32,
    ) -> Result<(), ForwardError> {
        if payload.traces.is_empty() {
            return Err(DeliveryError::EmptyTracePayload.into());
        }
        let bytes = codec::encode_trace_payload(payload)?;
        debug!(
            traces = payload.traces.len(),
            spans = payload.span_count(),
            env = %payload.env,
            "sending trace payload"
        );

        let headers = HashMap::from([
            ("Content-Type".to_string(), "application/msgpack".to_string()),
            ("Content-Encoding".to_string(), "identity".to_string()),
        ]);
        let delivery = DeliveryPayload::new(bytes, headers, self.trace_url.clone());
        self.send_payload(delivery, max_retries).await?;
        Ok(())
    }

    /// Serializes and sends a stats payload. Stats payloads are not gated on
    /// content: an empty bucket set is still a valid artifact.
    pub async fn send_stats(
        &self,
        payload: &StatsPayload,
        max_retries: u32,
    ) -> Result<(), ForwardError> {
        let bytes = codec::encode_stats_payload(payload)?;
        debug!(buckets = payload.stats.len(), env = %payload.env, "sending stats payload");

        let headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Content-Encoding".to_string(), "gzip".to_string()),
        ]);
        let delivery = DeliveryPayload::new(bytes, headers, self.stats_url.clone());
        self.send_payload(delivery, max_retries).await?;
        Ok(())
    }

    /// Sends a pre-built payload under the retry policy. The client's
    /// credential and user-agent headers are applied first, the payload's
    /// own headers last so callers can override defaults.
    pub async fn send_payload(
        &self,
        payload: DeliveryPayload,
        max_retries: u32,
    ) -> Result<(), DeliveryError> {
        let payload = self.with_default_headers(payload);
        let max_attempts = max_retries.max(1);
        let mut last_error: Option<DeliveryError> = None;

        for attempt in 1..=max_attempts {
            match self.attempt(&payload).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    error!(url = %payload.url, attempt, "delivery attempt failed: {err}");
                    if !err.is_retriable() && !self.retry_client_errors {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(TRACE_EDGE_RETRY_INTERVAL).await;
            }
        }

        // last_error is always set when the loop ends without success.
        let source = last_error.unwrap_or(DeliveryError::Transport {
            url: payload.url.clone(),
            message: "no attempts were made".to_string(),
        });
        Err(DeliveryError::RetriesExhausted {
            url: payload.url,
            attempts: max_attempts,
            source: Box::new(source),
        })
    }

    async fn attempt(&self, payload: &DeliveryPayload) -> Result<(), DeliveryError> {
        let status = self.transport.post(payload).await?;
        if (200..300).contains(&status) {
            return Ok(());
        }
        Err(DeliveryError::Status {
            url: payload.url.clone(),
            status,
        })
    }

    fn with_default_headers(&self, payload: DeliveryPayload) -> DeliveryPayload {
        let mut headers = HashMap::from([
            ("DD-Api-Key".to_string(), self.api_key.clone()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ]);
        headers.extend(payload.headers);
        DeliveryPayload { headers, ..payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::payload::{Span, Trace};

    /// Scripted transport double: pops one outcome per attempt and records
    /// every payload it sees. Once the script runs out it either repeats
    /// `default_status` or fails the test.
    struct MockTransport {
        outcomes: Mutex<VecDeque<Result<u16, String>>>,
        default_status: Option<u16>,
        requests: Mutex<Vec<DeliveryPayload>>,
    }

    impl MockTransport {
        fn scripted(outcomes: Vec<Result<u16, String>>) -> Arc<Self> {
            Arc::new(MockTransport {
                outcomes: Mutex::new(outcomes.into()),
                default_status: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn always(status: u16) -> Arc<Self> {
            Arc::new(MockTransport {
                outcomes: Mutex::new(VecDeque::new()),
                default_status: Some(status),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> DeliveryPayload {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(&self, payload: &DeliveryPayload) -> Result<u16, DeliveryError> {
            self.requests.lock().unwrap().push(payload.clone());
            let next = self.outcomes.lock().unwrap().pop_front();
            match next {
                Some(Ok(status)) => Ok(status),
                Some(Err(message)) => Err(DeliveryError::Transport {
                    url: payload.url.clone(),
                    message,
                }),
                None => match self.default_status {
                    Some(status) => Ok(status),
                    None => panic!("transport invoked more times than scripted"),
                },
            }
        }
    }

    fn config() -> ForwarderConfig {
        ForwarderConfig::new("https://trace.agent.datadoghq.com", "test-key")
    }

    fn trace_payload() -> TracePayload {
        TracePayload {
            host_name: "host".to_string(),
            env: "prod".to_string(),
            traces: vec![Trace {
                trace_id: 1,
                spans: vec![Span {
                    trace_id: 1,
                    span_id: 1,
                    service: "svc".to_string(),
                    name: "op".to_string(),
                    resource: "res".to_string(),
                    start: 0,
                    duration: 1,
                    ..Span::default()
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_empty_trace_payload_rejected_before_any_network_call() {
        let transport = MockTransport::scripted(Vec::new());
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let err = client
            .send_traces(&TracePayload::new("host", "prod"), 3)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ForwardError::Delivery(DeliveryError::EmptyTracePayload)
        ));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let transport = MockTransport::scripted(vec![
            Err("connection refused".to_string()),
            Err("connection refused".to_string()),
            Ok(200),
        ]);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let started = tokio::time::Instant::now();
        client.send_traces(&trace_payload(), 5).await.unwrap();

        assert_eq!(transport.attempts(), 3);
        // Two inter-retry delays for three attempts.
        assert_eq!(started.elapsed(), TRACE_EDGE_RETRY_INTERVAL * 2);

        // Retried attempts carry the credential and user-agent too.
        for index in 0..3 {
            let request = transport.request(index);
            assert_eq!(request.headers["DD-Api-Key"], "test-key");
            assert!(request.headers["User-Agent"].starts_with("datadog-trace-forwarder/"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_on_server_errors() {
        let transport = MockTransport::always(503);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let err = client.send_traces(&trace_payload(), 3).await.unwrap_err();

        assert_eq!(transport.attempts(), 3);
        let text = err.to_string();
        assert!(text.contains("after 3 attempt(s)"), "{text}");
        assert!(text.contains("503"), "{text}");
    }

    #[tokio::test]
    async fn test_client_error_short_circuits_retries() {
        let transport = MockTransport::scripted(vec![Ok(400)]);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let err = client.send_traces(&trace_payload(), 3).await.unwrap_err();

        assert_eq!(transport.attempts(), 1);
        assert!(matches!(
            err,
            ForwardError::Delivery(DeliveryError::Status { status: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_mode_retries_client_errors() {
        let transport = MockTransport::always(400);
        let mut cfg = config();
        cfg.retry_client_errors = true;
        let client = TraceEdgeClient::with_transport(&cfg, transport.clone());

        let err = client.send_traces(&trace_payload(), 2).await.unwrap_err();

        assert_eq!(transport.attempts(), 2);
        assert!(matches!(
            err,
            ForwardError::Delivery(DeliveryError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_trace_headers() {
        let transport = MockTransport::scripted(vec![Ok(200)]);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        client.send_traces(&trace_payload(), 1).await.unwrap();

        let request = transport.request(0);
        assert_eq!(
            request.url,
            "https://trace.agent.datadoghq.com/api/v0.2/traces"
        );
        assert_eq!(request.headers["DD-Api-Key"], "test-key");
        assert!(request.headers["User-Agent"].starts_with("datadog-trace-forwarder/"));
        assert_eq!(request.headers["Content-Type"], "application/msgpack");
        assert_eq!(request.headers["Content-Encoding"], "identity");
    }

    #[tokio::test]
    async fn test_stats_payload_exempt_from_empty_check() {
        let transport = MockTransport::scripted(vec![Ok(200)]);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let stats = StatsPayload {
            host_name: "host".to_string(),
            env: "prod".to_string(),
            stats: Vec::new(),
        };
        client.send_stats(&stats, 1).await.unwrap();

        let request = transport.request(0);
        assert_eq!(
            request.url,
            "https://trace.agent.datadoghq.com/api/v0.2/stats"
        );
        assert_eq!(request.headers["Content-Type"], "application/json");
        assert_eq!(request.headers["Content-Encoding"], "gzip");
    }

    #[tokio::test]
    async fn test_payload_headers_override_defaults() {
        let transport = MockTransport::scripted(vec![Ok(200)]);
        let client = TraceEdgeClient::with_transport(&config(), transport.clone());

        let headers = HashMap::from([("User-Agent".to_string(), "custom-agent".to_string())]);
        let payload = DeliveryPayload::new(
            Vec::new(),
            headers,
            "https://trace.agent.datadoghq.com/api/v0.2/traces".to_string(),
        );
        client.send_payload(payload, 1).await.unwrap();

        let request = transport.request(0);
        assert_eq!(request.headers["User-Agent"], "custom-agent");
        assert_eq!(request.headers["DD-Api-Key"], "test-key");
    }

    #[tokio::test]
    async fn test_reqwest_transport_posts_to_intake() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v0.2/traces")
            .match_header("dd-api-key", "test-key")
            .match_header("content-type", "application/msgpack")
            .with_status(200)
            .create_async()
            .await;

        let mut cfg = config();
        cfg.root_url = server.url();
        let transport = ReqwestTransport::new(false).unwrap();
        let client = TraceEdgeClient::with_transport(&cfg, Arc::new(transport));

        client.send_traces(&trace_payload(), 1).await.unwrap();
        mock.assert_async().await;
    }
}
