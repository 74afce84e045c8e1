// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for forwarder integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use datadog_trace_forwarder::edge::{DeliveryError, DeliveryPayload, Transport};
use datadog_trace_forwarder::{Span, TracePayload};

/// Transport double that records every payload it receives and answers with
/// a configurable status per endpoint path (200 by default).
pub struct RecordingTransport {
    statuses: Mutex<HashMap<String, u16>>,
    requests: Mutex<Vec<DeliveryPayload>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingTransport {
            statuses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers requests whose URL ends with `path_suffix` with `status`.
    pub fn respond_with(&self, path_suffix: &str, status: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(path_suffix.to_string(), status);
    }

    pub fn requests(&self) -> Vec<DeliveryPayload> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path_suffix: &str) -> Vec<DeliveryPayload> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(path_suffix))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, payload: &DeliveryPayload) -> Result<u16, DeliveryError> {
        self.requests.lock().unwrap().push(payload.clone());
        let statuses = self.statuses.lock().unwrap();
        let status = statuses
            .iter()
            .find(|(suffix, _)| payload.url.ends_with(suffix.as_str()))
            .map(|(_, status)| *status)
            .unwrap_or(200);
        Ok(status)
    }
}

pub fn span(trace_id: u64, span_id: u64, parent_id: u64, start: i64, duration: i64) -> Span {
    Span {
        trace_id,
        span_id,
        parent_id,
        service: "aws-lambda".to_string(),
        name: "invoke".to_string(),
        resource: "handler".to_string(),
        start,
        duration,
        ..Span::default()
    }
}

pub fn payload_with_spans(env: &str, spans: Vec<Span>) -> TracePayload {
    TracePayload::from_spans(spans, "test-host", env)
}
