// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace data model and environment grouping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single timed unit of work within a trace.
///
/// Timestamps and durations are nanoseconds. `top_level` marks spans that are
/// an entry point into a service, i.e. spans with no same-service parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: u64,
    pub span_id: u64,
    #[serde(default)]
    pub parent_id: u64,
    pub service: String,
    pub name: String,
    pub resource: String,
    #[serde(rename = "type", default)]
    pub span_type: String,
    pub start: i64,
    pub duration: i64,
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub top_level: bool,
}

impl Span {
    /// End timestamp of the span in nanoseconds.
    pub fn end(&self) -> i64 {
        self.start + self.duration
    }
}

/// An ordered set of spans sharing a trace identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: u64,
    pub spans: Vec<Span>,
}

/// Traces grouped under one host identity and one environment identity.
///
/// Created by parsing, merged by [`aggregate_payloads_by_env`], consumed by
/// stats computation and delivery, then discarded. The payload trusts
/// upstream to only put env-consistent traces inside; it does not
/// re-validate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TracePayload {
    pub host_name: String,
    pub env: String,
    pub traces: Vec<Trace>,
}

impl TracePayload {
    pub fn new(host_name: impl Into<String>, env: impl Into<String>) -> Self {
        TracePayload {
            host_name: host_name.into(),
            env: env.into(),
            traces: Vec::new(),
        }
    }

    /// Builds a payload from a flat span list, grouping spans into traces by
    /// trace id in first-seen order.
    pub fn from_spans(
        spans: Vec<Span>,
        host_name: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        let mut payload = TracePayload::new(host_name, env);
        for span in spans {
            match payload
                .traces
                .iter_mut()
                .find(|t| t.trace_id == span.trace_id)
            {
                Some(trace) => trace.spans.push(span),
                None => payload.traces.push(Trace {
                    trace_id: span.trace_id,
                    spans: vec![span],
                }),
            }
        }
        payload
    }

    /// Total number of spans across all traces.
    pub fn span_count(&self) -> usize {
        self.traces.iter().map(|t| t.spans.len()).sum()
    }
}

/// Merges payloads sharing an environment identity into one payload per
/// distinct environment.
///
/// Output groups appear in first-seen order and each group's traces are the
/// concatenation of its inputs' traces in their original relative order. The
/// merged host name is taken from the first payload contributing to the
/// group; callers are responsible for only grouping payloads that
/// legitimately share a host. Total over any input: an empty input yields an
/// empty output and a single payload passes through unchanged.
pub fn aggregate_payloads_by_env(payloads: Vec<TracePayload>) -> Vec<TracePayload> {
    let mut grouped: Vec<TracePayload> = Vec::new();
    for payload in payloads {
        match grouped.iter_mut().find(|g| g.env == payload.env) {
            Some(group) => group.traces.extend(payload.traces),
            None => grouped.push(payload),
        }
    }
    grouped
}
