// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span selection and sublayer computation.
//!
//! Stats computation does not decide which spans are statistically relevant;
//! it delegates that to a [`SpanAnalyzer`]. The default implementation
//! selects top-level spans (no same-service parent) and attributes each
//! trace's duration to the services in its causal chain by exclusive time.

use std::collections::HashMap;

use serde::Serialize;

use crate::payload::{Span, Trace};

/// Metric name for per-service sublayer durations.
pub const SUBLAYER_DURATION_BY_SERVICE: &str = "_sublayers.duration.by_service";
/// Metric name for the per-trace span count.
pub const SUBLAYER_SPAN_COUNT: &str = "_sublayers.span_count";

/// One sublayer measure for a trace: a metric, an optional dimension tag, and
/// the measured value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SublayerValue {
    pub metric: String,
    pub tag_name: String,
    pub tag_value: String,
    pub value: f64,
}

/// External capability deciding which spans feed statistics and how a
/// trace's cost breaks down per service.
pub trait SpanAnalyzer: Send + Sync {
    /// Returns the subset of the trace's spans worth statistics.
    fn analyzed_spans<'a>(&self, trace: &'a Trace) -> Vec<&'a Span>;

    /// Returns the trace's sublayer cost breakdown.
    fn sublayers(&self, trace: &Trace) -> Vec<SublayerValue>;
}

/// Default analyzer: selects top-level spans and computes exclusive
/// per-service durations.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopLevelAnalyzer;

impl TopLevelAnalyzer {
    fn is_top_level(span: &Span, by_id: &HashMap<u64, &Span>) -> bool {
        if span.top_level || span.parent_id == 0 {
            return true;
        }
        // A span whose parent lives in another payload chunk is still an
        // entry point from this trace's point of view.
        match by_id.get(&span.parent_id) {
            Some(parent) => parent.service != span.service,
            None => true,
        }
    }
}

impl SpanAnalyzer for TopLevelAnalyzer {
    fn analyzed_spans<'a>(&self, trace: &'a Trace) -> Vec<&'a Span> {
        let by_id: HashMap<u64, &Span> = trace.spans.iter().map(|s| (s.span_id, s)).collect();
        trace
            .spans
            .iter()
            .filter(|s| Self::is_top_level(s, &by_id))
            .collect()
    }

    fn sublayers(&self, trace: &Trace) -> Vec<SublayerValue> {
        if trace.spans.is_empty() {
            return Vec::new();
        }

        // Exclusive duration of a span is its duration minus the time spent
        // in its direct children, floored at zero for overlapping children.
        let mut children_duration: HashMap<u64, i64> = HashMap::new();
        for span in &trace.spans {
            *children_duration.entry(span.parent_id).or_insert(0) += span.duration;
        }

        let mut duration_by_service: HashMap<&str, i64> = HashMap::new();
        for span in &trace.spans {
            let child_time = children_duration.get(&span.span_id).copied().unwrap_or(0);
            let exclusive = (span.duration - child_time).max(0);
            *duration_by_service.entry(span.service.as_str()).or_insert(0) += exclusive;
        }

        let mut values: Vec<SublayerValue> = duration_by_service
            .into_iter()
            .map(|(service, duration)| SublayerValue {
                metric: SUBLAYER_DURATION_BY_SERVICE.to_string(),
                tag_name: "sublayer_service".to_string(),
                tag_value: service.to_string(),
                value: duration as f64,
            })
            .collect();
        values.sort_by(|a, b| a.tag_value.cmp(&b.tag_value));

        values.push(SublayerValue {
            metric: SUBLAYER_SPAN_COUNT.to_string(),
            tag_name: String::new(),
            tag_value: String::new(),
            value: trace.spans.len() as f64,
        });
        values
    }
}
