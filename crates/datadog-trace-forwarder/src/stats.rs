// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time-bucketed span statistics.
//!
//! Analyzed spans are folded into fixed 10-second buckets keyed by the
//! bucket's start timestamp. A span is assigned to a bucket by its *end*
//! timestamp: completion-time bucketing groups a span with others that
//! finished around the same wall-clock moment, independent of how long it
//! ran. Buckets are mutated incrementally during the fold and exported
//! exactly once into an immutable [`StatsPayload`].

use std::collections::HashMap;

use serde::Serialize;

use crate::analysis::{SpanAnalyzer, SublayerValue};
use crate::payload::{Span, TracePayload};

/// Width of a stats bucket in nanoseconds (10 seconds).
pub const BUCKET_DURATION_NS: i64 = 10_000_000_000;

/// A span annotated with its statistical weight.
///
/// Weight is fixed at 1: incoming sampling is non-uniform and its rate is
/// unknown, and for the low-volume workloads this targets sampling is
/// effectively 100%, so uniform weighting avoids fabricating confidence in a
/// rate that cannot be measured. `top_level` is forced true because only
/// top-level spans reach the aggregation step.
#[derive(Clone, Copy, Debug)]
pub struct WeightedSpan<'a> {
    pub span: &'a Span,
    pub weight: f64,
    pub top_level: bool,
}

/// Dimensions a bucket aggregates over.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GroupKey {
    env: String,
    service: String,
    name: String,
    resource: String,
}

/// Running measures for one group within a bucket.
#[derive(Clone, Debug, Default, PartialEq)]
struct GroupedStats {
    hits: f64,
    errors: f64,
    duration: f64,
    top_level_hits: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SublayerKey {
    metric: String,
    tag_name: String,
    tag_value: String,
}

/// Mutable aggregation unit for one 10-second window.
///
/// Created lazily on the first span whose end falls into the window; never
/// merged or split within an aggregation pass.
#[derive(Debug)]
pub struct StatsBucket {
    start: i64,
    duration: i64,
    counts: HashMap<GroupKey, GroupedStats>,
    sublayers: HashMap<SublayerKey, f64>,
}

impl StatsBucket {
    pub fn new(start: i64, duration: i64) -> Self {
        StatsBucket {
            start,
            duration,
            counts: HashMap::new(),
            sublayers: HashMap::new(),
        }
    }

    /// Accumulates one weighted span, tagged with its payload's environment,
    /// together with its trace's sublayer breakdown.
    pub fn handle_span(&mut self, weighted: &WeightedSpan<'_>, env: &str, sublayers: &[SublayerValue]) {
        let span = weighted.span;
        let key = GroupKey {
            env: env.to_string(),
            service: span.service.clone(),
            name: span.name.clone(),
            resource: span.resource.clone(),
        };
        let entry = self.counts.entry(key).or_default();
        entry.hits += weighted.weight;
        if span.error != 0 {
            entry.errors += weighted.weight;
        }
        entry.duration += span.duration as f64 * weighted.weight;
        if weighted.top_level {
            entry.top_level_hits += weighted.weight;

            for sublayer in sublayers {
                let key = SublayerKey {
                    metric: sublayer.metric.clone(),
                    tag_name: sublayer.tag_name.clone(),
                    tag_value: sublayer.tag_value.clone(),
                };
                *self.sublayers.entry(key).or_insert(0.0) += sublayer.value * weighted.weight;
            }
        }
    }

    /// Finalizes the bucket into its immutable exported form. Entries are
    /// sorted so the output is deterministic.
    pub fn export(self) -> Bucket {
        let mut counts: Vec<CountEntry> = self
            .counts
            .into_iter()
            .map(|(key, stats)| CountEntry {
                env: key.env,
                service: key.service,
                name: key.name,
                resource: key.resource,
                hits: stats.hits,
                errors: stats.errors,
                duration: stats.duration,
                top_level_hits: stats.top_level_hits,
            })
            .collect();
        counts.sort_by(|a, b| {
            (&a.env, &a.service, &a.name, &a.resource).cmp(&(&b.env, &b.service, &b.name, &b.resource))
        });

        let mut sublayers: Vec<SublayerEntry> = self
            .sublayers
            .into_iter()
            .map(|(key, value)| SublayerEntry {
                metric: key.metric,
                tag_name: key.tag_name,
                tag_value: key.tag_value,
                value,
            })
            .collect();
        sublayers.sort_by(|a, b| {
            (&a.metric, &a.tag_name, &a.tag_value).cmp(&(&b.metric, &b.tag_name, &b.tag_value))
        });

        Bucket {
            start: self.start,
            duration: self.duration,
            counts,
            sublayers,
        }
    }
}

/// Exported measures for one (env, service, name, resource) group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountEntry {
    pub env: String,
    pub service: String,
    pub name: String,
    pub resource: String,
    pub hits: f64,
    pub errors: f64,
    pub duration: f64,
    pub top_level_hits: f64,
}

/// Exported sublayer measure accumulated over a bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SublayerEntry {
    pub metric: String,
    pub tag_name: String,
    pub tag_value: String,
    pub value: f64,
}

/// Finalized form of a [`StatsBucket`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bucket {
    pub start: i64,
    pub duration: i64,
    pub counts: Vec<CountEntry>,
    pub sublayers: Vec<SublayerEntry>,
}

/// The finalized stats artifact for one trace payload, the unit handed to
/// delivery. Bucket order is not significant.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatsPayload {
    pub host_name: String,
    pub env: String,
    pub stats: Vec<Bucket>,
}

/// Computes the stats payload for a trace payload.
///
/// Each analyzed span lands in exactly one bucket, keyed by
/// `span_end - span_end % BUCKET_DURATION_NS` (truncating integer division;
/// timestamps are non-negative). A payload with zero traces yields a payload
/// with zero buckets.
pub fn compute_stats(payload: &TracePayload, analyzer: &dyn SpanAnalyzer) -> StatsPayload {
    let mut raw_buckets: HashMap<i64, StatsBucket> = HashMap::new();

    for trace in &payload.traces {
        let spans = analyzer.analyzed_spans(trace);
        let sublayers = analyzer.sublayers(trace);

        for span in spans {
            let span_end = span.end();
            let bucket_start = span_end - span_end % BUCKET_DURATION_NS;
            let bucket = raw_buckets
                .entry(bucket_start)
                .or_insert_with(|| StatsBucket::new(bucket_start, BUCKET_DURATION_NS));

            let weighted = WeightedSpan {
                span,
                weight: 1.0,
                top_level: true,
            };
            bucket.handle_span(&weighted, &payload.env, &sublayers);
        }
    }

    StatsPayload {
        host_name: payload.host_name.clone(),
        env: payload.env.clone(),
        stats: raw_buckets.into_values().map(StatsBucket::export).collect(),
    }
}
