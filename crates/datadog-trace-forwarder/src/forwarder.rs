// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding orchestration.
//!
//! One call to [`TraceForwarder::forward`] runs the full pipeline:
//! obfuscate every span, merge payloads by environment, then for each merged
//! payload send the traces and send the derived statistics. Both artifacts
//! are attempted for every group; a stats failure never suppresses the fact
//! that trace delivery already succeeded (or vice versa), and all failures
//! are reported together.

use std::sync::Arc;

use tracing::{debug, error};

use crate::analysis::{SpanAnalyzer, TopLevelAnalyzer};
use crate::config::ForwarderConfig;
use crate::edge::{TraceEdgeClient, Transport};
use crate::error::ForwardError;
use crate::obfuscate::{Obfuscator, TagObfuscator};
use crate::payload::{aggregate_payloads_by_env, TracePayload};
use crate::stats::compute_stats;

/// Outcome of one forwarding invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardSummary {
    /// Distinct environment groups that had their traces delivered.
    pub groups_forwarded: usize,
    /// Total traces delivered across groups.
    pub traces_forwarded: usize,
    /// Stats payloads delivered.
    pub stats_forwarded: usize,
}

/// The forwarding pipeline. Holds no mutable state across calls; safe to
/// invoke from multiple concurrent flows.
pub struct TraceForwarder {
    config: ForwarderConfig,
    obfuscator: Arc<dyn Obfuscator>,
    analyzer: Arc<dyn SpanAnalyzer>,
    edge: TraceEdgeClient,
}

impl TraceForwarder {
    /// Builds a forwarder with the built-in obfuscator and analyzer.
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let edge = TraceEdgeClient::new(&config)?;
        Ok(Self::with_parts(
            config.clone(),
            Arc::new(TagObfuscator::new(config.obfuscation)),
            Arc::new(TopLevelAnalyzer),
            edge,
        ))
    }

    /// Builds a forwarder over a caller-supplied transport, keeping the
    /// built-in obfuscator and analyzer. Used by tests.
    pub fn with_transport(
        config: ForwarderConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let edge = TraceEdgeClient::with_transport(&config, transport);
        Self::with_parts(
            config.clone(),
            Arc::new(TagObfuscator::new(config.obfuscation)),
            Arc::new(TopLevelAnalyzer),
            edge,
        )
    }

    /// Fully parameterized constructor for hosts bringing their own
    /// obfuscation engine or span analysis.
    pub fn with_parts(
        config: ForwarderConfig,
        obfuscator: Arc<dyn Obfuscator>,
        analyzer: Arc<dyn SpanAnalyzer>,
        edge: TraceEdgeClient,
    ) -> Self {
        TraceForwarder {
            config,
            obfuscator,
            analyzer,
            edge,
        }
    }

    /// Runs the pipeline over the given payloads.
    ///
    /// An empty input (no payloads, or payloads without traces) is success
    /// with a zeroed summary and performs no network call.
    pub async fn forward(
        &self,
        mut payloads: Vec<TracePayload>,
    ) -> Result<ForwardSummary, ForwardError> {
        if payloads.iter().all(|p| p.traces.is_empty()) {
            debug!("no traces to forward");
            return Ok(ForwardSummary::default());
        }

        for payload in &mut payloads {
            for trace in &mut payload.traces {
                for span in &mut trace.spans {
                    self.obfuscator.obfuscate_span(span);
                }
            }
        }

        let grouped = aggregate_payloads_by_env(payloads);
        debug!(groups = grouped.len(), "aggregated trace payloads by env");

        let mut summary = ForwardSummary::default();
        let mut failures: Vec<ForwardError> = Vec::new();

        for payload in &grouped {
            // A group can end up traceless when an input payload carried no
            // traces; there is nothing to deliver for it.
            if payload.traces.is_empty() {
                debug!(env = %payload.env, "skipping group with no traces");
                continue;
            }

            match self
                .edge
                .send_traces(payload, self.config.max_retries)
                .await
            {
                Ok(()) => {
                    summary.groups_forwarded += 1;
                    summary.traces_forwarded += payload.traces.len();
                }
                Err(err) => {
                    error!(env = %payload.env, "failed to send traces: {err}");
                    failures.push(err);
                }
            }

            let stats = compute_stats(payload, self.analyzer.as_ref());
            match self.edge.send_stats(&stats, self.config.max_retries).await {
                Ok(()) => summary.stats_forwarded += 1,
                Err(err) => {
                    error!(env = %payload.env, "failed to send trace stats: {err}");
                    failures.push(err);
                }
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(ForwardError::Aggregate(failures))
        }
    }
}
