// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace forwarding core for short-lived log-forwarding invocations.
//!
//! One invocation ingests parsed trace payloads, obfuscates sensitive span
//! data, regroups the payloads by environment, derives 10-second bucketed
//! span statistics, and delivers both the traces and the stats to the
//! Datadog trace intake ("trace edge") with a bounded retry policy.
//!
//! ```text
//! payloads → obfuscate → group by env → per group: [send traces]
//!                                                  [compute stats → send stats]
//! ```
//!
//! No state survives an invocation: every call to
//! [`forwarder::TraceForwarder::forward`] starts from an empty aggregation
//! state, and delivery retries may duplicate traces downstream (the intake
//! does not dedupe; favoring delivery over exactness is deliberate).

pub mod analysis;
pub mod codec;
pub mod config;
pub mod edge;
pub mod error;
pub mod ffi;
pub mod forwarder;
pub mod obfuscate;
pub mod payload;
pub mod stats;

pub use config::ForwarderConfig;
pub use error::ForwardError;
pub use forwarder::{ForwardSummary, TraceForwarder};
pub use payload::{Span, Trace, TracePayload};
