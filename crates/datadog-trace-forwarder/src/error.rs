// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::codec::EncodeError;
use crate::edge::DeliveryError;

/// Errors surfaced by the forwarding pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse trace records: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Trace-send and stats-send are both attempted for every group; every
    /// failure is collected here rather than short-circuiting on the first.
    #[error("forwarding finished with {} delivery failure(s), first: {}", .0.len(), .0[0])]
    Aggregate(Vec<ForwardError>),
}
