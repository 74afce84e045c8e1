// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire encodings for the two intake artifacts.
//!
//! Delivery only needs bytes: traces are serialized to msgpack and sent
//! identity-encoded, stats are serialized to JSON and gzip-compressed.
//! An encoding failure is fatal for that artifact and is never retried.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::payload::TracePayload;
use crate::stats::StatsPayload;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize trace payload to msgpack: {0}")]
    Traces(#[from] rmp_serde::encode::Error),

    #[error("failed to serialize stats payload to json: {0}")]
    Stats(#[from] serde_json::Error),

    #[error("failed to compress stats payload: {0}")]
    Compress(#[from] std::io::Error),
}

/// Serializes a trace payload to its binary wire form.
pub fn encode_trace_payload(payload: &TracePayload) -> Result<Vec<u8>, EncodeError> {
    Ok(rmp_serde::to_vec_named(payload)?)
}

/// Serializes a stats payload to gzip-compressed JSON.
pub fn encode_stats_payload(payload: &StatsPayload) -> Result<Vec<u8>, EncodeError> {
    let json = serde_json::to_vec(payload)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}
