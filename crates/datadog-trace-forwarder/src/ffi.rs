// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! C-compatible process entry surface.
//!
//! The hosting runtime only understands primitive arguments and integer
//! return codes, so this adapter translates between that convention and the
//! typed core. The core itself never reads the process-wide state held
//! here.
//!
//! All functions catch panics before they can cross the `extern "C"`
//! boundary and report them as failures instead of aborting the process.
//!
//! Expected call sequence: `datadog_trace_forwarder_configure` once per
//! process, then `datadog_trace_forwarder_forward` once per log-forwarding
//! cycle. `content` is a JSON array of span records; `tags` is a
//! comma/space-separated `key:value` string whose `env`/`host` entries tag
//! the payload.

use std::ffi::{c_char, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;

use tracing::error;

use crate::config::{ForwarderConfig, Tags};
use crate::forwarder::TraceForwarder;
use crate::payload::{Span, TracePayload};

/// Returned by every entry point on success.
pub const STATUS_OK: c_int = 0;
/// Returned by every entry point on failure; details go to operator logs.
pub const STATUS_ERROR: c_int = 1;

struct ProcessState {
    forwarder: TraceForwarder,
    runtime: tokio::runtime::Runtime,
}

static STATE: RwLock<Option<ProcessState>> = RwLock::new(None);

fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the caller guarantees `ptr` is a valid NUL-terminated string
    // for the duration of the call.
    let raw = unsafe { CStr::from_ptr(ptr) };
    // Copy out of the host-owned buffer before returning.
    raw.to_str().ok().map(str::to_owned)
}

/// Sets up the process-wide forwarder with the given intake root URL and
/// API key. Returns 0 on success, 1 on error.
///
/// # Safety
///
/// `root_url` and `api_key` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn datadog_trace_forwarder_configure(
    root_url: *const c_char,
    api_key: *const c_char,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let (Some(root_url), Some(api_key)) = (read_c_string(root_url), read_c_string(api_key))
        else {
            error!("configure called with invalid arguments");
            return STATUS_ERROR;
        };

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("failed to build runtime: {err}");
                return STATUS_ERROR;
            }
        };

        let config = ForwarderConfig::new(root_url, api_key);
        let forwarder = match TraceForwarder::new(config) {
            Ok(forwarder) => forwarder,
            Err(err) => {
                error!("failed to configure trace forwarder: {err}");
                return STATUS_ERROR;
            }
        };

        match STATE.write() {
            Ok(mut state) => {
                *state = Some(ProcessState { forwarder, runtime });
                STATUS_OK
            }
            Err(_) => {
                error!("forwarder state lock poisoned");
                STATUS_ERROR
            }
        }
    }));
    result.unwrap_or(STATUS_ERROR)
}

/// Runs the forwarding pipeline over the given serialized span records.
/// Returns 0 on success (including an empty record set), 1 on error.
///
/// # Safety
///
/// `content` and `tags` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn datadog_trace_forwarder_forward(
    content: *const c_char,
    tags: *const c_char,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let (Some(content), Some(tags)) = (read_c_string(content), read_c_string(tags)) else {
            error!("forward called with invalid arguments");
            return STATUS_ERROR;
        };

        let state = match STATE.read() {
            Ok(state) => state,
            Err(_) => {
                error!("forwarder state lock poisoned");
                return STATUS_ERROR;
            }
        };
        let Some(state) = state.as_ref() else {
            error!("forward called before configure");
            return STATUS_ERROR;
        };

        let payloads = match payloads_from_json(&content, &tags) {
            Ok(payloads) => payloads,
            Err(err) => {
                error!("couldn't forward traces: {err}");
                return STATUS_ERROR;
            }
        };

        match state.runtime.block_on(state.forwarder.forward(payloads)) {
            Ok(_) => STATUS_OK,
            Err(err) => {
                error!("failed to forward traces: {err}");
                STATUS_ERROR
            }
        }
    }));
    result.unwrap_or(STATUS_ERROR)
}

/// Parses a JSON array of span records into a single payload tagged with the
/// `env`/`host` entries of the tag string.
pub fn payloads_from_json(
    content: &str,
    tags: &str,
) -> Result<Vec<TracePayload>, crate::error::ForwardError> {
    let spans: Vec<Span> = serde_json::from_str(content)?;
    let tags = Tags::from_string(tags);
    if spans.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![TracePayload::from_spans(
        spans,
        tags.host(),
        tags.env(),
    )])
}
