// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarder configuration.
//!
//! Constructed once at process start and passed by reference into the
//! orchestrator and its components; nothing in the core reads ambient global
//! state, so tests can build independent instances in parallel.

use std::collections::HashMap;
use std::env;

use crate::error::ForwardError;
use crate::obfuscate::ObfuscationConfig;

const DEFAULT_SITE: &str = "datadoghq.com";
/// Default retry budget per delivery call; the first attempt counts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Key:value tags attached to an invocation, e.g. `env:prod,host:i-123`.
///
/// Space-separated key:value tags are the standard for tagging. For
/// compatibility reasons comma-separated tags are supported as well.
#[derive(Clone, Debug, Default)]
pub struct Tags {
    tags: HashMap<String, String>,
}

impl Tags {
    pub fn from_string(raw: &str) -> Self {
        let mut tags = HashMap::new();
        let normalized = raw.replace(',', " ");
        for kv in normalized.split_whitespace() {
            let parts = kv.split(':').collect::<Vec<&str>>();
            if parts.len() == 2 {
                tags.insert(parts[0].to_string(), parts[1].to_string());
            }
        }
        Self { tags }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Environment identity carried by the tag string, empty when absent.
    pub fn env(&self) -> &str {
        self.get("env").unwrap_or("")
    }

    /// Host identity carried by the tag string, empty when absent.
    pub fn host(&self) -> &str {
        self.get("host").unwrap_or("")
    }
}

/// Configuration for one forwarder instance.
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    /// Base intake URL, e.g. `https://trace.agent.datadoghq.com`. The trace
    /// and stats endpoints hang off this root.
    pub root_url: String,
    pub api_key: String,
    /// Skip TLS certificate verification. Test and debug environments only.
    pub accept_invalid_certs: bool,
    /// Retry budget handed to each delivery call.
    pub max_retries: u32,
    /// Legacy behavior: also spend the retry budget on non-retriable
    /// responses instead of returning immediately.
    pub retry_client_errors: bool,
    pub obfuscation: ObfuscationConfig,
}

impl ForwarderConfig {
    pub fn new(root_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        ForwarderConfig {
            root_url: root_url.into(),
            api_key: api_key.into(),
            accept_invalid_certs: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_client_errors: false,
            obfuscation: ObfuscationConfig::forwarder_defaults(),
        }
    }

    /// Builds the configuration from environment variables.
    ///
    /// `DD_API_KEY` is required. The intake root is derived from `DD_SITE`
    /// (default `datadoghq.com`); `DD_APM_DD_URL` overrides the entire root,
    /// which is primarily used by integration tests.
    pub fn from_env() -> Result<ForwarderConfig, ForwardError> {
        let api_key = env::var("DD_API_KEY").map_err(|_| {
            ForwardError::InvalidConfig("DD_API_KEY environment variable is not set".to_string())
        })?;

        let site = env::var("DD_SITE").unwrap_or_else(|_| DEFAULT_SITE.to_string());
        let root_url = match env::var("DD_APM_DD_URL") {
            Ok(prefix) => prefix,
            Err(_) => format!("https://trace.agent.{site}"),
        };

        Ok(ForwarderConfig::new(root_url, api_key))
    }
}
