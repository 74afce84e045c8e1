// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span obfuscation boundary.
//!
//! The forwarder calls [`Obfuscator::obfuscate_span`] once per span before
//! any grouping or aggregation; it never inspects or alters the redaction
//! policy itself. [`TagObfuscator`] is the built-in tag-level
//! implementation; hosts with a full scrubbing engine plug it in behind the
//! same trait.

use crate::payload::Span;

const REDACTED: &str = "?";

/// Redaction policy for the built-in obfuscator.
#[derive(Clone, Debug, Default)]
pub struct ObfuscationConfig {
    /// Redact Elasticsearch query bodies.
    pub es: bool,
    /// Redact MongoDB query documents.
    pub mongo: bool,
    /// Strip query strings from URLs.
    pub remove_query_string: bool,
    /// Replace numeric URL path segments.
    pub remove_path_digits: bool,
    /// Drop stack-trace tag values.
    pub remove_stack_traces: bool,
    /// Redact Redis command arguments.
    pub redis: bool,
    /// Redact Memcached command arguments.
    pub memcached: bool,
}

impl ObfuscationConfig {
    /// The fixed forwarder policy: everything enabled.
    pub fn forwarder_defaults() -> Self {
        ObfuscationConfig {
            es: true,
            mongo: true,
            remove_query_string: true,
            remove_path_digits: true,
            remove_stack_traces: true,
            redis: true,
            memcached: true,
        }
    }
}

/// External obfuscation capability applied to every span before forwarding.
pub trait Obfuscator: Send + Sync {
    fn obfuscate_span(&self, span: &mut Span);
}

/// Tag-level obfuscator redacting the well-known sensitive span tags.
#[derive(Clone, Debug, Default)]
pub struct TagObfuscator {
    config: ObfuscationConfig,
}

impl TagObfuscator {
    pub fn new(config: ObfuscationConfig) -> Self {
        TagObfuscator { config }
    }

    fn obfuscate_url(&self, url: &str) -> String {
        let mut url = url.to_string();
        // Segment redaction must never see the query part, kept or not.
        let mut query = String::new();
        if let Some(index) = url.find('?') {
            if self.config.remove_query_string {
                url.truncate(index);
            } else {
                query = url.split_off(index);
            }
        }
        if self.config.remove_path_digits {
            if let Some(path_start) = url.find("://").map(|i| i + 3) {
                if let Some(offset) = url[path_start..].find('/') {
                    let (scheme_and_host, path) = url.split_at(path_start + offset);
                    let redacted_path: Vec<&str> = path
                        .split('/')
                        .map(|segment| {
                            if !segment.is_empty() && segment.chars().any(|c| c.is_ascii_digit()) {
                                REDACTED
                            } else {
                                segment
                            }
                        })
                        .collect();
                    url = format!("{}{}", scheme_and_host, redacted_path.join("/"));
                }
            }
        }
        url + &query
    }

    /// Keeps the command word of a cache-protocol invocation, drops the
    /// arguments.
    fn obfuscate_command(raw: &str) -> String {
        match raw.split_whitespace().next() {
            Some(command) => format!("{command} {REDACTED}"),
            None => String::new(),
        }
    }
}

impl Obfuscator for TagObfuscator {
    fn obfuscate_span(&self, span: &mut Span) {
        if self.config.remove_stack_traces {
            span.meta.remove("error.stack");
        }
        if let Some(url) = span.meta.get("http.url") {
            let obfuscated = self.obfuscate_url(url);
            span.meta.insert("http.url".to_string(), obfuscated);
        }
        if self.config.redis {
            if let Some(raw) = span.meta.get("redis.raw_command") {
                let obfuscated = Self::obfuscate_command(raw);
                span.meta.insert("redis.raw_command".to_string(), obfuscated);
            }
        }
        if self.config.memcached {
            if let Some(raw) = span.meta.get("memcached.command") {
                let obfuscated = Self::obfuscate_command(raw);
                span.meta.insert("memcached.command".to_string(), obfuscated);
            }
        }
        if self.config.es {
            if span.meta.contains_key("elasticsearch.body") {
                span.meta
                    .insert("elasticsearch.body".to_string(), REDACTED.to_string());
            }
        }
        if self.config.mongo {
            if span.meta.contains_key("mongodb.query") {
                span.meta
                    .insert("mongodb.query".to_string(), REDACTED.to_string());
            }
        }
    }
}
