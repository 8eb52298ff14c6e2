//! Tool name synthesis: `{project}-{controller}-{operation}`, snake_cased per segment, unique
//! within one compilation pass and no longer than the configured maximum.

use crate::error::{OpenApiToolsError, Result};
use crate::model::Endpoint;
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug)]
pub struct ToolNameSynthesizer {
    max_len: usize,
    camel_boundary: Regex,
    separators: Regex,
    used: HashSet<String>,
}

impl ToolNameSynthesizer {
    /// # Errors
    ///
    /// Returns an error if `max_len` is too small to hold a `_N` suffix.
    pub fn new(max_len: usize) -> Result<Self> {
        if max_len < crate::config::MIN_TOOL_NAME_LENGTH {
            return Err(OpenApiToolsError::Config(format!(
                "maxToolNameLength must be at least {} (got {max_len})",
                crate::config::MIN_TOOL_NAME_LENGTH
            )));
        }
        let pattern = |p: &str| {
            Regex::new(p).map_err(|e| OpenApiToolsError::Config(format!("bad name pattern: {e}")))
        };
        Ok(Self {
            max_len,
            camel_boundary: pattern(r"([a-z0-9])([A-Z])")?,
            separators: pattern(r"[^a-zA-Z0-9]+")?,
            used: HashSet::new(),
        })
    }

    /// Lowercase snake_case with `_` at camelCase boundaries and in place of any
    /// non-alphanumeric run.
    #[must_use]
    pub fn snake_case(&self, s: &str) -> String {
        let split = self.camel_boundary.replace_all(s, "${1}_${2}");
        let joined = self.separators.replace_all(&split, "_");
        joined.to_lowercase().trim_matches('_').to_string()
    }

    #[must_use]
    pub fn base_name(&self, endpoint: &Endpoint) -> String {
        let operation = if endpoint.operation_id.trim().is_empty() {
            format!(
                "{} {}",
                endpoint.method.as_str().to_ascii_lowercase(),
                endpoint.path
            )
        } else {
            endpoint.operation_id.clone()
        };

        format!(
            "{}-{}-{}",
            self.snake_case(&endpoint.project_id),
            self.snake_case(&endpoint.controller()),
            self.snake_case(&operation)
        )
    }

    /// Pick and record the name for `endpoint`.
    pub fn synthesize(&mut self, endpoint: &Endpoint) -> String {
        let base = self.base_name(endpoint);
        self.reserve(&base)
    }

    /// Make `base` unique (`_1`, `_2`, ...), then truncate to the maximum length, then make the
    /// truncated name unique again by shortening it to fit a `_N` suffix.
    pub fn reserve(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut counter = 1u32;
        while self.used.contains(&name) {
            name = format!("{base}_{counter}");
            counter += 1;
        }

        if name.len() > self.max_len {
            tracing::warn!(
                tool = %name,
                max = self.max_len,
                "Tool name exceeds the maximum length and will be truncated"
            );
            let full = name;
            name = truncate_ascii(&full, self.max_len).to_string();
            let mut counter = 1u32;
            while self.used.contains(&name) {
                let suffix = format!("_{counter}");
                let keep = self.max_len.saturating_sub(suffix.len());
                name = format!("{}{suffix}", truncate_ascii(&full, keep));
                counter += 1;
            }
        }

        self.used.insert(name.clone());
        name
    }

    #[must_use]
    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }
}

/// Names are ASCII after snake-casing; the char-boundary walk only matters for odd input.
fn truncate_ascii(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
