//! Outbound header resolution
//!
//! Builds the per-connection header set in three ordered stages: parse a JSON
//! object template (inline text or file), substitute `${NAME}` environment
//! placeholders in every value, then merge explicit `key=value` overrides.
//! Later stages win on key collision. Resolution is a pure function of the
//! options and the process environment.

use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::options::BridgeOptions;

/// Environment variable holding an inline JSON header template
pub const HEADER_TEMPLATE_ENV: &str = "MCP_HEADER_TEMPLATE";

/// Environment variable holding a path to a JSON header template file
pub const HEADER_FILE_ENV: &str = "MCP_HEADER_FILE";

/// Resolved outbound headers
pub type HeaderSet = HashMap<String, String>;

/// Resolve the outbound header set for a connection
///
/// No template and no overrides yields an empty set. A malformed template is
/// logged and treated as empty; it never aborts the build.
pub fn resolve_headers(options: &BridgeOptions) -> HeaderSet {
    let template = load_template(options);
    let substituted = substitute_env(&template);
    merge_overrides(substituted, &options.headers)
}

/// Load the raw template, preferring inline text over a file path, and the
/// explicit option over its environment fallback
fn load_template(options: &BridgeOptions) -> HeaderSet {
    let inline = options
        .header_template
        .clone()
        .or_else(|| std::env::var(HEADER_TEMPLATE_ENV).ok().filter(|v| !v.is_empty()));

    let raw = match inline {
        Some(raw) => Some(raw),
        None => options
            .header_file
            .clone()
            .or_else(|| {
                std::env::var(HEADER_FILE_ENV)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(contents) => Some(contents),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "header template file unreadable; ignoring");
                    None
                }
            }),
    };

    match raw {
        Some(raw) => parse_template(&raw),
        None => HeaderSet::new(),
    }
}

fn parse_template(raw: &str) -> HeaderSet {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
        Ok(_) => {
            tracing::warn!("header template is not a JSON object; ignoring");
            HeaderSet::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "header template parse error; ignoring");
            HeaderSet::new()
        }
    }
}

/// Replace every `${NAME}` with the named environment variable's value,
/// or the empty string when unset. Never an error.
fn substitute_env(headers: &HeaderSet) -> HeaderSet {
    let placeholder = Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("valid placeholder pattern");
    headers
        .iter()
        .map(|(key, value)| {
            let replaced = placeholder.replace_all(value, |caps: &regex::Captures<'_>| {
                std::env::var(&caps[1]).unwrap_or_default()
            });
            (key.clone(), replaced.into_owned())
        })
        .collect()
}

/// Merge explicit `key=value` pairs, overriding template values.
/// Entries without a separator are ignored.
fn merge_overrides(mut headers: HeaderSet, overrides: &[String]) -> HeaderSet {
    for pair in overrides {
        if let Some((key, value)) = pair.split_once('=') {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    headers
}
