// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config diagnostics rendered through miette.
//!
//! Figment reports a bad key or value with its dotted path. That path is
//! matched against the known layout of `lifeline.toml` to name the section,
//! suggest the closest real key, and point at the offending line when the
//! TOML source is at hand.

#![allow(unused_assignments)] // miette's Diagnostic derive trips this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a key must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Keys accepted in each `lifeline.toml` section, mirroring `model.rs`.
const SECTIONS: &[(&str, &[&str])] = &[
    ("app", &["log_level"]),
    ("storage", &["database_path", "busy_timeout_ms"]),
    (
        "relay",
        &[
            "max_attempts",
            "base_delay_ms",
            "max_delay_ms",
            "jitter_ratio",
            "request_timeout_secs",
            "lease_margin_secs",
            "retain_completed",
        ],
    ),
    (
        "trigger",
        &[
            "sub_events_required",
            "min_quiet_interval_ms",
            "gesture_window_ms",
            "cooldown_ms",
        ],
    ),
    ("worker", &["poll_interval_ms", "orphan_grace_ms"]),
    ("gateway", &["host", "port", "database_path", "principals"]),
    ("gateway.principals", &["name", "token"]),
];

/// A configuration problem, ready for miette rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(code(lifeline::config::unknown_key), help("{help}"))]
    UnknownKey {
        key: String,
        /// `[relay]`, `[[gateway.principals]]` or "the top level".
        section: String,
        suggestion: Option<String>,
        help: String,
        #[label("not a {section} key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(lifeline::config::invalid_type))]
    InvalidType {
        key: String,
        detail: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        expected: String,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// Only reachable for `[[gateway.principals]]`; every other key has a default.
    #[error("missing key `{key}`")]
    #[diagnostic(
        code(lifeline::config::missing_key),
        help("each [[gateway.principals]] entry needs both `name` and `token`")
    )]
    MissingKey { key: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(lifeline::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(lifeline::config::other))]
    Other(String),
}

/// Keys valid at `section` (`""` for the top level).
fn keys_for(section: &str) -> Vec<&'static str> {
    if section.is_empty() {
        return SECTIONS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !name.contains('.'))
            .collect();
    }
    SECTIONS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, keys)| keys.to_vec())
        .unwrap_or_default()
}

/// Section name for a figment path, dropping array indices:
/// `["gateway", "principals", "0"]` becomes `gateway.principals`.
fn section_of(path: &[String]) -> String {
    path.iter()
        .filter(|segment| segment.parse::<usize>().is_err())
        .cloned()
        .collect::<Vec<_>>()
        .join(".")
}

fn section_label(section: &str) -> String {
    match section {
        "" => "the top level".to_string(),
        "gateway.principals" => "[[gateway.principals]]".to_string(),
        other => format!("[{other}]"),
    }
}

/// Closest valid key by Jaro-Winkler similarity, if any is close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Convert a figment error (possibly several) into diagnostics.
///
/// `sources` holds `(path, content)` for every TOML file that was merged;
/// it is used only to attach spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.clone();
            let section = section_of(&path);
            let source = source_for(&error, sources);
            match &error.kind {
                Kind::UnknownField(field, _) => {
                    let valid = keys_for(&section);
                    let suggestion = suggest_key(field, &valid);
                    let help = match &suggestion {
                        Some(s) => format!("did you mean `{s}`? valid keys: {}", valid.join(", ")),
                        None => format!("valid keys: {}", valid.join(", ")),
                    };
                    let (span, src) = spanned(source, &section, field);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section_label(&section),
                        suggestion,
                        help,
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(actual, expected) => {
                    // The last path segment is the key; the rest is its section.
                    let key = path.last().cloned().unwrap_or_default();
                    let parent = section_of(&path[..path.len().saturating_sub(1)]);
                    let (span, src) = spanned(source, &parent, &key);
                    ConfigError::InvalidType {
                        key: path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// The merged source an error came from. A single inline source is used
/// as-is, since figment does not tag string providers with a file path.
fn source_for<'a>(
    error: &figment::Error,
    sources: &'a [(String, String)],
) -> Option<&'a (String, String)> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    match file {
        Some(file) => sources.iter().find(|(path, _)| *path == file),
        None if sources.len() == 1 => sources.first(),
        None => None,
    }
}

fn spanned(
    source: Option<&(String, String)>,
    section: &str,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((path, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, section, key) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `key` inside the `section` table of `content`.
///
/// Scanning stops at the next table header, so a key of the same name in a
/// later section is not matched. `section` is `""` for top-level keys and
/// `gateway.principals` for the first array-of-tables entry holding `key`.
pub fn find_key_offset(content: &str, section: &str, key: &str) -> Option<usize> {
    let mut in_section = section.is_empty();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            let name = trimmed
                .trim_end()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim();
            if in_section && !(name == section && trimmed.starts_with("[[")) {
                // Leaving the section; a repeated [[array]] entry keeps searching.
                in_section = false;
            }
            if name == section {
                in_section = true;
            }
        } else if in_section {
            if let Some(rest) = trimmed.strip_prefix(key) {
                if rest.trim_start().starts_with('=') {
                    return Some(offset + (line.len() - trimmed.len()));
                }
            }
        }
        offset += line.len();
    }
    None
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_model_section_has_keys() {
        let top = keys_for("");
        assert_eq!(top, ["app", "storage", "relay", "trigger", "worker", "gateway"]);
        for section in top {
            assert!(!keys_for(section).is_empty(), "{section} has no keys");
        }
    }

    #[test]
    fn suggests_relay_key_for_typo() {
        assert_eq!(
            suggest_key("max_atempts", &keys_for("relay")),
            Some("max_attempts".to_string())
        );
        assert_eq!(
            suggest_key("cooldwn_ms", &keys_for("trigger")),
            Some("cooldown_ms".to_string())
        );
        assert_eq!(suggest_key("zzzzzz", &keys_for("worker")), None);
    }

    #[test]
    fn array_indices_are_dropped_from_section() {
        let path = ["gateway", "principals", "1"].map(String::from);
        assert_eq!(section_of(&path), "gateway.principals");
        assert_eq!(section_label("gateway.principals"), "[[gateway.principals]]");
        assert_eq!(section_label(""), "the top level");
    }

    #[test]
    fn key_offset_stays_inside_its_section() {
        let content = "[storage]\ndatabase_path = \"a.db\"\n\n[gateway]\nport = 1\ndatabase_path = \"g.db\"\n";
        let o = find_key_offset(content, "gateway", "database_path").unwrap();
        assert!(content[o..].starts_with("database_path = \"g.db\""));
        assert_eq!(find_key_offset(content, "worker", "port"), None);
    }

    #[test]
    fn key_offset_searches_principal_entries() {
        let content = "[[gateway.principals]]\nname = \"a\"\n\n[[gateway.principals]]\nname = \"b\"\ntokn = \"x\"\n";
        let o = find_key_offset(content, "gateway.principals", "tokn").unwrap();
        assert!(content[o..].starts_with("tokn"));
    }

    #[test]
    fn inline_unknown_key_gets_span_and_suggestion() {
        let toml = "[worker]\norphan_grace = 10\n";
        let err = crate::loader::load_config_from_str(toml).unwrap_err();
        let errors = figment_to_config_errors(err, &[("<inline>".to_string(), toml.to_string())]);
        match &errors[0] {
            ConfigError::UnknownKey {
                section,
                suggestion,
                span,
                ..
            } => {
                assert_eq!(section, "[worker]");
                assert_eq!(suggestion.as_deref(), Some("orphan_grace_ms"));
                assert_eq!(span.map(|s| s.offset()), Some(9));
            }
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }
}
