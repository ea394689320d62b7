// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics rendered with miette.
//!
//! Figment errors are mapped onto [`ConfigError`] with the offending key
//! located in the TOML source, and typos in section or key names get a
//! Jaro-Winkler "did you mean" suggestion. Semantic validation failures
//! carry the dotted key and, where the rule is not obvious, a hint.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Below this similarity no suggestion is offered.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Top-level sections of `wacast.toml` and what each one controls.
pub const SECTIONS: &[(&str, &str)] = &[
    ("service", "service name and log level"),
    ("storage", "SQLite database location"),
    ("whatsapp", "Cloud API endpoint, sender id, access token and webhook secrets"),
    ("dispatch", "batch size, worker concurrency, send timeout and job locking"),
    ("throttle", "adaptive send rate per sender"),
    ("suppression", "automatic suppression of repeatedly failing phones"),
    ("webhook", "opt-out keywords, dedup window and reconciliation interval"),
    ("precheck", "phone normalization before sending"),
    ("gateway", "HTTP bind address and operator bearer token"),
];

/// A configuration error ready for miette rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown section `[{section}]`")]
    #[diagnostic(
        code(wacast::config::unknown_section),
        help("{}", section_help(suggestion.as_deref()))
    )]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        #[label("not a wacast section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(
        code(wacast::config::unknown_key),
        help("{}", key_help(section, suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys the section accepts.
        valid_keys: String,
        #[label("not a key of this section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(wacast::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(wacast::config::missing_key),
        help("add `{key} = <value>` to wacast.toml")
    )]
    MissingKey { key: String },

    /// A value that parsed but breaks a semantic rule.
    #[error("invalid `{key}`: {message}")]
    #[diagnostic(code(wacast::config::validation))]
    Validation {
        /// Dotted key, e.g. `throttle.start_rate`.
        key: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("configuration error: {0}")]
    #[diagnostic(code(wacast::config::other))]
    Other(String),
}

impl ConfigError {
    pub fn validation(key: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.to_string(),
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, text: impl Into<String>) -> Self {
        if let Self::Validation { help, .. } = &mut self {
            *help = Some(text.into());
        }
        self
    }
}

fn section_help(suggestion: Option<&str>) -> String {
    let known = SECTIONS
        .iter()
        .map(|(name, _)| format!("[{name}]"))
        .collect::<Vec<_>>()
        .join(", ");
    match suggestion {
        Some(s) => format!("did you mean `[{s}]`? Sections: {known}"),
        None => format!("sections: {known}"),
    }
}

fn key_help(section: &str, suggestion: Option<&str>, valid_keys: &str) -> String {
    let about = SECTIONS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, about)| format!(" ({about})"))
        .unwrap_or_default();
    match suggestion {
        Some(s) => format!("did you mean `{s}`? [{section}]{about} accepts: {valid_keys}"),
        None => format!("[{section}]{about} accepts: {valid_keys}"),
    }
}

/// Map a figment error (possibly several) onto diagnostics.
///
/// `toml_sources` holds `(path, content)` of every file that was loaded,
/// used to point at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let section = error
                    .path
                    .iter()
                    .find(|segment| segment.as_str() != field.as_str())
                    .cloned();
                let source = source_of(&error, toml_sources);
                match section {
                    None => {
                        let span = source.as_ref().and_then(|(_, content)| {
                            find_section_offset(content, field)
                                .map(|offset| SourceSpan::new(offset.into(), field.len() + 2))
                        });
                        ConfigError::UnknownSection {
                            section: field.clone(),
                            suggestion: suggest_key(field, expected),
                            src: span.and(source.map(named)),
                            span,
                        }
                    }
                    Some(section) => {
                        let span = source.as_ref().and_then(|(_, content)| {
                            find_key_offset(content, Some(section.as_str()), field)
                                .map(|offset| SourceSpan::new(offset.into(), field.len()))
                        });
                        ConfigError::UnknownKey {
                            key: field.clone(),
                            suggestion: suggest_key(field, expected),
                            valid_keys: expected.join(", "),
                            src: span.and(source.map(named)),
                            span,
                            section,
                        }
                    }
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: dotted(&error.path, Some(&**field)),
            },
            Kind::InvalidType(found, expected) => ConfigError::InvalidType {
                key: dotted(&error.path, None),
                found: found.to_string(),
                expected: expected.clone(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted(path: &[String], leaf: Option<&str>) -> String {
    let mut parts: Vec<&str> = path.iter().map(String::as_str).collect();
    if let Some(leaf) = leaf
        && parts.last() != Some(&leaf)
    {
        parts.push(leaf);
    }
    parts.join(".")
}

fn source_of<'a>(
    error: &figment::error::Error,
    toml_sources: &'a [(String, String)],
) -> Option<(&'a str, &'a str)> {
    let path = match error.metadata.as_ref()?.source.as_ref()? {
        figment::Source::File(path) => path.display().to_string(),
        _ => return None,
    };
    toml_sources
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(p, content)| (p.as_str(), content.as_str()))
}

fn named((path, content): (&str, &str)) -> NamedSource<String> {
    NamedSource::new(path, content.to_string())
}

/// Section a TOML header line opens, if it is one (`[dispatch]` -> `dispatch`).
fn header_name(line: &str) -> Option<&str> {
    let inner = line.trim().strip_prefix('[')?.split(']').next()?;
    Some(inner.trim())
}

/// Byte offset of a `[section]` header.
pub fn find_section_offset(content: &str, section: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if header_name(line) == Some(section) {
            return Some(offset + (line.len() - line.trim_start().len()));
        }
        offset += line.len();
    }
    None
}

/// Byte offset of `key` inside `[section]`, or before any header when
/// `section` is `None`. Keys with the same name in other sections are
/// not matched.
pub fn find_key_offset(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if let Some(name) = header_name(line) {
            current = Some(name);
        } else if current == section {
            let trimmed = line.trim_start();
            let is_key = trimmed
                .strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with('='));
            if is_key {
                return Some(offset + (line.len() - trimmed.len()));
            }
        }
        offset += line.len();
    }
    None
}

/// Closest valid name above the similarity threshold.
pub fn suggest_key<S: AsRef<str>>(unknown: &str, valid: &[S]) -> Option<String> {
    valid
        .iter()
        .map(|candidate| {
            let candidate = candidate.as_ref();
            (strsim::jaro_winkler(unknown, candidate), candidate)
        })
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Print every error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
