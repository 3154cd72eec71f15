//! Configuration validation.
//!
//! Checks a TOML config file against the known schema, flags unknown or
//! misspelled fields and reports security warnings.

use std::{collections::HashMap, path::Path};

use crate::{env_subst::is_placeholder, schema::SolaceConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// One of "syntax", "unknown-field", "type-error", "invalid-value",
    /// "security", "file-ref".
    pub category: &'static str,
    /// Dotted path, e.g. "keystore.servce"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree ─────────────────────────────────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    let section = |fields: &[&'static str]| {
        Struct(fields.iter().map(|name| (*name, Leaf)).collect())
    };

    Struct(HashMap::from([
        ("storage", section(&["database"])),
        (
            "keystore",
            section(&["service", "entry", "allow_insecure_fallback"]),
        ),
        ("backup", section(&["export_dir", "password"])),
        ("metrics", section(&["enabled"])),
    ]))
}

// ── Suggestions ─────────────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|candidate| (*candidate, levenshtein(needle, candidate)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(candidate, d)| (*d, *candidate))
        .map(|(candidate, _)| candidate)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate the config at `path`, or the discovered config file when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|ext| ext == "toml");

    let mut result = match std::fs::read_to_string(actual_path) {
        Ok(content) if is_toml => validate_toml_str(&content),
        Ok(content) => {
            // Only TOML gets field-level checks; other formats must still load.
            let mut diagnostics = Vec::new();
            if let Err(e) = crate::loader::parse_config(&content, actual_path) {
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "type-error",
                    path: String::new(),
                    message: format!("type error: {e}"),
                });
            }
            ValidationResult {
                diagnostics,
                config_path: None,
            }
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<SolaceConfig>(toml_str) {
        Ok(config) => check_semantic_warnings(&config, &toml_value, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }

        let level = if prefix.is_empty() {
            " at top level"
        } else {
            ""
        };
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field{level} (did you mean \"{s}\"?)"),
            None => format!("unknown field{level}"),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message,
        });
    }
}

fn check_semantic_warnings(
    config: &SolaceConfig,
    raw: &toml::Value,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (path, value) in [
        ("keystore.service", &config.keystore.service),
        ("keystore.entry", &config.keystore.entry),
    ] {
        if value.trim().is_empty() {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "invalid-value",
                path: path.into(),
                message: "must not be empty".into(),
            });
        }
    }

    if config.storage.database.as_os_str().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "invalid-value",
            path: "storage.database".into(),
            message: "must not be empty".into(),
        });
    }

    if config.keystore.allow_insecure_fallback {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "keystore.allow_insecure_fallback".into(),
            message: "if the keychain is unavailable, records are encrypted with a \
                      publicly known fallback key; set to false to fail instead"
                .into(),
        });
    }

    // Judge the raw text: after substitution a placeholder looks like a literal.
    let raw_password = raw
        .get("backup")
        .and_then(|b| b.get("password"))
        .and_then(toml::Value::as_str);
    if let Some(password) = raw_password
        && !is_placeholder(password)
    {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "security",
            path: "backup.password".into(),
            message: "backup password stored in plain text; \
                      use \"${SOLACE_BACKUP_PASSWORD}\" instead"
                .into(),
        });
    }
}
