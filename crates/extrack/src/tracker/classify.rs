//! Failure classification for retry decisions.
//!
//! Classification is substring matching over the lowercased error text. The
//! rules are data: the first rule with a matching token decides the category.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category attached to a failed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Llm,
    Timeout,
    Database,
    Pdf,
    Validation,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Llm => "llm",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Database => "database",
            ErrorCategory::Pdf => "pdf",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    /// Whether re-dispatching the failed unit of work may succeed.
    pub recoverable: bool,
}

impl Classification {
    const UNKNOWN: Classification = Classification {
        category: ErrorCategory::Unknown,
        recoverable: false,
    };
}

struct Rule {
    category: ErrorCategory,
    recoverable: bool,
    tokens: &'static [&'static str],
}

/// Ordered classification rules. Order matters: "invalid" would otherwise
/// claim "invalid document" before the pdf rule sees it.
const RULES: &[Rule] = &[
    Rule {
        category: ErrorCategory::Network,
        recoverable: true,
        tokens: &["connection", "network", "dial", "eof", "reset by peer"],
    },
    Rule {
        category: ErrorCategory::Llm,
        recoverable: true,
        tokens: &[
            "inference api",
            "status 429",
            "status 500",
            "status 502",
            "status 503",
            "status 504",
            "http 429",
            "http 500",
            "http 502",
            "http 503",
            "http 504",
            "rate limit",
            "llm",
        ],
    },
    Rule {
        category: ErrorCategory::Timeout,
        recoverable: true,
        tokens: &["timeout", "deadline exceeded", "context deadline"],
    },
    Rule {
        category: ErrorCategory::Database,
        recoverable: false,
        tokens: &["database", "transaction", "sql", "sea_orm"],
    },
    Rule {
        category: ErrorCategory::Pdf,
        recoverable: false,
        tokens: &["pdf", "extract text", "invalid document"],
    },
    Rule {
        category: ErrorCategory::Validation,
        recoverable: false,
        tokens: &["validation", "invalid", "required"],
    },
];

/// Classifies an error message.
pub fn classify_message(message: &str) -> Classification {
    let lowered = message.to_lowercase();

    RULES
        .iter()
        .find(|rule| rule.tokens.iter().any(|token| lowered.contains(token)))
        .map(|rule| Classification {
            category: rule.category,
            recoverable: rule.recoverable,
        })
        .unwrap_or(Classification::UNKNOWN)
}

/// Classifies an optional error by its display text. `None` yields an
/// unrecoverable [`ErrorCategory::Unknown`].
pub fn classify_error(err: Option<&dyn fmt::Display>) -> Classification {
    match err {
        Some(err) => classify_message(&err.to_string()),
        None => Classification::UNKNOWN,
    }
}

/// Classifies an error using its full source chain, so a wrapped I/O cause
/// is visible even when the outer message is generic.
pub fn classify_error_chain(err: &(dyn std::error::Error + 'static)) -> Classification {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    classify_message(&text)
}
