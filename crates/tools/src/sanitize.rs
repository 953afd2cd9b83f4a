//! Error sanitization for user-visible failures.
//!
//! Scrubs absolute paths, hex addresses and source line references, and
//! maps errors onto a small category set with canned user-facing replies.

use regex::Regex;
use std::sync::OnceLock;

/// Error category inferred by substring match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    Timeout,
    Permission,
    Validation,
    NotFound,
    RateLimit,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Connection => "connection",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/[^\s]+").expect("path regex"))
}

fn addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").expect("address regex"))
}

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"line \d+").expect("line regex"))
}

/// Strip absolute paths, memory addresses and line references.
pub fn scrub(message: &str) -> String {
    let scrubbed = path_re().replace_all(message, "[path]");
    let scrubbed = addr_re().replace_all(&scrubbed, "[address]");
    line_re().replace_all(&scrubbed, "[line]").into_owned()
}

/// Categorize an error by its message (case-insensitive substring match).
pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("connection") || lower.contains("connect") {
        ErrorCategory::Connection
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCategory::Timeout
    } else if lower.contains("permission") || lower.contains("denied") {
        ErrorCategory::Permission
    } else if lower.contains("validation") || lower.contains("invalid") {
        ErrorCategory::Validation
    } else if lower.contains("not found") {
        ErrorCategory::NotFound
    } else if lower.contains("rate limit") {
        ErrorCategory::RateLimit
    } else if lower.contains("config") {
        ErrorCategory::Configuration
    } else {
        ErrorCategory::Unknown
    }
}

/// The canned user-facing reply for a category.
pub fn user_reply(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Connection => {
            "Unable to connect to the language model service. Please try again in a moment."
        }
        ErrorCategory::Timeout => {
            "The request took too long to process. Please try again with a simpler request."
        }
        ErrorCategory::Permission => "Permission denied. Please check your configuration.",
        ErrorCategory::Validation => {
            "Invalid request format. Please check your input and try again."
        }
        ErrorCategory::NotFound => "The requested resource was not found.",
        ErrorCategory::RateLimit => "Too many requests. Please wait a moment and try again.",
        ErrorCategory::Configuration => "Service configuration error. Please contact support.",
        ErrorCategory::Unknown => {
            "An error occurred while processing your request. Please try again."
        }
    }
}
