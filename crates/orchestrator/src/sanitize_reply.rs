//! User-facing failure replies, built on the tool layer's sanitizer.

use axon_tools::sanitize;

/// Canned category reply for an internal error message.
pub fn for_error(message: &str) -> String {
    sanitize::user_reply(sanitize::categorize(message)).to_string()
}

/// Scrubbed (path/address/line-free) version of an internal message, for
/// event fields.
pub fn scrubbed(message: &str) -> String {
    sanitize::scrub(message)
}
