/// Typed failures from the model backend.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("connection to model backend failed: {0}")]
    Connection(String),

    #[error("model request timed out after {0}s")]
    Timeout(u64),

    #[error("model backend rate limited the request")]
    RateLimit,

    #[error("model backend server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("no model configured for role {0}")]
    UnknownRole(String),
}
