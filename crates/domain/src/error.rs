/// Shared error type used across all Axon crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("model {role}: {message}")]
    Model { role: String, message: String },

    #[error("session: {0}")]
    Session(String),

    #[error("tool: {0}")]
    Tool(String),

    #[error("mode transition: {0}")]
    ModeTransition(String),

    #[error("gateway: {0}")]
    Gateway(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
