use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected gateway response: {0}")]
    Upstream(String),

    #[error("Page layout mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Value parse error for {field}: {reason}")]
    Parse { field: &'static str, reason: String },

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("State persistence error: {0}")]
    State(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
