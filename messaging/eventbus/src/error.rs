#[derive(thiserror::Error, Debug)]
pub enum EventBusError {
    #[error("broker connect failed: {0}")]
    Connect(String),

    #[error("topology declaration rejected: {0}")]
    Declare(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
