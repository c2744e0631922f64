//! Bus error types.

/// Errors from publishing or subscribing.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Topic is empty or contains wildcards where a concrete topic is needed
    #[error("invalid topic: {topic:?}")]
    InvalidTopic { topic: String },

    /// Subscription filter is malformed
    #[error("invalid topic filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: &'static str },

    /// Payload could not be encoded
    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// Broker client request queue rejected the request
    #[error("broker client: {0}")]
    Client(#[from] rumqttc::ClientError),
}
