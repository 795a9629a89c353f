//! Network-layer error types.

/// Errors that can occur while encoding frames or talking to NATS.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a frame or payload.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a frame or payload.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// NATS subscription error.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// NATS flush error.
    #[error("NATS flush error: {0}")]
    Flush(String),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),
}
