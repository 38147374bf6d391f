use thiserror::Error;

#[derive(Error, Debug)]
pub enum TwitchCastError {
    #[error("No Chromecast host or name configured")]
    NoDeviceConfigured,
    #[error("Cannot find Chromecast {0}")]
    DeviceNotFound(String),
    #[error("No relay location responded")]
    LocationUnavailable,
    #[error("Could not resolve token and signature for {0}")]
    TokenResolutionFailed(String),
    #[error("Could not resolve playlist for {0}")]
    PlaylistResolutionFailed(String),
    #[error("Timed out after {0:?} waiting for receiver app {1}")]
    AppLaunchTimeout(std::time::Duration, String),
    // Never aborts a stream: the metadata client falls back to defaults.
    #[error("Channel metadata unavailable for {0}")]
    MetadataUnavailable(String),
    #[error("Invalid layout {0:?}, expected one of right, left, top, bottom")]
    InvalidLayout(String),
    #[error("Channel name must not be empty")]
    EmptyChannel,
    #[error("HTTP Error: {0}")]
    Http(String),
    #[error("Cast transport Error: {0}")]
    CastTransport(String),
    #[error("Cast protocol Error: {0}")]
    CastProtocol(#[from] crate::cast::protocol::ProtocolError),
    #[error("Discovery Error: {0}")]
    Discovery(String),
    #[error("Failed to acquire controller state lock: {0}")]
    StateLock(String),
}

impl TwitchCastError {
    pub fn cast_transport(message: impl std::fmt::Display) -> Self {
        TwitchCastError::CastTransport(message.to_string())
    }

    pub fn http(message: impl std::fmt::Display) -> Self {
        TwitchCastError::Http(message.to_string())
    }

    /// Whether the cached cast session is unusable after this error.
    pub fn drops_session(&self) -> bool {
        matches!(
            self,
            TwitchCastError::CastTransport(_) | TwitchCastError::CastProtocol(_)
        )
    }
}
