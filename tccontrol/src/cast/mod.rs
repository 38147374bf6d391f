//! Chromecast side of TwitchCast.
//!
//! - [`discovery`] finds devices on the local network via mDNS.
//! - [`connection`] speaks Cast v2 over TLS to one device.
//! - [`manager`] tracks the receiver application state and sends LOAD.
//!
//! The manager only sees the [`CastSession`] and [`CastConnector`] traits, so
//! it can be driven by a real device or by a test double.

pub mod connection;
pub mod discovery;
pub mod manager;
pub mod protocol;

use std::time::Duration;

use serde_json::Value;

use crate::errors::TwitchCastError;
use crate::model::DeviceTarget;

pub use connection::{TlsCastConnector, TlsCastSession};
pub use discovery::DiscoveredChromecast;
pub use manager::{CastSessionManager, CastState};

pub const CAST_NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";
pub const CAST_NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";
pub const CAST_NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";
pub const CAST_NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";

/// Platform receiver every sender talks to first.
pub const PLATFORM_RECEIVER_ID: &str = "receiver-0";

/// An application running on the receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverApp {
    pub app_id: String,
    pub session_id: String,
    pub transport_id: String,
}

/// One open connection to a Chromecast.
pub trait CastSession: Send {
    /// Application currently running on the device, if any.
    ///
    /// Waits at most `wait` for the device to answer; a status that does not
    /// arrive in time reads as `Ok(None)`.
    fn running_app(&mut self, wait: Duration) -> Result<Option<ReceiverApp>, TwitchCastError>;

    /// Asks the device to start `app_id`; does not wait for it.
    fn launch_app(&mut self, app_id: &str) -> Result<(), TwitchCastError>;

    /// Sends `payload` on the media namespace of an application transport.
    fn send_media_message(
        &mut self,
        transport_id: &str,
        payload: &Value,
    ) -> Result<(), TwitchCastError>;
}

/// Opens sessions to a [`DeviceTarget`].
pub trait CastConnector: Send + Sync {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn CastSession>, TwitchCastError>;
}
