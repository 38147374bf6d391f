//! # tccontrol - TwitchCast Chromecast controller
//!
//! Streams a Twitch channel to a Chromecast running the TwitchCast receiver
//! app. The stream URL comes from the TwitchCast relay (token, then playlist
//! on the lowest-latency relay location); the title and logo come from the
//! Twitch API.
//!
//! ```no_run
//! use tccontrol::{ControllerConfig, DeviceTarget, Layout, TwitchCastController};
//!
//! let controller = TwitchCastController::new(
//!     DeviceTarget::Name("Living Room".to_string()),
//!     ControllerConfig::default(),
//! );
//! controller.setup();
//! controller.stream_channel("somechannel", Layout::Right);
//! ```

pub mod cast;
pub mod config_ext;
pub mod controller;
pub mod errors;
pub mod http;
pub mod location;
pub mod metadata_client;
pub mod model;
pub mod relay_client;

pub use cast::{CastConnector, CastSession, CastSessionManager, CastState, ReceiverApp};
pub use config_ext::{ControllerConfig, TwitchCastConfigExt};
pub use controller::TwitchCastController;
pub use errors::TwitchCastError;
pub use http::HttpFetcher;
pub use location::LocationSelector;
pub use metadata_client::ChannelMetadataClient;
pub use model::{ChannelMetadata, ContentDescriptor, DeviceTarget, Layout, LoadRequest, StreamRequest};
pub use relay_client::RelayClient;
