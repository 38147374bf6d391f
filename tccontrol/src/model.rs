use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::TwitchCastError;

/// Chat overlay position understood by the TwitchCast receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Layout {
    #[default]
    Right,
    Left,
    Top,
    Bottom,
}

impl Layout {
    pub const ALL: [Layout; 4] = [Layout::Right, Layout::Left, Layout::Top, Layout::Bottom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Right => "right",
            Layout::Left => "left",
            Layout::Top => "top",
            Layout::Bottom => "bottom",
        }
    }

    /// Value carried in the LOAD `customData`, e.g. `chat-right`.
    pub fn receiver_value(&self) -> String {
        format!("chat-{}", self.as_str())
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = TwitchCastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Layout::ALL
            .into_iter()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| TwitchCastError::InvalidLayout(s.to_string()))
    }
}

/// One stream request: a channel and where to put its chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    channel: String,
    layout: Layout,
}

impl StreamRequest {
    pub fn new(channel: &str, layout: Layout) -> Result<Self, TwitchCastError> {
        let channel = channel.trim();
        if channel.is_empty() {
            return Err(TwitchCastError::EmptyChannel);
        }
        Ok(Self {
            channel: channel.to_string(),
            layout,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// The playable media URL resolved for a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub content_id: String,
}

impl ContentDescriptor {
    /// Wraps a resolved URL; empty URLs mean resolution failed.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            None
        } else {
            Some(Self {
                content_id: url.to_string(),
            })
        }
    }
}

/// A relay server as listed by the population endpoint.
///
/// Fields other than `url` are kept untouched in `extra`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RelayLocation {
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub status: Option<LocationStatus>,
}

impl RelayLocation {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            extra: Map::new(),
            status: None,
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        self.status.as_ref().map(|s| s.latency)
    }
}

/// Result of a successful stats probe.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationStatus {
    pub latency: Duration,
    pub raw: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Cast generic media metadata shown by the receiver.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    pub metadata_type: u8,
    pub title: String,
    pub subtitle: String,
    pub images: Vec<Image>,
}

impl ChannelMetadata {
    /// Fallback used when the platform API gives nothing usable.
    pub fn defaults_for(channel: &str) -> Self {
        Self {
            metadata_type: 1,
            title: channel.to_string(),
            subtitle: channel.to_string(),
            images: Vec::new(),
        }
    }
}

/// Which Chromecast a controller drives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Exact mDNS friendly name.
    Name(String),
    /// Direct address, no discovery.
    Host { host: String, port: u16 },
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Name(name) => write!(f, "{}", name),
            DeviceTarget::Host { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadMedia {
    pub content_id: String,
    pub content_type: String,
    pub stream_type: String,
    pub metadata: ChannelMetadata,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct LoadCustomData {
    pub channel: String,
    pub layout: String,
}

/// Payload of the media-namespace LOAD message.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media: LoadMedia,
    pub media_session_id: Option<i64>,
    pub custom_data: LoadCustomData,
}

impl LoadRequest {
    pub fn new(
        request: &StreamRequest,
        content: &ContentDescriptor,
        metadata: ChannelMetadata,
    ) -> Self {
        Self {
            kind: "LOAD",
            media: LoadMedia {
                content_id: content.content_id.clone(),
                content_type: "video/mp4".to_string(),
                stream_type: "LIVE".to_string(),
                metadata,
            },
            media_session_id: None,
            custom_data: LoadCustomData {
                channel: request.channel().to_string(),
                layout: request.layout().receiver_value(),
            },
        }
    }
}
