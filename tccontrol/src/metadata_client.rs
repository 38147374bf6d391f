//! Channel display information from the streaming platform API.

use serde::Deserialize;
use tracing::{debug, error};

use crate::config_ext::ControllerConfig;
use crate::errors::TwitchCastError;
use crate::http::{percent_encode, HttpFetcher};
use crate::model::{ChannelMetadata, Image};

#[derive(Debug, Deserialize)]
struct StreamsReply {
    stream: StreamInfo,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    channel: ChannelInfo,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    display_name: String,
    status: String,
    logo: String,
}

#[derive(Clone, Debug)]
pub struct ChannelMetadataClient {
    http: HttpFetcher,
    api_base: String,
    client_id: String,
}

impl ChannelMetadataClient {
    pub fn new(config: &ControllerConfig) -> Self {
        Self::with_fetcher(
            HttpFetcher::new(config.http_timeout, &config.user_agent),
            &config.metadata_api_base,
            &config.metadata_client_id,
        )
    }

    pub fn with_fetcher(http: HttpFetcher, api_base: &str, client_id: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Title, status and logo for `channel`, or the channel name when unavailable.
    pub fn fetch_metadata(&self, channel: &str) -> ChannelMetadata {
        debug!("getting stream details for {}", channel);
        match self.try_fetch_metadata(channel) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("{}", e);
                ChannelMetadata::defaults_for(channel)
            }
        }
    }

    fn try_fetch_metadata(&self, channel: &str) -> Result<ChannelMetadata, TwitchCastError> {
        let unavailable =
            |reason: String| TwitchCastError::MetadataUnavailable(format!("{} ({})", channel, reason));

        let url = format!(
            "{}/streams/{}?client_id={}",
            self.api_base,
            percent_encode(channel),
            percent_encode(&self.client_id)
        );
        let reply = self.http.get(&url).map_err(|e| unavailable(e.to_string()))?;
        if !reply.is_ok() {
            return Err(unavailable(format!("status {}", reply.status)));
        }

        let parsed: StreamsReply =
            serde_json::from_str(&reply.body).map_err(|e| unavailable(e.to_string()))?;
        let info = parsed.stream.channel;

        let mut metadata = ChannelMetadata::defaults_for(channel);
        metadata.title = info.display_name;
        metadata.subtitle = info.status;
        metadata.images.push(Image {
            url: info.logo,
            width: 0,
            height: 0,
        });
        Ok(metadata)
    }
}
