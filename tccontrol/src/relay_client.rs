//! Client for the TwitchCast relay service.
//!
//! Every operation swallows failures: problems are logged and reported as an
//! empty result so that the caller decides whether the request can go on.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config_ext::ControllerConfig;
use crate::errors::TwitchCastError;
use crate::http::{percent_encode, unwrap_jsonp, HttpFetcher, HttpReply};
use crate::model::{ContentDescriptor, LocationStatus, RelayLocation};

#[derive(Debug, Deserialize)]
struct TokenReply {
    token: String,
    sig: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistReply {
    playlist: Vec<PlaylistEntry>,
}

#[derive(Clone, Debug)]
pub struct RelayClient {
    http: HttpFetcher,
    base_url: String,
}

impl RelayClient {
    pub fn new(config: &ControllerConfig) -> Self {
        Self::with_fetcher(
            HttpFetcher::new(config.http_timeout, &config.user_agent),
            &config.relay_base_url,
        )
    }

    pub fn with_fetcher(http: HttpFetcher, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Logs transport errors and non-200 replies, keeping only usable bodies.
    fn get_ok(&self, url: &str, what: &str) -> Option<HttpReply> {
        match self.http.get(url) {
            Ok(reply) if reply.is_ok() => Some(reply),
            Ok(reply) => {
                error!("status {} during {}", reply.status, what);
                None
            }
            Err(e) => {
                error!("{} during {}", e, what);
                None
            }
        }
    }

    /// Lists every relay location; empty on any failure.
    pub fn fetch_locations(&self) -> Vec<RelayLocation> {
        let url = format!("{}/pops.json?{}", self.base_url, rand::random::<f64>());
        let Some(reply) = self.get_ok(&url, "populations") else {
            return Vec::new();
        };

        match serde_json::from_str::<Vec<RelayLocation>>(&reply.body) {
            Ok(locations) => {
                debug!("relay lists {} locations", locations.len());
                locations
            }
            Err(e) => {
                error!("error parsing populations: {}", e);
                Vec::new()
            }
        }
    }

    /// Hits `{location}/stats` and records how long the round trip took.
    ///
    /// Returns `None` when the location does not answer with a parsable body.
    pub fn probe_location(&self, mut location: RelayLocation) -> Option<RelayLocation> {
        let url = format!("{}/stats?callback=?", location.url.trim_end_matches('/'));
        let reply = self.get_ok(&url, &format!("stats for {}", location.url))?;

        let raw = unwrap_jsonp(&reply.body)
            .and_then(|inner| serde_json::from_str::<Value>(inner).ok());
        let Some(raw) = raw else {
            warn!("unparsable stats from {}", location.url);
            return None;
        };

        debug!(location = %location.url, latency_ms = reply.elapsed.as_millis() as u64, "probed relay location");
        location.status = Some(LocationStatus {
            latency: reply.elapsed,
            raw,
        });
        Some(location)
    }

    pub fn fetch_token_and_signature(&self, channel: &str) -> Option<(String, String)> {
        let url = format!(
            "{}/token.php?channel={}",
            self.base_url,
            percent_encode(channel)
        );
        let what = format!("token and sig for {}", channel);
        let reply = self.get_ok(&url, &what)?;

        match serde_json::from_str::<TokenReply>(&reply.body) {
            Ok(TokenReply { token, sig }) if !token.is_empty() && !sig.is_empty() => {
                Some((token, sig))
            }
            Ok(_) => {
                error!("empty token or sig for {}", channel);
                None
            }
            Err(e) => {
                error!("error parsing {}: {}", what, e);
                None
            }
        }
    }

    /// First playlist URL served by `location_url` for this channel.
    pub fn fetch_playlist(
        &self,
        location_url: &str,
        channel: &str,
        token: &str,
        sig: &str,
    ) -> Option<String> {
        let url = format!(
            "{}/get/playlist?channel={}&token={}&sig={}&callback=?",
            location_url.trim_end_matches('/'),
            percent_encode(channel),
            percent_encode(token),
            percent_encode(sig)
        );
        let reply = self.get_ok(&url, &format!("playlist for {}", channel))?;

        let parsed = unwrap_jsonp(&reply.body)
            .ok_or_else(|| "body too short".to_string())
            .and_then(|inner| {
                serde_json::from_str::<PlaylistReply>(inner).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(reply) => {
                let first = reply.playlist.into_iter().next().map(|entry| entry.url);
                if first.is_none() {
                    warn!("empty playlist for {}", channel);
                }
                first
            }
            Err(e) => {
                error!("error parsing playlist for {}: {}", channel, e);
                None
            }
        }
    }

    /// Token, then playlist: the playable URL for `channel` right now.
    pub fn resolve_content(
        &self,
        location_url: &str,
        channel: &str,
    ) -> Result<ContentDescriptor, TwitchCastError> {
        debug!("getting content_id for {}", channel);
        let (token, sig) = self
            .fetch_token_and_signature(channel)
            .ok_or_else(|| TwitchCastError::TokenResolutionFailed(channel.to_string()))?;

        self.fetch_playlist(location_url, channel, &token, &sig)
            .and_then(|url| ContentDescriptor::from_url(&url))
            .ok_or_else(|| TwitchCastError::PlaylistResolutionFailed(channel.to_string()))
    }
}
