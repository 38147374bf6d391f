//! Hub-facing entry point: one controller per Chromecast.
//!
//! ```text
//! stream_channel
//!   -> ensure_ready        connect + pick relay location (cached)
//!   -> resolve_content     token, then playlist
//!   -> ensure_app_ready    launch receiver app, poll until it runs
//!   -> fetch_metadata      falls back to the channel name
//!   -> send_load
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::cast::{CastConnector, CastSessionManager, TlsCastConnector};
use crate::config_ext::ControllerConfig;
use crate::errors::TwitchCastError;
use crate::location::LocationSelector;
use crate::metadata_client::ChannelMetadataClient;
use crate::model::{ChannelMetadata, DeviceTarget, Layout, LoadRequest, StreamRequest};
use crate::relay_client::RelayClient;

struct ControllerState {
    manager: CastSessionManager,
    selected_location: Option<String>,
    setup_valid: bool,
}

pub struct TwitchCastController {
    state: Mutex<ControllerState>,
    relay: RelayClient,
    metadata: ChannelMetadataClient,
}

impl TwitchCastController {
    /// Controller talking to a real device over TLS.
    pub fn new(target: DeviceTarget, config: ControllerConfig) -> Self {
        let connector = Arc::new(TlsCastConnector::new(config.discovery_timeout));
        Self::with_connector(target, config, connector)
    }

    pub fn with_connector(
        target: DeviceTarget,
        config: ControllerConfig,
        connector: Arc<dyn CastConnector>,
    ) -> Self {
        let manager =
            CastSessionManager::new(target, connector, &config.app_id, config.launch_timeout);
        Self::with_parts(
            manager,
            RelayClient::new(&config),
            ChannelMetadataClient::new(&config),
        )
    }

    /// Assembles a controller from already built collaborators.
    pub fn with_parts(
        manager: CastSessionManager,
        relay: RelayClient,
        metadata: ChannelMetadataClient,
    ) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                manager,
                selected_location: None,
                setup_valid: false,
            }),
            relay,
            metadata,
        }
    }

    /// Currently cached relay location, if one was selected.
    pub fn selected_location(&self) -> Option<String> {
        self.lock_state()
            .ok()
            .and_then(|state| state.selected_location.clone())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>, TwitchCastError> {
        self.state
            .lock()
            .map_err(|e| TwitchCastError::StateLock(e.to_string()))
    }

    /// Eager setup, as done once at startup. Outcome is only logged.
    pub fn setup(&self) {
        match self.ensure_ready() {
            Ok(()) => info!("TwitchCast controller ready"),
            Err(e) => warn!("TwitchCast setup incomplete: {}", e),
        }
    }

    /// Connects the Chromecast and picks a relay location if either is missing.
    pub fn ensure_ready(&self) -> Result<(), TwitchCastError> {
        let mut state = self.lock_state()?;
        self.ensure_ready_locked(&mut state)
    }

    fn ensure_ready_locked(&self, state: &mut ControllerState) -> Result<(), TwitchCastError> {
        if state.setup_valid && state.manager.is_connected() && state.selected_location.is_some()
        {
            return Ok(());
        }
        state.setup_valid = false;

        state.manager.connect()?;

        if state.selected_location.is_none() {
            state.selected_location = LocationSelector::new(&self.relay).select_best_location();
        }
        if state.selected_location.is_none() {
            error!("no relay location available");
            return Err(TwitchCastError::LocationUnavailable);
        }

        state.setup_valid = true;
        Ok(())
    }

    /// Streams `channel` to the Chromecast. Failures are logged, never returned.
    pub fn stream_channel(&self, channel: &str, layout: Layout) {
        if let Err(e) = self.try_stream_channel(channel, layout) {
            warn!("could not stream {}: {}", channel, e);
        }
    }

    /// Same pipeline as [`stream_channel`](Self::stream_channel), reporting the failure.
    pub fn try_stream_channel(&self, channel: &str, layout: Layout) -> Result<(), TwitchCastError> {
        let request = StreamRequest::new(channel, layout)?;
        let mut state = self.lock_state()?;

        self.ensure_ready_locked(&mut state)?;
        let location = state
            .selected_location
            .clone()
            .ok_or(TwitchCastError::LocationUnavailable)?;

        info!("trying to stream {} - {}", request.channel(), request.layout());
        let content = self
            .relay
            .resolve_content(&location, request.channel())
            .inspect_err(|_| warn!("couldn't get content_id for {}", request.channel()))?;
        debug!("content_id for {} is {}", request.channel(), content.content_id);

        let app = match state.manager.ensure_app_ready() {
            Ok(app) => app,
            Err(e @ TwitchCastError::AppLaunchTimeout(..)) => {
                error!("timed out waiting on chromecast");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let metadata = self.metadata.fetch_metadata(request.channel());
        let load = LoadRequest::new(&request, &content, metadata);
        state.manager.send_load(&app, &load)?;
        info!("streaming {} on {}", request.channel(), state.manager.target());
        Ok(())
    }

    pub fn channel_details(&self, channel: &str) -> ChannelMetadata {
        self.metadata.fetch_metadata(channel)
    }
}
