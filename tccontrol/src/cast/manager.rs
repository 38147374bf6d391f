//! Receiver application state machine for one Chromecast.
//!
//! ```text
//! Disconnected --connect--> Connected --launch--> AppLaunching --poll--> AppReady
//! ```
//!
//! Any transport failure drops the session and returns to `Disconnected`.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{CastConnector, CastSession, ReceiverApp};
use crate::errors::TwitchCastError;
use crate::model::{DeviceTarget, LoadRequest};

/// Five checks per second while waiting for the receiver app.
pub const APP_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CastState {
    Disconnected,
    Connected,
    AppLaunching,
    AppReady(ReceiverApp),
}

pub struct CastSessionManager {
    target: DeviceTarget,
    connector: Arc<dyn CastConnector>,
    session: Option<Box<dyn CastSession>>,
    state: CastState,
    app_id: String,
    launch_timeout: Duration,
    poll_interval: Duration,
}

impl CastSessionManager {
    pub fn new(
        target: DeviceTarget,
        connector: Arc<dyn CastConnector>,
        app_id: &str,
        launch_timeout: Duration,
    ) -> Self {
        Self {
            target,
            connector,
            session: None,
            state: CastState::Disconnected,
            app_id: app_id.to_string(),
            launch_timeout,
            poll_interval: APP_POLL_INTERVAL,
        }
    }

    /// Overrides the readiness poll cadence.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn state(&self) -> &CastState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Opens the session if there is none; a no-op otherwise.
    pub fn connect(&mut self) -> Result<(), TwitchCastError> {
        if self.session.is_some() {
            return Ok(());
        }
        match self.connector.connect(&self.target) {
            Ok(session) => {
                info!("connected to Chromecast {}", self.target);
                self.session = Some(session);
                self.state = CastState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("cannot find {}: {}", self.target, e);
                self.state = CastState::Disconnected;
                Err(e)
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            debug!("dropping Chromecast session for {}", self.target);
        }
        self.state = CastState::Disconnected;
    }

    /// Runs `op` on the session, dropping it if the transport failed.
    fn with_session<T>(
        &mut self,
        op: impl FnOnce(&mut dyn CastSession) -> Result<T, TwitchCastError>,
    ) -> Result<T, TwitchCastError> {
        let session = self
            .session
            .as_deref_mut()
            .ok_or_else(|| TwitchCastError::cast_transport("not connected"))?;
        let result = op(session);
        if let Err(e) = &result {
            if e.drops_session() {
                warn!("Chromecast session lost: {}", e);
                self.disconnect();
            }
        }
        result
    }

    fn matching_app(&mut self, wait: Duration) -> Result<Option<ReceiverApp>, TwitchCastError> {
        let app_id = self.app_id.clone();
        let running = self.with_session(|session| session.running_app(wait))?;
        Ok(running.filter(|app| app.app_id == app_id))
    }

    /// First status check, reconnecting once if a reused session went stale.
    fn current_app(
        &mut self,
        reused: bool,
        wait: Duration,
    ) -> Result<Option<ReceiverApp>, TwitchCastError> {
        match self.matching_app(wait) {
            Err(e) if reused && e.drops_session() => {
                info!("reconnecting to Chromecast {} after: {}", self.target, e);
                self.connect()?;
                self.matching_app(wait)
            }
            other => other,
        }
    }

    /// Makes sure the TwitchCast receiver is running, launching it if needed.
    ///
    /// Gives up once the launch timeout has elapsed, status checks included.
    pub fn ensure_app_ready(&mut self) -> Result<ReceiverApp, TwitchCastError> {
        let reused = self.session.is_some();
        self.connect()?;

        let deadline = Instant::now() + self.launch_timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        if let Some(app) = self.current_app(reused, remaining())? {
            self.state = CastState::AppReady(app.clone());
            return Ok(app);
        }

        let app_id = self.app_id.clone();
        self.with_session(|session| session.launch_app(&app_id))?;
        self.state = CastState::AppLaunching;

        loop {
            let left = remaining();
            if left.is_zero() {
                break;
            }
            thread::sleep(self.poll_interval.min(left));
            let left = remaining();
            if left.is_zero() {
                break;
            }
            if let Some(app) = self.matching_app(left)? {
                debug!("receiver app {} ready on {}", app.app_id, app.transport_id);
                self.state = CastState::AppReady(app.clone());
                return Ok(app);
            }
        }

        self.state = CastState::Connected;
        Err(TwitchCastError::AppLaunchTimeout(
            self.launch_timeout,
            self.app_id.clone(),
        ))
    }

    /// Sends LOAD to a ready receiver app. No reply is awaited.
    pub fn send_load(&mut self, app: &ReceiverApp, load: &LoadRequest) -> Result<(), TwitchCastError> {
        if self.state != CastState::AppReady(app.clone()) {
            return Err(TwitchCastError::cast_transport(
                "receiver app is not confirmed ready",
            ));
        }
        let payload = serde_json::to_value(load)
            .map_err(|e| TwitchCastError::cast_transport(format!("cannot encode LOAD: {}", e)))?;
        debug!("sending chromecast message {}", payload);
        let transport_id = app.transport_id.clone();
        self.with_session(|session| session.send_media_message(&transport_id, &payload))
    }
}
