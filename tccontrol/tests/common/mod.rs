//! Shared fixtures: a recording Chromecast double and mock relay wiring.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tccontrol::{
    CastConnector, CastSession, ControllerConfig, DeviceTarget, ReceiverApp, TwitchCastError,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const APP_ID: &str = "DAC1CD8C";
pub const USER_AGENT: &str = concat!("TwitchCast-Service ", env!("CARGO_PKG_VERSION"));
pub const PLAYLIST_URL: &str = "http://video.example/hls/somechannel.m3u8";

/// Everything the fake Chromecast saw.
#[derive(Debug, Default)]
pub struct Recording {
    pub connects: usize,
    pub launches: Vec<String>,
    pub media_messages: Vec<(String, Value)>,
    pub running: Option<ReceiverApp>,
}

impl Recording {
    pub fn loads(&self) -> Vec<&Value> {
        self.media_messages
            .iter()
            .map(|(_, payload)| payload)
            .filter(|payload| payload["type"] == "LOAD")
            .collect()
    }
}

pub struct RecordingSession {
    recording: Arc<Mutex<Recording>>,
    closed: bool,
}

impl CastSession for RecordingSession {
    fn running_app(&mut self, _wait: Duration) -> Result<Option<ReceiverApp>, TwitchCastError> {
        if self.closed {
            return Err(TwitchCastError::cast_transport("connection closed by device"));
        }
        Ok(self.recording.lock().unwrap().running.clone())
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), TwitchCastError> {
        if self.closed {
            return Err(TwitchCastError::cast_transport("connection closed by device"));
        }
        let mut recording = self.recording.lock().unwrap();
        recording.launches.push(app_id.to_string());
        recording.running = Some(ReceiverApp {
            app_id: app_id.to_string(),
            session_id: "session-1".to_string(),
            transport_id: "web-7".to_string(),
        });
        Ok(())
    }

    fn send_media_message(
        &mut self,
        transport_id: &str,
        payload: &Value,
    ) -> Result<(), TwitchCastError> {
        if self.closed {
            return Err(TwitchCastError::cast_transport("connection closed by device"));
        }
        self.recording
            .lock()
            .unwrap()
            .media_messages
            .push((transport_id.to_string(), payload.clone()));
        Ok(())
    }
}

/// Connector handing out sessions on one shared recording.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    pub recording: Arc<Mutex<Recording>>,
    pub unreachable: bool,
    /// The first session handed out is closed by the device before use.
    pub first_session_stale: bool,
}

impl RecordingConnector {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn stale_first_session() -> Self {
        Self {
            first_session_stale: true,
            ..Default::default()
        }
    }
}

impl CastConnector for RecordingConnector {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn CastSession>, TwitchCastError> {
        if self.unreachable {
            return Err(TwitchCastError::DeviceNotFound(target.to_string()));
        }
        let mut recording = self.recording.lock().unwrap();
        recording.connects += 1;
        let closed = self.first_session_stale && recording.connects == 1;
        Ok(Box::new(RecordingSession {
            recording: self.recording.clone(),
            closed,
        }))
    }
}

pub fn device() -> DeviceTarget {
    DeviceTarget::Name("Living Room".to_string())
}

pub fn test_config(server: &MockServer) -> ControllerConfig {
    ControllerConfig {
        relay_base_url: server.uri(),
        metadata_api_base: format!("{}/kraken", server.uri()),
        http_timeout: Duration::from_secs(5),
        launch_timeout: Duration::from_secs(2),
        ..ControllerConfig::default()
    }
}

pub fn jsonp(value: &Value) -> String {
    format!("?({});", value)
}

pub async fn mount_locations(server: &MockServer, location_paths: &[&str]) {
    let locations: Vec<Value> = location_paths
        .iter()
        .map(|p| json!({ "url": format!("{}{}", server.uri(), p), "name": p }))
        .collect();
    Mock::given(method("GET"))
        .and(header("User-Agent", USER_AGENT))
        .and(path("/pops.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(locations)))
        .mount(server)
        .await;
}

pub async fn mount_stats(server: &MockServer, location_path: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(header("User-Agent", USER_AGENT))
        .and(path(format!("{}/stats", location_path)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(jsonp(&json!({ "viewers": 12 })))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

pub async fn mount_token(server: &MockServer, channel: &str) {
    Mock::given(method("GET"))
        .and(header("User-Agent", USER_AGENT))
        .and(path("/token.php"))
        .and(query_param("channel", channel))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "{\"a\":1}", "sig": "deadbeef" })),
        )
        .mount(server)
        .await;
}

pub async fn mount_playlist(server: &MockServer, location_path: &str, channel: &str) {
    Mock::given(method("GET"))
        .and(header("User-Agent", USER_AGENT))
        .and(path(format!("{}/get/playlist", location_path)))
        .and(query_param("channel", channel))
        .and(query_param("token", "{\"a\":1}"))
        .and(query_param("sig", "deadbeef"))
        .respond_with(ResponseTemplate::new(200).set_body_string(jsonp(&json!({
            "playlist": [
                { "url": PLAYLIST_URL, "quality": "source" },
                { "url": "http://video.example/hls/low.m3u8", "quality": "low" }
            ]
        }))))
        .mount(server)
        .await;
}

pub async fn mount_metadata(server: &MockServer, channel: &str) {
    Mock::given(method("GET"))
        .and(header("User-Agent", USER_AGENT))
        .and(path(format!("/kraken/streams/{}", channel)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stream": {
                "channel": {
                    "display_name": "SomeChannel",
                    "status": "Speedrunning all day",
                    "logo": "http://img.example/logo.png"
                }
            }
        })))
        .mount(server)
        .await;
}
