//! Bridge between `tcconfig::Config` and the values the controller needs.
//!
//! The controller never reads configuration on its own: callers build a
//! [`ControllerConfig`] (from a loaded `Config`, or by hand in tests) and pass
//! it in.

use std::time::Duration;

use tcconfig::Config;
use tracing::warn;

use crate::model::{DeviceTarget, Layout};

/// Identifying header sent with every relay and metadata request.
pub fn default_user_agent() -> String {
    format!("TwitchCast-Service {}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub relay_base_url: String,
    pub metadata_api_base: String,
    pub metadata_client_id: String,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub app_id: String,
    pub cast_port: u16,
    pub launch_timeout: Duration,
    pub discovery_timeout: Duration,
    pub default_layout: Layout,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            relay_base_url: tcconfig::DEFAULT_RELAY_BASE_URL.to_string(),
            metadata_api_base: tcconfig::DEFAULT_METADATA_API_BASE.to_string(),
            metadata_client_id: tcconfig::DEFAULT_METADATA_CLIENT_ID.to_string(),
            user_agent: default_user_agent(),
            http_timeout: Duration::from_secs(10),
            app_id: tcconfig::DEFAULT_CAST_APP_ID.to_string(),
            cast_port: tcconfig::DEFAULT_CAST_PORT,
            launch_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(5),
            default_layout: Layout::Right,
        }
    }
}

/// Extension trait reading TwitchCast settings out of `tcconfig::Config`.
pub trait TwitchCastConfigExt {
    /// Builds the controller settings, falling back to defaults on bad values.
    fn controller_config(&self) -> ControllerConfig;

    /// The configured Chromecast; a host takes precedence over a name.
    fn device_target(&self) -> Option<DeviceTarget>;
}

impl TwitchCastConfigExt for Config {
    fn controller_config(&self) -> ControllerConfig {
        let default_layout = self.get_default_layout();
        let default_layout = default_layout.parse().unwrap_or_else(|_| {
            warn!(layout = %default_layout, "Unknown default layout, using right");
            Layout::Right
        });

        ControllerConfig {
            relay_base_url: self.get_relay_base_url().trim_end_matches('/').to_string(),
            metadata_api_base: self.get_metadata_api_base().trim_end_matches('/').to_string(),
            metadata_client_id: self.get_metadata_client_id(),
            user_agent: self.get_user_agent().unwrap_or_else(default_user_agent),
            http_timeout: Duration::from_secs(self.get_http_timeout_secs().max(1)),
            app_id: self.get_cast_app_id(),
            cast_port: self.get_cast_port(),
            launch_timeout: Duration::from_secs(self.get_launch_timeout_secs()),
            discovery_timeout: Duration::from_secs(self.get_discovery_timeout_secs().max(1)),
            default_layout,
        }
    }

    fn device_target(&self) -> Option<DeviceTarget> {
        if let Some(host) = self.get_device_host() {
            return Some(DeviceTarget::Host {
                host,
                port: self.get_cast_port(),
            });
        }
        self.get_device_name().map(DeviceTarget::Name)
    }
}
