//! Chromecast device discovery via mDNS.
//!
//! Chromecast devices advertise themselves on the `_googlecast._tcp.local`
//! service. Discovery runs for a bounded window on a short-lived async-std
//! executor so callers stay fully blocking.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use futures_util::{pin_mut, stream::StreamExt};
use tracing::{debug, warn};

use crate::errors::TwitchCastError;

const GOOGLECAST_SERVICE: &str = "_googlecast._tcp.local";
const QUERY_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CHROMECAST_PORT: u16 = 8009;

/// Information about a discovered Chromecast device from mDNS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredChromecast {
    pub friendly_name: String,
    pub host: String,
    pub port: u16,
    pub model: Option<String>,
    pub uuid: String,
}

/// Collects every Chromecast answering within `window`.
pub fn discover_chromecasts(window: Duration) -> Result<Vec<DiscoveredChromecast>, TwitchCastError> {
    let found = scan(window, |_| false)?;
    let mut devices: Vec<_> = found.into_values().collect();
    devices.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
    Ok(devices)
}

/// Looks for the device whose friendly name is exactly `name`.
///
/// Returns as soon as it answers, or `None` once `window` has elapsed.
pub fn find_chromecast(
    name: &str,
    window: Duration,
) -> Result<Option<DiscoveredChromecast>, TwitchCastError> {
    let found = scan(window, |device| device.friendly_name == name)?;
    Ok(found.into_values().find(|device| device.friendly_name == name))
}

fn scan<F>(
    window: Duration,
    stop: F,
) -> Result<HashMap<String, DiscoveredChromecast>, TwitchCastError>
where
    F: Fn(&DiscoveredChromecast) -> bool,
{
    let discovery = mdns::discover::all(GOOGLECAST_SERVICE, QUERY_INTERVAL)
        .map_err(|e| TwitchCastError::Discovery(e.to_string()))?;

    let mut found: HashMap<String, DiscoveredChromecast> = HashMap::new();
    let listen = async {
        let stream = discovery.listen();
        pin_mut!(stream);
        while let Some(response) = stream.next().await {
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!("mDNS error during discovery: {}", e);
                    continue;
                }
            };
            if let Some(device) = process_mdns_response(&response) {
                let done = stop(&device);
                found.insert(device.uuid.clone(), device);
                if done {
                    break;
                }
            }
        }
    };

    // The stream never ends on its own; the window elapsing is the normal exit.
    let _ = async_std::task::block_on(async_std::future::timeout(window, listen));
    debug!("mDNS discovery found {} Chromecast(s)", found.len());
    Ok(found)
}

/// Extracts a Chromecast description from one mDNS response.
pub fn process_mdns_response(response: &mdns::Response) -> Option<DiscoveredChromecast> {
    let service_name = response.records().find_map(|r| {
        if let mdns::RecordKind::PTR(ref name) = r.kind {
            Some(name.clone())
        } else {
            None
        }
    })?;

    let addresses: Vec<IpAddr> = response
        .records()
        .filter_map(|r| match r.kind {
            mdns::RecordKind::A(addr) => Some(IpAddr::V4(addr)),
            mdns::RecordKind::AAAA(addr) => Some(IpAddr::V6(addr)),
            _ => None,
        })
        .collect();

    let Some(host) = preferred_host(&addresses) else {
        warn!("No IP address found for Chromecast device: {}", service_name);
        return None;
    };

    let port = response
        .records()
        .find_map(|r| {
            if let mdns::RecordKind::SRV { port, .. } = r.kind {
                Some(port)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_CHROMECAST_PORT);

    let txt_records = parse_txt_records(response.records().filter_map(|r| {
        if let mdns::RecordKind::TXT(ref data) = r.kind {
            Some(data.clone())
        } else {
            None
        }
    }));

    let uuid = txt_records
        .get("id")
        .cloned()
        .unwrap_or_else(|| format!("chromecast-{}-{}", host, port));
    let friendly_name = txt_records
        .get("fn")
        .cloned()
        .unwrap_or_else(|| friendly_name_from_service(&service_name));

    let device = DiscoveredChromecast {
        friendly_name,
        host,
        port,
        model: txt_records.get("md").cloned(),
        uuid,
    };
    debug!(
        "Discovered Chromecast: {} at {}:{} (UUID: {}, Model: {:?})",
        device.friendly_name, device.host, device.port, device.uuid, device.model
    );
    Some(device)
}

/// IPv4 first, then whatever else was advertised.
fn preferred_host(addresses: &[IpAddr]) -> Option<String> {
    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.first())
        .map(|addr| addr.to_string())
}

/// Flattens TXT strings of the form `key=value`.
fn parse_txt_records<I>(records: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    records
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Instance name without the service suffix and the 32-char hex id.
fn friendly_name_from_service(service_name: &str) -> String {
    let instance = service_name
        .split("._googlecast._tcp.local")
        .next()
        .unwrap_or(service_name);
    let name = instance
        .split('-')
        .take_while(|part| part.len() != 32)
        .collect::<Vec<_>>()
        .join("-");
    let name = name.trim();
    if name.is_empty() {
        "Unknown Chromecast".to_string()
    } else {
        name.to_string()
    }
}
