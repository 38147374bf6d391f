//! Picks the relay location with the lowest measured latency.

use tracing::{debug, info, warn};

use crate::model::RelayLocation;
use crate::relay_client::RelayClient;

pub struct LocationSelector<'a> {
    relay: &'a RelayClient,
}

impl<'a> LocationSelector<'a> {
    pub fn new(relay: &'a RelayClient) -> Self {
        Self { relay }
    }

    /// Probes every known location and returns the URL of the fastest one.
    ///
    /// All locations are probed before choosing; `None` when none answered.
    pub fn select_best_location(&self) -> Option<String> {
        let locations = self.relay.fetch_locations();
        if locations.is_empty() {
            warn!("relay returned no locations");
            return None;
        }

        let total = locations.len();
        let probed: Vec<RelayLocation> = locations
            .into_iter()
            .filter_map(|location| self.relay.probe_location(location))
            .collect();
        debug!("{} of {} relay locations responded", probed.len(), total);

        let best = fastest(&probed)?;
        info!(
            location = %best.url,
            latency_ms = best.latency().map(|l| l.as_millis() as u64).unwrap_or_default(),
            "selected relay location"
        );
        Some(best.url.clone())
    }
}

/// The probed location with the smallest latency; unprobed entries are ignored.
pub fn fastest(locations: &[RelayLocation]) -> Option<&RelayLocation> {
    locations
        .iter()
        .filter_map(|location| location.latency().map(|latency| (latency, location)))
        .min_by_key(|(latency, _)| *latency)
        .map(|(_, location)| location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocationStatus;
    use std::time::Duration;

    fn probed(url: &str, millis: u64) -> RelayLocation {
        let mut location = RelayLocation::new(url);
        location.status = Some(LocationStatus {
            latency: Duration::from_millis(millis),
            raw: serde_json::json!({}),
        });
        location
    }

    #[test]
    fn test_fastest_picks_minimum_latency() {
        let locations = vec![
            probed("http://a", 50),
            probed("http://b", 10),
            probed("http://c", 30),
        ];
        assert_eq!(fastest(&locations).unwrap().url, "http://b");
    }

    #[test]
    fn test_fastest_ignores_unprobed_and_handles_empty() {
        assert!(fastest(&[]).is_none());
        assert!(fastest(&[RelayLocation::new("http://a")]).is_none());

        let locations = vec![RelayLocation::new("http://a"), probed("http://b", 900)];
        assert_eq!(fastest(&locations).unwrap().url, "http://b");
    }
}
