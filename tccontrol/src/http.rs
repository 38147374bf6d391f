//! Blocking HTTP helpers shared by the relay and metadata clients.

use std::time::{Duration, Instant};

use ureq::Agent;

use crate::errors::TwitchCastError;

/// A fully read HTTP reply, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    /// Time from sending the request to having read the whole body.
    pub elapsed: Duration,
}

impl HttpReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// GET client sending the identifying `User-Agent` on every request.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    agent: Agent,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        Self {
            agent: build_agent(timeout),
            user_agent: user_agent.to_string(),
        }
    }

    /// GETs `url`; only transport failures are errors, non-200 statuses are not.
    pub fn get(&self, url: &str) -> Result<HttpReply, TwitchCastError> {
        let started = Instant::now();
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| TwitchCastError::http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TwitchCastError::http(format!("Failed to read body of {}: {}", url, e)))?;

        Ok(HttpReply {
            status,
            body,
            elapsed: started.elapsed(),
        })
    }
}

/// Strips a `callback(...)` style wrapper by dropping two characters at each end.
///
/// Returns `None` when the body is too short or the cut falls inside a
/// multi-byte character.
pub fn unwrap_jsonp(body: &str) -> Option<&str> {
    if body.len() < 4 {
        return None;
    }
    body.get(2..body.len() - 2)
}

pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_jsonp() {
        let json = r#"{"playlist":[{"url":"http://a"}]}"#;
        assert_eq!(unwrap_jsonp(&format!("?({});", json)), Some(json));
        assert_eq!(unwrap_jsonp("??{}??"), Some("{}"));
    }

    #[test]
    fn test_unwrap_jsonp_roundtrip_various_bodies() {
        for json in [r#"{}"#, r#"[]"#, r#"{"a":[1,2,{"b":"é"}]}"#, r#""text""#, "42"] {
            let wrapped = format!("?({})?", json);
            assert_eq!(unwrap_jsonp(&wrapped), Some(json));
        }
    }

    #[test]
    fn test_unwrap_jsonp_short_or_odd_bodies() {
        assert_eq!(unwrap_jsonp(""), None);
        assert_eq!(unwrap_jsonp("?()"), None);
        assert_eq!(unwrap_jsonp("????"), Some(""));
        // cut lands inside the two-byte "é"
        assert_eq!(unwrap_jsonp("?é{}??"), None);
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("some channel"), "some%20channel");
        assert_eq!(percent_encode("a+b/c=d&e"), "a%2Bb%2Fc%3Dd%26e");
        assert_eq!(percent_encode("plain_name-1.2~"), "plain_name-1.2~");
    }
}
