//! Cast v2 session over TLS.
//!
//! Chromecasts present self-signed device certificates, so the TLS layer
//! accepts any certificate and handshake signature.

use std::collections::HashSet;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::discovery::find_chromecast;
use super::protocol::{take_frame, CastFrame};
use super::{
    CastConnector, CastSession, ReceiverApp, CAST_NAMESPACE_CONNECTION, CAST_NAMESPACE_HEARTBEAT,
    CAST_NAMESPACE_MEDIA, CAST_NAMESPACE_RECEIVER, PLATFORM_RECEIVER_ID,
};
use crate::errors::TwitchCastError;
use crate::model::DeviceTarget;

const SENDER_ID: &str = "sender-twitchcast";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

/// Accepts whatever the device presents.
///
/// Chromecast certificates are self-signed device certificates, so neither
/// the chain nor the handshake signatures can be checked against a root.
#[derive(Debug)]
struct DeviceCertVerifier;

impl ServerCertVerifier for DeviceCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn tls_config() -> Result<Arc<ClientConfig>, TwitchCastError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(TwitchCastError::cast_transport)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DeviceCertVerifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Extracts the first application from a RECEIVER_STATUS payload.
pub fn parse_receiver_status(payload: &Value) -> Option<Option<ReceiverApp>> {
    if payload.get("type").and_then(Value::as_str) != Some("RECEIVER_STATUS") {
        return None;
    }
    let app = payload
        .pointer("/status/applications")
        .and_then(Value::as_array)
        .and_then(|apps| apps.first())
        .and_then(|app| {
            Some(ReceiverApp {
                app_id: app.get("appId")?.as_str()?.to_string(),
                session_id: app.get("sessionId")?.as_str()?.to_string(),
                transport_id: app.get("transportId")?.as_str()?.to_string(),
            })
        });
    Some(app)
}

/// Live connection to one Chromecast.
pub struct TlsCastSession {
    stream: StreamOwned<ClientConnection, TcpStream>,
    inbox: Vec<u8>,
    connected_transports: HashSet<String>,
    next_request_id: i64,
}

impl TlsCastSession {
    pub fn connect(host: &str, port: u16) -> Result<Self, TwitchCastError> {
        debug!("Connecting to Chromecast at {}:{}", host, port);

        let address = (host, port)
            .to_socket_addrs()
            .map_err(|e| TwitchCastError::DeviceNotFound(format!("{}:{} ({})", host, port, e)))?
            .next()
            .ok_or_else(|| TwitchCastError::DeviceNotFound(format!("{}:{}", host, port)))?;

        let tcp = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
            .map_err(|e| TwitchCastError::DeviceNotFound(format!("{} ({})", address, e)))?;
        // the handshake runs on the first write and needs the longer timeout
        tcp.set_read_timeout(Some(CONNECT_TIMEOUT))
            .map_err(TwitchCastError::cast_transport)?;
        tcp.set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(TwitchCastError::cast_transport)?;

        let server_name =
            ServerName::try_from(host.to_string()).map_err(TwitchCastError::cast_transport)?;
        let connection =
            ClientConnection::new(tls_config()?, server_name).map_err(TwitchCastError::cast_transport)?;

        let mut session = Self {
            stream: StreamOwned::new(connection, tcp),
            inbox: Vec::new(),
            connected_transports: HashSet::new(),
            next_request_id: 1,
        };
        session.connect_transport(PLATFORM_RECEIVER_ID)?;
        session
            .stream
            .get_ref()
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(TwitchCastError::cast_transport)?;

        info!("Connected to Chromecast at {}:{}", host, port);
        Ok(session)
    }

    fn alloc_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn send_json(
        &mut self,
        namespace: &str,
        destination_id: &str,
        payload: &Value,
    ) -> Result<(), TwitchCastError> {
        let frame = CastFrame::new(SENDER_ID, destination_id, namespace, &payload.to_string());
        self.stream
            .write_all(&frame.encode()?)
            .and_then(|_| self.stream.flush())
            .map_err(|e| TwitchCastError::cast_transport(format!("failed to send frame: {}", e)))
    }

    fn connect_transport(&mut self, transport_id: &str) -> Result<(), TwitchCastError> {
        if self.connected_transports.contains(transport_id) {
            return Ok(());
        }
        self.send_json(
            CAST_NAMESPACE_CONNECTION,
            transport_id,
            &json!({"type": "CONNECT", "origin": {}}),
        )?;
        self.connected_transports.insert(transport_id.to_string());
        Ok(())
    }

    /// Next frame that is not a heartbeat or connection notice, if one arrives
    /// before the socket read timeout.
    fn poll_frame(&mut self) -> Result<Option<CastFrame>, TwitchCastError> {
        loop {
            while let Some(frame) = take_frame(&mut self.inbox)? {
                if !self.handle_control_frame(&frame)? {
                    return Ok(Some(frame));
                }
            }

            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TwitchCastError::cast_transport("connection closed by device")),
                Ok(n) => self.inbox.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) => {
                    return Err(TwitchCastError::cast_transport(format!(
                        "failed to read frame: {}",
                        e
                    )))
                }
            }
        }
    }

    /// Answers PINGs and tracks CLOSEs; returns true when the frame was consumed.
    fn handle_control_frame(&mut self, frame: &CastFrame) -> Result<bool, TwitchCastError> {
        match frame.namespace.as_str() {
            CAST_NAMESPACE_HEARTBEAT => {
                let payload: Value = serde_json::from_str(&frame.payload).unwrap_or(Value::Null);
                if payload.get("type").and_then(Value::as_str) == Some("PING") {
                    let source = frame.source_id.clone();
                    self.send_json(CAST_NAMESPACE_HEARTBEAT, &source, &json!({"type": "PONG"}))?;
                }
                Ok(true)
            }
            CAST_NAMESPACE_CONNECTION => {
                debug!("transport {} closed the virtual connection", frame.source_id);
                self.connected_transports.remove(&frame.source_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl CastSession for TlsCastSession {
    fn running_app(&mut self, wait: Duration) -> Result<Option<ReceiverApp>, TwitchCastError> {
        let request_id = self.alloc_request_id();
        self.send_json(
            CAST_NAMESPACE_RECEIVER,
            PLATFORM_RECEIVER_ID,
            &json!({"type": "GET_STATUS", "requestId": request_id}),
        )?;

        let wait = wait.min(STATUS_TIMEOUT);
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            // a socket read must not outlast the caller's deadline
            self.stream
                .get_ref()
                .set_read_timeout(Some(remaining.min(READ_TIMEOUT)))
                .map_err(TwitchCastError::cast_transport)?;
            let Some(frame) = self.poll_frame()? else {
                continue;
            };
            if frame.namespace != CAST_NAMESPACE_RECEIVER {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<Value>(&frame.payload) else {
                continue;
            };
            if let Some(app) = parse_receiver_status(&payload) {
                return Ok(app);
            }
        }
        debug!("no receiver status within {:?}", wait);
        Ok(None)
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), TwitchCastError> {
        debug!("Launching receiver app {}", app_id);
        let request_id = self.alloc_request_id();
        self.send_json(
            CAST_NAMESPACE_RECEIVER,
            PLATFORM_RECEIVER_ID,
            &json!({"type": "LAUNCH", "appId": app_id, "requestId": request_id}),
        )
    }

    fn send_media_message(
        &mut self,
        transport_id: &str,
        payload: &Value,
    ) -> Result<(), TwitchCastError> {
        self.connect_transport(transport_id)?;
        let mut payload = payload.clone();
        if let Value::Object(map) = &mut payload {
            let request_id = self.alloc_request_id();
            map.entry("requestId").or_insert(json!(request_id));
        } else {
            warn!("media payload is not a JSON object, sending as is");
        }
        self.send_json(CAST_NAMESPACE_MEDIA, transport_id, &payload)
    }
}

/// Connects to real devices, discovering them by name when needed.
#[derive(Clone, Debug)]
pub struct TlsCastConnector {
    discovery_timeout: Duration,
}

impl TlsCastConnector {
    pub fn new(discovery_timeout: Duration) -> Self {
        Self { discovery_timeout }
    }
}

impl CastConnector for TlsCastConnector {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn CastSession>, TwitchCastError> {
        let session = match target {
            DeviceTarget::Host { host, port } => TlsCastSession::connect(host, *port)?,
            DeviceTarget::Name(name) => {
                let device = find_chromecast(name, self.discovery_timeout)?
                    .ok_or_else(|| TwitchCastError::DeviceNotFound(name.clone()))?;
                TlsCastSession::connect(&device.host, device.port)?
            }
        };
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_verifier_accepts_unparsable_certificates() {
        let verifier = DeviceCertVerifier;
        let garbage = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02, 0x03]);
        let server_name = ServerName::try_from("192.168.1.20").unwrap();

        assert!(verifier
            .verify_server_cert(&garbage, &[], &server_name, &[], UnixTime::now())
            .is_ok());
        let schemes = verifier.supported_verify_schemes();
        assert!(schemes.contains(&SignatureScheme::RSA_PKCS1_SHA256));
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
        assert!(tls_config().is_ok());
    }

    #[test]
    fn test_parse_receiver_status_with_app() {
        let payload = json!({
            "type": "RECEIVER_STATUS",
            "requestId": 3,
            "status": {
                "applications": [{
                    "appId": "DAC1CD8C",
                    "displayName": "TwitchCast",
                    "sessionId": "abc-123",
                    "transportId": "web-4"
                }],
                "volume": {"level": 1.0, "muted": false}
            }
        });
        assert_eq!(
            parse_receiver_status(&payload),
            Some(Some(ReceiverApp {
                app_id: "DAC1CD8C".to_string(),
                session_id: "abc-123".to_string(),
                transport_id: "web-4".to_string(),
            }))
        );
    }

    #[test]
    fn test_parse_receiver_status_idle_and_other_messages() {
        let idle = json!({"type": "RECEIVER_STATUS", "status": {"volume": {"level": 0.5}}});
        assert_eq!(parse_receiver_status(&idle), Some(None));

        let other = json!({"type": "LAUNCH_ERROR", "reason": "NOT_FOUND"});
        assert_eq!(parse_receiver_status(&other), None);
    }
}
