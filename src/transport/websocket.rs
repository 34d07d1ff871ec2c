//! WebSocket transport
//!
//! Blocking `tungstenite` client over a `TcpStream` with read and write
//! timeouts. `wss://` URLs are wrapped in TLS via native-tls. Credentials
//! ride on the upgrade request as `x-project-id` / `x-project-secret`
//! headers in addition to the handshake frame.

use super::{Frame, Reply, Transport};
use crate::core::{Result, ShipperConfig, ShipperError};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

const MIN_IO_TIMEOUT: Duration = Duration::from_millis(1);

/// WebSocket link to the collector
///
/// # Example
///
/// ```no_run
/// use rust_log_shipper::transport::{Transport, WebSocketTransport};
/// use rust_log_shipper::ShipperConfig;
/// use std::time::Duration;
///
/// let config = ShipperConfig::builder()
///     .credentials("project", "secret")
///     .server_url("ws://127.0.0.1:8765/v1/logs")
///     .build();
///
/// let mut transport = WebSocketTransport::from_config(&config).unwrap();
/// transport.connect(Duration::from_secs(5)).unwrap();
/// ```
pub struct WebSocketTransport {
    url: Url,
    project_id: Option<String>,
    project_secret: Option<String>,
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    /// Clone of the underlying socket, for adjusting timeouts under TLS
    raw: Option<TcpStream>,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            project_id: None,
            project_secret: None,
            socket: None,
            raw: None,
        }
    }

    pub fn from_config(config: &ShipperConfig) -> Result<Self> {
        let mut transport = Self::new(config.parsed_server_url()?);
        transport.project_id = config.project_id.clone();
        transport.project_secret = config.project_secret.clone();
        Ok(transport)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn open_stream(&self, timeout: Duration) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self
            .url
            .socket_addrs(|| None)
            .map_err(|e| ShipperError::transport("resolve", e))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout.max(MIN_IO_TIMEOUT)) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => ShipperError::transport("connect", e),
            None => ShipperError::transport("resolve", format!("no address for {}", self.url)),
        })
    }

    fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        if let Some(ref raw) = self.raw {
            raw.set_read_timeout(Some(timeout.max(MIN_IO_TIMEOUT)))?;
        }
        Ok(())
    }

    fn header(value: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(value)
            .map_err(|e| ShipperError::config("credentials", e.to_string()))
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, timeout: Duration) -> Result<()> {
        self.close();

        let stream = self.open_stream(timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout.max(MIN_IO_TIMEOUT)))?;
        stream.set_write_timeout(Some(timeout.max(MIN_IO_TIMEOUT)))?;
        let raw = stream.try_clone()?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ShipperError::transport("upgrade", e))?;
        if let (Some(id), Some(secret)) = (&self.project_id, &self.project_secret) {
            let headers = request.headers_mut();
            headers.insert("x-project-id", Self::header(id)?);
            headers.insert("x-project-secret", Self::header(secret)?);
        }

        let (socket, _response) = tungstenite::client_tls(request, stream)
            .map_err(|e| ShipperError::transport("upgrade", e))?;

        self.socket = Some(socket);
        self.raw = Some(raw);
        Ok(())
    }

    fn send(&mut self, frame: &Frame<'_>) -> Result<()> {
        let message = match frame {
            Frame::Heartbeat => Message::Ping(Vec::new()),
            other => Message::Text(other.encode()?),
        };

        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| ShipperError::transport("send", "not connected"))?;
        socket
            .send(message)
            .map_err(|e| ShipperError::transport("send", e))
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Reply>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.set_read_timeout(remaining)?;

            let socket = self
                .socket
                .as_mut()
                .ok_or_else(|| ShipperError::transport("recv", "not connected"))?;

            match socket.read() {
                Ok(Message::Text(text)) => return Reply::decode(&text).map(Some),
                Ok(Message::Pong(_)) => return Ok(Some(Reply::Pong)),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by collector".to_string());
                    return Err(ShipperError::transport("recv", reason));
                }
                // Pings are answered by tungstenite on the next write
                Ok(Message::Ping(_)) | Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => continue,
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(ShipperError::transport("recv", e)),
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        self.raw = None;
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
