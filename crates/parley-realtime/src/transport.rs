use crate::RealtimeError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const DEFAULT_REALTIME_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";
pub const REALTIME_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "realtime=v1");

/// Everything needed to open one duplex connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectRequest {
    pub url: String,
    pub api_key: String,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Option<Duration>,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            headers: vec![(
                REALTIME_BETA_HEADER.0.to_string(),
                REALTIME_BETA_HEADER.1.to_string(),
            )],
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bearer credential first, then the extra headers in order.
    pub fn all_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        ));
        headers.extend(self.headers.iter().cloned());
        headers
    }
}

/// One ordered, message-oriented duplex connection carrying JSON text frames.
#[async_trait]
pub trait RealtimeTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError>;

    /// `Ok(None)` means the remote side closed the stream.
    async fn next_text(&mut self) -> Result<Option<String>, RealtimeError>;

    async fn close(&mut self) -> Result<(), RealtimeError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RealtimeTransport>, RealtimeError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn RealtimeTransport>, RealtimeError> {
        let mut client_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|error| RealtimeError::InvalidRequest(error.to_string()))?;
        for (name, value) in request.all_headers() {
            let header_value = HeaderValue::from_str(&value).map_err(|error| {
                RealtimeError::InvalidRequest(format!("header '{name}': {error}"))
            })?;
            let header_name = tokio_tungstenite::tungstenite::http::HeaderName::from_bytes(
                name.as_bytes(),
            )
            .map_err(|error| RealtimeError::InvalidRequest(format!("header '{name}': {error}")))?;
            client_request.headers_mut().insert(header_name, header_value);
        }

        let connecting = tokio_tungstenite::connect_async(client_request);
        let connected = match request.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| {
                RealtimeError::TimedOut {
                    waiting_for: "websocket handshake",
                    waited_ms: limit.as_millis(),
                }
            })?,
            None => connecting.await,
        };
        let (stream, response) =
            connected.map_err(|error| RealtimeError::Connection(error.to_string()))?;
        tracing::info!(status = %response.status(), "realtime websocket connected");

        Ok(Box::new(WebSocketTransport {
            stream,
            closed: false,
        }))
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError> {
        if self.closed {
            return Err(RealtimeError::ConnectionClosed);
        }
        self.stream
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|error| RealtimeError::Connection(error.to_string()))
    }

    async fn next_text(&mut self) -> Result<Option<String>, RealtimeError> {
        if self.closed {
            return Ok(None);
        }
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => return Ok(Some(text.to_string())),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => {
                        tracing::warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                    }
                },
                Ok(WsMessage::Close(frame)) => {
                    tracing::info!(?frame, "realtime endpoint closed the connection");
                    self.closed = true;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(error) => {
                    self.closed = true;
                    return Err(RealtimeError::Connection(error.to_string()));
                }
            }
        }
        self.closed = true;
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|error| RealtimeError::Connection(error.to_string()))
    }
}
