//! ChatDev backend: WebSocket sessions and HTTP health probe.

use async_trait::async_trait;
use autoforge_config::BackendConfig;
use autoforge_core::backend::{BuildBackend, SessionChannel};
use autoforge_core::event::{BackendEvent, OutboundMessage};
use autoforge_core::{Error, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for a ChatDev server.
pub struct ChatDevBackend {
    ws_url: Url,
    health_url: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

impl ChatDevBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.health_timeout)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            ws_url: ws_url(&config.base_url)?,
            health_url: endpoint(&config.base_url, "health"),
            client,
        })
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

/// `http(s)://host/base` -> `ws(s)://host/base/ws`
fn ws_url(base: &Url) -> Result<Url> {
    let mut url = endpoint(base, "ws");
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::InvalidInput(format!(
                "unsupported backend scheme: {}",
                other
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::InvalidInput(format!("cannot use {} with {}", scheme, base)))?;
    Ok(url)
}

fn endpoint(base: &Url, segment: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}/{}", base.path().trim_end_matches('/'), segment);
    url.set_path(&path);
    url
}

#[async_trait]
impl BuildBackend for ChatDevBackend {
    fn name(&self) -> &'static str {
        "chatdev"
    }

    async fn connect(&self) -> Result<Box<dyn SessionChannel>> {
        debug!(url = %self.ws_url, "Connecting to backend");
        let (stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| Error::Unavailable(format!("WebSocket connect: {}", e)))?;
        Ok(Box::new(WebSocketChannel::new(stream)))
    }

    async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("health request: {}", e)))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Backend health endpoint returned an error");
            return Ok(false);
        }

        let body: HealthResponse = response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("health response: {}", e)))?;
        Ok(body.status == "healthy")
    }
}

/// One backend session over a WebSocket.
pub struct WebSocketChannel {
    stream: WsStream,
    closed: bool,
    peer_closed: bool,
}

impl WebSocketChannel {
    fn new(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
            peer_closed: false,
        }
    }
}

#[async_trait]
impl SessionChannel for WebSocketChannel {
    async fn send(&mut self, message: &OutboundMessage) -> Result<()> {
        if self.closed {
            return Err(Error::Stream("channel already closed".to_string()));
        }
        let text = message.to_json()?;
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| Error::Stream(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<BackendEvent>> {
        if self.closed {
            return None;
        }

        // Each frame is consumed by a single `next()`, so dropping this future
        // between frames loses nothing.
        while let Some(frame) = self.stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.as_str().to_owned(),
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => text.to_owned(),
                    Err(_) => {
                        warn!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Backend closed the session channel");
                    self.peer_closed = true;
                    return None;
                }
                Ok(_) => continue, // ping, pong, raw frames
                Err(e) => return Some(Err(Error::Stream(e.to_string()))),
            };

            match BackendEvent::parse(&text) {
                Ok(event) => return Some(Ok(event)),
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed backend message");
                }
            }
        }

        self.peer_closed = true;
        None
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            // The peer is gone, so a failed close handshake changes nothing.
            Err(e) if self.peer_closed => {
                debug!(error = %e, "Close handshake after peer close failed");
                Ok(())
            }
            Err(e) => Err(Error::Stream(e.to_string())),
        }
    }
}
