//! WebSocket + HTTP driver.
//!
//! Provides [`WsDriver`], the production [`Driver`]. This is a thin layer:
//! the WebSocket reader/writer and each HTTP request run in spawned tasks
//! that only post [`DriverEvent`]s into a channel. Protocol logic remains in
//! the Sans-IO state machines.

use std::{collections::VecDeque, time::Duration};

use coinboard_chat::ChatNotice;
use coinboard_core::{ConnectionSnapshot, Environment};
use coinboard_proto::{
    ChatMessage, Credential, HistoryRequest, Message,
    payloads::{credential, history},
};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    Message as WsMessage, protocol::frame::coding::CloseCode,
};

use crate::{Driver, DriverEvent, SystemEnv};

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be built.
    #[error("http client: {0}")]
    Http(String),

    /// No transport is open.
    #[error("transport not open")]
    NotOpen,

    /// Event channel closed; the driver can no longer make progress.
    #[error("event channel closed")]
    ChannelClosed,
}

/// HTTP endpoints used next to the WebSocket.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Credential endpoint. `None` uses `cookie` only.
    pub credential_url: Option<String>,
    /// Chat history endpoint.
    pub history_url: String,
    /// `Cookie` header value to read the credential from as a fallback.
    pub cookie: Option<String>,
    /// Name of the credential cookie.
    pub cookie_name: String,
    /// Header the credential is sent under.
    pub header_name: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            credential_url: Some("http://localhost:8080/api/csrf".to_string()),
            history_url: "http://localhost:8080/api/chat/messages".to_string(),
            cookie: None,
            cookie_name: credential::DEFAULT_COOKIE_NAME.to_string(),
            header_name: credential::DEFAULT_HEADER_NAME.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Presentation surface of the production driver.
///
/// Keeps the driver free of any particular UI.
pub trait Presenter: Send {
    /// Show the chat buffer. Returns the content extent if known.
    fn render(&mut self, messages: &VecDeque<ChatMessage>) -> Option<u32>;

    /// Move the chat viewport.
    fn scroll_to(&mut self, _offset: u32) {}

    /// Show a user-facing notice.
    fn notify(&mut self, notice: &ChatNotice);

    /// Connection state changed.
    fn connection_changed(&mut self, snapshot: &ConnectionSnapshot);

    /// Message on a non-chat topic.
    fn topic_message(&mut self, message: &Message);
}

/// Events from spawned tasks, tagged with the transport generation that
/// produced them so a replaced transport cannot report into its successor.
#[derive(Debug)]
struct Tagged {
    generation: Option<u64>,
    event: DriverEvent,
}

/// Production driver over tokio-tungstenite and reqwest.
///
/// Must be used inside a tokio runtime.
pub struct WsDriver<P> {
    env: SystemEnv,
    http: reqwest::Client,
    config: HttpConfig,
    presenter: P,
    events_tx: mpsc::UnboundedSender<Tagged>,
    events_rx: mpsc::UnboundedReceiver<Tagged>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection: Option<tokio::task::AbortHandle>,
    generation: u64,
}

impl<P: Presenter> WsDriver<P> {
    /// Create a driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: HttpConfig, presenter: P) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            env: SystemEnv::new(),
            http,
            config,
            presenter,
            events_tx,
            events_rx,
            outbound: None,
            connection: None,
            generation: 0,
        })
    }

    /// Handle for injecting user input from another task.
    pub fn input(&self) -> InputSender {
        InputSender { tx: self.events_tx.clone() }
    }

    /// The presenter.
    pub fn presenter(&self) -> &P {
        &self.presenter
    }
}

/// Injects user input into a [`WsDriver`].
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: mpsc::UnboundedSender<Tagged>,
}

impl InputSender {
    /// Post an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver has been dropped.
    pub fn send(&self, event: DriverEvent) -> Result<(), TransportError> {
        self.tx.send(Tagged { generation: None, event }).map_err(|_| TransportError::ChannelClosed)
    }
}

impl<P: Presenter> Driver for WsDriver<P> {
    type Error = TransportError;
    type Instant = std::time::Instant;

    async fn poll_event(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<DriverEvent>, Self::Error> {
        loop {
            let received = match timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, self.events_rx.recv()).await {
                        Ok(received) => received,
                        Err(_) => return Ok(None),
                    }
                },
                None => self.events_rx.recv().await,
            };

            let Some(tagged) = received else {
                return Err(TransportError::ChannelClosed);
            };
            match tagged.generation {
                Some(generation) if generation != self.generation => {
                    tracing::debug!(generation, event = ?tagged.event, "stale transport event dropped");
                },
                _ => return Ok(Some(tagged.event)),
            }
        }
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn fetch_credential(&mut self, attempt: u64) -> Result<(), Self::Error> {
        let http = self.http.clone();
        let config = self.config.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetch_credential(&http, &config).await;
            let event = DriverEvent::CredentialFetched { attempt, result };
            let _ = tx.send(Tagged { generation: None, event });
        });
        Ok(())
    }

    fn open_transport(&mut self, url: &str) -> Result<(), Self::Error> {
        self.close_transport();
        self.generation += 1;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_connection(
            url.to_string(),
            self.generation,
            outbound_rx,
            self.events_tx.clone(),
        ));

        self.outbound = Some(outbound_tx);
        self.connection = Some(handle.abort_handle());
        Ok(())
    }

    fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound.send(text).map_err(|_| TransportError::NotOpen)
    }

    fn close_transport(&mut self) {
        // Dropping the sender lets the writer send a close frame
        self.outbound = None;
        if let Some(connection) = self.connection.take() {
            // Bump so anything the old task already queued is ignored
            self.generation += 1;
            let abort = connection;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                abort.abort();
            });
        }
    }

    fn fetch_history(&mut self, request: HistoryRequest) -> Result<(), Self::Error> {
        let http = self.http.clone();
        let url = self.config.history_url.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetch_history(&http, &url, request).await;
            let event = DriverEvent::HistoryLoaded { page: request.page, result };
            let _ = tx.send(Tagged { generation: None, event });
        });
        Ok(())
    }

    fn render(&mut self, messages: &VecDeque<ChatMessage>) -> Result<Option<u32>, Self::Error> {
        Ok(self.presenter.render(messages))
    }

    fn scroll_to(&mut self, offset: u32) {
        self.presenter.scroll_to(offset);
    }

    fn notify(&mut self, notice: &ChatNotice) {
        self.presenter.notify(notice);
    }

    fn connection_changed(&mut self, snapshot: &ConnectionSnapshot) {
        self.presenter.connection_changed(snapshot);
    }

    fn topic_message(&mut self, message: &Message) {
        self.presenter.topic_message(message);
    }

    fn stop(&mut self) {
        self.close_transport();
    }
}

/// Own one WebSocket: forward outbound text, post inbound events.
async fn run_connection(
    url: String,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<Tagged>,
) {
    let post = |event: DriverEvent| {
        let _ = events.send(Tagged { generation: Some(generation), event });
    };

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            post(DriverEvent::TransportError(format!("connect failed: {e}")));
            return;
        },
    };
    tracing::debug!(%url, "websocket open");
    post(DriverEvent::TransportOpened);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        post(DriverEvent::TransportError(format!("send failed: {e}")));
                        return;
                    }
                },
                None => {
                    let _ = sink.close().await;
                    return;
                },
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => post(DriverEvent::TextReceived(text)),
                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => post(DriverEvent::TextReceived(text)),
                    Err(_) => tracing::warn!("non-UTF-8 binary message dropped"),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    let clean = frame.is_none_or(|f| is_clean(f.code));
                    post(DriverEvent::TransportClosed { clean });
                    return;
                },
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    post(DriverEvent::TransportError(e.to_string()));
                    return;
                },
                None => {
                    post(DriverEvent::TransportClosed { clean: false });
                    return;
                },
            },
        }
    }
}

fn is_clean(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away)
}

async fn fetch_credential(http: &reqwest::Client, config: &HttpConfig) -> Result<Credential, String> {
    let from_cookie = config.cookie.as_deref().and_then(|cookie| {
        Credential::from_cookie_header(cookie, &config.cookie_name, &config.header_name)
    });

    let Some(url) = config.credential_url.as_deref() else {
        return from_cookie.ok_or_else(|| format!("no {} cookie configured", config.cookie_name));
    };

    let response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?;

    let set_cookie = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            Credential::from_cookie_header(value, &config.cookie_name, &config.header_name)
        });

    let body = response.text().await.map_err(|e| e.to_string())?;
    match Credential::from_json(&body) {
        Ok(credential) => Ok(credential),
        Err(e) => set_cookie.or(from_cookie).ok_or_else(|| format!("invalid credential: {e}")),
    }
}

async fn fetch_history(
    http: &reqwest::Client,
    url: &str,
    request: HistoryRequest,
) -> Result<Vec<ChatMessage>, String> {
    let body = http
        .get(url)
        .query(&request.query())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?
        .text()
        .await
        .map_err(|e| e.to_string())?;

    history::decode_page(&body).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_and_away_closes_are_clean() {
        assert!(is_clean(CloseCode::Normal));
        assert!(is_clean(CloseCode::Away));
        assert!(!is_clean(CloseCode::Abnormal));
        assert!(!is_clean(CloseCode::Error));
    }

    #[tokio::test]
    async fn cookie_only_credential() {
        let config = HttpConfig {
            credential_url: None,
            cookie: Some("theme=dark; XSRF-TOKEN=abc123".to_string()),
            ..HttpConfig::default()
        };
        let http = reqwest::Client::new();

        let credential = fetch_credential(&http, &config).await.unwrap();
        assert_eq!(credential, Credential::new("X-XSRF-TOKEN", "abc123"));
    }

    #[tokio::test]
    async fn missing_cookie_is_an_error() {
        let config = HttpConfig { credential_url: None, cookie: None, ..HttpConfig::default() };
        let http = reqwest::Client::new();

        assert!(fetch_credential(&http, &config).await.is_err());
    }
}
