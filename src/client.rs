//! Price stream WebSocket client.
//!
//! Responsibilities:
//! • Open one connection to the price endpoint and greet the server once.
//! • Render the `priceIndex` of every inbound frame into a display target.
//! • Isolate bad frames from the session. There is no reconnection.

use crate::config::ClientConfig;
use crate::display::{DisplayTarget, Page};
use crate::errors::{AppError, Result};
use crate::models::{ConnectionState, PriceMessage, SessionSummary};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message, protocol::CloseFrame};
use tracing::{debug, info, warn};
use url::Url;

/// Greeting sent once the connection is open.
pub const HANDSHAKE: &str = "Hello Server!";

/// Whether the read loop keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Client owning one connection and one display target.
#[derive(Debug)]
pub struct PriceDisplayClient {
    endpoint: Url,
    target: DisplayTarget,
    state: ConnectionState,
    handshake_sent: bool,
    frames_rendered: u64,
    frames_discarded: u64,
}

impl PriceDisplayClient {
    /// Locate the display target and run a session against the configured
    /// endpoint until the server closes it.
    pub async fn start(config: &ClientConfig, page: &mut Page) -> Result<SessionSummary> {
        Self::new(config, page)?.run().await
    }

    /// Claim the display target named in `config`. No network activity yet.
    pub fn new(config: &ClientConfig, page: &mut Page) -> Result<Self> {
        let target = page.locate(&config.target_id)?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            target,
            state: ConnectionState::Connecting,
            handshake_sent: false,
            frames_rendered: 0,
            frames_discarded: 0,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> &DisplayTarget {
        &self.target
    }

    /// Connect, greet, and render frames in arrival order.
    ///
    /// Consumes the client so a client never opens a second connection.
    pub async fn run(mut self) -> Result<SessionSummary> {
        info!(endpoint = %self.endpoint, "[WS] connecting");
        let (ws_stream, _resp) = match connect_async(self.endpoint.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.on_error(&e);
                return Err(e.into());
            }
        };
        let (mut write, mut read) = ws_stream.split();

        if let Some(greeting) = self.on_open() {
            if let Err(e) = write.send(greeting).await {
                self.on_error(&e);
                return Err(e.into());
            }
        }

        while let Some(frame) = read.next().await {
            match frame {
                Ok(msg) => {
                    if self.on_frame(msg) == Flow::Stop {
                        // flushes the queued close reply
                        if let Err(e) = write.close().await {
                            debug!(error = %e, "[WS] close handshake incomplete");
                        }
                        break;
                    }
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(e) => {
                    self.on_error(&e);
                    return Err(e.into());
                }
            }
        }

        if self.state != ConnectionState::Closed {
            self.on_close(None);
        }
        Ok(self.summary())
    }

    /// Run the session until it ends or `shutdown` resolves with `Ok`.
    ///
    /// Returns `None` when interrupted. A failing `shutdown` future (e.g. the
    /// signal handler could not be installed) is logged and the session keeps
    /// running.
    pub async fn run_until<S>(self, shutdown: S) -> Option<Result<SessionSummary>>
    where
        S: Future<Output = std::io::Result<()>>,
    {
        let session = self.run();
        tokio::pin!(session);
        tokio::select! {
            res = &mut session => Some(res),
            signal = shutdown => match signal {
                Ok(()) => None,
                Err(e) => {
                    warn!(error = %e, "[WS] shutdown signal unavailable, running until the stream ends");
                    Some(session.await)
                }
            },
        }
    }

    /// Mark the connection open and hand back the greeting, the first time
    /// only.
    pub fn on_open(&mut self) -> Option<Message> {
        self.state = ConnectionState::Open;
        info!(endpoint = %self.endpoint, "[WS] connection open");
        if self.handshake_sent {
            return None;
        }
        self.handshake_sent = true;
        Some(Message::Text(HANDSHAKE.to_string()))
    }

    /// Dispatch one transport frame.
    pub fn on_frame(&mut self, msg: Message) -> Flow {
        match msg {
            Message::Text(txt) => {
                let outcome = self.on_message(&txt).map(|_| ());
                if let Err(e) = outcome {
                    self.discard(&e);
                }
                Flow::Continue
            }
            Message::Binary(bytes) => {
                let e = AppError::MalformedPayload(format!(
                    "unexpected binary frame ({} bytes)",
                    bytes.len()
                ));
                self.discard(&e);
                Flow::Continue
            }
            Message::Close(frame) => {
                self.on_close(frame.as_ref());
                Flow::Stop
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Flow::Continue,
        }
    }

    /// Parse one price frame and render it. Returns the rendered fragment.
    pub fn on_message(&mut self, raw: &str) -> Result<&str> {
        let msg = PriceMessage::parse(raw)?;
        debug!(
            price_index = msg.price_index,
            height = ?msg.height,
            quote = ?msg.quote,
            node = ?msg.node_address,
            timestamp = ?msg.timestamp,
            "[PRICE] message from server"
        );
        let fragment = msg.to_fragment();
        self.frames_rendered += 1;
        if let Err(e) = self.target.render(fragment) {
            warn!(error = %e, display = self.target.id(), "[PRICE] display write failed");
        }
        Ok(self.target.current().unwrap_or_default())
    }

    /// Record that the server went away. No cleanup is performed.
    pub fn on_close(&mut self, frame: Option<&CloseFrame<'_>>) {
        self.state = ConnectionState::Closed;
        match frame {
            Some(cf) => info!(code = %cf.code, reason = %cf.reason, "[WS] connection closed"),
            None => info!("[WS] connection closed"),
        }
    }

    /// Record a transport failure. The session is not retried.
    pub fn on_error(&mut self, err: &tungstenite::Error) {
        self.state = ConnectionState::Errored;
        warn!(error = %err, endpoint = %self.endpoint, "[WS] connection error");
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            state: self.state,
            frames_rendered: self.frames_rendered,
            frames_discarded: self.frames_discarded,
            last_rendered: self.target.current().map(str::to_string),
        }
    }

    fn discard(&mut self, err: &AppError) {
        self.frames_discarded += 1;
        warn!(error = %err, "[PRICE] frame discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{DisplaySink, WatchSink};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Keeps every fragment so tests can check ordering.
    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl DisplaySink for RecordingSink {
        fn write_fragment(&mut self, fragment: &str) -> Result<()> {
            self.0.lock().unwrap().push(fragment.to_string());
            Ok(())
        }
    }

    fn config_for(endpoint: &str) -> ClientConfig {
        ClientConfig {
            endpoint: Url::parse(endpoint).expect("valid url"),
            target_id: "price".to_string(),
        }
    }

    fn client_with_recorder() -> (PriceDisplayClient, RecordingSink) {
        let recorder = RecordingSink::default();
        let mut page = Page::new();
        page.register("price", recorder.clone());
        let client = PriceDisplayClient::new(&config_for("ws://127.0.0.1:1/price"), &mut page)
            .expect("target should exist");
        (client, recorder)
    }

    #[test]
    fn handshake_is_produced_exactly_once() {
        let (mut client, _rec) = client_with_recorder();
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(
            client.on_open(),
            Some(Message::Text("Hello Server!".to_string()))
        );
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(client.on_open(), None);
    }

    #[test]
    fn renders_in_arrival_order_and_keeps_latest() {
        let (mut client, rec) = client_with_recorder();
        client.on_open();
        assert_eq!(
            client.on_message(r#"{"priceIndex": 1.5}"#).unwrap(),
            "USD 1.50000000"
        );
        assert_eq!(
            client.on_message(r#"{"priceIndex": 0}"#).unwrap(),
            "USD 0.00000000"
        );
        assert_eq!(
            client.on_message(r#"{"priceIndex": 12345.123456789}"#).unwrap(),
            "USD 12345.12345679"
        );
        assert_eq!(
            *rec.0.lock().unwrap(),
            vec!["USD 1.50000000", "USD 0.00000000", "USD 12345.12345679"]
        );
        assert_eq!(client.target().current(), Some("USD 12345.12345679"));
    }

    #[test]
    fn malformed_frames_are_discarded_without_touching_display() {
        let (mut client, rec) = client_with_recorder();
        client.on_open();
        assert_eq!(
            client.on_frame(Message::Text(r#"{"priceIndex": 2}"#.into())),
            Flow::Continue
        );
        for bad in ["not json", r#"{"other": 1}"#, r#"{"priceIndex": "2"}"#] {
            assert_eq!(client.on_frame(Message::Text(bad.into())), Flow::Continue);
        }
        assert_eq!(client.on_frame(Message::Binary(vec![1, 2, 3])), Flow::Continue);
        assert_eq!(client.on_frame(Message::Ping(vec![])), Flow::Continue);

        let summary = client.summary();
        assert_eq!(summary.frames_rendered, 1);
        assert_eq!(summary.frames_discarded, 4);
        assert_eq!(summary.last_rendered.as_deref(), Some("USD 2.00000000"));
        assert_eq!(rec.0.lock().unwrap().len(), 1);
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[test]
    fn close_frame_stops_the_session() {
        let (mut client, _rec) = client_with_recorder();
        client.on_open();
        assert_eq!(client.on_frame(Message::Close(None)), Flow::Stop);
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn missing_target_fails_before_connecting() {
        let mut page = Page::new();
        let res = PriceDisplayClient::new(&config_for("ws://127.0.0.1:1/price"), &mut page);
        assert!(matches!(res, Err(AppError::TargetNotFound(id)) if id == "price"));
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (sink, _rx) = WatchSink::channel();
        let mut page = Page::new();
        page.register("price", sink);
        let res =
            PriceDisplayClient::start(&config_for(&format!("ws://{addr}/price")), &mut page).await;
        assert!(matches!(res, Err(AppError::Connection(_))));
    }

    #[tokio::test]
    async fn full_session_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received_rx) = oneshot::channel::<Vec<String>>();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let mut received = Vec::new();
            if let Some(Ok(Message::Text(greeting))) = ws.next().await {
                received.push(greeting);
            }
            for frame in [
                r#"{"height": 1, "priceIndex": 1.5, "quote": "USD"}"#,
                "not json",
                r#"{"height": 2}"#,
                r#"{"priceIndex": "oops"}"#,
                r#"{"height": 3, "priceIndex": 12345.123456789}"#,
            ] {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            ws.close(None).await.unwrap();

            // Drain until the client acknowledges the close.
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(txt) = msg {
                    received.push(txt);
                }
            }
            let _ = received_tx.send(received);
        });

        let (sink, rx) = WatchSink::channel();
        let mut page = Page::new();
        page.register("price", sink);
        let summary =
            PriceDisplayClient::start(&config_for(&format!("ws://{addr}/price")), &mut page)
                .await
                .expect("session should end cleanly");

        assert_eq!(summary.state, ConnectionState::Closed);
        assert_eq!(summary.frames_rendered, 2);
        assert_eq!(summary.frames_discarded, 3);
        assert_eq!(summary.last_rendered.as_deref(), Some("USD 12345.12345679"));
        assert_eq!(*rx.borrow(), "USD 12345.12345679");

        server.await.unwrap();
        let received = received_rx.await.unwrap();
        assert_eq!(received, vec!["Hello Server!".to_string()]);
    }

    #[tokio::test]
    async fn dropped_transport_ends_session_in_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _greeting = ws.next().await;
            ws.send(Message::Text(r#"{"priceIndex": 7.25}"#.to_string()))
                .await
                .unwrap();
            // no close handshake, the socket just goes away
            drop(ws);
        });

        let (sink, rx) = WatchSink::channel();
        let mut page = Page::new();
        page.register("price", sink);
        let res =
            PriceDisplayClient::start(&config_for(&format!("ws://{addr}/price")), &mut page).await;

        assert!(matches!(res, Err(AppError::Connection(_))));
        assert_eq!(*rx.borrow(), "USD 7.25000000");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_interrupts_only_when_it_fires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // first session: stays silent until the client goes away
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}

            // second session: one price, then a clean close
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _greeting = ws.next().await;
            ws.send(Message::Text(r#"{"priceIndex": 3}"#.to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });
        let config = config_for(&format!("ws://{addr}/price"));

        let (sink, _rx) = WatchSink::channel();
        let mut page = Page::new();
        page.register("price", sink);
        let interrupted = PriceDisplayClient::new(&config, &mut page)
            .unwrap()
            .run_until(async {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                Ok::<(), std::io::Error>(())
            })
            .await;
        assert!(interrupted.is_none());

        let (sink, rx) = WatchSink::channel();
        let mut page = Page::new();
        page.register("price", sink);
        let outcome = PriceDisplayClient::new(&config, &mut page)
            .unwrap()
            .run_until(async { Err::<(), _>(std::io::Error::other("no signal handler")) })
            .await;
        let summary = outcome
            .expect("a failed signal must not end the session")
            .expect("session should end cleanly");
        assert_eq!(summary.state, ConnectionState::Closed);
        assert_eq!(*rx.borrow(), "USD 3.00000000");

        server.await.unwrap();
    }
}
