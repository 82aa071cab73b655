//! Socket transport
//!
//! The live worker talks to a hub through a [`Link`]: a pair of channels
//! carrying outbound JSON text and inbound binary messages. A [`Connector`]
//! opens links; [`WsConnector`] does so over a WebSocket, and the simulator
//! provides an in-process one.
//!
//! Dropping the link's `outgoing` sender closes the connection.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Channel depth for each direction of a link
pub const LINK_DEPTH: usize = 256;

/// Something that happened on the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A binary message from the hub
    Message(Vec<u8>),
    /// Socket error; a `Closed` follows
    Error(String),
    /// The socket is closed
    Closed,
}

/// An open connection to a hub
#[derive(Debug)]
pub struct Link {
    /// Text frames to send (JSON command envelopes)
    pub outgoing: mpsc::Sender<String>,
    /// Messages and lifecycle events from the hub
    pub incoming: mpsc::Receiver<LinkEvent>,
}

impl Link {
    /// Create a link and the far-end halves of its channels
    pub fn pair() -> (Self, mpsc::Receiver<String>, mpsc::Sender<LinkEvent>) {
        let (out_tx, out_rx) = mpsc::channel(LINK_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(LINK_DEPTH);
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            out_rx,
            in_tx,
        )
    }
}

/// Opens links to a hub URL
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> impl Future<Output = Result<Link, TransportError>> + Send;
}

/// WebSocket connector built on tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        info!("WebSocket connected to {}", url);

        let (link, mut out_rx, in_tx) = Link::pair();
        let (mut sink, mut source) = stream.split();
        let url = url.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    text = out_rx.recv() => {
                        let Some(text) = text else {
                            debug!("Link to {} dropped, closing socket", url);
                            let _ = sink.close().await;
                            break;
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!("Send to {} failed: {}", url, e);
                            let _ = in_tx.send(LinkEvent::Error(e.to_string())).await;
                            break;
                        }
                    }

                    message = source.next() => {
                        match message {
                            Some(Ok(Message::Binary(data))) => {
                                if in_tx.send(LinkEvent::Message(data)).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(LinkEvent::Message(text.into_bytes())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("Hub closed socket: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {} // ping/pong handled by tungstenite
                            Some(Err(e)) => {
                                warn!("Socket error on {}: {}", url, e);
                                let _ = in_tx.send(LinkEvent::Error(e.to_string())).await;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            let _ = in_tx.send(LinkEvent::Closed).await;
            debug!("Socket pump for {} ended", url);
        });

        Ok(link)
    }
}

/// Build the socket URL for a pathway
///
/// `host` is `name[:port]`; `secure` selects `wss`.
pub fn socket_url(host: &str, secure: bool, pathway: &str) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}/ws/{pathway}/")
}
