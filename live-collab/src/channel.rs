//! The duplex channel underneath the transport.
//!
//! [`Channel`] is the outbound half the transport pushes encoded frames into.
//! Inbound frames arrive on a separate `mpsc` receiver that the caller drains
//! into [`LiveTransport::handle_frame`](crate::transport::LiveTransport::handle_frame).
//!
//! ```text
//!  LiveTransport ──push──► WsChannel ──mpsc──► writer task ──► WebSocket
//!        ▲                                                        │
//!        └──── handle_frame ◄── mpsc ◄── reader task ◄────────────┘
//! ```
//!
//! When the socket closes or fails, the reader task delivers a synthetic
//! [`InboundFrame::Error`] without payload, which the transport reports as a
//! connection loss.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::config::LiveConfig;
use crate::protocol::{InboundFrame, TransportError};

/// Outbound half of a live channel.
pub trait Channel {
    /// Queue one encoded frame for sending. Never blocks.
    fn push(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Stop sending. Frames queued before the call may still go out.
    fn close(&mut self) {}
}

/// In-process channel; the other end receives the raw frames.
impl Channel for mpsc::UnboundedSender<Vec<u8>> {
    fn push(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.send(frame).map_err(|_| TransportError::ChannelUnavailable)
    }
}

/// WebSocket channel backed by tokio-tungstenite.
pub struct WsChannel {
    outgoing_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl WsChannel {
    /// Open the socket and spawn the writer and reader tasks.
    ///
    /// Returns the channel and the receiver of inbound frames.
    pub async fn connect(
        config: &LiveConfig,
        token: &str,
    ) -> Result<(Self, mpsc::Receiver<Vec<u8>>), TransportError> {
        let url = config.connect_url(token);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        log::info!("connected to {}", config.socket_url);

        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(config.channel_capacity.max(1));

        // Writer task: forward outgoing channel to WebSocket
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(Message::Binary(data.into())).await {
                    log::warn!("socket write failed: {e}");
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Reader task: forward binary frames, then report the loss
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        if in_tx.send(data.into()).await.is_err() {
                            // Receiver dropped; nobody is listening.
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::warn!("socket read failed: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            match InboundFrame::connection_loss().encode() {
                Ok(frame) => {
                    let _ = in_tx.send(frame).await;
                }
                Err(e) => log::error!("failed to encode connection loss: {e}"),
            }
        });

        Ok((
            Self {
                outgoing_tx: Some(out_tx),
            },
            in_rx,
        ))
    }

    /// Whether the writer task is still accepting frames.
    pub fn is_open(&self) -> bool {
        self.outgoing_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl Channel for WsChannel {
    fn push(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        match self.outgoing_tx.as_mut() {
            Some(tx) => tx.push(frame),
            None => Err(TransportError::ChannelUnavailable),
        }
    }

    fn close(&mut self) {
        // Dropping the sender ends the writer task, which closes the socket.
        self.outgoing_tx = None;
    }
}
