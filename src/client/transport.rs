// Duplex text channel and the websocket pump that feeds it
//
// The client only ever sees two unbounded queues of text frames. A live
// session bridges them to a websocket with one writer and one reader task;
// tests wire two channels back to back instead.

use crate::error::{InspectError, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;

/// One end of a duplex text channel
#[derive(Debug)]
pub struct Channel {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<String>,
}

impl Channel {
    /// Two ends wired back to back: whatever one sends, the other receives
    pub fn pair() -> (Channel, Channel) {
        let (a_tx, a_rx) = unbounded_channel();
        let (b_tx, b_rx) = unbounded_channel();
        (
            Channel {
                outbound: a_tx,
                inbound: b_rx,
            },
            Channel {
                outbound: b_tx,
                inbound: a_rx,
            },
        )
    }
}

/// Open a websocket and pump it into a [`Channel`]
///
/// The writer closes the socket once every outbound sender is dropped; the
/// reader ends the inbound queue when the socket closes or fails.
pub async fn open_websocket(url: &str) -> Result<Channel> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| InspectError::Connection(format!("websocket handshake with {url} failed: {e}")))?;
    tracing::debug!(url, "websocket open");

    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = unbounded_channel::<String>();
    let (in_tx, in_rx) = unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::warn!(error = %e, "websocket write failed");
                return;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "websocket read failed");
                    break;
                }
            };
            if in_tx.send(text).is_err() {
                break;
            }
        }
        tracing::debug!("websocket reader finished");
    });

    Ok(Channel {
        outbound: out_tx,
        inbound: in_rx,
    })
}
