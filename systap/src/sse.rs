//! Push-stream framing (`text/event-stream`) and the channel that carries
//! frames from a session task to its response body.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::StreamError;

const DATA_PREFIX: &[u8] = b"data: ";
const TERMINATOR: &[u8] = b"\n\n";

/// Frame one value as a `data:` event terminated by a blank line.
pub fn encode_event<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, serde_json::Error> {
    let mut buf = BytesMut::with_capacity(256).writer();
    buf.get_mut().put_slice(DATA_PREFIX);
    serde_json::to_writer(&mut buf, value)?;
    buf.get_mut().put_slice(TERMINATOR);
    Ok(buf.into_inner().freeze())
}

/// Decode a single frame produced by [`encode_event`]. Multi-line `data:`
/// fields are joined with `\n` as an EventSource would.
pub fn decode_event<T: DeserializeOwned>(frame: &str) -> Result<T, serde_json::Error> {
    let payload = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect::<Vec<_>>()
        .join("\n");
    serde_json::from_str(&payload)
}

/// Headers every push endpoint responds with.
pub fn event_stream_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
    ]
}

/// Sending half of a push stream. Holds at most one frame in flight, so a
/// slow client slows its own session down instead of queueing samples.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<Bytes>,
}

impl EventSink {
    /// A sink plus the response body that drains it. Each frame becomes its
    /// own body chunk and is written out as soon as it is sent.
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel::<Bytes>(1);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
        });
        (Self { tx }, Body::from_stream(stream))
    }

    pub async fn send(&self, frame: Bytes) -> Result<(), StreamError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| StreamError::Disconnected)
    }

    /// Resolves once the body has been dropped (client went away).
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
