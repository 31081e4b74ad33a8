//! One `send / close / is_open` contract over two delivery mechanisms.
//!
//! [`SocketTransport`] feeds a duplex connection with JSON text frames.
//! [`EventStreamTransport`] feeds a one-way event stream with `data:`
//! frames. Both are fire-and-forget: frames go into an unbounded channel
//! drained by the connection task, and nothing is acknowledged back.
//! Each adapter owns a [`CancellationToken`] that is cancelled on close or
//! when the reader goes away, so producers can stop their timers.

use std::fmt;

use breachx_model::{CompletionSummary, LogRecord};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Unit of output pushed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Record(LogRecord),
    Complete(CompletionSummary),
}

impl StreamFrame {
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            StreamFrame::Record(_) => None,
            StreamFrame::Complete(_) => Some("complete"),
        }
    }
}

impl From<LogRecord> for StreamFrame {
    fn from(record: LogRecord) -> Self {
        StreamFrame::Record(record)
    }
}

impl From<CompletionSummary> for StreamFrame {
    fn from(summary: CompletionSummary) -> Self {
        StreamFrame::Complete(summary)
    }
}

pub trait LogTransport: Send + Sync + fmt::Debug {
    /// Deliver a frame if the transport is open; otherwise drop it.
    fn send(&self, frame: StreamFrame);

    fn close(&self);

    fn is_open(&self) -> bool;

    /// Token cancelled once the transport is closed from either side.
    fn closed(&self) -> CancellationToken;

    fn send_record(&self, record: LogRecord) {
        self.send(StreamFrame::Record(record));
    }
}

/// Push-socket adapter emitting one JSON text message per frame.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    tx: mpsc::UnboundedSender<String>,
    token: CancellationToken,
}

impl SocketTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            token: CancellationToken::new(),
        };
        (transport, rx)
    }

    fn push(&self, frame: &StreamFrame) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(err) => {
                debug!("dropping unserialisable frame: {err}");
                return;
            }
        };
        if self.tx.send(text).is_err() {
            self.token.cancel();
        }
    }
}

impl LogTransport for SocketTransport {
    fn send(&self, frame: StreamFrame) {
        if self.is_open() {
            self.push(&frame);
        }
    }

    fn close(&self) {
        if !self.is_open() {
            return;
        }
        self.push(&StreamFrame::Record(LogRecord::info("Log stream closed")));
        self.token.cancel();
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled() && !self.tx.is_closed()
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// A single server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<&'static str>,
    pub data: String,
}

impl SseFrame {
    /// Wire encoding: optional `event:` line, one `data:` line, blank line.
    pub fn encode(&self) -> String {
        match self.event {
            Some(event) => format!("event: {event}\ndata: {}\n\n", self.data),
            None => format!("data: {}\n\n", self.data),
        }
    }
}

/// Event-stream adapter; closing simply ends the stream.
#[derive(Debug, Clone)]
pub struct EventStreamTransport {
    tx: mpsc::UnboundedSender<SseFrame>,
    token: CancellationToken,
}

impl EventStreamTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SseFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            tx,
            token: CancellationToken::new(),
        };
        (transport, rx)
    }
}

impl LogTransport for EventStreamTransport {
    fn send(&self, frame: StreamFrame) {
        if !self.is_open() {
            return;
        }
        let data = match serde_json::to_string(&frame) {
            Ok(data) => data,
            Err(err) => {
                debug!("dropping unserialisable frame: {err}");
                return;
            }
        };
        let sse = SseFrame {
            event: frame.event_name(),
            data,
        };
        if self.tx.send(sse).is_err() {
            self.token.cancel();
        }
    }

    fn close(&self) {
        self.token.cancel();
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled() && !self.tx.is_closed()
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}
