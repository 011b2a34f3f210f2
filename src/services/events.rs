//! UI Push Channel
//!
//! The bridge is the only component that talks to the UI process; it does so
//! through the UiSink seam. The host binary backs it with a JSON-lines writer
//! on stdout, tests with a collecting sink.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// One frame pushed to the UI process
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushFrame {
    pub channel: String,
    pub payload: Value,
}

/// Outbound push seam. Implementations must not block the caller;
/// a failed push is logged, never fatal.
pub trait UiSink: Send + Sync {
    fn push(&self, channel: &str, payload: Value);
}

/// Sink backed by an unbounded channel, drained by the process boundary
/// writer in the host binary
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PushFrame>,
}

impl ChannelSink {
    /// Create the sink and the receiver the writer drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UiSink for ChannelSink {
    fn push(&self, channel: &str, payload: Value) {
        let frame = PushFrame {
            channel: channel.to_string(),
            payload,
        };
        if self.tx.send(frame).is_err() {
            warn!(channel, "UI push channel closed, dropping frame");
        }
    }
}
