//! Notification Sinks
//!
//! Adapters for the [`NotificationSink`] port: one that writes to the log
//! and one that forwards to a UI task over a channel.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::ports::{Notification, NotificationKind, NotificationSink};

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, kind: NotificationKind, text: &str, detail: Option<&str>) {
        match kind {
            NotificationKind::Error => warn!(kind = %kind, detail, "{text}"),
            NotificationKind::Success | NotificationKind::Info => {
                info!(kind = %kind, detail, "{text}");
            }
        }
    }
}

/// Forwards notifications over an unbounded channel.
///
/// Sending never blocks; once the receiver is gone notifications are dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotificationSink {
    fn notify(&self, kind: NotificationKind, text: &str, detail: Option<&str>) {
        let _ = self.tx.send(Notification {
            kind,
            text: text.to_string(),
            detail: detail.map(str::to_string),
        });
    }
}
