//! Outbound notifications
//!
//! Components build [`OutboundMessage`]s and hand them to a [`Dispatcher`],
//! which sends each one through the configured [`NotificationSink`]. Delivery
//! is best-effort: every send is isolated, failures are logged and counted,
//! and nothing is ever propagated to the caller.

pub mod memory;
pub mod templates;

pub use memory::MemorySink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Where a message goes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "channel", content = "address", rename_all = "lowercase")]
pub enum Destination {
    Email(String),
    Sms(String),
}

impl Destination {
    pub fn address(&self) -> &str {
        match self {
            Destination::Email(a) | Destination::Sms(a) => a,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    pub fn email(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: Destination::Email(to.into()),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn sms(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: Destination::Sms(to.into()),
            subject: String::new(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Transport for outbound mail and SMS
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// `sender` is the configured from-address.
    async fn send(&self, sender: &str, message: &OutboundMessage) -> Result<()>;
}

/// Sink that only logs; used where no mail/SMS transport is configured.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn send(&self, sender: &str, message: &OutboundMessage) -> Result<()> {
        info!(
            from = sender,
            to = message.destination.address(),
            subject = %message.subject,
            attachments = message.attachments.len(),
            "Notification"
        );
        Ok(())
    }
}

/// Outcome of one dispatch batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Per-recipient dispatch loop
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    sender: String,

    // Stats (atomic, no locks)
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, sender: impl Into<String>) -> Self {
        Self {
            sink,
            sender: sender.into(),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Send every message; a failure is logged and never stops the rest.
    pub async fn dispatch(&self, messages: Vec<OutboundMessage>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for message in &messages {
            match self.sink.send(&self.sender, message).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed += 1;
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        to = message.destination.address(),
                        subject = %message.subject,
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        }
        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Dispatched notifications"
        );
        report
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_for("broken@example.org").await;
        let dispatcher = Dispatcher::new(sink.clone(), "portal@example.org");

        let report = dispatcher
            .dispatch(vec![
                OutboundMessage::email("broken@example.org", "Hello", "one"),
                OutboundMessage::email("ok@example.org", "Hello", "two"),
                OutboundMessage::sms("+23276000000", "three"),
            ])
            .await;

        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
        assert_eq!(dispatcher.stats(), DispatchStats { delivered: 2, failed: 1 });
        assert_eq!(sink.sent_to("ok@example.org").await.len(), 1);
        assert!(sink.sent_to("broken@example.org").await.is_empty());
    }
}
