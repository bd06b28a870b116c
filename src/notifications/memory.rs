//! In-memory sink that records every message

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{NotificationSink, OutboundMessage};

#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `address` fail.
    pub async fn fail_for(&self, address: impl Into<String>) {
        self.failing.lock().await.insert(address.into());
    }

    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, address: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.destination.address() == address)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(&self, _sender: &str, message: &OutboundMessage) -> Result<()> {
        if self.failing.lock().await.contains(message.destination.address()) {
            bail!("delivery to {} refused", message.destination.address());
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
