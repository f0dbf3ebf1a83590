// src/network_adapter/memory.rs
use super::r#trait::NetworkAdapter;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One end of an in-process connection. Frames sent on one end arrive on the other.
pub struct MemoryAdapter {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryAdapter {
    /// Creates two connected ends.
    pub fn pair() -> (MemoryAdapter, MemoryAdapter) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            MemoryAdapter { tx: a_tx, rx: a_rx },
            MemoryAdapter { tx: b_tx, rx: b_rx },
        )
    }
}

#[async_trait]
impl NetworkAdapter for MemoryAdapter {
    async fn send(&mut self, msg: &str) -> Result<()> {
        self.tx.send(msg.to_string()).map_err(|_| Error::ChannelClosed)
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }
}
