// src/network_adapter/trait.rs
use crate::error::Result;
use async_trait::async_trait;

/// A transport that delivers whole JSON-RPC frames in order.
///
/// `recv` is polled inside `tokio::select!` by the session's dispatch loop, so it must
/// be cancel safe: dropping an unfinished `recv` future must not lose a frame.
/// `Ok(None)` signals that the peer closed the connection.
#[async_trait]
pub trait NetworkAdapter: Send + 'static {
    async fn send(&mut self, msg: &str) -> Result<()>;
    async fn recv(&mut self) -> Result<Option<String>>;
}
