//! Defines the protocol layer for handling message serialization and deserialization.
//!
//! This layer sits on top of the `NetworkAdapter` and provides a strongly-typed interface
//! for sending and receiving JSON-RPC messages. It is responsible for all `serde_json`
//! operations, keeping the session logic focused on routing.

use crate::envelope::{Envelope, Undecodable};
use crate::error::Result;
use crate::network_adapter::NetworkAdapter;
use serde::{de::DeserializeOwned, Serialize};

/// A connection that frames JSON-RPC messages over a generic `NetworkAdapter`.
pub struct ProtocolConnection<A: NetworkAdapter> {
    adapter: A,
}

impl<A: NetworkAdapter> ProtocolConnection<A> {
    /// Creates a new `ProtocolConnection` that will use the given adapter for communication.
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    /// Serializes a message struct into a JSON string and sends it via the adapter.
    pub async fn send_serializable<T: Serialize + Send + Sync>(&mut self, msg: T) -> Result<()> {
        let json_string = serde_json::to_string(&msg)?;
        self.adapter.send(&json_string).await
    }

    /// Sends a raw, already-serialized JSON string over the adapter.
    pub async fn send_raw(&mut self, json_string: &str) -> Result<()> {
        self.adapter.send(json_string).await
    }

    /// Receives the next non-blank frame. `None` means the peer closed the connection.
    ///
    /// Cancel safe as long as the adapter's `recv` is.
    pub async fn recv_raw(&mut self) -> Result<Option<String>> {
        loop {
            match self.adapter.recv().await? {
                Some(frame) if frame.trim().is_empty() => continue,
                other => return Ok(other),
            }
        }
    }

    /// Receives a raw JSON string from the adapter and deserializes it into a message struct.
    pub async fn recv_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.recv_raw().await? {
            Some(json_string) => Ok(Some(serde_json::from_str::<T>(&json_string)?)),
            None => Ok(None),
        }
    }

    /// Receives the next frame and classifies it. Decoding failures are returned as
    /// the inner `Err` so that the caller can answer them without tearing down.
    pub async fn recv_envelope(
        &mut self,
    ) -> Result<Option<std::result::Result<Envelope, Undecodable>>> {
        Ok(self.recv_raw().await?.map(|raw| Envelope::parse_frame(&raw)))
    }
}
