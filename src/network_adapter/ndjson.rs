// src/network_adapter/ndjson.rs
use super::r#trait::NetworkAdapter;
use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Newline-delimited JSON over any byte stream pair.
///
/// Reads go through `Lines::next_line`, which is cancel safe.
pub struct NdjsonAdapter<R = OwnedReadHalf, W = OwnedWriteHalf> {
    writer: W,
    reader: Lines<BufReader<R>>,
}

impl<R, W> NdjsonAdapter<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            writer,
            reader: BufReader::new(reader).lines(),
        }
    }
}

impl NdjsonAdapter {
    /// Creates a new `NdjsonAdapter` by connecting to a given address.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from(stream))
    }
}

impl NdjsonAdapter<Stdin, Stdout> {
    /// Uses the process's stdin and stdout. Anything else written to stdout corrupts
    /// the stream, so logging must go to stderr.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl From<TcpStream> for NdjsonAdapter {
    fn from(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(read_half, write_half)
    }
}

#[async_trait]
impl<R, W> NetworkAdapter for NdjsonAdapter<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, msg: &str) -> Result<()> {
        self.writer.write_all(msg.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        loop {
            match self.reader.next_line().await? {
                None => return Ok(None),
                Some(line) => {
                    let line = line.trim_end_matches('\r');
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(line.to_string()));
                }
            }
        }
    }
}
