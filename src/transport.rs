//! Byte-stream transport used to reach the broker.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Any duplex byte stream a session can run over.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxStream = Box<dyn ByteStream>;

/// Opens a byte stream to `host:port`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, host: &str, port: u16, timeout: Duration) -> Result<BoxStream>;
}

/// Plain TCP via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(&self, host: &str, port: u16, timeout: Duration) -> Result<BoxStream> {
        let addr = format!("{}:{}", host, port);
        debug!(%addr, ?timeout, "dialing broker");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Transport(e)),
            Err(_) => return Err(Error::DialTimeout { addr, timeout }),
        };
        stream.set_nodelay(true).map_err(Error::Transport)?;
        Ok(Box::new(stream))
    }
}
