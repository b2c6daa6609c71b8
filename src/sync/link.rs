// src/sync/link.rs — Controller side of the monitor connection

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::protocol::{encode_frame, SyncMessage};
use crate::infra::errors::{ConnectionError, LuminoError, Result};

/// Client connection to the monitor's server socket.
#[derive(Debug)]
pub struct MonitorLink {
    addr: String,
    stream: Option<TcpStream>,
}

impl MonitorLink {
    /// Connect, retrying a bounded number of times with a fixed delay.
    pub async fn connect_with_retry(addr: &str, attempts: u32, delay: Duration) -> Result<Self> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::info!("Connected to monitor at {} (attempt {})", addr, attempt);
                    return Ok(Self {
                        addr: addr.to_string(),
                        stream: Some(stream),
                    });
                }
                Err(e) => {
                    tracing::debug!(
                        "Monitor connect attempt {}/{} to {} failed: {}",
                        attempt,
                        attempts,
                        addr,
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(ConnectionError::Refused {
            addr: addr.to_string(),
            attempts,
        }
        .into())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Write one frame. A failed write drops the stream.
    pub async fn send(&mut self, msg: &SyncMessage) -> Result<()> {
        let frame = encode_frame(msg)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or(LuminoError::Connection(ConnectionError::Closed))?;
        if let Err(e) = stream.write_all(&frame).await {
            tracing::warn!("Send of {} to monitor failed: {}", msg.command(), e);
            self.stream = None;
            return Err(ConnectionError::Io(e).into());
        }
        tracing::debug!("Sent {} to monitor", msg.command());
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            tracing::debug!("Closed monitor connection to {}", self.addr);
        }
    }
}
