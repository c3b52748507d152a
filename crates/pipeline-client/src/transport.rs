//! Transport abstraction for the execution channel
//!
//! A transport opens one bidirectional line channel to the engine. The
//! channel is closed by dropping its outbound sender; the inbound receiver
//! yields `None` once the remote side goes away.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// An open channel: raw text lines in both directions
pub struct TransportChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens execution channels
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &str) -> Result<TransportChannel, TransportError>;
}

/// Newline-delimited text over TCP
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self, endpoint: &str) -> Result<TransportChannel, TransportError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| TransportError::Timeout(endpoint.to_string()))?
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not disable Nagle on {}: {}", endpoint, e);
        }
        log::debug!("TCP channel open to {}", endpoint);

        let (read_half, mut write_half) = stream.into_split();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if inbound_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::debug!("Execution channel closed by remote");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Execution channel read failed: {}", e);
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                let written = async {
                    write_half.write_all(line.as_bytes()).await?;
                    write_half.write_all(b"\n").await?;
                    write_half.flush().await
                };
                if let Err(e) = written.await {
                    log::warn!("Execution channel write failed: {}", e);
                    break;
                }
            }
            // Sender dropped or write failed: tear down both halves
            let _ = write_half.shutdown().await;
            reader.abort();
        });

        Ok(TransportChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_lines_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            write_half
                .write_all(b"{\"type\":\"connected\"}\n\n")
                .await
                .unwrap();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap()
        });

        let mut channel = TcpTransport::default().open(&addr).await.unwrap();
        assert_eq!(
            channel.inbound.recv().await.as_deref(),
            Some("{\"type\":\"connected\"}")
        );

        channel.outbound.send("{\"type\":\"ping\"}".to_string()).unwrap();
        let received = server.await.unwrap();
        assert_eq!(received.as_deref(), Some("{\"type\":\"ping\"}"));

        // Remote dropped its socket after reading
        assert_eq!(channel.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpTransport::default().open(&addr).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
