//! hpfeeds client over TCP.
//!
//! Connection setup mirrors the broker's handshake: the broker speaks first
//! with an info frame carrying a nonce, the client answers with an auth frame
//! and may then subscribe and publish. The broker never acknowledges
//! anything explicitly; a rejected publish or subscribe shows up as an error
//! frame, usually followed by a disconnect.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info};

use mazu_shared::types::FeedEndpoint;

use crate::client::{FeedConnection, FeedConnector, FeedEvent, FeedMessage};
use crate::codec::{auth_digest, Frame};
use crate::error::FeedError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HpfeedsConnector {
    connect_timeout: Duration,
    max_frame: usize,
}

impl HpfeedsConnector {
    pub fn new(connect_timeout: Duration, max_frame: usize) -> Self {
        Self {
            connect_timeout,
            max_frame,
        }
    }
}

impl Default for HpfeedsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_FRAME)
    }
}

#[async_trait]
impl FeedConnector for HpfeedsConnector {
    async fn connect(&self, endpoint: &FeedEndpoint) -> Result<Box<dyn FeedConnection>, FeedError> {
        let conn = HpfeedsConnection::connect(endpoint, self.connect_timeout, self.max_frame).await?;
        Ok(Box::new(conn))
    }
}

pub struct HpfeedsConnection {
    stream: TcpStream,
    buffer: BytesMut,
    ident: String,
    broker: String,
    max_frame: usize,
}

impl HpfeedsConnection {
    /// Connect and authenticate. The whole handshake is bounded by
    /// `connect_timeout`.
    pub async fn connect(
        endpoint: &FeedEndpoint,
        connect_timeout: Duration,
        max_frame: usize,
    ) -> Result<Self, FeedError> {
        let handshake = async {
            let stream = TcpStream::connect(endpoint.address()).await?;
            stream.set_nodelay(true)?;

            let mut conn = Self {
                stream,
                buffer: BytesMut::with_capacity(READ_CHUNK),
                ident: endpoint.ident.clone(),
                broker: String::new(),
                max_frame,
            };

            match conn.read_frame().await? {
                Frame::Info { name, nonce } => {
                    conn.broker = name;
                    let auth = Frame::Auth {
                        ident: conn.ident.clone(),
                        digest: auth_digest(&nonce, &endpoint.secret),
                    };
                    conn.write_frame(&auth).await?;
                }
                Frame::Error(message) => return Err(FeedError::Remote(message)),
                other => {
                    return Err(FeedError::Protocol(format!(
                        "expected info frame, got opcode {}",
                        other.opcode()
                    )))
                }
            }
            Ok::<_, FeedError>(conn)
        };

        let conn = timeout(connect_timeout, handshake)
            .await
            .map_err(|_| FeedError::Timeout(connect_timeout))??;

        info!(
            addr = %endpoint.address(),
            broker = %conn.broker,
            ident = %conn.ident,
            "Connected to feed broker"
        );
        Ok(conn)
    }

    /// Name the broker announced in its info frame.
    pub fn broker_name(&self) -> &str {
        &self.broker
    }

    // Cancel-safe: bytes already read stay in `self.buffer`.
    async fn read_frame(&mut self) -> Result<Frame, FeedError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buffer, self.max_frame)? {
                return Ok(frame);
            }
            if self.buffer.capacity() - self.buffer.len() < READ_CHUNK {
                self.buffer.reserve(READ_CHUNK);
            }
            let read = self.stream.read_buf(&mut self.buffer).await?;
            if read == 0 {
                return Err(FeedError::Closed);
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), FeedError> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }
}

#[async_trait]
impl FeedConnection for HpfeedsConnection {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), FeedError> {
        for topic in topics {
            let frame = Frame::Subscribe {
                ident: self.ident.clone(),
                channel: topic.clone(),
            };
            self.write_frame(&frame).await?;
            debug!(topic = %topic, "Subscribed");
        }
        Ok(())
    }

    async fn publish(&mut self, topics: &[String], payload: &[u8]) -> Result<(), FeedError> {
        let payload = Bytes::copy_from_slice(payload);
        for topic in topics {
            let frame = Frame::Publish {
                ident: self.ident.clone(),
                channel: topic.clone(),
                payload: payload.clone(),
            };
            self.write_frame(&frame).await?;
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<FeedEvent, FeedError> {
        loop {
            match self.read_frame().await? {
                Frame::Publish {
                    ident,
                    channel,
                    payload,
                } => {
                    return Ok(FeedEvent::Message(FeedMessage {
                        ident,
                        topic: channel,
                        payload,
                    }))
                }
                Frame::Error(message) => return Ok(FeedEvent::Error(message)),
                other => debug!(opcode = other.opcode(), "Ignoring unexpected frame"),
            }
        }
    }

    async fn wait(&mut self, wait_for: Duration) -> Result<Option<String>, FeedError> {
        let deadline = Instant::now() + wait_for;
        loop {
            match timeout_at(deadline, self.read_frame()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(Frame::Error(message))) => return Ok(Some(message)),
                Ok(Ok(other)) => debug!(opcode = other.opcode(), "Ignoring frame while waiting"),
            }
        }
    }

    async fn stop(&mut self) -> Result<(), FeedError> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
