//! Transport seam for command channels.
//!
//! A command channel never opens sockets itself. It asks a [`Dialer`] for a
//! connected byte stream described by a [`DialRequest`], and, for relay
//! targets, asks it to upgrade that stream to TLS before the channel is
//! considered ready. The production implementation lives in
//! `flexkit-transport`; tests can substitute in-memory streams.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A bidirectional async byte stream usable by a command channel.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed [`ByteStream`].
pub type BoxedStream = Box<dyn ByteStream>;

/// A fully resolved connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    /// Remote host name or address.
    pub host: String,
    /// Remote port, already selected from the target classification.
    pub port: u16,
    /// Local address to bind before connecting (hole-punch targets).
    pub bind: Option<SocketAddr>,
    /// Upper bound on the raw connect.
    pub timeout: Duration,
}

impl DialRequest {
    /// Build a request with no local binding.
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            bind: None,
            timeout,
        }
    }

    /// Bind the local end to `ip:port` before connecting.
    pub fn bind_local(mut self, ip: IpAddr, port: u16) -> Self {
        self.bind = Some(SocketAddr::new(ip, port));
        self
    }

    /// `host:port` label for logging.
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Opens and secures connections on behalf of a command channel.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Establish the raw connection, bounded by `request.timeout`.
    async fn dial(&self, request: &DialRequest) -> Result<BoxedStream>;

    /// Run a TLS client handshake over an already connected stream.
    ///
    /// `server_name` is the host the stream was dialed to; it is used for
    /// SNI and handed to the trust policy.
    async fn secure(&self, stream: BoxedStream, server_name: &str) -> Result<BoxedStream>;
}
