//! Transport implementations for flexkit.
//!
//! This crate provides the production [`Dialer`](flexkit_core::Dialer):
//!
//! - [`open_tcp`]: bounded TCP connect, optionally from a bound local
//!   address for NAT hole-punch targets
//! - [`tls`]: TLS upgrade with a pluggable [`TrustPolicy`]
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use flexkit_core::{DialRequest, Dialer};
//! use flexkit_transport::NetDialer;
//!
//! # async fn example() -> flexkit_core::Result<()> {
//! let dialer = NetDialer::new();
//! let request = DialRequest::new("192.168.1.100", 4992, Duration::from_millis(500));
//! let stream = dialer.dial(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use flexkit_core::error::Result;
use flexkit_core::transport::{BoxedStream, DialRequest, Dialer};

pub use tcp::open_tcp;
pub use tls::{AcceptAnyCertificate, TrustPolicy};

/// TCP + rustls [`Dialer`].
#[derive(Debug, Clone)]
pub struct NetDialer {
    trust: Arc<dyn TrustPolicy>,
}

impl NetDialer {
    /// A dialer that trusts every relay certificate.
    pub fn new() -> Self {
        Self::with_trust_policy(Arc::new(AcceptAnyCertificate))
    }

    /// A dialer whose TLS upgrades consult `trust`.
    pub fn with_trust_policy(trust: Arc<dyn TrustPolicy>) -> Self {
        Self { trust }
    }
}

impl Default for NetDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialer for NetDialer {
    async fn dial(&self, request: &DialRequest) -> Result<BoxedStream> {
        let stream = open_tcp(request).await?;
        Ok(Box::new(stream))
    }

    async fn secure(&self, stream: BoxedStream, server_name: &str) -> Result<BoxedStream> {
        let connector = tls::connector(Arc::clone(&self.trust))?;
        tls::upgrade(&connector, stream, server_name).await
    }
}
