//! TCP dialing for command channels.
//!
//! [`open_tcp`] establishes the raw connection described by a
//! [`DialRequest`]: a bounded connect, optionally from a specific local
//! address (hole-punch targets bind the pre-negotiated interface and port
//! before connecting).

use std::net::SocketAddr;

use flexkit_core::error::{Error, Result};
use flexkit_core::transport::DialRequest;
use tokio::net::{TcpSocket, TcpStream, lookup_host};

/// Connect to `request.host:request.port` within `request.timeout`.
pub async fn open_tcp(request: &DialRequest) -> Result<TcpStream> {
    let addr = request.label();
    tracing::debug!(
        addr = %addr,
        bind = ?request.bind,
        timeout_ms = request.timeout.as_millis(),
        "Connecting to TCP endpoint"
    );

    let stream = tokio::time::timeout(request.timeout, connect(request))
        .await
        .map_err(|_| {
            tracing::debug!(addr = %addr, "TCP connection timed out");
            Error::Timeout
        })?
        .map_err(|e| {
            tracing::debug!(addr = %addr, error = %e, "TCP connection failed");
            map_connect_error(e, &addr)
        })?;

    // Commands are small and latency-sensitive.
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(
            addr = %addr,
            error = %e,
            "Failed to set TCP_NODELAY (continuing anyway)"
        );
    }

    tracing::debug!(addr = %addr, "TCP connection established");
    Ok(stream)
}

async fn connect(request: &DialRequest) -> std::io::Result<TcpStream> {
    let Some(local) = request.bind else {
        return TcpStream::connect((request.host.as_str(), request.port)).await;
    };

    let remote = resolve_for(local, &request.host, request.port).await?;
    let socket = if local.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(local)?;
    socket.connect(remote).await
}

/// Resolve `host:port` to an address of the same family as `local`.
async fn resolve_for(local: SocketAddr, host: &str, port: u16) -> std::io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .find(|a| a.is_ipv4() == local.is_ipv4())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address for {host} matching local interface {local}"),
            )
        })
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        std::io::ErrorKind::AddrNotAvailable => {
            Error::InvalidParameter(format!("local interface unusable for {}: {}", addr, e))
        }
        _ => Error::Io(e),
    }
}
