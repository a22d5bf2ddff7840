//! Error types for flexkit.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Connect failures, mid-session transport
//! failures, parse failures, and strict-mode protocol drift are all
//! captured here.

/// The error type for all flexkit operations.
///
/// Not every variant reaches the caller: parse failures inside a discovery
/// record or status line are usually recovered locally (the offending row
/// or token is skipped), and mid-session transport failures are reported as
/// a terminal channel event rather than returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, UDP socket, local interface).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed line, unexpected handshake value).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a connection or a response.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed, such as a hole-punch target without
    /// a usable local interface address.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The TLS upgrade of a relay connection failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A status line or discovery record carried a key outside the object's
    /// token table while parsing in strict mode.
    ///
    /// Lenient parsing skips such tokens instead; strict parsing surfaces
    /// them so wire-format drift is caught during development.
    #[error("unknown {object} token: {key}")]
    UnknownToken {
        /// The object kind being parsed (e.g. `"slice"`, `"discovery"`).
        object: &'static str,
        /// The unrecognised key.
        key: String,
    },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("bad reply line".into());
        assert_eq!(e.to_string(), "protocol error: bad reply line");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("unspecified local interface".into());
        assert_eq!(
            e.to_string(),
            "invalid parameter: unspecified local interface"
        );
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn error_display_connection_lost() {
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_display_tls() {
        let e = Error::Tls("handshake failure".into());
        assert_eq!(e.to_string(), "TLS error: handshake failure");
    }

    #[test]
    fn error_display_unknown_token() {
        let e = Error::UnknownToken {
            object: "slice",
            key: "bogus".into(),
        };
        assert_eq!(e.to_string(), "unknown slice token: bogus");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
