//! Tunable options for channels, discovery, and status parsing.

use std::time::Duration;

use flexkit_core::DEFAULT_EVENT_CAPACITY;

/// Default device command port for direct (LAN) connections.
pub const DEFAULT_COMMAND_PORT: u16 = 4992;

/// Default TLS command port for relay-direct connections.
pub const DEFAULT_RELAY_TLS_PORT: u16 = 4994;

/// Default bound on the raw connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default bound on the TLS handshake of a relay connection.
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on one inbound frame, newline excluded.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Default UDP port discovery broadcasts arrive on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4992;

/// How long a local record may go unseen before it is swept.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(5);

/// How often the discovery listener sweeps stale records.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// How unrecognised keys in status lines and discovery records are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown keys are an error. Catches wire-format drift early.
    Strict,
    /// Unknown keys are skipped.
    Lenient,
}

impl ParseMode {
    /// `Strict` in debug builds, `Lenient` in release builds.
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        }
    }

    pub fn is_strict(self) -> bool {
        self == ParseMode::Strict
    }
}

impl Default for ParseMode {
    fn default() -> Self {
        Self::for_build()
    }
}

/// Options for a [`CommandChannel`](crate::channel::CommandChannel).
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Upper bound on the raw TCP connect.
    pub connect_timeout: Duration,
    /// Upper bound on the TLS handshake for relay targets.
    pub tls_handshake_timeout: Duration,
    /// Port used for relay targets that connect straight to the TLS port
    /// when the target does not name one.
    pub relay_tls_port: u16,
    /// Capacity of the channel's event bus.
    pub event_capacity: usize,
    /// Longest inbound frame accepted. A longer one closes the connection.
    pub max_frame_len: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            relay_tls_port: DEFAULT_RELAY_TLS_PORT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Options for the LAN [`DiscoveryListener`](crate::discovery::DiscoveryListener).
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// UDP port to listen on.
    pub port: u16,
    /// Local records not seen for this long are removed.
    pub staleness: Duration,
    /// Interval between stale sweeps.
    pub sweep_interval: Duration,
    /// Key handling for discovery payloads.
    pub parse_mode: ParseMode,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            staleness: DEFAULT_STALENESS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            parse_mode: ParseMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_defaults() {
        let o = ChannelOptions::default();
        assert_eq!(o.connect_timeout, Duration::from_millis(500));
        assert_eq!(o.relay_tls_port, 4994);
        assert_eq!(o.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(o.max_frame_len, 64 * 1024);
    }

    #[test]
    fn discovery_defaults() {
        let o = DiscoveryOptions::default();
        assert_eq!(o.port, 4992);
        assert_eq!(o.staleness, Duration::from_secs(5));
        assert_eq!(o.parse_mode, ParseMode::for_build());
    }

    #[test]
    fn parse_mode_follows_build_profile() {
        assert_eq!(ParseMode::default().is_strict(), cfg!(debug_assertions));
    }
}
