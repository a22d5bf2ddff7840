//! SessionBuilder -- fluent builder for constructing [`SessionContext`]s.
//!
//! Separates configuration from construction so that callers can set up
//! timeouts, parse mode, trust policy and registration before any task is
//! spawned.
//!
//! # Example
//!
//! ```no_run
//! use flexkit::SessionBuilder;
//! use flexkit::channel::Target;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let session = SessionBuilder::new()
//!     .client_program("logger")
//!     .connect_timeout(Duration::from_secs(1))
//!     .build();
//! if session.connect(&Target::local("192.168.1.100", 4992)).await {
//!     // Use session.model() and session.subscribe()...
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use flexkit_core::{DEFAULT_EVENT_CAPACITY, Dialer};
use flexkit_transport::{NetDialer, TrustPolicy};

use crate::channel::CommandChannel;
use crate::config::{ChannelOptions, DiscoveryOptions, ParseMode};
use crate::context::{Registration, SessionContext};
use crate::objects::ObjectModel;
use crate::store::DiscoveryStore;

/// Default client program name.
const DEFAULT_CLIENT_PROGRAM: &str = "flexkit";

/// Object classes subscribed to after connecting.
const DEFAULT_SUBSCRIPTIONS: &[&str] = &["slice all", "meter all", "pan all", "amplifier all"];

/// Fluent builder for [`SessionContext`].
///
/// All configuration has defaults, so the simplest usage is
/// `SessionBuilder::new().build()`.
pub struct SessionBuilder {
    channel: ChannelOptions,
    discovery: DiscoveryOptions,
    event_capacity: usize,
    trust: Option<Arc<dyn TrustPolicy>>,
    dialer: Option<Arc<dyn Dialer>>,
    client_program: Option<String>,
    subscriptions: Vec<String>,
}

impl SessionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        SessionBuilder {
            channel: ChannelOptions::default(),
            discovery: DiscoveryOptions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            trust: None,
            dialer: None,
            client_program: Some(DEFAULT_CLIENT_PROGRAM.to_string()),
            subscriptions: DEFAULT_SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace all channel options.
    pub fn channel_options(mut self, options: ChannelOptions) -> Self {
        self.channel = options;
        self
    }

    /// Bound on the raw connect (default: 500ms).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.channel.connect_timeout = timeout;
        self
    }

    /// Bound on the relay TLS handshake (default: 5s).
    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.channel.tls_handshake_timeout = timeout;
        self
    }

    /// TLS port used for relay targets that do not name one (default: 4994).
    pub fn relay_tls_port(mut self, port: u16) -> Self {
        self.channel.relay_tls_port = port;
        self
    }

    /// Replace all discovery options, parse mode included.
    pub fn discovery_options(mut self, options: DiscoveryOptions) -> Self {
        self.discovery = options;
        self
    }

    /// UDP port for the discovery listener (default: 4992).
    pub fn discovery_port(mut self, port: u16) -> Self {
        self.discovery.port = port;
        self
    }

    /// How long a LAN record may go unseen (default: 5s).
    pub fn staleness(mut self, staleness: Duration) -> Self {
        self.discovery.staleness = staleness;
        self
    }

    /// Unknown-key handling for status lines and discovery records.
    ///
    /// Defaults to [`ParseMode::for_build`].
    pub fn parse_mode(mut self, mode: ParseMode) -> Self {
        self.discovery.parse_mode = mode;
        self
    }

    /// Capacity of every event bus in the session (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Certificate policy for relay TLS. Ignored when a custom dialer is set.
    pub fn trust_policy(mut self, trust: Arc<dyn TrustPolicy>) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Open connections through `dialer` instead of TCP + rustls.
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Client program name registered after connect (default: "flexkit").
    pub fn client_program(mut self, name: &str) -> Self {
        self.client_program = Some(name.to_string());
        self
    }

    /// Replace the status subscriptions sent after connect.
    pub fn subscriptions<I, S>(mut self, objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions = objects.into_iter().map(Into::into).collect();
        self
    }

    /// Send nothing after connect.
    pub fn no_registration(mut self) -> Self {
        self.client_program = None;
        self.subscriptions.clear();
        self
    }

    /// Build the context. Must be called within a Tokio runtime.
    pub fn build(self) -> SessionContext {
        let dialer: Arc<dyn Dialer> = match (self.dialer, self.trust) {
            (Some(dialer), _) => dialer,
            (None, Some(trust)) => Arc::new(NetDialer::with_trust_policy(trust)),
            (None, None) => Arc::new(NetDialer::new()),
        };

        let mut channel_options = self.channel;
        channel_options.event_capacity = self.event_capacity;
        let mode = self.discovery.parse_mode;

        SessionContext::assemble(
            CommandChannel::new(dialer, channel_options),
            ObjectModel::spawn(mode, self.event_capacity),
            DiscoveryStore::with_capacity(self.event_capacity),
            self.event_capacity,
            Registration {
                client_program: self.client_program,
                subscriptions: self.subscriptions,
            },
            self.discovery,
        )
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Target;
    use crate::context::SessionEvent;
    use flexkit_core::ChannelStatus;
    use flexkit_test_harness::MockRadio;

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.channel.connect_timeout, Duration::from_millis(500));
        assert_eq!(builder.channel.relay_tls_port, 4994);
        assert_eq!(builder.discovery.port, 4992);
        assert_eq!(builder.discovery.parse_mode, ParseMode::for_build());
        assert_eq!(builder.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(builder.client_program.as_deref(), Some("flexkit"));
        assert_eq!(builder.subscriptions.len(), DEFAULT_SUBSCRIPTIONS.len());
        assert!(builder.dialer.is_none());
    }

    #[test]
    fn test_builder_custom_settings() {
        let builder = SessionBuilder::new()
            .connect_timeout(Duration::from_secs(2))
            .tls_handshake_timeout(Duration::from_secs(1))
            .relay_tls_port(5994)
            .discovery_port(14992)
            .staleness(Duration::from_secs(10))
            .parse_mode(ParseMode::Lenient)
            .event_capacity(32)
            .client_program("logger")
            .subscriptions(["slice all"]);

        assert_eq!(builder.channel.connect_timeout, Duration::from_secs(2));
        assert_eq!(builder.channel.tls_handshake_timeout, Duration::from_secs(1));
        assert_eq!(builder.channel.relay_tls_port, 5994);
        assert_eq!(builder.discovery.port, 14992);
        assert_eq!(builder.discovery.staleness, Duration::from_secs(10));
        assert_eq!(builder.discovery.parse_mode, ParseMode::Lenient);
        assert_eq!(builder.event_capacity, 32);
        assert_eq!(builder.client_program.as_deref(), Some("logger"));
        assert_eq!(builder.subscriptions, vec!["slice all".to_string()]);
    }

    #[test]
    fn test_no_registration() {
        let builder = SessionBuilder::new().no_registration();
        assert!(builder.client_program.is_none());
        assert!(builder.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_build_connects_and_registers() {
        let mut radio = MockRadio::new().await.unwrap();
        radio
            .push_line("V1.4.0.0")
            .push_line("H2A3B4C5D")
            .expect_command("client program logger")
            .expect_command("sub slice all")
            .expect_command("sub meter all")
            .hangup();
        let port = radio.port();
        radio.start();

        let session = SessionBuilder::new()
            .client_program("logger")
            .subscriptions(["slice all", "meter all"])
            .build();
        let mut events = session.subscribe();
        assert!(session.connect(&Target::local("127.0.0.1", port)).await);

        let connected = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            connected,
            SessionEvent::Channel(ChannelStatus::Connected { .. })
        ));

        let frames = radio.wait().await.unwrap();
        assert_eq!(
            frames,
            vec!["C0|client program logger", "C1|sub slice all", "C2|sub meter all"]
        );
    }

    #[tokio::test]
    async fn test_build_refused_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let session = SessionBuilder::new().build();
        assert!(!session.connect(&Target::local("127.0.0.1", port)).await);
        assert!(!session.is_connected());
    }
}
