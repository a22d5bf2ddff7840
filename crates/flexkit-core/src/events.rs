//! Asynchronous event publication.
//!
//! Every component in flexkit publishes its state changes through an
//! [`EventBus`], a thin wrapper over [`tokio::sync::broadcast`]. Publishing
//! never blocks: each currently registered subscriber receives every event
//! at least once unless it falls more than the bus capacity behind, in which
//! case it observes [`RecvError::Lagged`](tokio::sync::broadcast::error::RecvError::Lagged)
//! and resumes from the oldest retained event.

use std::time::Duration;

use tokio::sync::broadcast;

/// Default capacity of an [`EventBus`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Multi-consumer, non-blocking event publisher.
#[derive(Debug)]
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    /// Create a bus retaining at most `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to. Having
    /// no subscribers is not an error.
    pub fn publish(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Register a new subscriber. Only events published after this call are
    /// observed.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Connection status of a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel is ready: raw connect succeeded and, for relay targets,
    /// the TLS handshake completed.
    Connected {
        /// Remote host the channel is connected to.
        host: String,
        /// Remote port the channel is connected to.
        port: u16,
        /// Whether the stream is TLS-secured.
        secure: bool,
    },

    /// The channel closed. Terminal for this connection.
    Disconnected {
        /// The underlying transport error, if the close was not requested.
        error: Option<String>,
    },
}

/// An event emitted by a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A command frame was written to the transport.
    Sent {
        /// The frame without its trailing newline, e.g. `C3|info`.
        frame: String,
        /// Time since the connection was established.
        elapsed: Duration,
    },

    /// A frame was read from the transport.
    Received {
        /// The frame with the trailing delimiter stripped.
        frame: String,
        /// Time since the connection was established.
        elapsed: Duration,
    },

    /// The channel's connection status changed.
    Status(ChannelStatus),
}
