//! flexkit-core: Core error, event, and transport-seam types for flexkit.
//!
//! This crate defines the pieces shared by every flexkit component: the
//! error taxonomy, the non-blocking multi-consumer event bus, the command
//! channel's event types, and the [`Dialer`] trait through which channels
//! obtain their byte streams.
//!
//! # Key types
//!
//! - [`Error`] / [`Result`] -- error handling
//! - [`EventBus`] -- broadcast publication with a never-blocking publisher
//! - [`ChannelEvent`] / [`ChannelStatus`] -- command channel notifications
//! - [`Dialer`] / [`DialRequest`] -- connection establishment and TLS upgrade

pub mod error;
pub mod events;
pub mod transport;

pub use error::{Error, Result};
pub use events::{ChannelEvent, ChannelStatus, DEFAULT_EVENT_CAPACITY, EventBus};
pub use transport::{BoxedStream, ByteStream, DialRequest, Dialer};
