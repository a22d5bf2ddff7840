//! Client engine for SmartSDR-style software-defined radios.
//!
//! This crate discovers radios, opens their command channel and keeps an
//! in-memory model of device state in step with the radio's status stream.
//! It provides:
//!
//! - **Discovery** ([`discovery`], [`vita49`]) -- decode LAN discovery
//!   broadcasts and relay broker records into [`DeviceRecord`]s.
//! - **Store** ([`store`]) -- deduplicated radios by (serial, address) with
//!   their peer-session rosters ([`roster`]), diffed on every receipt.
//! - **Command channel** ([`channel`]) -- sequence-numbered command framing
//!   over TCP, upgraded to TLS for relayed sessions.
//! - **Status engine** ([`status`]) -- the generic create/update/remove
//!   algorithm driven by `key=value` status lines, instantiated per device
//!   object type in [`objects`].
//! - **Session context** ([`context`], [`builder`]) -- owner of the store,
//!   the channel and the object model, routing received lines to engines.
//!
//! # Architecture
//!
//! ```text
//! UDP broadcast / relay text --> DeviceRecord --> DiscoveryStore --> StoreEvent
//!                                                       |
//!                        caller picks a record ---------+
//!                                                       v
//! CommandChannel  C<seq>|cmd -->  radio  --> V / H / R / S / M lines
//!                                                       |
//!                 SessionContext router <---------------+
//!                   R, M    --> SessionEvent
//!                   S       --> ObjectModel --> ObjectEngine<T> --> ObjectEvent<T>
//! ```
//!
//! Every component publishes through a never-blocking
//! [`EventBus`](flexkit_core::EventBus) and exposes read-only snapshots
//! through `tokio::sync::watch`. Nothing is global: build a context with
//! [`SessionBuilder`] and drop it to tear everything down.
//!
//! # Example
//!
//! ```no_run
//! use flexkit::SessionBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> flexkit_core::Result<()> {
//! let radios = flexkit::discovery::discover(Duration::from_secs(3)).await?;
//! if let Some(radio) = radios.first() {
//!     let session = SessionBuilder::new().client_program("logger").build();
//!     if session.connect_to(radio).await {
//!         let mut slices = session.model().slices.subscribe();
//!         while let Ok(event) = slices.recv().await {
//!             println!("{event:?}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod channel;
pub mod codec;
pub mod config;
pub mod context;
pub mod discovery;
pub mod objects;
pub mod roster;
pub mod status;
pub mod store;
pub mod vita49;

pub use builder::SessionBuilder;
pub use channel::{CommandChannel, Target, TargetClass};
pub use config::{ChannelOptions, DiscoveryOptions, ParseMode};
pub use context::{SessionContext, SessionEvent};
pub use discovery::{DeviceKey, DeviceRecord, DiscoveryListener, Source};
pub use objects::{ObjectModel, ObjectSetting};
pub use roster::PeerSession;
pub use status::{ObjectEngine, ObjectEvent, StatusObject};
pub use store::{DiscoveryStore, StoreEvent};
