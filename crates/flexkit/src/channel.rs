//! Command channel: one connection to one radio.
//!
//! [`CommandChannel`] owns the transport to a single radio. It selects the
//! port from the [`Target`] classification, performs the bounded connect,
//! upgrades relay connections to TLS before declaring itself ready, stamps
//! every outbound command with a per-connection sequence number, and runs a
//! receive loop that keeps exactly one read outstanding.
//!
//! Each connection is served by two tasks: a writer that serializes outbound
//! frames and a reader that serializes inbound frames, so `Sent` and
//! `Received` events are published in wire order for their direction.
//!
//! Observers subscribe to the broadcast bus, which drops events for a
//! subscriber that falls too far behind. A consumer that must see every
//! frame opens the [`inbound`](CommandChannel::inbound) feed instead.
//!
//! The channel does not interpret inbound frames and never retries: a
//! transport failure produces one terminal
//! [`ChannelStatus::Disconnected`] event and reconnecting is left to the
//! caller.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use flexkit_core::error::{Error, Result};
use flexkit_core::events::{ChannelEvent, ChannelStatus, EventBus};
use flexkit_core::transport::{BoxedStream, DialRequest, Dialer};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::config::{ChannelOptions, DEFAULT_COMMAND_PORT};

/// How a target is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetClass {
    /// Direct connection on the local network.
    Local,
    /// Relay session through a NAT hole punch. The local end is bound to
    /// `local_interface:negotiated_port` and the remote end is the same
    /// negotiated port.
    HolePunch {
        local_interface: Option<IpAddr>,
        negotiated_port: u16,
    },
    /// Relay session straight to the radio's public TLS port. `None` uses
    /// [`ChannelOptions::relay_tls_port`].
    RelayTls { tls_port: Option<u16> },
}

/// A radio to connect a [`CommandChannel`] to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Radio host name or address.
    pub host: String,
    /// Plain command port used by [`TargetClass::Local`].
    pub port: u16,
    /// Connection classification.
    pub class: TargetClass,
}

impl Target {
    /// A radio on the local network.
    pub fn local(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            class: TargetClass::Local,
        }
    }

    /// A relayed radio reached on its public TLS port.
    pub fn relay_tls(host: impl Into<String>, tls_port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_COMMAND_PORT,
            class: TargetClass::RelayTls { tls_port },
        }
    }

    /// A relayed radio reached through a negotiated hole punch.
    pub fn hole_punch(
        host: impl Into<String>,
        local_interface: Option<IpAddr>,
        negotiated_port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_COMMAND_PORT,
            class: TargetClass::HolePunch {
                local_interface,
                negotiated_port,
            },
        }
    }

    /// Relay sessions are TLS-secured; local sessions are not.
    pub fn is_relay(&self) -> bool {
        !matches!(self.class, TargetClass::Local)
    }

    /// Resolve the connection attempt for this target.
    ///
    /// Fails without touching the network when a hole-punch target has no
    /// usable local interface address.
    pub fn dial_request(&self, options: &ChannelOptions) -> Result<DialRequest> {
        let timeout = options.connect_timeout;
        match &self.class {
            TargetClass::Local => Ok(DialRequest::new(&self.host, self.port, timeout)),
            TargetClass::RelayTls { tls_port } => Ok(DialRequest::new(
                &self.host,
                tls_port.unwrap_or(options.relay_tls_port),
                timeout,
            )),
            TargetClass::HolePunch {
                local_interface,
                negotiated_port,
            } => {
                let local = local_interface
                    .filter(|ip| !ip.is_unspecified())
                    .ok_or_else(|| {
                        Error::InvalidParameter(format!(
                            "hole punch to {} requires a local interface address",
                            self.host
                        ))
                    })?;
                Ok(DialRequest::new(&self.host, *negotiated_port, timeout)
                    .bind_local(local, *negotiated_port))
            }
        }
    }
}

type Feeds = Arc<Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>>;

/// Where channel events go: the broadcast bus, plus every open inbound feed
/// for all but `Sent`.
#[derive(Clone)]
struct Outlet {
    events: EventBus<ChannelEvent>,
    feeds: Feeds,
}

impl Outlet {
    fn publish(&self, event: ChannelEvent) {
        if !matches!(event, ChannelEvent::Sent { .. }) {
            let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
            feeds.retain(|feed| feed.send(event.clone()).is_ok());
        }
        self.events.publish(event);
    }
}

/// State of one live connection.
struct Link {
    live: AtomicBool,
    started: Instant,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl Link {
    /// Tear the link down once. Publishes the terminal status on the first
    /// call only.
    fn close(&self, outlet: &Outlet, error: Option<String>) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.cancel.cancel();
            tracing::debug!(error = ?error, "Command channel disconnected");
            outlet.publish(ChannelEvent::Status(ChannelStatus::Disconnected { error }));
        }
    }
}

/// A sequence-numbered command channel to one radio.
pub struct CommandChannel {
    options: ChannelOptions,
    dialer: Arc<dyn Dialer>,
    outlet: Outlet,
    sequence: AtomicU32,
    link: Mutex<Option<Arc<Link>>>,
}

impl CommandChannel {
    /// Create a disconnected channel that opens connections through `dialer`.
    pub fn new(dialer: Arc<dyn Dialer>, options: ChannelOptions) -> Self {
        Self {
            outlet: Outlet {
                events: EventBus::new(options.event_capacity),
                feeds: Arc::new(Mutex::new(Vec::new())),
            },
            options,
            dialer,
            sequence: AtomicU32::new(0),
            link: Mutex::new(None),
        }
    }

    /// Connect to `target`, returning `false` on any connect failure.
    ///
    /// See [`try_connect`](Self::try_connect) for the failure reason.
    pub async fn connect(&self, target: &Target) -> bool {
        match self.try_connect(target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(host = %target.host, error = %e, "Connect failed");
                false
            }
        }
    }

    /// Connect to `target`.
    ///
    /// The connection start time is taken on raw connect success. Relay
    /// targets are then upgraded to TLS. Only once the stream is usable is
    /// the sequence counter reset to zero and the channel made ready
    /// (publishing [`ChannelStatus::Connected`] and starting to read).
    pub async fn try_connect(&self, target: &Target) -> Result<()> {
        let request = target.dial_request(&self.options)?;
        self.disconnect();

        let stream = self.dialer.dial(&request).await?;
        let started = Instant::now();

        let stream = if target.is_relay() {
            tokio::time::timeout(
                self.options.tls_handshake_timeout,
                self.dialer.secure(stream, &target.host),
            )
            .await
            .map_err(|_| Error::Timeout)??
        } else {
            stream
        };

        self.sequence.store(0, Ordering::SeqCst);
        self.arm(stream, started, &target.host, request.port, target.is_relay());
        Ok(())
    }

    /// Adopt an already connected (and, if required, secured) stream.
    ///
    /// Resets the sequence counter and makes the channel ready immediately.
    pub fn attach(&self, stream: BoxedStream, host: &str, port: u16, secure: bool) {
        self.disconnect();
        self.sequence.store(0, Ordering::SeqCst);
        self.arm(stream, Instant::now(), host, port, secure);
    }

    fn arm(&self, stream: BoxedStream, started: Instant, host: &str, port: u16, secure: bool) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            live: AtomicBool::new(true),
            started,
            cancel: CancellationToken::new(),
            outbound: tx,
        });
        *self.slot() = Some(Arc::clone(&link));

        tokio::spawn(write_loop(write_half, rx, Arc::clone(&link), self.outlet.clone()));

        tracing::debug!(host = %host, port = port, secure = secure, "Command channel ready");
        self.outlet
            .publish(ChannelEvent::Status(ChannelStatus::Connected {
                host: host.to_string(),
                port,
                secure,
            }));

        tokio::spawn(read_loop(
            read_half,
            link,
            self.outlet.clone(),
            self.options.max_frame_len,
        ));
    }

    /// Tear down the connection. Idempotent and callable from any context.
    ///
    /// In-flight reads are abandoned, not drained.
    pub fn disconnect(&self) {
        if let Some(link) = self.slot().take() {
            link.close(&self.outlet, None);
        }
    }

    /// Send a command and return its sequence number.
    ///
    /// The frame `C[D]<seq>|<text>\n` is queued to the writer task, which
    /// publishes a [`ChannelEvent::Sent`] once it is on the wire. The
    /// sequence number is for the caller to correlate the eventual reply.
    pub fn send(&self, text: &str, diagnostic: bool) -> Result<u32> {
        let slot = self.slot();
        let link = slot
            .as_ref()
            .filter(|l| l.live.load(Ordering::SeqCst))
            .ok_or(Error::NotConnected)?;

        // Assigned and queued under the slot lock so wire order matches
        // sequence order.
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        link.outbound
            .send(codec::encode_command(seq, text, diagnostic))
            .map_err(|_| Error::NotConnected)?;

        tracing::trace!(seq = seq, command = %text, diagnostic = diagnostic, "Queued command");
        Ok(seq)
    }

    /// The sequence number the next [`send`](Self::send) will use.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Whether the channel is ready and its transport has not failed.
    pub fn is_connected(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|l| l.live.load(Ordering::SeqCst))
    }

    /// Subscribe to sent/received/status events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.outlet.events.subscribe()
    }

    /// Open a lossless inbound feed: every `Received` and `Status` event
    /// from now on, in order, never dropped.
    ///
    /// Feeds are independent. One is closed once its receiver is dropped.
    pub fn inbound(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outlet
            .feeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Link>>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Connection tasks
// ---------------------------------------------------------------------------

async fn write_loop(
    mut writer: WriteHalf<BoxedStream>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    link: Arc<Link>,
    outlet: Outlet,
) {
    loop {
        let frame = tokio::select! {
            _ = link.cancel.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            tracing::debug!(error = %e, "Command write failed");
            link.close(&outlet, Some(e.to_string()));
            break;
        }

        let text = String::from_utf8_lossy(&frame);
        outlet.publish(ChannelEvent::Sent {
            frame: text.trim_end_matches('\n').to_string(),
            elapsed: link.started.elapsed(),
        });
    }

    let _ = writer.shutdown().await;
}

async fn read_loop(
    reader: ReadHalf<BoxedStream>,
    link: Arc<Link>,
    outlet: Outlet,
    max_frame_len: usize,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(512);
    // Room for the longest frame plus its newline.
    let limit = max_frame_len as u64 + 1;

    loop {
        buf.clear();
        let mut bounded = (&mut reader).take(limit);
        let read = tokio::select! {
            _ = link.cancel.cancelled() => return,
            read = bounded.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("Connection closed by radio");
                link.close(&outlet, Some(Error::ConnectionLost.to_string()));
                return;
            }
            Ok(n) if n as u64 == limit && buf.last() != Some(&b'\n') => {
                tracing::warn!(max_frame_len = max_frame_len, "Inbound frame too long");
                let error = Error::Protocol(format!("frame exceeds {max_frame_len} bytes"));
                link.close(&outlet, Some(error.to_string()));
                return;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let frame = line.trim_end_matches('\n').trim_end_matches('\r');
                if frame.is_empty() {
                    continue;
                }
                tracing::trace!(frame = %frame, "Received frame");
                outlet.publish(ChannelEvent::Received {
                    frame: frame.to_string(),
                    elapsed: link.started.elapsed(),
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "Command channel read error");
                link.close(&outlet, Some(e.to_string()));
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
