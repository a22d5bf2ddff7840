//! Session context: the discovery store, one command channel and the
//! object model, wired together.
//!
//! A background router reads every frame the channel receives from a
//! lossless feed and classifies it. Status lines are queued to the matching
//! object engine without waiting for them to be applied, replies
//! and messages are republished as [`SessionEvent`]s for the caller to
//! correlate by sequence number, and a channel disconnect clears the object
//! model. Contexts are constructed with
//! [`SessionBuilder`](crate::builder::SessionBuilder); nothing is global.

use std::sync::{Arc, Mutex, MutexGuard};

use flexkit_core::error::Result;
use flexkit_core::{BoxedStream, ChannelEvent, ChannelStatus, EventBus};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::channel::{CommandChannel, Target};
use crate::codec::{self, Inbound, ProtocolVersion, Reply};
use crate::config::{DiscoveryOptions, ParseMode};
use crate::discovery::{DeviceRecord, DiscoveryListener};
use crate::objects::{ObjectModel, ObjectSetting};
use crate::status::{Rejected, StatusObject};
use crate::store::DiscoveryStore;

/// What a session publishes besides object and store events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The radio announced its protocol version.
    Version(ProtocolVersion),
    /// The radio assigned our client handle.
    Handle(u32),
    /// A reply to a command sent on this session.
    Reply(Reply),
    /// An informational message from the radio.
    Message(String),
    /// A status line was rejected in strict parse mode.
    ProtocolError { line: String, error: String },
    /// The command channel connected or disconnected.
    Channel(ChannelStatus),
}

#[derive(Debug, Default)]
struct Handshake {
    version: Option<ProtocolVersion>,
    handle: Option<u32>,
}

/// Registration sent after every successful connect.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub(crate) client_program: Option<String>,
    pub(crate) subscriptions: Vec<String>,
}

/// Owner of a store, a command channel and an object model.
pub struct SessionContext {
    store: DiscoveryStore,
    channel: Arc<CommandChannel>,
    model: ObjectModel,
    events: EventBus<SessionEvent>,
    handshake: Arc<Mutex<Handshake>>,
    registration: Registration,
    discovery: DiscoveryOptions,
    parse_mode: ParseMode,
    listener: tokio::sync::Mutex<Option<DiscoveryListener>>,
    cancel: CancellationToken,
}

impl SessionContext {
    pub(crate) fn assemble(
        channel: CommandChannel,
        model: ObjectModel,
        store: DiscoveryStore,
        event_capacity: usize,
        registration: Registration,
        discovery: DiscoveryOptions,
    ) -> Self {
        let channel = Arc::new(channel);
        let events = EventBus::new(event_capacity);
        let handshake = Arc::new(Mutex::new(Handshake::default()));
        let cancel = CancellationToken::new();

        tokio::spawn(route(
            channel.inbound(),
            model.clone(),
            store.clone(),
            events.clone(),
            Arc::clone(&handshake),
            cancel.clone(),
        ));

        Self {
            store,
            channel,
            model,
            events,
            handshake,
            registration,
            parse_mode: discovery.parse_mode,
            discovery,
            listener: tokio::sync::Mutex::new(None),
            cancel,
        }
    }

    pub fn store(&self) -> &DiscoveryStore {
        &self.store
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// Start listening for LAN discovery broadcasts. A no-op when already
    /// listening.
    pub async fn start_discovery(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_none() {
            let bound = DiscoveryListener::bind(self.store.clone(), self.discovery.clone()).await?;
            *listener = Some(bound);
        }
        Ok(())
    }

    pub async fn stop_discovery(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.stop().await;
        }
    }

    /// Decode a relay broker record and add it to the store.
    pub fn ingest_relay(&self, payload: &str) -> Result<()> {
        let record = DeviceRecord::from_relay(payload, self.parse_mode)?;
        self.store.ingest(record)
    }

    /// Connect the command channel and register with the radio.
    ///
    /// Returns `false` on any connect failure.
    pub async fn connect(&self, target: &Target) -> bool {
        if !self.channel.connect(target).await {
            return false;
        }
        if let Err(e) = self.register() {
            tracing::warn!(host = %target.host, error = %e, "Registration failed");
        }
        true
    }

    /// Connect to a discovered radio.
    pub async fn connect_to(&self, record: &DeviceRecord) -> bool {
        self.connect(&record.target()).await
    }

    /// Adopt an already connected stream and register with the radio.
    pub fn attach(&self, stream: BoxedStream, host: &str, port: u16, secure: bool) {
        self.channel.attach(stream, host, port, secure);
        if let Err(e) = self.register() {
            tracing::warn!(host = %host, error = %e, "Registration failed");
        }
    }

    fn register(&self) -> Result<()> {
        if let Some(program) = &self.registration.client_program {
            self.channel.send(&codec::cmd_client_program(program), false)?;
        }
        for object in &self.registration.subscriptions {
            self.channel.send(&codec::cmd_subscribe(object), false)?;
        }
        Ok(())
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Send a command. Its reply arrives as [`SessionEvent::Reply`] with the
    /// returned sequence number.
    pub fn send(&self, command: &str) -> Result<u32> {
        self.channel.send(command, false)
    }

    /// Send a command flagged as diagnostic (`CD` prefix).
    pub fn send_diagnostic(&self, command: &str) -> Result<u32> {
        self.channel.send(command, true)
    }

    /// Send the command for one object setting.
    pub fn apply_setting<S: ObjectSetting>(
        &self,
        id: &<S::Object as StatusObject>::Id,
        setting: &S,
    ) -> Result<u32> {
        let command = setting.command(id);
        tracing::trace!(
            object = <S::Object as StatusObject>::OBJECT,
            command = %command,
            "Applying setting"
        );
        self.channel.send(&command, false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Our client handle, once the radio has assigned it.
    pub fn handle(&self) -> Option<u32> {
        lock(&self.handshake).handle
    }

    pub fn version(&self) -> Option<ProtocolVersion> {
        lock(&self.handshake).version.clone()
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.channel.disconnect();
    }
}

fn lock(handshake: &Mutex<Handshake>) -> MutexGuard<'_, Handshake> {
    handshake.lock().unwrap_or_else(|e| e.into_inner())
}

async fn route(
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    model: ObjectModel,
    store: DiscoveryStore,
    events: EventBus<SessionEvent>,
    handshake: Arc<Mutex<Handshake>>,
    cancel: CancellationToken,
) {
    let (rejects_tx, mut rejects) = mpsc::unbounded_channel::<Rejected>();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(rejected) = rejects.recv() => {
                events.publish(SessionEvent::ProtocolError {
                    line: rejected.frame,
                    error: rejected.error.to_string(),
                });
            }
            event = inbound.recv() => match event {
                Some(ChannelEvent::Received { frame, .. }) => {
                    dispatch(&frame, &model, &store, &events, &handshake, &rejects_tx);
                }
                Some(ChannelEvent::Status(status)) => {
                    if let ChannelStatus::Disconnected { .. } = &status {
                        *lock(&handshake) = Handshake::default();
                        let _ = store.set_own_handle(None);
                        if let Err(e) = model.clear().await {
                            tracing::warn!(error = %e, "Failed to clear object model");
                        }
                    }
                    events.publish(SessionEvent::Channel(status));
                }
                Some(ChannelEvent::Sent { .. }) => {}
                None => break,
            },
        }
    }
    tracing::trace!("Session router stopped");
}

fn dispatch(
    frame: &str,
    model: &ObjectModel,
    store: &DiscoveryStore,
    events: &EventBus<SessionEvent>,
    handshake: &Mutex<Handshake>,
    rejects: &mpsc::UnboundedSender<Rejected>,
) {
    let inbound = match codec::parse_line(frame) {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::trace!(frame = %frame, error = %e, "Unparsable frame");
            return;
        }
    };

    match inbound {
        Inbound::Version(version) => {
            tracing::debug!(?version, "Radio protocol version");
            lock(handshake).version = Some(version.clone());
            events.publish(SessionEvent::Version(version));
        }
        Inbound::Handle(handle) => {
            tracing::debug!(handle = handle, "Client handle assigned");
            lock(handshake).handle = Some(handle);
            let _ = store.set_own_handle(Some(handle));
            events.publish(SessionEvent::Handle(handle));
        }
        Inbound::Reply(reply) => {
            if reply.code != 0 {
                tracing::debug!(
                    seq = reply.sequence,
                    code = reply.code,
                    text = %reply.text,
                    "Command failed"
                );
            }
            events.publish(SessionEvent::Reply(reply));
        }
        Inbound::Status(status) => {
            match model.submit(&status.object, &status.rest, frame, rejects) {
                Ok(true) => {}
                Ok(false) => tracing::trace!(object = %status.object, "Untracked status"),
                Err(e) => tracing::warn!(object = %status.object, error = %e, "Object engine gone"),
            }
        }
        Inbound::Message(text) => {
            tracing::debug!(text = %text, "Radio message");
            events.publish(SessionEvent::Message(text));
        }
        Inbound::Unknown(line) => tracing::trace!(line = %line, "Unknown frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SessionBuilder;
    use crate::objects::SliceSetting;
    use flexkit_core::Error;
    use flexkit_test_harness::MockRadio;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn next(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session bus closed")
    }

    #[tokio::test]
    async fn routes_handshake_status_replies_and_messages() {
        let mut radio = MockRadio::new().await.unwrap();
        radio
            .push_line("V1.4.0.0")
            .push_line("H2A3B4C5D")
            .push_line("S2A3B4C5D|slice 0 RF_frequency=14.250000 mode=USB")
            .expect_command("slice tune 0 7.100000")
            .reply("50000015", "bad freq")
            .push_line("M10000001|hello")
            .hangup();
        let port = radio.port();
        radio.start();

        let session = SessionBuilder::new()
            .no_registration()
            .parse_mode(ParseMode::Strict)
            .build();
        let mut rx = session.subscribe();
        let mut slices = session.model().slices.watch();
        assert!(session.connect(&Target::local("127.0.0.1", port)).await);

        assert!(matches!(
            next(&mut rx).await,
            SessionEvent::Channel(ChannelStatus::Connected { .. })
        ));
        match next(&mut rx).await {
            SessionEvent::Version(v) => assert_eq!((v.major, v.minor), (1, 4)),
            other => panic!("expected Version, got {other:?}"),
        }
        assert_eq!(next(&mut rx).await, SessionEvent::Handle(0x2A3B_4C5D));
        assert_eq!(session.handle(), Some(0x2A3B_4C5D));

        tokio::time::timeout(Duration::from_secs(2), slices.wait_for(|s| s.contains_key(&0)))
            .await
            .unwrap()
            .unwrap();
        let slice = session.model().slices.get(&0).unwrap();
        assert_eq!(slice.frequency_hz, 14_250_000);
        assert_eq!(slice.mode, "USB");

        let seq = session
            .apply_setting(&0, &SliceSetting::Frequency(7_100_000))
            .unwrap();
        assert_eq!(seq, 0);

        match next(&mut rx).await {
            SessionEvent::Reply(reply) => {
                assert_eq!(reply.sequence, seq);
                assert_eq!(reply.code, 0x5000_0015);
                assert_eq!(reply.text, "bad freq");
            }
            other => panic!("expected Reply, got {other:?}"),
        }
        assert_eq!(next(&mut rx).await, SessionEvent::Message("hello".into()));
        assert!(matches!(
            next(&mut rx).await,
            SessionEvent::Channel(ChannelStatus::Disconnected { error: Some(_) })
        ));

        assert!(session.model().slices.snapshot().is_empty());
        assert_eq!(session.handle(), None);
        assert_eq!(radio.wait().await.unwrap(), vec!["C0|slice tune 0 7.100000"]);
    }

    #[tokio::test]
    async fn strict_mode_publishes_protocol_errors() {
        let session = SessionBuilder::new()
            .no_registration()
            .parse_mode(ParseMode::Strict)
            .build();
        let mut rx = session.subscribe();
        let (stream, mut peer) = tokio::io::duplex(1024);
        session.attach(Box::new(stream), "radio", 4992, false);
        assert!(matches!(next(&mut rx).await, SessionEvent::Channel(_)));

        peer.write_all(b"S1|slice 0 bogus_key=1\n").await.unwrap();
        match next(&mut rx).await {
            SessionEvent::ProtocolError { line, error } => {
                assert_eq!(line, "S1|slice 0 bogus_key=1");
                assert!(error.contains("bogus_key"));
            }
            other => panic!("expected ProtocolError, got {other:?}"),
        }
        assert!(session.model().slices.get(&0).is_none());
    }

    #[tokio::test]
    async fn status_burst_beyond_event_capacity_is_fully_applied() {
        const LINES: u32 = 600;

        let session = SessionBuilder::new()
            .no_registration()
            .parse_mode(ParseMode::Strict)
            .event_capacity(16)
            .build();
        let mut slices = session.model().slices.watch();
        let (stream, mut peer) = tokio::io::duplex(64 * 1024);
        session.attach(Box::new(stream), "radio", 4992, false);

        let writer = tokio::spawn(async move {
            for i in 0..LINES {
                let line = format!("S1|slice {i} mode=USB\n");
                peer.write_all(line.as_bytes()).await.unwrap();
            }
            peer
        });

        tokio::time::timeout(
            Duration::from_secs(10),
            slices.wait_for(|s| s.len() == LINES as usize),
        )
        .await
        .expect("status lines were dropped")
        .unwrap();
        let _peer = writer.await.unwrap();

        let snapshot = session.model().slices.snapshot();
        assert!((0..LINES).all(|i| snapshot.get(&i).is_some_and(|s| s.mode == "USB")));
    }

    #[tokio::test]
    async fn lenient_mode_skips_unknown_keys() {
        let session = SessionBuilder::new()
            .no_registration()
            .parse_mode(ParseMode::Lenient)
            .build();
        let mut slices = session.model().slices.watch();
        let (stream, mut peer) = tokio::io::duplex(1024);
        session.attach(Box::new(stream), "radio", 4992, false);

        peer.write_all(b"S1|slice 0 bogus_key=1 mode=CW\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), slices.wait_for(|s| s.contains_key(&0)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.model().slices.get(&0).unwrap().mode, "CW");
    }

    #[tokio::test]
    async fn attach_registers() {
        let session = SessionBuilder::new()
            .client_program("logger")
            .subscriptions(["slice all"])
            .build();
        let (stream, peer) = tokio::io::duplex(1024);
        session.attach(Box::new(stream), "radio", 4992, false);

        let mut lines = BufReader::new(peer).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "C0|client program logger");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "C1|sub slice all");
    }

    #[tokio::test]
    async fn relay_records_enter_the_store() {
        let session = SessionBuilder::new().parse_mode(ParseMode::Strict).build();
        session
            .ingest_relay("serial=S1 public_ip=203.0.113.4 public_tls_port=4994 radio_name=Remote")
            .unwrap();
        assert!(matches!(
            session.ingest_relay("serial=S2 surprise=1"),
            Err(Error::UnknownToken { .. })
        ));
        session.store().barrier().await.unwrap();

        let snapshot = session.store().snapshot();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.values().next().unwrap();
        assert_eq!(record.nickname, "Remote");
        assert!(record.target().is_relay());
    }

    #[tokio::test]
    async fn settings_need_a_connection() {
        let session = SessionBuilder::new().build();
        assert!(matches!(
            session.apply_setting(&0, &SliceSetting::Mode("USB".into())),
            Err(Error::NotConnected)
        ));
        assert!(session.version().is_none());
    }
}
