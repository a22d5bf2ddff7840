//! Discovery records and the LAN discovery listener.
//!
//! Radios announce themselves on the local network with VITA-49 broadcasts
//! (see [`vita49`](crate::vita49)); relay brokers report the same
//! information as `key=value` text. Both are decoded into a
//! [`DeviceRecord`]. Local and relay payloads name some fields differently,
//! so keys are resolved through an alias table:
//!
//! | field | local | relay |
//! |---|---|---|
//! | public address | `ip` | `public_ip` |
//! | in-use host | `inuse_host` | `inusehost` |
//! | in-use address | `inuse_ip` | `inuseip` |
//! | nickname | `nickname` | `radio_name` |
//! | session addresses | `gui_client_ips` | `gui_client_ip` |
//!
//! Spaces inside values are sent as `0x7F` and restored on decode.
//!
//! # Usage
//!
//! ```no_run
//! use flexkit::discovery;
//! use std::time::Duration;
//!
//! # async fn example() -> flexkit_core::Result<()> {
//! let radios = discovery::discover(Duration::from_secs(3)).await?;
//! for radio in &radios {
//!     println!("{} ({}) at {}:{}", radio.model, radio.serial, radio.public_ip, radio.port);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use flexkit_core::error::{Error, Result};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::Target;
use crate::config::{DEFAULT_COMMAND_PORT, DEFAULT_DISCOVERY_PORT, DiscoveryOptions, ParseMode};
use crate::roster::{PeerSession, SessionColumns};
use crate::store::DiscoveryStore;
use crate::vita49;

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// LAN broadcast. Expires when no longer heard.
    Local,
    /// Relay broker. Never time-expired.
    Relay,
}

/// Identity of a radio: serial number plus public address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub serial: String,
    pub public_ip: String,
}

/// One radio as announced by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// Local identity, assigned by the store on first insert.
    pub local_id: Uuid,
    /// When the record was last received.
    pub last_seen: Instant,
    pub source: Source,

    pub serial: String,
    pub public_ip: String,
    pub model: String,
    pub nickname: String,
    pub callsign: String,
    /// `Available`, `In_Use`, `Update`, ...
    pub status: String,
    pub version: String,
    pub min_software_version: String,
    pub discovery_protocol_version: String,
    /// Plain command port.
    pub port: u16,
    pub inuse_host: String,
    pub inuse_ip: String,

    pub public_tls_port: Option<u16>,
    pub public_udp_port: Option<u16>,
    pub public_upnp_tls_port: Option<u16>,
    pub public_upnp_udp_port: Option<u16>,
    pub upnp_supported: bool,
    pub requires_hole_punch: bool,
    pub wan_connected: bool,
    pub external_port_link: bool,

    pub max_licensed_version: String,
    pub radio_license_id: String,
    pub requires_additional_license: bool,
    pub fpc_mac: String,
    pub turf_region: String,

    pub licensed_clients: u32,
    pub available_clients: u32,
    pub max_panadapters: u32,
    pub available_panadapters: u32,
    pub max_slices: u32,
    pub available_slices: u32,

    pub gui_client_programs: String,
    pub gui_client_stations: String,
    pub gui_client_handles: String,
    pub gui_client_ips: String,
    pub gui_client_hosts: String,

    /// Decoded from the `gui_client_*` columns by the store.
    pub sessions: Vec<PeerSession>,
}

/// Recognised discovery keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Serial,
    PublicIp,
    Model,
    Nickname,
    Callsign,
    Status,
    Version,
    MinSoftwareVersion,
    DiscoveryProtocolVersion,
    Port,
    InuseHost,
    InuseIp,
    PublicTlsPort,
    PublicUdpPort,
    PublicUpnpTlsPort,
    PublicUpnpUdpPort,
    UpnpSupported,
    RequiresHolePunch,
    WanConnected,
    ExternalPortLink,
    MaxLicensedVersion,
    RadioLicenseId,
    RequiresAdditionalLicense,
    FpcMac,
    TurfRegion,
    LicensedClients,
    AvailableClients,
    MaxPanadapters,
    AvailablePanadapters,
    MaxSlices,
    AvailableSlices,
    GuiClientPrograms,
    GuiClientStations,
    GuiClientHandles,
    GuiClientIps,
    GuiClientHosts,
}

impl Key {
    fn resolve(key: &str) -> Option<Key> {
        Some(match key {
            "serial" => Key::Serial,
            "ip" | "public_ip" => Key::PublicIp,
            "model" => Key::Model,
            "nickname" | "radio_name" => Key::Nickname,
            "callsign" => Key::Callsign,
            "status" => Key::Status,
            "version" => Key::Version,
            "min_software_version" => Key::MinSoftwareVersion,
            "discovery_protocol_version" => Key::DiscoveryProtocolVersion,
            "port" => Key::Port,
            "inuse_host" | "inusehost" => Key::InuseHost,
            "inuse_ip" | "inuseip" => Key::InuseIp,
            "public_tls_port" => Key::PublicTlsPort,
            "public_udp_port" => Key::PublicUdpPort,
            "public_upnp_tls_port" => Key::PublicUpnpTlsPort,
            "public_upnp_udp_port" => Key::PublicUpnpUdpPort,
            "upnp_supported" => Key::UpnpSupported,
            "requires_holepunch" => Key::RequiresHolePunch,
            "wan_connected" => Key::WanConnected,
            "external_port_link" => Key::ExternalPortLink,
            "max_licensed_version" => Key::MaxLicensedVersion,
            "radio_license_id" => Key::RadioLicenseId,
            "requires_additional_license" => Key::RequiresAdditionalLicense,
            "fpc_mac" => Key::FpcMac,
            "turf_region" => Key::TurfRegion,
            "licensed_clients" => Key::LicensedClients,
            "available_clients" => Key::AvailableClients,
            "max_panadapters" => Key::MaxPanadapters,
            "available_panadapters" => Key::AvailablePanadapters,
            "max_slices" => Key::MaxSlices,
            "available_slices" => Key::AvailableSlices,
            "gui_client_programs" => Key::GuiClientPrograms,
            "gui_client_stations" => Key::GuiClientStations,
            "gui_client_handles" => Key::GuiClientHandles,
            "gui_client_ips" | "gui_client_ip" => Key::GuiClientIps,
            "gui_client_hosts" => Key::GuiClientHosts,
            _ => return None,
        })
    }
}

fn set_num<N: std::str::FromStr>(slot: &mut N, key: &str, value: &str) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::trace!(key = %key, value = %value, "Ignoring malformed discovery value"),
    }
}

fn set_port(slot: &mut Option<u16>, key: &str, value: &str) {
    if value.is_empty() {
        *slot = None;
    } else {
        match value.parse::<u16>() {
            Ok(p) => *slot = Some(p),
            Err(_) => tracing::trace!(key = %key, value = %value, "Ignoring malformed port"),
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "True")
}

impl DeviceRecord {
    /// An empty record, stamped now.
    pub fn new(source: Source) -> Self {
        Self {
            local_id: Uuid::nil(),
            last_seen: Instant::now(),
            source,
            serial: String::new(),
            public_ip: String::new(),
            model: String::new(),
            nickname: String::new(),
            callsign: String::new(),
            status: String::new(),
            version: String::new(),
            min_software_version: String::new(),
            discovery_protocol_version: String::new(),
            port: DEFAULT_COMMAND_PORT,
            inuse_host: String::new(),
            inuse_ip: String::new(),
            public_tls_port: None,
            public_udp_port: None,
            public_upnp_tls_port: None,
            public_upnp_udp_port: None,
            upnp_supported: false,
            requires_hole_punch: false,
            wan_connected: false,
            external_port_link: false,
            max_licensed_version: String::new(),
            radio_license_id: String::new(),
            requires_additional_license: false,
            fpc_mac: String::new(),
            turf_region: String::new(),
            licensed_clients: 0,
            available_clients: 0,
            max_panadapters: 0,
            available_panadapters: 0,
            max_slices: 0,
            available_slices: 0,
            gui_client_programs: String::new(),
            gui_client_stations: String::new(),
            gui_client_handles: String::new(),
            gui_client_ips: String::new(),
            gui_client_hosts: String::new(),
            sessions: Vec::new(),
        }
    }

    /// Decode a `key=value` payload.
    ///
    /// Unknown keys fail in [`ParseMode::Strict`] and are skipped in
    /// [`ParseMode::Lenient`]. Malformed numbers leave the field at its
    /// default. A record without a serial is rejected.
    pub fn parse(payload: &str, source: Source, mode: ParseMode) -> Result<Self> {
        let mut record = Self::new(source);

        for token in payload.split(|c: char| c.is_whitespace() || c == '\0') {
            if token.is_empty() {
                continue;
            }
            let Some((key, raw)) = token.split_once('=') else {
                tracing::trace!(token = %token, "Skipping bare discovery token");
                continue;
            };
            let value = raw.replace('\u{7f}', " ");

            let Some(field) = Key::resolve(key) else {
                if mode.is_strict() {
                    return Err(Error::UnknownToken {
                        object: "discovery",
                        key: key.to_string(),
                    });
                }
                tracing::trace!(key = %key, "Unknown discovery key skipped");
                continue;
            };
            record.set(field, key, value);
        }

        if record.serial.is_empty() {
            return Err(Error::Protocol("discovery record without serial".into()));
        }
        Ok(record)
    }

    fn set(&mut self, field: Key, key: &str, value: String) {
        match field {
            Key::Serial => self.serial = value,
            Key::PublicIp => self.public_ip = value,
            Key::Model => self.model = value,
            Key::Nickname => self.nickname = value,
            Key::Callsign => self.callsign = value,
            Key::Status => self.status = value,
            Key::Version => self.version = value,
            Key::MinSoftwareVersion => self.min_software_version = value,
            Key::DiscoveryProtocolVersion => self.discovery_protocol_version = value,
            Key::Port => set_num(&mut self.port, key, &value),
            Key::InuseHost => self.inuse_host = value,
            Key::InuseIp => self.inuse_ip = value,
            Key::PublicTlsPort => set_port(&mut self.public_tls_port, key, &value),
            Key::PublicUdpPort => set_port(&mut self.public_udp_port, key, &value),
            Key::PublicUpnpTlsPort => set_port(&mut self.public_upnp_tls_port, key, &value),
            Key::PublicUpnpUdpPort => set_port(&mut self.public_upnp_udp_port, key, &value),
            Key::UpnpSupported => self.upnp_supported = flag(&value),
            Key::RequiresHolePunch => self.requires_hole_punch = flag(&value),
            Key::WanConnected => self.wan_connected = flag(&value),
            Key::ExternalPortLink => self.external_port_link = flag(&value),
            Key::MaxLicensedVersion => self.max_licensed_version = value,
            Key::RadioLicenseId => self.radio_license_id = value,
            Key::RequiresAdditionalLicense => self.requires_additional_license = flag(&value),
            Key::FpcMac => self.fpc_mac = value,
            Key::TurfRegion => self.turf_region = value,
            Key::LicensedClients => set_num(&mut self.licensed_clients, key, &value),
            Key::AvailableClients => set_num(&mut self.available_clients, key, &value),
            Key::MaxPanadapters => set_num(&mut self.max_panadapters, key, &value),
            Key::AvailablePanadapters => set_num(&mut self.available_panadapters, key, &value),
            Key::MaxSlices => set_num(&mut self.max_slices, key, &value),
            Key::AvailableSlices => set_num(&mut self.available_slices, key, &value),
            Key::GuiClientPrograms => self.gui_client_programs = value,
            Key::GuiClientStations => self.gui_client_stations = value,
            Key::GuiClientHandles => self.gui_client_handles = value,
            Key::GuiClientIps => self.gui_client_ips = value,
            Key::GuiClientHosts => self.gui_client_hosts = value,
        }
    }

    /// Decode a relay broker record.
    pub fn from_relay(payload: &str, mode: ParseMode) -> Result<Self> {
        Self::parse(payload, Source::Relay, mode)
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey {
            serial: self.serial.clone(),
            public_ip: self.public_ip.clone(),
        }
    }

    /// The raw roster columns.
    pub fn session_columns(&self) -> SessionColumns<'_> {
        SessionColumns {
            programs: &self.gui_client_programs,
            stations: &self.gui_client_stations,
            handles: &self.gui_client_handles,
            ips: &self.gui_client_ips,
            hosts: Some(self.gui_client_hosts.as_str()).filter(|h| !h.is_empty()),
        }
    }

    /// Connection target for this radio.
    ///
    /// Local radios use the plain command port; relay radios use their
    /// public TLS port, falling back to the UPnP-mapped one.
    pub fn target(&self) -> Target {
        match self.source {
            Source::Local => Target::local(&self.public_ip, self.port),
            Source::Relay => Target::relay_tls(
                &self.public_ip,
                self.public_tls_port.or(self.public_upnp_tls_port),
            ),
        }
    }

    /// Hole-punch target for a relay radio behind NAT, using the port pair
    /// negotiated with the broker.
    pub fn hole_punch_target(
        &self,
        local_interface: Option<IpAddr>,
        negotiated_port: u16,
    ) -> Target {
        Target::hole_punch(&self.public_ip, local_interface, negotiated_port)
    }
}

/// Decode a discovery datagram received from `src`.
///
/// When the payload has no address the sender's address is used.
pub fn parse_discovery_packet(data: &[u8], src: IpAddr, mode: ParseMode) -> Result<DeviceRecord> {
    let packet = vita49::parse_packet(data)?;
    if !packet.header.is_discovery() {
        return Err(Error::Protocol("not a discovery packet".into()));
    }

    let payload = std::str::from_utf8(packet.payload)
        .map_err(|_| Error::Protocol("discovery payload is not valid UTF-8".into()))?;

    let mut record = DeviceRecord::parse(payload, Source::Local, mode)?;
    if record.public_ip.is_empty() {
        record.public_ip = src.to_string();
    }
    Ok(record)
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Receives LAN discovery broadcasts into a [`DiscoveryStore`] and sweeps
/// records that stop announcing.
///
/// Stops when dropped.
pub struct DiscoveryListener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DiscoveryListener {
    /// Bind the discovery port and start listening.
    pub async fn bind(store: DiscoveryStore, options: DiscoveryOptions) -> Result<Self> {
        let socket = bind_discovery(options.port).await?;
        let local_addr = socket.local_addr()?;
        let cancel = CancellationToken::new();

        tracing::debug!(addr = %local_addr, "Discovery listener started");
        let task = tokio::spawn(listen(socket, store, options, cancel.clone()));

        Ok(Self {
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop listening and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn bind_discovery(port: u16) -> Result<UdpSocket> {
    let bind_addr = format!("0.0.0.0:{port}");
    UdpSocket::bind(&bind_addr).await.map_err(|e| {
        Error::Transport(format!("failed to bind discovery socket on {bind_addr}: {e}"))
    })
}

async fn listen(
    socket: UdpSocket,
    store: DiscoveryStore,
    options: DiscoveryOptions,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 4096];
    let mut sweep = tokio::time::interval(options.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sweep.tick() => {
                if let Some(cutoff) = Instant::now().checked_sub(options.staleness) {
                    if store.expire_stale(cutoff).is_err() {
                        break;
                    }
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (n, src) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::trace!(error = %e, "Discovery recv error");
                        continue;
                    }
                };
                match parse_discovery_packet(&buf[..n], src.ip(), options.parse_mode) {
                    Ok(record) => {
                        tracing::trace!(
                            serial = %record.serial,
                            ip = %record.public_ip,
                            "Discovery record"
                        );
                        if store.ingest(record).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::trace!(src = %src, error = %e, "Ignoring datagram"),
                }
            }
        }
    }
    tracing::debug!("Discovery listener stopped");
}

// ---------------------------------------------------------------------------
// One-shot discovery
// ---------------------------------------------------------------------------

/// Listen on the default discovery port for `timeout` and return every
/// radio heard.
pub async fn discover(timeout: Duration) -> Result<Vec<DeviceRecord>> {
    discover_on_port(DEFAULT_DISCOVERY_PORT, timeout).await
}

/// Listen on `port` for `timeout` and return every radio heard, one record
/// per identity (the latest received). Unknown keys are skipped.
pub async fn discover_on_port(port: u16, timeout: Duration) -> Result<Vec<DeviceRecord>> {
    let socket = bind_discovery(port).await?;
    tracing::debug!(port = port, "Listening for discovery broadcasts");

    let mut radios: HashMap<DeviceKey, DeviceRecord> = HashMap::new();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, src))) => {
                match parse_discovery_packet(&buf[..n], src.ip(), ParseMode::Lenient) {
                    Ok(radio) => {
                        tracing::debug!(
                            model = %radio.model,
                            serial = %radio.serial,
                            ip = %radio.public_ip,
                            "Discovered radio"
                        );
                        radios.insert(radio.key(), radio);
                    }
                    Err(e) => tracing::trace!(error = %e, "Ignoring datagram"),
                }
            }
            Ok(Err(e)) => tracing::trace!(error = %e, "Discovery recv error"),
            Err(_) => break,
        }
    }

    let result: Vec<DeviceRecord> = radios.into_values().collect();
    tracing::debug!(count = result.len(), "Discovery complete");
    Ok(result)
}
