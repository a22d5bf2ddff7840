//! Peer-session roster embedded in discovery records.
//!
//! A discovery record lists the clients connected to the radio as parallel
//! comma-separated columns:
//!
//! ```text
//! gui_client_programs=SmartSDR-Win,Maestro
//! gui_client_stations=Shack,Kitchen
//! gui_client_handles=0x2A3B4C5D,0x11223344
//! gui_client_ips=192.168.1.10,192.168.1.22
//! gui_client_hosts=shack-pc,maestro   (optional)
//! ```
//!
//! Row `i` of every column describes one [`PeerSession`].

use crate::codec::parse_hex_u32;

/// A client session connected to a radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    /// Session handle, unique within a record.
    pub handle: u32,
    /// Client program name.
    pub program: String,
    /// Station (display) name.
    pub station: String,
    /// Host name, when the hosts column lines up with the others.
    pub host: Option<String>,
    /// Originating address.
    pub ip: String,
    /// Whether this session owns local PTT.
    pub local_ptt: bool,
    /// Whether this session is ours.
    pub is_this_client: bool,
}

/// The raw roster columns of one record.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionColumns<'a> {
    pub programs: &'a str,
    pub stations: &'a str,
    pub handles: &'a str,
    pub ips: &'a str,
    pub hosts: Option<&'a str>,
}

/// Parse a session handle: hex with a `0x` prefix, decimal otherwise.
pub fn parse_session_handle(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex_u32(s)
    } else {
        s.parse().ok()
    }
}

fn split(column: &str) -> Vec<&str> {
    if column.trim().is_empty() {
        Vec::new()
    } else {
        column.split(',').map(str::trim).collect()
    }
}

/// Decode the roster.
///
/// The four mandatory columns must have the same number of entries or no
/// sessions are produced. Rows with a blank program, station or address, or
/// an unparsable handle, are skipped. `own_handle` marks our own session.
pub fn decode_sessions(columns: &SessionColumns<'_>, own_handle: Option<u32>) -> Vec<PeerSession> {
    let programs = split(columns.programs);
    let stations = split(columns.stations);
    let handles = split(columns.handles);
    let ips = split(columns.ips);

    let rows = programs.len();
    if stations.len() != rows || handles.len() != rows || ips.len() != rows {
        tracing::trace!(
            programs = programs.len(),
            stations = stations.len(),
            handles = handles.len(),
            ips = ips.len(),
            "Session columns differ in length"
        );
        return Vec::new();
    }

    let hosts = columns
        .hosts
        .map(split)
        .filter(|hosts| hosts.len() == rows);

    let mut sessions = Vec::with_capacity(rows);
    for i in 0..rows {
        let (program, station, ip) = (programs[i], stations[i], ips[i]);
        if program.is_empty() || station.is_empty() || ip.is_empty() {
            tracing::trace!(row = i, "Skipping incomplete session row");
            continue;
        }
        let Some(handle) = parse_session_handle(handles[i]) else {
            tracing::trace!(row = i, handle = %handles[i], "Skipping session with bad handle");
            continue;
        };

        sessions.push(PeerSession {
            handle,
            program: program.to_string(),
            station: station.to_string(),
            host: hosts
                .as_ref()
                .map(|h| h[i])
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            ip: ip.to_string(),
            local_ptt: false,
            is_this_client: own_handle == Some(handle),
        });
    }
    sessions
}
