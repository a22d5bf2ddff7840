//! Receive and transmit graphic equalizers.
//!
//! The two equalizers have fixed literal ids:
//!
//! ```text
//! eq rxsc mode=1 63Hz=0 125Hz=2 250Hz=4 500Hz=0 1000Hz=0 2000Hz=-3 4000Hz=0 8000Hz=0
//! eq txsc mode=0 63Hz=0 ...
//! ```

use std::fmt;

use crate::status::{StatusObject, parse_bool, parse_num};

use super::{ObjectSetting, assign, flag};

/// Center frequencies of the equalizer bands, in Hz.
pub const BAND_HZ: [u32; 8] = [63, 125, 250, 500, 1000, 2000, 4000, 8000];

/// Which equalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqualizerKind {
    Rx,
    Tx,
}

impl EqualizerKind {
    pub fn as_wire(self) -> &'static str {
        match self {
            EqualizerKind::Rx => "rxsc",
            EqualizerKind::Tx => "txsc",
        }
    }
}

impl fmt::Display for EqualizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Equalizer {
    pub kind: EqualizerKind,
    pub enabled: bool,
    /// Gain per band in dB, in [`BAND_HZ`] order.
    pub levels: [i32; 8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualizerToken {
    Mode,
    /// Index into [`BAND_HZ`].
    Band(usize),
}

impl StatusObject for Equalizer {
    type Id = EqualizerKind;
    type Token = EqualizerToken;
    const OBJECT: &'static str = "eq";

    fn parse_id(token: &str) -> Option<EqualizerKind> {
        match token {
            "rxsc" => Some(EqualizerKind::Rx),
            "txsc" => Some(EqualizerKind::Tx),
            _ => None,
        }
    }

    fn with_id(kind: EqualizerKind) -> Self {
        Self {
            kind,
            enabled: false,
            levels: [0; 8],
        }
    }

    fn id(&self) -> &EqualizerKind {
        &self.kind
    }

    fn token(key: &str) -> Option<EqualizerToken> {
        if key == "mode" {
            return Some(EqualizerToken::Mode);
        }
        let hz: u32 = key
            .strip_suffix("Hz")
            .or_else(|| key.strip_suffix("hz"))?
            .parse()
            .ok()?;
        BAND_HZ
            .iter()
            .position(|&b| b == hz)
            .map(EqualizerToken::Band)
    }

    fn apply(&mut self, token: EqualizerToken, value: &str) -> bool {
        match token {
            EqualizerToken::Mode => assign(&mut self.enabled, parse_bool(value)),
            EqualizerToken::Band(i) => assign(&mut self.levels[i], parse_num(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EqualizerSetting {
    Enabled(bool),
    /// Gain in dB for the band centered on `hz`, which must be one of
    /// [`BAND_HZ`].
    Band { hz: u32, level: i32 },
}

impl ObjectSetting for EqualizerSetting {
    type Object = Equalizer;

    fn command(&self, kind: &EqualizerKind) -> String {
        match self {
            EqualizerSetting::Enabled(on) => format!("eq {kind} mode={}", flag(*on)),
            EqualizerSetting::Band { hz, level } => format!("eq {kind} {hz}Hz={level}"),
        }
    }
}
