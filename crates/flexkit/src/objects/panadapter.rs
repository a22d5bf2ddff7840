//! Panadapters: spectrum displays, identified by their hex stream id.
//!
//! ```text
//! display pan 0x40000000 center=14.100000 bandwidth=0.200000 min_dbm=-135.00 max_dbm=-40.00 fps=25
//! display pan 0x40000000 removed
//! ```
//!
//! The session context strips the `display pan` prefix before the line
//! reaches the engine.

use crate::codec::hz_to_mhz;
use crate::status::{StatusObject, parse_bool, parse_float, parse_hex_id, parse_mhz, parse_num};

use super::{ObjectSetting, assign, flag, split_list};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panadapter {
    /// Stream id.
    pub stream_id: u32,
    pub client_handle: u32,
    /// Stream id of the attached waterfall.
    pub waterfall: u32,
    pub center_hz: u64,
    pub bandwidth_hz: u64,
    pub min_bandwidth_hz: u64,
    pub max_bandwidth_hz: u64,
    pub min_dbm: f64,
    pub max_dbm: f64,
    pub fps: u32,
    pub average: u32,
    pub weighted_average: bool,
    pub rf_gain: i32,
    pub rx_antenna: String,
    pub antenna_list: Vec<String>,
    pub band: String,
    pub preamp: String,
    pub transverter: String,
    pub wide: bool,
    pub loop_a: bool,
    pub loop_b: bool,
    pub daxiq_channel: u32,
    pub x_pixels: u32,
    pub y_pixels: u32,
    pub wnb: bool,
    pub wnb_level: u32,
    pub wnb_updating: bool,
    pub band_zoom: bool,
    pub segment_zoom: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanadapterToken {
    ClientHandle,
    Waterfall,
    Center,
    Bandwidth,
    MinBandwidth,
    MaxBandwidth,
    MinDbm,
    MaxDbm,
    Fps,
    Average,
    WeightedAverage,
    RfGain,
    RxAnt,
    AntList,
    Band,
    Pre,
    Xvtr,
    Wide,
    LoopA,
    LoopB,
    DaxIqChannel,
    XPixels,
    YPixels,
    Wnb,
    WnbLevel,
    WnbUpdating,
    BandZoom,
    SegmentZoom,
}

impl StatusObject for Panadapter {
    type Id = u32;
    type Token = PanadapterToken;
    const OBJECT: &'static str = "panadapter";

    fn parse_id(token: &str) -> Option<u32> {
        parse_hex_id(token)
    }

    fn with_id(stream_id: u32) -> Self {
        Self {
            stream_id,
            ..Self::default()
        }
    }

    fn id(&self) -> &u32 {
        &self.stream_id
    }

    fn token(key: &str) -> Option<PanadapterToken> {
        use PanadapterToken::*;
        Some(match key {
            "client_handle" => ClientHandle,
            "waterfall" => Waterfall,
            "center" => Center,
            "bandwidth" => Bandwidth,
            "min_bw" => MinBandwidth,
            "max_bw" => MaxBandwidth,
            "min_dbm" => MinDbm,
            "max_dbm" => MaxDbm,
            "fps" => Fps,
            "average" => Average,
            "weighted_average" => WeightedAverage,
            "rfgain" => RfGain,
            "rxant" => RxAnt,
            "ant_list" => AntList,
            "band" => Band,
            "pre" => Pre,
            "xvtr" => Xvtr,
            "wide" => Wide,
            "loopa" => LoopA,
            "loopb" => LoopB,
            "daxiq_channel" => DaxIqChannel,
            "x_pixels" => XPixels,
            "y_pixels" => YPixels,
            "wnb" => Wnb,
            "wnb_level" => WnbLevel,
            "wnb_updating" => WnbUpdating,
            "band_zoom" => BandZoom,
            "segment_zoom" => SegmentZoom,
            _ => return None,
        })
    }

    fn apply(&mut self, token: PanadapterToken, value: &str) -> bool {
        use PanadapterToken::*;
        match token {
            ClientHandle => assign(&mut self.client_handle, parse_hex_id(value)),
            Waterfall => assign(&mut self.waterfall, parse_hex_id(value)),
            Center => assign(&mut self.center_hz, parse_mhz(value)),
            Bandwidth => assign(&mut self.bandwidth_hz, parse_mhz(value)),
            MinBandwidth => assign(&mut self.min_bandwidth_hz, parse_mhz(value)),
            MaxBandwidth => assign(&mut self.max_bandwidth_hz, parse_mhz(value)),
            MinDbm => assign(&mut self.min_dbm, parse_float(value)),
            MaxDbm => assign(&mut self.max_dbm, parse_float(value)),
            Fps => assign(&mut self.fps, parse_num(value)),
            Average => assign(&mut self.average, parse_num(value)),
            WeightedAverage => assign(&mut self.weighted_average, parse_bool(value)),
            RfGain => assign(&mut self.rf_gain, parse_num(value)),
            RxAnt => assign(&mut self.rx_antenna, Some(value.to_string())),
            AntList => assign(&mut self.antenna_list, Some(split_list(value))),
            Band => assign(&mut self.band, Some(value.to_string())),
            Pre => assign(&mut self.preamp, Some(value.to_string())),
            Xvtr => assign(&mut self.transverter, Some(value.to_string())),
            Wide => assign(&mut self.wide, parse_bool(value)),
            LoopA => assign(&mut self.loop_a, parse_bool(value)),
            LoopB => assign(&mut self.loop_b, parse_bool(value)),
            DaxIqChannel => assign(&mut self.daxiq_channel, parse_num(value)),
            XPixels => assign(&mut self.x_pixels, parse_num(value)),
            YPixels => assign(&mut self.y_pixels, parse_num(value)),
            Wnb => assign(&mut self.wnb, parse_bool(value)),
            WnbLevel => assign(&mut self.wnb_level, parse_num(value)),
            WnbUpdating => assign(&mut self.wnb_updating, parse_bool(value)),
            BandZoom => assign(&mut self.band_zoom, parse_bool(value)),
            SegmentZoom => assign(&mut self.segment_zoom, parse_bool(value)),
        }
    }
}

/// A change to one panadapter property.
#[derive(Debug, Clone, PartialEq)]
pub enum PanadapterSetting {
    /// Center frequency in Hz.
    Center(u64),
    /// Displayed span in Hz.
    Bandwidth(u64),
    /// Vertical range in dBm.
    Range { min_dbm: f64, max_dbm: f64 },
    Fps(u32),
    Average(u32),
    WeightedAverage(bool),
    RfGain(i32),
    RxAntenna(String),
    Band(String),
    Wnb(bool),
    WnbLevel(u32),
    Size { x_pixels: u32, y_pixels: u32 },
}

impl ObjectSetting for PanadapterSetting {
    type Object = Panadapter;

    fn command(&self, stream_id: &u32) -> String {
        let kv = match self {
            PanadapterSetting::Center(hz) => format!("center={:.6}", hz_to_mhz(*hz)),
            PanadapterSetting::Bandwidth(hz) => format!("bandwidth={:.6}", hz_to_mhz(*hz)),
            PanadapterSetting::Range { min_dbm, max_dbm } => {
                format!("min_dbm={min_dbm:.2} max_dbm={max_dbm:.2}")
            }
            PanadapterSetting::Fps(fps) => format!("fps={fps}"),
            PanadapterSetting::Average(n) => format!("average={n}"),
            PanadapterSetting::WeightedAverage(on) => format!("weighted_average={}", flag(*on)),
            PanadapterSetting::RfGain(gain) => format!("rfgain={gain}"),
            PanadapterSetting::RxAntenna(ant) => format!("rxant={ant}"),
            PanadapterSetting::Band(band) => format!("band={band}"),
            PanadapterSetting::Wnb(on) => format!("wnb={}", flag(*on)),
            PanadapterSetting::WnbLevel(level) => format!("wnb_level={level}"),
            PanadapterSetting::Size { x_pixels, y_pixels } => {
                format!("xpixels={x_pixels} ypixels={y_pixels}")
            }
        };
        format!("display pan set 0x{stream_id:08X} {kv}")
    }
}

pub fn cmd_panafall_create(x_pixels: u32, y_pixels: u32) -> String {
    format!("display panafall create x={x_pixels} y={y_pixels}")
}

pub fn cmd_panadapter_remove(stream_id: u32) -> String {
    format!("display pan remove 0x{stream_id:08X}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;
    use crate::status::ObjectCollection;

    #[test]
    fn status_line() {
        let mut c = ObjectCollection::<Panadapter>::new(ParseMode::Strict);
        c.apply_status(
            "0x40000000 wnb=0 wnb_level=50 band_zoom=0 segment_zoom=0 x_pixels=1024 y_pixels=700 \
             center=14.100000 bandwidth=0.200000 min_dbm=-135.00 max_dbm=-40.00 fps=25 average=50 \
             weighted_average=0 rfgain=8 rxant=ANT1 wide=0 loopa=0 loopb=0 band=20 daxiq_channel=0 \
             waterfall=0x42000000 min_bw=0.004920 max_bw=14.745601 xvtr= pre=+8dB \
             ant_list=ANT1,ANT2,RX_A,XVTA",
            true,
            ' ',
        )
        .unwrap();

        let p = c.get(&0x4000_0000).unwrap();
        assert_eq!(p.center_hz, 14_100_000);
        assert_eq!(p.bandwidth_hz, 200_000);
        assert_eq!(p.min_bandwidth_hz, 4_920);
        assert_eq!(p.waterfall, 0x4200_0000);
        assert_eq!(p.min_dbm, -135.0);
        assert_eq!(p.x_pixels, 1024);
        assert_eq!(p.band, "20");
        assert_eq!(p.transverter, "");
        assert_eq!(p.preamp, "+8dB");
        assert_eq!(p.antenna_list.len(), 4);
    }

    #[test]
    fn id_accepts_prefixed_and_bare_hex() {
        assert_eq!(Panadapter::parse_id("0x40000000"), Some(0x4000_0000));
        assert_eq!(Panadapter::parse_id("40000000"), Some(0x4000_0000));
        assert_eq!(Panadapter::parse_id("pan"), None);
    }

    #[test]
    fn setting_commands() {
        let id = 0x4000_0000;
        assert_eq!(
            PanadapterSetting::Center(7_100_000).command(&id),
            "display pan set 0x40000000 center=7.100000"
        );
        assert_eq!(
            PanadapterSetting::Range {
                min_dbm: -130.0,
                max_dbm: -50.0
            }
            .command(&id),
            "display pan set 0x40000000 min_dbm=-130.00 max_dbm=-50.00"
        );
        assert_eq!(cmd_panadapter_remove(id), "display pan remove 0x40000000");
    }
}
