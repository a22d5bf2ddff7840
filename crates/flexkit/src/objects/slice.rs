//! Receive slice: an independent receiver with its own frequency, mode,
//! filter and DSP settings.
//!
//! Slices are addressed by decimal index:
//!
//! ```text
//! slice 0 in_use=1 RF_frequency=14.250000 mode=USB filter_lo=100 filter_hi=2900 tx=1 active=1
//! slice 0 in_use=0 removed
//! ```
//!
//! Outbound changes are expressed as a [`SliceSetting`] and turned into a
//! command string with [`ObjectSetting::command`].

use crate::codec::hz_to_mhz;
use crate::status::{
    StatusObject, parse_bool, parse_decimal_id, parse_float, parse_hex_id, parse_mhz, parse_num,
};

use super::{ObjectSetting, assign, flag, parse_num_list, split_list};

/// State of one receive slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    /// Slice index.
    pub index: u32,
    /// Letter shown for the slice (`A`, `B`, ...).
    pub index_letter: String,
    pub in_use: bool,
    /// Owning client handle.
    pub client_handle: u32,
    /// Stream id of the panadapter the slice sits on.
    pub panadapter: u32,
    pub sample_rate: u32,
    /// Tuned frequency in Hz (`RF_frequency` is reported in MHz).
    pub frequency_hz: u64,
    /// Demodulation mode (`USB`, `LSB`, `CW`, `DIGU`, ...).
    pub mode: String,
    pub mode_list: Vec<String>,
    pub filter_lo: i32,
    pub filter_hi: i32,
    pub wide: bool,
    pub step: u32,
    pub step_list: Vec<u32>,
    /// Whether this slice is the transmit slice.
    pub tx: bool,
    /// Whether this slice has focus.
    pub active: bool,
    pub locked: bool,
    pub detached: bool,
    pub rx_antenna: String,
    pub tx_antenna: String,
    pub antenna_list: Vec<String>,
    pub loop_a: bool,
    pub loop_b: bool,
    pub qsk: bool,
    pub rit_on: bool,
    pub rit_freq: i32,
    pub xit_on: bool,
    pub xit_freq: i32,
    pub agc_mode: String,
    pub agc_threshold: i32,
    pub agc_off_level: i32,
    pub audio_level: u32,
    pub audio_pan: u32,
    pub audio_mute: bool,
    pub dax: u32,
    pub dax_clients: u32,
    pub nb: bool,
    pub nb_level: u32,
    pub wnb: bool,
    pub wnb_level: u32,
    pub nr: bool,
    pub nr_level: u32,
    pub anf: bool,
    pub anf_level: u32,
    pub apf: bool,
    pub apf_level: u32,
    pub squelch: bool,
    pub squelch_level: u32,
    pub diversity: bool,
    pub diversity_parent: bool,
    pub diversity_child: bool,
    pub diversity_index: u32,
    pub record: bool,
    pub play: String,
    pub record_time: f64,
    pub rtty_mark: u32,
    pub rtty_shift: u32,
    pub digl_offset: i32,
    pub digu_offset: i32,
    pub post_demod_low: u32,
    pub post_demod_high: u32,
    pub post_demod_bypass: bool,
    pub fm_tone_mode: String,
    pub fm_tone_value: f64,
    pub fm_tone_burst: bool,
    pub fm_deviation: u32,
    pub fm_pre_de_emphasis: bool,
    pub fm_repeater_offset: f64,
    pub tx_offset: f64,
    pub repeater_offset_dir: String,
}

/// Recognised slice status keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceToken {
    IndexLetter,
    InUse,
    ClientHandle,
    Pan,
    SampleRate,
    RfFrequency,
    Mode,
    ModeList,
    FilterLo,
    FilterHi,
    Wide,
    Step,
    StepList,
    Tx,
    Active,
    Lock,
    Detached,
    RxAnt,
    TxAnt,
    AntList,
    LoopA,
    LoopB,
    Qsk,
    RitOn,
    RitFreq,
    XitOn,
    XitFreq,
    AgcMode,
    AgcThreshold,
    AgcOffLevel,
    AudioLevel,
    AudioPan,
    AudioMute,
    Dax,
    DaxClients,
    Nb,
    NbLevel,
    Wnb,
    WnbLevel,
    Nr,
    NrLevel,
    Anf,
    AnfLevel,
    Apf,
    ApfLevel,
    Squelch,
    SquelchLevel,
    Diversity,
    DiversityParent,
    DiversityChild,
    DiversityIndex,
    Record,
    Play,
    RecordTime,
    RttyMark,
    RttyShift,
    DiglOffset,
    DiguOffset,
    PostDemodLow,
    PostDemodHigh,
    PostDemodBypass,
    FmToneMode,
    FmToneValue,
    FmToneBurst,
    FmDeviation,
    FmPreDeEmphasis,
    FmRepeaterOffset,
    TxOffset,
    RepeaterOffsetDir,
}

impl StatusObject for Slice {
    type Id = u32;
    type Token = SliceToken;
    const OBJECT: &'static str = "slice";

    fn parse_id(token: &str) -> Option<u32> {
        parse_decimal_id(token)
    }

    fn with_id(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    fn id(&self) -> &u32 {
        &self.index
    }

    fn token(key: &str) -> Option<SliceToken> {
        use SliceToken::*;
        Some(match key {
            "index_letter" => IndexLetter,
            "in_use" => InUse,
            "client_handle" => ClientHandle,
            "pan" => Pan,
            "sample_rate" => SampleRate,
            "RF_frequency" => RfFrequency,
            "mode" => Mode,
            "mode_list" => ModeList,
            "filter_lo" => FilterLo,
            "filter_hi" => FilterHi,
            "wide" => Wide,
            "step" => Step,
            "step_list" => StepList,
            "tx" => Tx,
            "active" => Active,
            "lock" => Lock,
            "detached" => Detached,
            "rxant" => RxAnt,
            "txant" => TxAnt,
            "ant_list" => AntList,
            "loopa" => LoopA,
            "loopb" => LoopB,
            "qsk" => Qsk,
            "rit_on" => RitOn,
            "rit_freq" => RitFreq,
            "xit_on" => XitOn,
            "xit_freq" => XitFreq,
            "agc_mode" => AgcMode,
            "agc_threshold" => AgcThreshold,
            "agc_off_level" => AgcOffLevel,
            "audio_level" => AudioLevel,
            "audio_pan" => AudioPan,
            "audio_mute" => AudioMute,
            "dax" => Dax,
            "dax_clients" => DaxClients,
            "nb" => Nb,
            "nb_level" => NbLevel,
            "wnb" => Wnb,
            "wnb_level" => WnbLevel,
            "nr" => Nr,
            "nr_level" => NrLevel,
            "anf" => Anf,
            "anf_level" => AnfLevel,
            "apf" => Apf,
            "apf_level" => ApfLevel,
            "squelch" => Squelch,
            "squelch_level" => SquelchLevel,
            "diversity" => Diversity,
            "diversity_parent" => DiversityParent,
            "diversity_child" => DiversityChild,
            "diversity_index" => DiversityIndex,
            "record" => Record,
            "play" => Play,
            "record_time" => RecordTime,
            "rtty_mark" => RttyMark,
            "rtty_shift" => RttyShift,
            "digl_offset" => DiglOffset,
            "digu_offset" => DiguOffset,
            "post_demod_low" => PostDemodLow,
            "post_demod_high" => PostDemodHigh,
            "post_demod_bypass" => PostDemodBypass,
            "fm_tone_mode" => FmToneMode,
            "fm_tone_value" => FmToneValue,
            "fm_tone_burst" => FmToneBurst,
            "fm_deviation" => FmDeviation,
            "dfm_pre_de_emphasis" => FmPreDeEmphasis,
            "fm_repeater_offset_freq" => FmRepeaterOffset,
            "tx_offset_freq" => TxOffset,
            "repeater_offset_dir" => RepeaterOffsetDir,
            _ => return None,
        })
    }

    fn apply(&mut self, token: SliceToken, value: &str) -> bool {
        use SliceToken::*;
        let text = || value.to_string();
        match token {
            IndexLetter => assign(&mut self.index_letter, Some(text())),
            InUse => assign(&mut self.in_use, parse_bool(value)),
            ClientHandle => assign(&mut self.client_handle, parse_hex_id(value)),
            Pan => assign(&mut self.panadapter, parse_hex_id(value)),
            SampleRate => assign(&mut self.sample_rate, parse_num(value)),
            RfFrequency => assign(&mut self.frequency_hz, parse_mhz(value)),
            Mode => assign(&mut self.mode, Some(text())),
            ModeList => assign(&mut self.mode_list, Some(split_list(value))),
            FilterLo => assign(&mut self.filter_lo, parse_num(value)),
            FilterHi => assign(&mut self.filter_hi, parse_num(value)),
            Wide => assign(&mut self.wide, parse_bool(value)),
            Step => assign(&mut self.step, parse_num(value)),
            StepList => assign(&mut self.step_list, parse_num_list(value)),
            Tx => assign(&mut self.tx, parse_bool(value)),
            Active => assign(&mut self.active, parse_bool(value)),
            Lock => assign(&mut self.locked, parse_bool(value)),
            Detached => assign(&mut self.detached, parse_bool(value)),
            RxAnt => assign(&mut self.rx_antenna, Some(text())),
            TxAnt => assign(&mut self.tx_antenna, Some(text())),
            AntList => assign(&mut self.antenna_list, Some(split_list(value))),
            LoopA => assign(&mut self.loop_a, parse_bool(value)),
            LoopB => assign(&mut self.loop_b, parse_bool(value)),
            Qsk => assign(&mut self.qsk, parse_bool(value)),
            RitOn => assign(&mut self.rit_on, parse_bool(value)),
            RitFreq => assign(&mut self.rit_freq, parse_num(value)),
            XitOn => assign(&mut self.xit_on, parse_bool(value)),
            XitFreq => assign(&mut self.xit_freq, parse_num(value)),
            AgcMode => assign(&mut self.agc_mode, Some(text())),
            AgcThreshold => assign(&mut self.agc_threshold, parse_num(value)),
            AgcOffLevel => assign(&mut self.agc_off_level, parse_num(value)),
            AudioLevel => assign(&mut self.audio_level, parse_num(value)),
            AudioPan => assign(&mut self.audio_pan, parse_num(value)),
            AudioMute => assign(&mut self.audio_mute, parse_bool(value)),
            Dax => assign(&mut self.dax, parse_num(value)),
            DaxClients => assign(&mut self.dax_clients, parse_num(value)),
            Nb => assign(&mut self.nb, parse_bool(value)),
            NbLevel => assign(&mut self.nb_level, parse_num(value)),
            Wnb => assign(&mut self.wnb, parse_bool(value)),
            WnbLevel => assign(&mut self.wnb_level, parse_num(value)),
            Nr => assign(&mut self.nr, parse_bool(value)),
            NrLevel => assign(&mut self.nr_level, parse_num(value)),
            Anf => assign(&mut self.anf, parse_bool(value)),
            AnfLevel => assign(&mut self.anf_level, parse_num(value)),
            Apf => assign(&mut self.apf, parse_bool(value)),
            ApfLevel => assign(&mut self.apf_level, parse_num(value)),
            Squelch => assign(&mut self.squelch, parse_bool(value)),
            SquelchLevel => assign(&mut self.squelch_level, parse_num(value)),
            Diversity => assign(&mut self.diversity, parse_bool(value)),
            DiversityParent => assign(&mut self.diversity_parent, parse_bool(value)),
            DiversityChild => assign(&mut self.diversity_child, parse_bool(value)),
            DiversityIndex => assign(&mut self.diversity_index, parse_num(value)),
            Record => assign(&mut self.record, parse_bool(value)),
            Play => assign(&mut self.play, Some(text())),
            RecordTime => assign(&mut self.record_time, parse_float(value)),
            RttyMark => assign(&mut self.rtty_mark, parse_num(value)),
            RttyShift => assign(&mut self.rtty_shift, parse_num(value)),
            DiglOffset => assign(&mut self.digl_offset, parse_num(value)),
            DiguOffset => assign(&mut self.digu_offset, parse_num(value)),
            PostDemodLow => assign(&mut self.post_demod_low, parse_num(value)),
            PostDemodHigh => assign(&mut self.post_demod_high, parse_num(value)),
            PostDemodBypass => assign(&mut self.post_demod_bypass, parse_bool(value)),
            FmToneMode => assign(&mut self.fm_tone_mode, Some(text())),
            FmToneValue => assign(&mut self.fm_tone_value, parse_float(value)),
            FmToneBurst => assign(&mut self.fm_tone_burst, parse_bool(value)),
            FmDeviation => assign(&mut self.fm_deviation, parse_num(value)),
            FmPreDeEmphasis => assign(&mut self.fm_pre_de_emphasis, parse_bool(value)),
            FmRepeaterOffset => assign(&mut self.fm_repeater_offset, parse_float(value)),
            TxOffset => assign(&mut self.tx_offset, parse_float(value)),
            RepeaterOffsetDir => assign(&mut self.repeater_offset_dir, Some(text())),
        }
    }
}

/// A change to one slice property.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceSetting {
    /// Tune to a frequency in Hz.
    Frequency(u64),
    Mode(String),
    Filter { lo: i32, hi: i32 },
    Active(bool),
    /// Make this the transmit slice.
    Tx(bool),
    Lock(bool),
    RxAntenna(String),
    TxAntenna(String),
    Rit(bool),
    RitFreq(i32),
    Xit(bool),
    XitFreq(i32),
    AgcMode(String),
    AgcThreshold(i32),
    AudioLevel(u32),
    AudioPan(u32),
    AudioMute(bool),
    Nb(bool),
    NbLevel(u32),
    Nr(bool),
    NrLevel(u32),
    Anf(bool),
    AnfLevel(u32),
    Squelch(bool),
    SquelchLevel(u32),
    Dax(u32),
    Step(u32),
}

impl ObjectSetting for SliceSetting {
    type Object = Slice;

    fn command(&self, index: &u32) -> String {
        let index = *index;
        let set = |kv: String| format!("slice set {index} {kv}");
        match self {
            SliceSetting::Frequency(hz) => format!("slice tune {index} {:.6}", hz_to_mhz(*hz)),
            SliceSetting::Mode(mode) => set(format!("mode={mode}")),
            SliceSetting::Filter { lo, hi } => set(format!("filter_lo={lo} filter_hi={hi}")),
            SliceSetting::Active(on) => set(format!("active={}", flag(*on))),
            SliceSetting::Tx(on) => set(format!("tx={}", flag(*on))),
            SliceSetting::Lock(true) => format!("slice lock {index}"),
            SliceSetting::Lock(false) => format!("slice unlock {index}"),
            SliceSetting::RxAntenna(ant) => set(format!("rxant={ant}")),
            SliceSetting::TxAntenna(ant) => set(format!("txant={ant}")),
            SliceSetting::Rit(on) => set(format!("rit_on={}", flag(*on))),
            SliceSetting::RitFreq(hz) => set(format!("rit_freq={hz}")),
            SliceSetting::Xit(on) => set(format!("xit_on={}", flag(*on))),
            SliceSetting::XitFreq(hz) => set(format!("xit_freq={hz}")),
            SliceSetting::AgcMode(mode) => set(format!("agc_mode={mode}")),
            SliceSetting::AgcThreshold(level) => set(format!("agc_threshold={level}")),
            SliceSetting::AudioLevel(level) => set(format!("audio_level={level}")),
            SliceSetting::AudioPan(pan) => set(format!("audio_pan={pan}")),
            SliceSetting::AudioMute(on) => set(format!("audio_mute={}", flag(*on))),
            SliceSetting::Nb(on) => set(format!("nb={}", flag(*on))),
            SliceSetting::NbLevel(level) => set(format!("nb_level={level}")),
            SliceSetting::Nr(on) => set(format!("nr={}", flag(*on))),
            SliceSetting::NrLevel(level) => set(format!("nr_level={level}")),
            SliceSetting::Anf(on) => set(format!("anf={}", flag(*on))),
            SliceSetting::AnfLevel(level) => set(format!("anf_level={level}")),
            SliceSetting::Squelch(on) => set(format!("squelch={}", flag(*on))),
            SliceSetting::SquelchLevel(level) => set(format!("squelch_level={level}")),
            SliceSetting::Dax(channel) => set(format!("dax={channel}")),
            SliceSetting::Step(hz) => set(format!("step={hz}")),
        }
    }
}

/// Create a slice at `freq_hz`.
pub fn cmd_slice_create(freq_hz: u64, antenna: Option<&str>, mode: Option<&str>) -> String {
    let mut cmd = format!("slice create freq={:.6}", hz_to_mhz(freq_hz));
    if let Some(ant) = antenna {
        cmd.push_str(&format!(" ant={ant}"));
    }
    if let Some(mode) = mode {
        cmd.push_str(&format!(" mode={mode}"));
    }
    cmd
}

pub fn cmd_slice_remove(index: u32) -> String {
    format!("slice remove {index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;
    use crate::status::{ObjectCollection, ObjectEvent};

    fn slices() -> ObjectCollection<Slice> {
        ObjectCollection::new(ParseMode::Strict)
    }

    #[test]
    fn full_status_line() {
        let mut c = slices();
        c.apply_status(
            "0 in_use=1 sample_rate=24000 RF_frequency=14.250000 client_handle=0x2A3B4C5D \
             index_letter=A rit_on=0 rit_freq=0 xit_on=1 xit_freq=-50 rxant=ANT1 mode=USB \
             wide=0 filter_lo=100 filter_hi=2900 step=10 step_list=1,10,50,100 agc_mode=med \
             agc_threshold=65 pan=0x40000000 txant=ANT1 tx=1 active=1 lock=0 \
             ant_list=ANT1,ANT2,RX_A mode_list=LSB,USB,CW",
            true,
            ' ',
        )
        .unwrap();

        let s = c.get(&0).unwrap();
        assert!(s.in_use);
        assert_eq!(s.frequency_hz, 14_250_000);
        assert_eq!(s.client_handle, 0x2A3B4C5D);
        assert_eq!(s.panadapter, 0x4000_0000);
        assert_eq!(s.index_letter, "A");
        assert!(s.xit_on);
        assert_eq!(s.xit_freq, -50);
        assert_eq!(s.mode, "USB");
        assert_eq!((s.filter_lo, s.filter_hi), (100, 2900));
        assert_eq!(s.step_list, vec![1, 10, 50, 100]);
        assert_eq!(s.antenna_list, vec!["ANT1", "ANT2", "RX_A"]);
        assert_eq!(s.mode_list.len(), 3);
        assert!(s.tx && s.active && !s.locked);
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut c = slices();
        c.apply_status("1 RF_frequency=7.074000 mode=DIGU", true, ' ')
            .unwrap();
        let events = c.apply_status("1 RF_frequency=7.047500", true, ' ').unwrap();

        match events.as_slice() {
            [ObjectEvent::Updated(s)] => {
                assert_eq!(s.frequency_hz, 7_047_500);
                assert_eq!(s.mode, "DIGU");
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn bad_step_list_is_ignored() {
        let mut c = slices();
        c.apply_status("2 step_list=1,10", true, ' ').unwrap();
        c.apply_status("2 step_list=1,x", true, ' ').unwrap();
        assert_eq!(c.get(&2).unwrap().step_list, vec![1, 10]);
    }

    #[test]
    fn removal_line() {
        let mut c = slices();
        c.apply_status("3 in_use=1", true, ' ').unwrap();
        c.apply_status("3 in_use=0 removed", false, ' ').unwrap();
        assert!(c.get(&3).is_none());
    }

    #[test]
    fn hex_index_is_rejected() {
        assert_eq!(Slice::parse_id("0x1"), None);
        assert_eq!(Slice::parse_id("7"), Some(7));
    }

    #[test]
    fn setting_commands() {
        assert_eq!(
            SliceSetting::Frequency(14_074_000).command(&0),
            "slice tune 0 14.074000"
        );
        assert_eq!(
            SliceSetting::Mode("CW".into()).command(&1),
            "slice set 1 mode=CW"
        );
        assert_eq!(
            SliceSetting::Filter { lo: -200, hi: 200 }.command(&1),
            "slice set 1 filter_lo=-200 filter_hi=200"
        );
        assert_eq!(SliceSetting::Tx(true).command(&2), "slice set 2 tx=1");
        assert_eq!(SliceSetting::Lock(true).command(&0), "slice lock 0");
        assert_eq!(SliceSetting::Lock(false).command(&0), "slice unlock 0");
        assert_eq!(SliceSetting::Nr(false).command(&3), "slice set 3 nr=0");
    }

    #[test]
    fn create_and_remove_commands() {
        assert_eq!(
            cmd_slice_create(14_250_000, Some("ANT1"), Some("USB")),
            "slice create freq=14.250000 ant=ANT1 mode=USB"
        );
        assert_eq!(cmd_slice_create(7_000_000, None, None), "slice create freq=7.000000");
        assert_eq!(cmd_slice_remove(4), "slice remove 4");
    }
}
