//! Meters: named measurement points whose values arrive on the streaming
//! path. Status lines only describe them.
//!
//! Meter status uses `#` as the delimiter and prefixes every key with the
//! meter id, so one line can describe several meters:
//!
//! ```text
//! meter 1.src=COD-#1.num=1#1.nam=MICPEAK#1.low=-150.0#1.hi=20.0#1.unit=dBFS#1.fps=40#
//! meter 1 removed
//! ```

use crate::status::{StatusObject, parse_decimal_id, parse_float, parse_num};

use super::assign;

/// Unit a meter reports in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MeterUnit {
    Dbm,
    Dbfs,
    Swr,
    Volts,
    Amps,
    DegC,
    DegF,
    Watts,
    Percent,
    Rpm,
    #[default]
    None,
    Other(String),
}

impl MeterUnit {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "dBm" => MeterUnit::Dbm,
            "dBFS" => MeterUnit::Dbfs,
            "SWR" => MeterUnit::Swr,
            "Volts" => MeterUnit::Volts,
            "Amps" => MeterUnit::Amps,
            "degC" => MeterUnit::DegC,
            "degF" => MeterUnit::DegF,
            "Watts" => MeterUnit::Watts,
            "Percent" => MeterUnit::Percent,
            "RPM" => MeterUnit::Rpm,
            "" | "none" => MeterUnit::None,
            other => MeterUnit::Other(other.to_string()),
        }
    }
}

/// Description of one meter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meter {
    pub id: u32,
    /// Source subsystem (`SLC`, `TX-`, `COD-`, `RAD`, `AMP`, ...).
    pub source: String,
    /// Index within the source, e.g. the slice number for `SLC` meters.
    pub source_index: u32,
    pub name: String,
    pub description: String,
    pub low: f64,
    pub high: f64,
    pub unit: MeterUnit,
    /// Update rate in frames per second.
    pub fps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterToken {
    Source,
    Num,
    Name,
    Description,
    Low,
    High,
    Unit,
    Fps,
}

impl StatusObject for Meter {
    type Id = u32;
    type Token = MeterToken;
    const OBJECT: &'static str = "meter";

    fn parse_id(token: &str) -> Option<u32> {
        parse_decimal_id(token)
    }

    fn with_id(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn id(&self) -> &u32 {
        &self.id
    }

    fn token(key: &str) -> Option<MeterToken> {
        Some(match key {
            "src" => MeterToken::Source,
            "num" => MeterToken::Num,
            "nam" => MeterToken::Name,
            "desc" => MeterToken::Description,
            "low" => MeterToken::Low,
            "hi" => MeterToken::High,
            "unit" => MeterToken::Unit,
            "fps" => MeterToken::Fps,
            _ => return None,
        })
    }

    fn apply(&mut self, token: MeterToken, value: &str) -> bool {
        match token {
            MeterToken::Source => assign(&mut self.source, Some(value.to_string())),
            MeterToken::Num => assign(&mut self.source_index, parse_num(value)),
            MeterToken::Name => assign(&mut self.name, Some(value.to_string())),
            MeterToken::Description => assign(&mut self.description, Some(value.to_string())),
            MeterToken::Low => assign(&mut self.low, parse_float(value)),
            MeterToken::High => assign(&mut self.high, parse_float(value)),
            MeterToken::Unit => assign(&mut self.unit, Some(MeterUnit::from_wire(value))),
            MeterToken::Fps => assign(&mut self.fps, parse_num(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;
    use crate::status::ObjectCollection;

    const LINE: &str = "1.src=COD-#1.num=1#1.nam=MICPEAK#1.low=-150.0#1.hi=20.0#\
                        1.desc=Signal strength of MIC output in CODEC#1.unit=dBFS#1.fps=40#\
                        2.src=SLC#2.num=0#2.nam=LEVEL#2.unit=dBm#";

    #[test]
    fn namespaced_line_describes_two_meters() {
        let mut c = ObjectCollection::<Meter>::new(ParseMode::Strict);
        let events = c.apply_status(LINE, true, '#').unwrap();
        assert_eq!(events.len(), 2);

        let mic = c.get(&1).unwrap();
        assert_eq!(mic.source, "COD-");
        assert_eq!(mic.name, "MICPEAK");
        assert_eq!(mic.low, -150.0);
        assert_eq!(mic.high, 20.0);
        assert_eq!(mic.description, "Signal strength of MIC output in CODEC");
        assert_eq!(mic.unit, MeterUnit::Dbfs);
        assert_eq!(mic.fps, 40);

        let level = c.get(&2).unwrap();
        assert_eq!((level.source.as_str(), level.source_index), ("SLC", 0));
        assert_eq!(level.name, "LEVEL");
        assert_eq!(level.unit, MeterUnit::Dbm);
    }

    #[test]
    fn removal() {
        let mut c = ObjectCollection::<Meter>::new(ParseMode::Strict);
        c.apply_status(LINE, true, '#').unwrap();
        c.apply_status("1 removed", false, '#').unwrap();
        assert!(c.get(&1).is_none());
        assert!(c.get(&2).is_some());
    }

    #[test]
    fn unknown_unit_is_kept() {
        assert_eq!(
            MeterUnit::from_wire("furlongs"),
            MeterUnit::Other("furlongs".into())
        );
    }
}
