//! External power amplifiers registered with the radio, keyed by hex handle.
//!
//! ```text
//! amplifier 0x1B2C3D4E model=PowerGeniusXL serial_num=2119-1001 ip=192.168.1.40 port=9008
//!     state=STANDBY ant=ANT1:1,ANT2:2
//! amplifier 0x1B2C3D4E removed
//! ```

use crate::status::{StatusObject, parse_hex_id, parse_num};

use super::{ObjectSetting, assign, flag};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Amplifier {
    pub handle: u32,
    pub model: String,
    pub serial: String,
    pub ip: String,
    pub port: u16,
    /// Operating state as reported (`STANDBY`, `OPERATE`, `FAULT`, ...).
    pub state: String,
    /// Radio antenna to amplifier input mapping, `(radio_port, amp_port)`.
    pub antenna_map: Vec<(String, String)>,
}

impl Amplifier {
    pub fn is_operating(&self) -> bool {
        self.state.eq_ignore_ascii_case("OPERATE")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplifierToken {
    Model,
    Serial,
    Ip,
    Port,
    State,
    Ant,
}

impl StatusObject for Amplifier {
    type Id = u32;
    type Token = AmplifierToken;
    const OBJECT: &'static str = "amplifier";

    fn parse_id(token: &str) -> Option<u32> {
        parse_hex_id(token)
    }

    fn with_id(handle: u32) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }

    fn id(&self) -> &u32 {
        &self.handle
    }

    fn token(key: &str) -> Option<AmplifierToken> {
        Some(match key {
            "model" => AmplifierToken::Model,
            "serial_num" => AmplifierToken::Serial,
            "ip" => AmplifierToken::Ip,
            "port" => AmplifierToken::Port,
            "state" => AmplifierToken::State,
            "ant" => AmplifierToken::Ant,
            _ => return None,
        })
    }

    fn apply(&mut self, token: AmplifierToken, value: &str) -> bool {
        match token {
            AmplifierToken::Model => assign(&mut self.model, Some(value.to_string())),
            AmplifierToken::Serial => assign(&mut self.serial, Some(value.to_string())),
            AmplifierToken::Ip => assign(&mut self.ip, Some(value.to_string())),
            AmplifierToken::Port => assign(&mut self.port, parse_num(value)),
            AmplifierToken::State => assign(&mut self.state, Some(value.to_string())),
            AmplifierToken::Ant => assign(&mut self.antenna_map, parse_antenna_map(value)),
        }
    }
}

/// `ANT1:1,ANT2:2` into pairs. Fails on any entry without a colon.
fn parse_antenna_map(value: &str) -> Option<Vec<(String, String)>> {
    value
        .split(',')
        .filter(|e| !e.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(radio, amp)| (radio.to_string(), amp.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum AmplifierSetting {
    Operate(bool),
}

impl ObjectSetting for AmplifierSetting {
    type Object = Amplifier;

    fn command(&self, handle: &u32) -> String {
        match self {
            AmplifierSetting::Operate(on) => {
                format!("amplifier set 0x{handle:08X} operate={}", flag(*on))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseMode;
    use crate::status::ObjectCollection;

    #[test]
    fn status_line() {
        let mut c = ObjectCollection::<Amplifier>::new(ParseMode::Strict);
        c.apply_status(
            "0x1B2C3D4E model=PowerGeniusXL serial_num=2119-1001 ip=192.168.1.40 port=9008 \
             state=STANDBY ant=ANT1:1,ANT2:2",
            true,
            ' ',
        )
        .unwrap();

        let amp = c.get(&0x1B2C_3D4E).unwrap();
        assert_eq!(amp.model, "PowerGeniusXL");
        assert_eq!(amp.port, 9008);
        assert!(!amp.is_operating());
        assert_eq!(
            amp.antenna_map,
            vec![("ANT1".into(), "1".into()), ("ANT2".into(), "2".into())]
        );

        c.apply_status("0x1B2C3D4E state=OPERATE ant=bogus", true, ' ')
            .unwrap();
        let amp = c.get(&0x1B2C_3D4E).unwrap();
        assert!(amp.is_operating());
        assert_eq!(amp.antenna_map.len(), 2, "malformed map keeps previous value");
    }

    #[test]
    fn operate_command() {
        assert_eq!(
            AmplifierSetting::Operate(true).command(&0xAB),
            "amplifier set 0x000000AB operate=1"
        );
    }
}
