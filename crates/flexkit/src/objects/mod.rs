//! Device object types maintained from status lines.
//!
//! Each type implements [`StatusObject`](crate::status::StatusObject) with
//! its own id rule and token table, and has a closed setting enum for
//! outbound changes:
//!
//! | object | id | delimiter | setting |
//! |---|---|---|---|
//! | [`Slice`] | decimal index | space | [`SliceSetting`] |
//! | [`Meter`] | decimal, namespaced | `#` | none |
//! | [`Panadapter`] | hex stream id | space | [`PanadapterSetting`] |
//! | [`Amplifier`] | hex handle | space | [`AmplifierSetting`] |
//! | [`Equalizer`] | `rxsc` / `txsc` | space | [`EqualizerSetting`] |
//!
//! [`ObjectModel`] owns one engine per type and routes status payloads to
//! them.

pub mod amplifier;
pub mod equalizer;
pub mod meter;
pub mod panadapter;
pub mod slice;

use std::str::FromStr;

use flexkit_core::error::Result;
use tokio::sync::mpsc;

use crate::config::ParseMode;
use crate::status::{ObjectEngine, Rejected, StatusObject, is_present};

pub use amplifier::{Amplifier, AmplifierSetting};
pub use equalizer::{Equalizer, EqualizerKind, EqualizerSetting};
pub use meter::{Meter, MeterUnit};
pub use panadapter::{Panadapter, PanadapterSetting};
pub use slice::{Slice, SliceSetting};

/// A closed set of changes for one object type.
pub trait ObjectSetting {
    type Object: StatusObject;

    /// The command text applying this change to object `id`.
    fn command(&self, id: &<Self::Object as StatusObject>::Id) -> String;
}

/// Store `value` in `slot` if present. Returns whether it was.
pub(crate) fn assign<V>(slot: &mut V, value: Option<V>) -> bool {
    match value {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

pub(crate) fn flag(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

/// Comma-separated list, empty entries dropped.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Comma-separated numbers. Fails if any entry does not parse.
pub(crate) fn parse_num_list<N: FromStr>(value: &str) -> Option<Vec<N>> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// One engine per device object type.
#[derive(Clone)]
pub struct ObjectModel {
    pub slices: ObjectEngine<Slice>,
    pub meters: ObjectEngine<Meter>,
    pub panadapters: ObjectEngine<Panadapter>,
    pub amplifiers: ObjectEngine<Amplifier>,
    pub equalizers: ObjectEngine<Equalizer>,
}

impl ObjectModel {
    /// Spawn all engines. Must be called within a Tokio runtime.
    pub fn spawn(mode: ParseMode, event_capacity: usize) -> Self {
        Self {
            slices: ObjectEngine::with_capacity(mode, event_capacity),
            meters: ObjectEngine::with_capacity(mode, event_capacity),
            panadapters: ObjectEngine::with_capacity(mode, event_capacity),
            amplifiers: ObjectEngine::with_capacity(mode, event_capacity),
            equalizers: ObjectEngine::with_capacity(mode, event_capacity),
        }
    }

    /// Apply a status payload for object class `object`.
    ///
    /// Returns `Ok(false)` when no engine tracks that class.
    pub async fn route(&self, object: &str, rest: &str) -> Result<bool> {
        match object {
            "slice" => apply(&self.slices, rest, ' ').await,
            "meter" => apply(&self.meters, rest, '#').await,
            "amplifier" => apply(&self.amplifiers, rest, ' ').await,
            "eq" => apply(&self.equalizers, rest, ' ').await,
            "display" => match rest.split_once(' ') {
                Some(("pan", body)) => apply(&self.panadapters, body.trim_start(), ' ').await,
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// Enqueue a status payload for object class `object` without waiting
    /// for it to be applied.
    ///
    /// Returns `Ok(false)` when no engine tracks that class. A payload the
    /// engine refuses is sent to `rejects`, tagged with `frame`.
    pub fn submit(
        &self,
        object: &str,
        rest: &str,
        frame: &str,
        rejects: &mpsc::UnboundedSender<Rejected>,
    ) -> Result<bool> {
        match object {
            "slice" => enqueue(&self.slices, rest, ' ', frame, rejects),
            "meter" => enqueue(&self.meters, rest, '#', frame, rejects),
            "amplifier" => enqueue(&self.amplifiers, rest, ' ', frame, rejects),
            "eq" => enqueue(&self.equalizers, rest, ' ', frame, rejects),
            "display" => match rest.split_once(' ') {
                Some(("pan", body)) => {
                    enqueue(&self.panadapters, body.trim_start(), ' ', frame, rejects)
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    /// Wait until every engine has applied what was enqueued before.
    pub async fn barrier(&self) -> Result<()> {
        self.slices.barrier().await?;
        self.meters.barrier().await?;
        self.panadapters.barrier().await?;
        self.amplifiers.barrier().await?;
        self.equalizers.barrier().await
    }

    /// Remove every object from every engine.
    pub async fn clear(&self) -> Result<()> {
        self.slices.clear().await?;
        self.meters.clear().await?;
        self.panadapters.clear().await?;
        self.amplifiers.clear().await?;
        self.equalizers.clear().await
    }
}

async fn apply<T: StatusObject>(
    engine: &ObjectEngine<T>,
    rest: &str,
    delimiter: char,
) -> Result<bool> {
    engine
        .apply_status(rest, is_present(rest, delimiter), delimiter)
        .await?;
    Ok(true)
}

fn enqueue<T: StatusObject>(
    engine: &ObjectEngine<T>,
    rest: &str,
    delimiter: char,
    frame: &str,
    rejects: &mpsc::UnboundedSender<Rejected>,
) -> Result<bool> {
    engine.submit_reported(rest, is_present(rest, delimiter), delimiter, frame, rejects)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_helpers() {
        assert_eq!(split_list("A,,B"), vec!["A", "B"]);
        assert!(split_list("").is_empty());
        assert_eq!(parse_num_list::<u32>("1,2"), Some(vec![1, 2]));
        assert_eq!(parse_num_list::<u32>("1,x"), None);
    }

    #[test]
    fn assign_only_on_value() {
        let mut slot = 3;
        assert!(!assign(&mut slot, None));
        assert_eq!(slot, 3);
        assert!(assign(&mut slot, Some(4)));
        assert_eq!(slot, 4);
    }

    #[tokio::test]
    async fn routes_by_object_class() {
        let model = ObjectModel::spawn(ParseMode::Strict, 16);

        assert!(model.route("slice", "0 mode=USB").await.unwrap());
        assert!(model.route("meter", "3.nam=SWR#3.unit=SWR#").await.unwrap());
        assert!(
            model
                .route("display", "pan 0x40000000 center=14.1")
                .await
                .unwrap()
        );
        assert!(model.route("amplifier", "0x1 state=OPERATE").await.unwrap());
        assert!(model.route("eq", "txsc mode=1").await.unwrap());

        let waterfall = model.route("display", "waterfall 0x42000000 line_duration=100");
        assert!(!waterfall.await.unwrap());
        assert!(!model.route("interlock", "state=READY").await.unwrap());

        assert_eq!(model.slices.get(&0).unwrap().mode, "USB");
        assert_eq!(model.meters.get(&3).unwrap().unit, MeterUnit::Swr);
        assert_eq!(model.panadapters.get(&0x4000_0000).unwrap().center_hz, 14_100_000);
        assert!(model.amplifiers.get(&1).unwrap().is_operating());
        assert!(model.equalizers.get(&EqualizerKind::Tx).unwrap().enabled);
    }

    #[tokio::test]
    async fn removal_lines_are_detected() {
        let model = ObjectModel::spawn(ParseMode::Strict, 16);
        model.route("slice", "1 in_use=1").await.unwrap();
        model.route("slice", "1 in_use=0 removed").await.unwrap();
        assert!(model.slices.get(&1).is_none());

        model.route("meter", "4.nam=ALC#").await.unwrap();
        model.route("meter", "4 removed").await.unwrap();
        assert!(model.meters.get(&4).is_none());
    }

    #[tokio::test]
    async fn submitted_payloads_reach_their_engines() {
        let model = ObjectModel::spawn(ParseMode::Strict, 16);
        let (tx, mut rejects) = mpsc::unbounded_channel();

        assert!(model.submit("slice", "2 mode=LSB", "S1|slice 2 mode=LSB", &tx).unwrap());
        assert!(
            model
                .submit("display", "pan 0x40000001 center=7.2", "S1|display pan ...", &tx)
                .unwrap()
        );
        assert!(model.submit("slice", "3 wat=1", "S1|slice 3 wat=1", &tx).unwrap());
        assert!(!model.submit("gps", "lat=1", "S1|gps lat=1", &tx).unwrap());
        model.barrier().await.unwrap();

        assert_eq!(model.slices.get(&2).unwrap().mode, "LSB");
        assert_eq!(model.panadapters.get(&0x4000_0001).unwrap().center_hz, 7_200_000);
        let rejected = rejects.try_recv().unwrap();
        assert_eq!(rejected.object, "slice");
        assert_eq!(rejected.frame, "S1|slice 3 wat=1");
        assert!(rejects.try_recv().is_err());
    }

    #[tokio::test]
    async fn clear_empties_all_engines() {
        let model = ObjectModel::spawn(ParseMode::Strict, 16);
        model.route("slice", "0 mode=CW").await.unwrap();
        model.route("eq", "rxsc mode=1").await.unwrap();
        model.clear().await.unwrap();
        assert!(model.slices.snapshot().is_empty());
        assert!(model.equalizers.snapshot().is_empty());
    }
}
