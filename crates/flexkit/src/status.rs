//! Status-line lifecycle engine.
//!
//! Every stateful radio object (slices, meters, panadapters, amplifiers,
//! equalizers, ...) is created, updated and removed by text status lines of
//! the shape
//!
//! ```text
//! <id> key=value key=value ...
//! <id> removed
//! ```
//!
//! The token delimiter is normally a space, but is passed per call because
//! some objects use `#`. Those objects also use the namespaced form
//! `<id>.key=value#<id>.key=value#`, where the id is the prefix of each
//! token; one namespaced line may carry several objects.
//!
//! [`StatusObject`] is the per-type contract: an id rule and a closed token
//! table. [`ObjectCollection`] is the pure algorithm and [`ObjectEngine`]
//! runs one collection inside a task, republishing an immutable snapshot and
//! an [`ObjectEvent`] after every mutation.
//!
//! Mutation is non-cumulative: each recognised key replaces the previous
//! value, and applying the same line twice yields the same state.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use flexkit_core::error::{Error, Result};
use flexkit_core::events::{DEFAULT_EVENT_CAPACITY, EventBus};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::codec;
use crate::config::ParseMode;

/// Token marking a status line as a removal.
pub const REMOVED: &str = "removed";

/// A device object maintained from status lines.
pub trait StatusObject: Clone + fmt::Debug + Send + Sync + 'static {
    /// Identity of one object of this type.
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// The closed set of recognised keys.
    type Token: Copy + fmt::Debug;

    /// Object class name, used in errors and logs.
    const OBJECT: &'static str;

    /// Parse the leading id token.
    fn parse_id(token: &str) -> Option<Self::Id>;

    /// A default object with the given id.
    fn with_id(id: Self::Id) -> Self;

    fn id(&self) -> &Self::Id;

    /// Resolve a wire key to a token.
    fn token(key: &str) -> Option<Self::Token>;

    /// Apply one value. Returns `false`, leaving the property unchanged, when
    /// the value does not coerce.
    fn apply(&mut self, token: Self::Token, value: &str) -> bool;
}

/// A change published by an [`ObjectEngine`].
#[derive(Debug, Clone)]
pub enum ObjectEvent<T: StatusObject> {
    /// First status line for an unknown id.
    Added(T),
    /// A status line touched an existing object.
    Updated(T),
    /// A removal line. Published whether or not the object existed.
    Removed(T::Id),
}

/// A status line an engine refused.
#[derive(Debug)]
pub struct Rejected {
    pub object: &'static str,
    /// The inbound frame the line was taken from.
    pub frame: String,
    pub error: Error,
}

/// Immutable view of an engine's objects.
pub type Snapshot<T> = Arc<HashMap<<T as StatusObject>::Id, T>>;

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

/// `"1"` / `"0"`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

pub fn parse_num<N: FromStr>(value: &str) -> Option<N> {
    value.parse().ok()
}

/// A finite float.
pub fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Frequency in MHz to integer Hz.
pub fn parse_mhz(value: &str) -> Option<u64> {
    parse_float(value)
        .filter(|mhz| *mhz >= 0.0)
        .map(codec::mhz_to_hz)
}

/// Hex handle with optional `0x` prefix.
pub fn parse_hex_id(token: &str) -> Option<u32> {
    codec::parse_hex_u32(token)
}

/// Decimal index.
pub fn parse_decimal_id(token: &str) -> Option<u32> {
    token.parse().ok()
}

/// Whether a status line describes a live object rather than a removal.
pub fn is_present(line: &str, delimiter: char) -> bool {
    !line
        .split(|c: char| c == delimiter || c.is_whitespace())
        .any(|token| token == REMOVED)
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Tokens addressed to one object within a line.
struct Group<'a, I> {
    id: I,
    tokens: Vec<(&'a str, &'a str)>,
}

/// The objects of one type, keyed by id.
#[derive(Debug, Clone)]
pub struct ObjectCollection<T: StatusObject> {
    objects: HashMap<T::Id, T>,
    mode: ParseMode,
}

impl<T: StatusObject> ObjectCollection<T> {
    pub fn new(mode: ParseMode) -> Self {
        Self {
            objects: HashMap::new(),
            mode,
        }
    }

    /// Apply one status line and return the resulting changes.
    ///
    /// With `present == false` the object is removed (a no-op if absent) and
    /// a single [`ObjectEvent::Removed`] is returned. Otherwise each addressed
    /// object is created if needed and its tokens applied. In strict mode an
    /// unknown key fails the whole line and nothing is changed.
    pub fn apply_status(
        &mut self,
        line: &str,
        present: bool,
        delimiter: char,
    ) -> Result<Vec<ObjectEvent<T>>> {
        let line = line.trim();

        if !present {
            let token = line
                .split(|c: char| c == delimiter || c.is_whitespace())
                .find(|t| !t.is_empty())
                .ok_or_else(|| Error::Protocol(format!("empty {} status line", T::OBJECT)))?;
            let token = match token.split_once('=') {
                Some((lhs, _)) => lhs.split('.').next().unwrap_or(lhs),
                None => token,
            };
            let id = Self::parse_id(token)?;
            if self.objects.remove(&id).is_some() {
                tracing::debug!(object = T::OBJECT, id = ?id, "Object removed");
            }
            return Ok(vec![ObjectEvent::Removed(id)]);
        }

        let groups = self.group(line, delimiter)?;

        let mut staged = Vec::with_capacity(groups.len());
        for group in groups {
            let existing = self.objects.get(&group.id).cloned();
            let added = existing.is_none();
            let mut object = existing.unwrap_or_else(|| T::with_id(group.id.clone()));
            self.apply_tokens(&mut object, &group.tokens)?;
            staged.push((object, added));
        }

        Ok(staged
            .into_iter()
            .map(|(object, added)| {
                self.objects.insert(object.id().clone(), object.clone());
                if added {
                    tracing::debug!(object = T::OBJECT, id = ?object.id(), "Object added");
                    ObjectEvent::Added(object)
                } else {
                    ObjectEvent::Updated(object)
                }
            })
            .collect())
    }

    fn parse_id(token: &str) -> Result<T::Id> {
        T::parse_id(token)
            .ok_or_else(|| Error::Protocol(format!("invalid {} id: {token}", T::OBJECT)))
    }

    /// Split a line into per-object token groups.
    fn group<'a>(&self, line: &'a str, delimiter: char) -> Result<Vec<Group<'a, T::Id>>> {
        let mut tokens = line.split(delimiter).map(str::trim).filter(|t| !t.is_empty());
        let first = tokens
            .next()
            .ok_or_else(|| Error::Protocol(format!("empty {} status line", T::OBJECT)))?;

        if !first.contains('=') {
            let id = Self::parse_id(first)?;
            let tokens = tokens.filter_map(split_token).collect();
            return Ok(vec![Group { id, tokens }]);
        }

        // Namespaced: every token is `<id>.key=value`.
        let mut groups: Vec<Group<'a, T::Id>> = Vec::new();
        for token in std::iter::once(first).chain(tokens) {
            let Some((lhs, value)) = token.split_once('=') else {
                tracing::trace!(object = T::OBJECT, token = %token, "Skipping bare token");
                continue;
            };
            let Some((ns, key)) = lhs.split_once('.') else {
                tracing::trace!(object = T::OBJECT, token = %token, "Skipping token without id");
                continue;
            };
            let id = Self::parse_id(ns)?;
            match groups.iter_mut().find(|g| g.id == id) {
                Some(group) => group.tokens.push((key, value)),
                None => groups.push(Group {
                    id,
                    tokens: vec![(key, value)],
                }),
            }
        }
        Ok(groups)
    }

    fn apply_tokens(&self, object: &mut T, tokens: &[(&str, &str)]) -> Result<()> {
        for &(key, value) in tokens {
            match T::token(key) {
                Some(token) => {
                    if !object.apply(token, value) {
                        tracing::trace!(
                            object = T::OBJECT,
                            key = %key,
                            value = %value,
                            "Malformed value ignored"
                        );
                    }
                }
                None if self.mode.is_strict() => {
                    return Err(Error::UnknownToken {
                        object: T::OBJECT,
                        key: key.to_string(),
                    });
                }
                None => {
                    tracing::trace!(object = T::OBJECT, key = %key, "Unknown key skipped");
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.objects.values()
    }

    /// Remove every object, returning a removal event for each.
    pub fn clear(&mut self) -> Vec<ObjectEvent<T>> {
        self.objects
            .drain()
            .map(|(id, _)| ObjectEvent::Removed(id))
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        Arc::new(self.objects.clone())
    }
}

fn split_token(token: &str) -> Option<(&str, &str)> {
    let pair = token.split_once('=');
    if pair.is_none() {
        tracing::trace!(token = %token, "Skipping bare token");
    }
    pair
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Where the outcome of an applied line goes.
enum Outcome {
    Log,
    Reply(oneshot::Sender<Result<()>>),
    Report {
        frame: String,
        rejects: mpsc::UnboundedSender<Rejected>,
    },
}

enum Request {
    Apply {
        line: String,
        present: bool,
        delimiter: char,
        outcome: Outcome,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Barrier {
        reply: oneshot::Sender<()>,
    },
}

/// One [`ObjectCollection`] confined to its own task.
///
/// All mutation is enqueued to the task; readers only ever see the
/// [`Snapshot`] republished after each mutation. The task exits when the
/// last handle is dropped.
#[derive(Clone)]
pub struct ObjectEngine<T: StatusObject> {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<Snapshot<T>>,
    events: EventBus<ObjectEvent<T>>,
}

impl<T: StatusObject> ObjectEngine<T> {
    /// Spawn an engine. Must be called within a Tokio runtime.
    pub fn spawn(mode: ParseMode) -> Self {
        Self::with_capacity(mode, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(mode: ParseMode, capacity: usize) -> Self {
        let collection = ObjectCollection::<T>::new(mode);
        let (snapshot_tx, snapshot) = watch::channel(collection.snapshot());
        let (requests, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(capacity);

        tokio::spawn(run(collection, rx, snapshot_tx, events.clone()));

        Self {
            requests,
            snapshot,
            events,
        }
    }

    /// Enqueue a status line without waiting for it to be applied.
    ///
    /// Failures are logged by the engine task.
    pub fn submit(&self, line: &str, present: bool, delimiter: char) -> Result<()> {
        self.enqueue(line, present, delimiter, Outcome::Log)
    }

    /// Enqueue a status line without waiting. A refused line is sent to
    /// `rejects`, tagged with `frame`.
    pub fn submit_reported(
        &self,
        line: &str,
        present: bool,
        delimiter: char,
        frame: &str,
        rejects: &mpsc::UnboundedSender<Rejected>,
    ) -> Result<()> {
        let outcome = Outcome::Report {
            frame: frame.to_string(),
            rejects: rejects.clone(),
        };
        self.enqueue(line, present, delimiter, outcome)
    }

    /// Apply a status line and wait for the outcome.
    pub async fn apply_status(&self, line: &str, present: bool, delimiter: char) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(line, present, delimiter, Outcome::Reply(reply))?;
        rx.await.map_err(|_| Error::NotConnected)?
    }

    fn enqueue(&self, line: &str, present: bool, delimiter: char, outcome: Outcome) -> Result<()> {
        self.requests
            .send(Request::Apply {
                line: line.to_string(),
                present,
                delimiter,
                outcome,
            })
            .map_err(|_| Error::NotConnected)
    }

    /// Remove every object, publishing a removal for each.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Clear { reply })
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// Wait until everything enqueued before this call has been applied.
    pub async fn barrier(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Barrier { reply })
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    /// The current objects.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.snapshot.borrow().get(id).cloned()
    }

    /// A receiver notified on every republished snapshot.
    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObjectEvent<T>> {
        self.events.subscribe()
    }
}

async fn run<T: StatusObject>(
    mut collection: ObjectCollection<T>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    snapshot: watch::Sender<Snapshot<T>>,
    events: EventBus<ObjectEvent<T>>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            Request::Apply {
                line,
                present,
                delimiter,
                outcome,
            } => {
                let result = collection
                    .apply_status(&line, present, delimiter)
                    .map(|changes| publish(&collection, changes, &snapshot, &events));

                match (outcome, result) {
                    (Outcome::Reply(reply), result) => {
                        let _ = reply.send(result);
                    }
                    (_, Ok(())) => {}
                    (Outcome::Log, Err(e)) => {
                        tracing::warn!(
                            object = T::OBJECT,
                            line = %line,
                            error = %e,
                            "Status line rejected"
                        );
                    }
                    (Outcome::Report { frame, rejects }, Err(error)) => {
                        tracing::debug!(
                            object = T::OBJECT,
                            frame = %frame,
                            error = %error,
                            "Status line rejected"
                        );
                        let _ = rejects.send(Rejected {
                            object: T::OBJECT,
                            frame,
                            error,
                        });
                    }
                }
            }
            Request::Clear { reply } => {
                let changes = collection.clear();
                publish(&collection, changes, &snapshot, &events);
                let _ = reply.send(());
            }
            Request::Barrier { reply } => {
                let _ = reply.send(());
            }
        }
    }
    tracing::trace!(object = T::OBJECT, "Object engine stopped");
}

/// Republish the snapshot, then the events, so subscribers that look up the
/// snapshot on an event see the change.
fn publish<T: StatusObject>(
    collection: &ObjectCollection<T>,
    changes: Vec<ObjectEvent<T>>,
    snapshot: &watch::Sender<Snapshot<T>>,
    events: &EventBus<ObjectEvent<T>>,
) {
    if changes.is_empty() {
        return;
    }
    snapshot.send_replace(collection.snapshot());
    for change in changes {
        events.publish(change);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
