//! Stream registry
//!
//! Streams are named, append-only histories fed by the host. A push is only
//! buffered: reads observe the committed prefix of the history, and `commit`
//! (called by flush) is the one place where new values become visible.

use super::errors::EngineError;
use super::types::{Datum, NodeId, Val, ValueKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/* ===================== Streams ===================== */

/// Kind of value a stream accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Any,
    Of(ValueKind),
}

impl StreamKind {
    pub fn accepts(self, kind: ValueKind) -> bool {
        match self {
            StreamKind::Any => true,
            StreamKind::Of(expected) => expected == kind,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Any => write!(f, "any"),
            StreamKind::Of(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug)]
pub struct Stream {
    pub name: String,
    pub kind: StreamKind,
    /// Value the history starts with on every run
    initial: Option<Val>,
    history: Vec<Val>,
    /// Length of the history visible to reads
    committed: usize,
    subscribers: BTreeSet<NodeId>,
}

impl Stream {
    fn new(name: &str, kind: StreamKind, initial: Option<Val>) -> Self {
        let history: Vec<Val> = initial.iter().cloned().collect();
        Stream {
            name: name.to_string(),
            kind,
            committed: history.len(),
            initial,
            history,
            subscribers: BTreeSet::new(),
        }
    }

    /// Most recent committed value
    pub fn latest(&self) -> Option<&Val> {
        self.history[..self.committed].last()
    }

    /// Committed values, oldest first
    pub fn history(&self) -> &[Val] {
        &self.history[..self.committed]
    }

    pub fn pending(&self) -> usize {
        self.history.len() - self.committed
    }

    pub fn subscribers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.subscribers.iter().copied()
    }
}

/* ===================== Async Sources ===================== */

/// Cloneable, thread-safe handle for feeding streams from other tasks
///
/// Values sent here are drained into the registry at the next flush.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: UnboundedSender<(String, Datum)>,
}

impl StreamSender {
    pub fn send(&self, stream: &str, value: Datum) -> Result<(), EngineError> {
        self.tx
            .send((stream.to_string(), value))
            .map_err(|_| EngineError::StreamClosed(stream.to_string()))
    }
}

/* ===================== Registry ===================== */

#[derive(Debug)]
pub struct StreamRegistry {
    streams: BTreeMap<String, Stream>,
    /// Streams that received values at the last commit
    changed: BTreeSet<String>,
    tx: UnboundedSender<(String, Datum)>,
    inbox: UnboundedReceiver<(String, Datum)>,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        StreamRegistry {
            streams: BTreeMap::new(),
            changed: BTreeSet::new(),
            tx,
            inbox,
        }
    }

    /// Register a stream accepting any value. Idempotent.
    pub fn register(&mut self, name: &str) -> &Stream {
        self.streams
            .entry(name.to_string())
            .or_insert_with(|| Stream::new(name, StreamKind::Any, None))
    }

    /// Register a stream with a kind and optional initial value
    ///
    /// Re-registering with the same kind returns the existing stream; a
    /// different kind is rejected.
    pub fn register_with(
        &mut self,
        name: &str,
        kind: StreamKind,
        initial: Option<Val>,
    ) -> Result<&Stream, EngineError> {
        if let Some(value) = &initial {
            if !kind.accepts(value.kind()) {
                return Err(EngineError::StreamKindMismatch {
                    name: name.to_string(),
                    expected: kind.to_string(),
                    received: value.kind().to_string(),
                });
            }
        }
        if let Some(existing) = self.streams.get(name) {
            if existing.kind != kind {
                return Err(EngineError::StreamConflict {
                    name: name.to_string(),
                    existing: existing.kind.to_string(),
                    requested: kind.to_string(),
                });
            }
        }
        debug!(stream = name, kind = %kind, "stream registered");
        Ok(self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| Stream::new(name, kind, initial)))
    }

    /// Find a stream, registering it first if it is a native one
    pub fn ensure(&mut self, name: &str) -> Option<&Stream> {
        if !self.streams.contains_key(name) {
            let (kind, initial) = native_stream(name)?;
            self.streams
                .insert(name.to_string(), Stream::new(name, kind, Some(initial)));
        }
        self.streams.get(name)
    }

    pub fn get(&self, name: &str) -> Option<&Stream> {
        self.streams.get(name)
    }

    pub fn latest(&self, name: &str) -> Option<&Val> {
        self.streams.get(name).and_then(Stream::latest)
    }

    /// Whether `name` received values at the last commit
    pub fn changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    /// Append `value` without making it visible. Returns the stream's subscribers.
    pub fn push(&mut self, name: &str, value: Val) -> Result<Vec<NodeId>, EngineError> {
        if self.ensure(name).is_none() {
            return Err(EngineError::UnknownStream(name.to_string()));
        }
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStream(name.to_string()))?;
        if !stream.kind.accepts(value.kind()) {
            return Err(EngineError::StreamKindMismatch {
                name: name.to_string(),
                expected: stream.kind.to_string(),
                received: value.kind().to_string(),
            });
        }
        stream.history.push(value);
        Ok(stream.subscribers().collect())
    }

    /// Move everything sent through `StreamSender`s into the histories
    pub fn drain_inbox(&mut self) -> usize {
        let mut drained = 0;
        while let Ok((name, datum)) = self.inbox.try_recv() {
            match self.push(&name, Val::from(datum)) {
                Ok(_) => drained += 1,
                Err(e) => warn!(stream = %name, error = %e, "dropping value from async source"),
            }
        }
        drained
    }

    /// Make every pending value visible. Returns the names of the streams that advanced.
    pub fn commit(&mut self) -> Vec<String> {
        self.changed.clear();
        for stream in self.streams.values_mut() {
            if stream.pending() > 0 {
                stream.committed = stream.history.len();
                self.changed.insert(stream.name.clone());
            }
        }
        self.changed.iter().cloned().collect()
    }

    /// Every value held by any stream, committed or not
    pub fn values(&self) -> impl Iterator<Item = &Val> + '_ {
        self.streams
            .values()
            .flat_map(|s| s.history.iter().chain(s.initial.iter()))
    }

    pub fn sender(&self) -> StreamSender {
        StreamSender {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&mut self, name: &str, reaction: NodeId) {
        if let Some(stream) = self.streams.get_mut(name) {
            stream.subscribers.insert(reaction);
        }
    }

    pub fn unsubscribe_all(&mut self) {
        for stream in self.streams.values_mut() {
            stream.subscribers.clear();
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.streams.values().map(|s| s.subscribers.len()).sum()
    }

    /// Return every stream to its initial history and drop subscriptions
    pub fn reset(&mut self) {
        for stream in self.streams.values_mut() {
            stream.history = stream.initial.iter().cloned().collect();
            stream.committed = stream.history.len();
            stream.subscribers.clear();
        }
        self.changed.clear();
    }
}

/// Streams the engine provides without host registration
fn native_stream(name: &str) -> Option<(StreamKind, Val)> {
    match name {
        "Time" => Some((StreamKind::Of(ValueKind::Number), Val::measure(0.0, "ms"))),
        _ => None,
    }
}
