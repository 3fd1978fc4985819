//! Match history handed off when a match ends
//!
//! The orchestrator builds a `MatchRecord` and passes it to a `HistorySink`
//! exactly once. Persisting it is the sink's business.

use serde::{Deserialize, Serialize};
use shared::Point;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Per player name, one entry per micro-turn: the direction applied that
/// turn, or `None` when the player had no queued move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveLog {
    moves: BTreeMap<String, Vec<Option<Point>>>,
}

impl MoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, applied: Option<Point>) {
        self.moves.entry(name.to_string()).or_default().push(applied);
    }

    pub fn get(&self, name: &str) -> Option<&[Option<Point>]> {
        self.moves.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Everything kept about a finished match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub name: String,
    /// JSON `FullSnapshot`s, one per micro-turn
    pub snapshots: Vec<String>,
    pub moves: MoveLog,
}

impl MatchRecord {
    /// Micro-turn snapshots as a single JSON array
    pub fn snapshots_json(&self) -> String {
        format!("[{}]", self.snapshots.join(","))
    }
}

/// Receives the record of a finished match
pub trait HistorySink: Send + 'static {
    fn record(&mut self, record: MatchRecord);
}

impl<F> HistorySink for F
where
    F: FnMut(MatchRecord) + Send + 'static,
{
    fn record(&mut self, record: MatchRecord) {
        self(record)
    }
}

impl HistorySink for mpsc::UnboundedSender<MatchRecord> {
    fn record(&mut self, record: MatchRecord) {
        if self.send(record).is_err() {
            log::warn!("History receiver dropped; match record discarded");
        }
    }
}
