//! Recent run traces
//!
//! Keeps the last few completed traces per signal and broadcasts every
//! completed trace to subscribers.

use crate::trace::SignalTrace;
use dashmap::DashMap;
use signal_config::EngineConfig;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use tracing::trace;

/// Completed traces, grouped by signal name
pub struct TraceLog {
    /// Traces kept per signal
    capacity: usize,
    traces: DashMap<String, VecDeque<SignalTrace>>,
    sender: broadcast::Sender<SignalTrace>,
}

impl TraceLog {
    /// Create a log keeping `capacity` traces per signal
    pub fn new(capacity: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            capacity: capacity.max(1),
            traces: DashMap::new(),
            sender,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.stored_traces, config.trace_channel_capacity)
    }

    /// Store a completed trace and send it to subscribers
    pub fn record(&self, trace: SignalTrace) {
        trace!(signal = %trace.name, run_id = %trace.id, "Recording trace");

        // No receivers is fine
        let _ = self.sender.send(trace.clone());

        let mut entry = self.traces.entry(trace.name.clone()).or_default();
        entry.push_back(trace);
        while entry.len() > self.capacity {
            entry.pop_front();
        }
    }

    /// Receive every trace recorded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SignalTrace> {
        self.sender.subscribe()
    }

    /// Stored traces of a signal, oldest first
    pub fn traces(&self, signal: &str) -> Vec<SignalTrace> {
        self.traces
            .get(signal)
            .map(|traces| traces.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, signal: &str) -> Option<SignalTrace> {
        self.traces
            .get(signal)
            .and_then(|traces| traces.back().cloned())
    }

    /// Find a stored trace by run id
    pub fn get(&self, signal: &str, run_id: &str) -> Option<SignalTrace> {
        self.traces
            .get(signal)
            .and_then(|traces| traces.iter().find(|t| t.id == run_id).cloned())
    }

    /// Names of signals with stored traces, sorted
    pub fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.traces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Drop the stored traces of a signal, returning how many there were
    pub fn clear(&self, signal: &str) -> usize {
        self.traces
            .remove(signal)
            .map(|(_, traces)| traces.len())
            .unwrap_or(0)
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
