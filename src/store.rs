use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel as channel;
use dashmap::DashMap;
use serde::Serialize;

use crate::network::Network;
use crate::rates::Rates;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub network: Network,
    /// Smoothed window rates across all tracked chains.
    pub aggregate: Rates,
    /// Unsmoothed rates of the relay chain's latest block.
    pub baseline: Rates,
}

impl MetricsSnapshot {
    pub fn empty(network: Network) -> Self {
        Self { network, aggregate: Rates::ZERO, baseline: Rates::ZERO }
    }

    pub fn ratios(&self) -> Ratios {
        Ratios {
            tps: Ratio::of(self.aggregate.tps, self.baseline.tps),
            mbps: Ratio::of(self.aggregate.mbps, self.baseline.mbps),
            mgas: Ratio::of(self.aggregate.mgas, self.baseline.mgas),
        }
    }
}

/// Aggregate-over-baseline multiplier.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub enum Ratio {
    Value(f64),
    Unavailable,
}

impl Ratio {
    pub fn of(aggregate: f64, baseline: f64) -> Ratio {
        if baseline == 0.0 {
            return Ratio::Unavailable;
        }
        let v = aggregate / baseline;
        if v.is_finite() {
            Ratio::Value(v)
        } else {
            Ratio::Unavailable
        }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ratio::Value(v) => write!(f, "x{v:.2}"),
            Ratio::Unavailable => f.write_str("n/a"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Ratios {
    pub tps: Ratio,
    pub mbps: Ratio,
    pub mgas: Ratio,
}

/// Latest published snapshot plus push subscribers.
pub struct MetricsStore {
    current: ArcSwap<MetricsSnapshot>,
    next_id: AtomicU64,
    subscribers: DashMap<u64, channel::Sender<MetricsSnapshot>>,
}

impl MetricsStore {
    pub fn new(network: Network) -> Self {
        Self {
            current: ArcSwap::from_pointee(MetricsSnapshot::empty(network)),
            next_id: AtomicU64::new(0),
            subscribers: DashMap::new(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        **self.current.load()
    }

    pub fn subscribe(&self, capacity: usize) -> channel::Receiver<MetricsSnapshot> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn publish(&self, snapshot: MetricsSnapshot) {
        self.current.store(Arc::new(snapshot));

        // Clone senders out so no shard lock is held while sending
        let senders: Vec<(u64, channel::Sender<MetricsSnapshot>)> =
            self.subscribers.iter().map(|e| (*e.key(), e.value().clone())).collect();

        let mut to_remove = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(snapshot) {
                Ok(()) => {}
                // slow consumer
                Err(channel::TrySendError::Full(_)) => to_remove.push(id),
                Err(channel::TrySendError::Disconnected(_)) => to_remove.push(id),
            }
        }
        for id in to_remove {
            self.subscribers.remove(&id);
        }
    }

    pub(crate) fn dispose(&self) {
        self.subscribers.clear();
    }
}
