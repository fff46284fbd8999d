use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::config::{AggregatorConfig, Conversion};
use crate::ingest::{DecodeError, DecodeOptions, Ingestor, LatestUpdate};
use crate::metrics::Smoother;
use crate::network::{ChainIdentity, ChainKey, Network};
use crate::rates::Rates;
use crate::recorder::{BlockRecord, ChainRecords, RecordBook, Recorder, Rejection};
use crate::registry::ChainRegistry;
use crate::store::{MetricsSnapshot, MetricsStore};
use crate::window::window_sums;

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[derive(Debug, thiserror::Error)]
pub enum Dropped {
    #[error("malformed update: {0}")]
    Malformed(#[from] DecodeError),
    #[error("rejected update: {0:?}")]
    Rejected(Rejection),
}

/// Owns one selection context: the rolling buffers, the smoothed state and
/// the published snapshot. All mutation goes through `&mut self`.
pub struct Aggregator {
    config: AggregatorConfig,
    registry: Arc<dyn ChainRegistry>,
    selected: Network,
    ingestor: Ingestor,
    recorder: Recorder,
    smoother: Smoother,
    store: Arc<MetricsStore>,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig, registry: Arc<dyn ChainRegistry>, selected: Network) -> Self {
        let ingestor = Ingestor::new(DecodeOptions::from(&config), Arc::clone(&registry));
        let recorder = Recorder::new(config.max_blocks_store, Arc::clone(&registry));
        let smoother = Smoother::new(config.alpha, selected);
        Self {
            config,
            registry,
            selected,
            ingestor,
            recorder,
            smoother,
            store: Arc::new(MetricsStore::new(selected)),
        }
    }

    pub fn selected(&self) -> Network {
        self.selected
    }

    pub fn handle(&self) -> MetricsHandle {
        MetricsHandle {
            store: Arc::clone(&self.store),
            book: self.recorder.book(),
            ingestor: self.ingestor.clone(),
            registry: Arc::clone(&self.registry),
            system_extrinsic_offset: self.config.system_extrinsic_offset,
            conversion: self.config.conversion.clone(),
        }
    }

    /// Decode and record one raw message without recomputing rates.
    pub fn record(&mut self, raw: &[u8]) -> Result<BlockRecord, Dropped> {
        let update = self.ingestor.ingest(raw)?;
        self.recorder.accept(&update).map_err(Dropped::Rejected)
    }

    /// Record a batch of messages and recompute once if the selected
    /// network's window changed. Returns whether a snapshot was published.
    pub fn update<'a, I>(&mut self, batch: I, now_ms: u64) -> bool
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut changed = false;
        for raw in batch {
            match self.record(raw) {
                Ok(record) => changed |= record.key.network == self.selected,
                Err(e) => debug!(error = %e, "Dropping update"),
            }
        }
        if changed {
            self.recompute(now_ms);
        }
        changed
    }

    /// Switch the selected network. Reselecting the current one leaves the
    /// smoothed state untouched.
    pub fn select(&mut self, network: Network, now_ms: u64) -> MetricsSnapshot {
        if network == self.selected {
            return self.store.snapshot();
        }
        info!(from = %self.selected, to = %network, "Switching network");
        self.selected = network;
        self.recompute(now_ms)
    }

    fn recompute(&mut self, now_ms: u64) -> MetricsSnapshot {
        let buffer = self.recorder.book().buffer(self.selected);
        let sums = window_sums(&buffer, now_ms, self.config.window_ms, self.config.system_extrinsic_offset);
        let raw = Rates::from_window(sums, &self.config.conversion);
        let aggregate = self.smoother.update(self.selected, raw);
        let snapshot = MetricsSnapshot { network: self.selected, aggregate, baseline: self.baseline(self.selected) };
        self.store.publish(snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.store.snapshot()
    }

    fn baseline(&self, network: Network) -> Rates {
        let relay = ChainKey::new(network, self.registry.relay_id(network));
        self.recorder
            .book()
            .chain(&relay)
            .map(|c| Rates::for_block(&c.latest, self.config.system_extrinsic_offset, &self.config.conversion))
            .unwrap_or(Rates::ZERO)
    }

    pub(crate) fn dispose(&self) {
        self.store.dispose();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainRow {
    pub identity: ChainIdentity,
    pub latest: Option<BlockRecord>,
    pub rates: Rates,
}

/// Read-only view for consumers on other threads.
#[derive(Clone)]
pub struct MetricsHandle {
    store: Arc<MetricsStore>,
    book: Arc<RecordBook>,
    ingestor: Ingestor,
    registry: Arc<dyn ChainRegistry>,
    system_extrinsic_offset: u64,
    conversion: Conversion,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self, capacity: usize) -> Receiver<MetricsSnapshot> {
        self.store.subscribe(capacity)
    }

    pub fn latest_update(&self, key: &ChainKey) -> Option<LatestUpdate> {
        self.ingestor.latest(key)
    }

    pub fn chain_records(&self, key: &ChainKey) -> Option<ChainRecords> {
        self.book.chain(key)
    }

    pub fn buffer(&self, network: Network) -> Arc<Vec<BlockRecord>> {
        self.book.buffer(network)
    }

    /// Per-chain rows for the table: relay first, then by TPS descending.
    pub fn chain_rows(&self, network: Network) -> Vec<ChainRow> {
        let relay_id = self.registry.relay_id(network);
        let mut rows: Vec<ChainRow> = self
            .registry
            .chains(network)
            .iter()
            .map(|identity| {
                let latest = self.book.chain(&identity.key()).map(|c| c.latest);
                let rates = latest
                    .map(|r| Rates::for_block(&r, self.system_extrinsic_offset, &self.conversion))
                    .unwrap_or(Rates::ZERO);
                ChainRow { identity: identity.clone(), latest, rates }
            })
            .collect();
        rows.sort_by(|a, b| {
            (b.identity.para_id == relay_id)
                .cmp(&(a.identity.para_id == relay_id))
                .then(b.rates.tps.total_cmp(&a.rates.tps))
                .then_with(|| a.identity.name.cmp(&b.identity.name))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::message;
    use crate::registry::StaticRegistry;
    use crate::store::Ratio;

    const MB: f64 = 1024.0 * 1024.0;

    fn aggregator(alpha: f64) -> Aggregator {
        let config = AggregatorConfig { alpha, ..AggregatorConfig::default() };
        Aggregator::new(config, Arc::new(StaticRegistry::default()), Network::Polkadot)
    }

    #[test]
    fn window_with_one_record_yields_zero() {
        let mut agg = aggregator(1.0);
        assert!(agg.update([message("Polkadot", 2000, 1, 10_000, 50, MB).as_slice()], 10_000));
        assert_eq!(agg.snapshot().aggregate, Rates::ZERO);
    }

    #[test]
    fn two_blocks_one_second_apart() {
        let mut agg = aggregator(1.0);
        let batch = [message("Polkadot", 2000, 1, 5_000, 10, 0.0), message("Polkadot", 2000, 2, 6_000, 20, 0.0)];
        agg.update(batch.iter().map(Vec::as_slice), 6_000);
        assert_eq!(agg.snapshot().aggregate.tps, 26.0);
    }

    #[test]
    fn smoothing_starts_from_zero() {
        let mut agg = aggregator(0.3);
        let first = [message("Polkadot", 2000, 1, 5_000, 12, 0.0), message("Polkadot", 2000, 2, 6_000, 12, 0.0)];
        agg.update(first.iter().map(Vec::as_slice), 6_000);
        // raw 20 tps, alpha 0.3 from a zero state
        assert!((agg.snapshot().aggregate.tps - 6.0).abs() < 1e-9);
    }

    #[test]
    fn duplicates_and_other_networks_do_not_recompute() {
        let mut agg = aggregator(0.3);
        agg.update([message("Polkadot", 2000, 1, 5_000, 12, 0.0).as_slice()], 6_000);
        assert!(!agg.update([message("Polkadot", 2000, 1, 5_000, 12, 0.0).as_slice()], 6_000));
        assert!(!agg.update([message("Kusama", 2000, 1, 5_000, 12, 0.0).as_slice()], 6_000));
        assert!(!agg.update([b"garbage".as_slice()], 6_000));
        assert_eq!(agg.handle().buffer(Network::Kusama).len(), 1);
    }

    #[test]
    fn reselecting_current_network_keeps_smoothed_state() {
        let mut agg = aggregator(0.3);
        let batch = [message("Polkadot", 2000, 1, 5_000, 12, 0.0), message("Polkadot", 2000, 2, 6_000, 12, 0.0)];
        agg.update(batch.iter().map(Vec::as_slice), 6_000);
        let before = agg.snapshot();
        assert_eq!(agg.select(Network::Polkadot, 6_000), before);
        assert_eq!(agg.select(Network::Polkadot, 7_000), before);
        assert_eq!(agg.snapshot(), before);
    }

    #[test]
    fn huge_extrinsic_counts_do_not_panic() {
        let mut agg = aggregator(1.0);
        let batch = [
            message("Polkadot", 2000, 1, 5_000, u64::MAX / 2 + 10, 0.0),
            message("Polkadot", 2000, 2, 6_000, u64::MAX / 2 + 10, 0.0),
        ];
        assert!(agg.update(batch.iter().map(Vec::as_slice), 6_000));
        let snap = agg.snapshot();
        assert!(snap.aggregate.tps.is_finite());
        assert!(snap.aggregate.tps > 0.0);
    }

    #[test]
    fn switching_network_resets_smoothing() {
        let mut agg = aggregator(0.3);
        let dot = [message("Polkadot", 2000, 1, 5_000, 102, 0.0), message("Polkadot", 2000, 2, 6_000, 102, 0.0)];
        agg.update(dot.iter().map(Vec::as_slice), 6_000);
        let ksm = [message("Kusama", 1000, 1, 4_000, 6, 0.0), message("Kusama", 1000, 2, 6_000, 6, 0.0)];
        agg.update(ksm.iter().map(Vec::as_slice), 6_000);
        assert_eq!(agg.snapshot().network, Network::Polkadot);

        let snap = agg.select(Network::Kusama, 6_000);
        // (4 + 4) extrinsics over 2s, not blended with Polkadot's 200 tps
        assert_eq!(snap.network, Network::Kusama);
        assert_eq!(snap.aggregate.tps, 4.0);
    }

    #[test]
    fn baseline_comes_from_latest_relay_block() {
        let mut agg = aggregator(1.0);
        let batch = [
            message("Polkadot", 0, 100, 5_000, 14, 3.0 * MB),
            message("Polkadot", 2000, 1, 6_000, 50, MB),
        ];
        agg.update(batch.iter().map(Vec::as_slice), 6_000);
        let snap = agg.snapshot();
        assert_eq!(snap.baseline.tps, 2.0);
        assert!((snap.baseline.mbps - 0.5).abs() < 1e-9);
        assert!((snap.baseline.mgas - 6.0).abs() < 1e-9);
    }

    #[test]
    fn missing_baseline_reports_unavailable_ratio() {
        let mut agg = aggregator(1.0);
        let batch = [message("Polkadot", 2000, 1, 5_000, 12, MB), message("Polkadot", 2004, 1, 6_000, 12, MB)];
        agg.update(batch.iter().map(Vec::as_slice), 6_000);
        let snap = agg.snapshot();
        assert!(snap.aggregate.tps > 0.0);
        assert_eq!(snap.ratios().tps, Ratio::Unavailable);
    }

    #[test]
    fn handle_exposes_table_reads() {
        let mut agg = aggregator(1.0);
        let handle = agg.handle();
        let batch = [
            message("Kusama", 0, 10, 1_000, 8, 0.0),
            message("Kusama", 1000, 1, 1_000, 3, 0.0),
            message("Kusama", 1000, 2, 7_000, 62, 0.0),
        ];
        agg.update(batch.iter().map(Vec::as_slice), 7_000);

        let key = ChainKey::new(Network::Kusama, 1000);
        let records = handle.chain_records(&key).unwrap();
        assert_eq!(records.latest.block_number, 2);
        assert_eq!(records.previous.unwrap().block_number, 1);
        assert_eq!(handle.latest_update(&key).unwrap().current.extrinsics, 62);

        let rows = handle.chain_rows(Network::Kusama);
        assert_eq!(rows[0].identity.name, "Kusama");
        assert_eq!(rows[1].identity.name, "AssetHub");
        assert_eq!(rows[1].rates.tps, 10.0);
        assert!(rows.iter().skip(2).all(|r| r.latest.is_none()));
    }

    #[test]
    fn subscribers_are_notified_on_publish() {
        let mut agg = aggregator(1.0);
        let rx = agg.handle().subscribe(8);
        agg.update([message("Polkadot", 2000, 1, 5_000, 12, 0.0).as_slice()], 6_000);
        assert_eq!(rx.try_recv().unwrap().network, Network::Polkadot);
        agg.select(Network::Kusama, 6_000);
        assert_eq!(rx.try_recv().unwrap().network, Network::Kusama);
    }
}
