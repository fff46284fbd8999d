use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::ingest::ConsumptionUpdate;
use crate::network::{ChainKey, Network};
use crate::registry::ChainRegistry;

/// One accepted block. Never mutated after creation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BlockRecord {
    pub key: ChainKey,
    pub block_number: u64,
    pub timestamp: u64,
    pub extrinsics: u64,
    pub proof_size: f64,
    pub block_time_secs: f64,
    pub authorities: Option<u32>,
}

impl From<&ConsumptionUpdate> for BlockRecord {
    fn from(u: &ConsumptionUpdate) -> Self {
        Self {
            key: u.key(),
            block_number: u.block_number,
            timestamp: u.timestamp,
            extrinsics: u.extrinsics,
            proof_size: u.proof_size_total,
            block_time_secs: u.block_time_secs,
            authorities: u.authorities,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChainRecords {
    pub latest: BlockRecord,
    pub previous: Option<BlockRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Block number not above the last accepted one for the chain-key.
    Stale { last: u64 },
    UnknownChain,
}

/// Read side of the recorder. Buffers are swapped wholesale, so a reader sees
/// either the previous or the next buffer, never a partial one.
pub struct RecordBook {
    buffers: HashMap<Network, ArcSwap<Vec<BlockRecord>>>,
    chains: DashMap<ChainKey, ChainRecords>,
}

impl RecordBook {
    fn new() -> Self {
        let buffers = Network::ALL.iter().map(|n| (*n, ArcSwap::from_pointee(Vec::new()))).collect();
        Self { buffers, chains: DashMap::new() }
    }

    pub fn buffer(&self, network: Network) -> Arc<Vec<BlockRecord>> {
        self.buffers.get(&network).map(|b| b.load_full()).unwrap_or_default()
    }

    pub fn chain(&self, key: &ChainKey) -> Option<ChainRecords> {
        self.chains.get(key).map(|e| *e.value())
    }
}

/// Sole writer of the per-network rolling buffers.
pub struct Recorder {
    max_blocks: usize,
    registry: Arc<dyn ChainRegistry>,
    last_block: HashMap<ChainKey, u64>,
    book: Arc<RecordBook>,
}

impl Recorder {
    pub fn new(max_blocks: usize, registry: Arc<dyn ChainRegistry>) -> Self {
        Self { max_blocks: max_blocks.max(1), registry, last_block: HashMap::new(), book: Arc::new(RecordBook::new()) }
    }

    pub fn book(&self) -> Arc<RecordBook> {
        Arc::clone(&self.book)
    }

    pub fn last_block(&self, key: &ChainKey) -> Option<u64> {
        self.last_block.get(key).copied()
    }

    pub fn accept(&mut self, update: &ConsumptionUpdate) -> Result<BlockRecord, Rejection> {
        let key = update.key();
        if self.registry.lookup(key.network, key.para_id).is_none() {
            return Err(Rejection::UnknownChain);
        }
        if let Some(&last) = self.last_block.get(&key) {
            if update.block_number <= last {
                return Err(Rejection::Stale { last });
            }
        }
        self.last_block.insert(key, update.block_number);

        let record = BlockRecord::from(update);
        if let Some(slot) = self.book.buffers.get(&key.network) {
            let current = slot.load();
            let skip = (current.len() + 1).saturating_sub(self.max_blocks);
            let mut next = Vec::with_capacity(current.len() + 1 - skip);
            next.extend(current.iter().skip(skip).copied());
            next.push(record);
            slot.store(Arc::new(next));
        }

        let previous = self.book.chain(&key).map(|c| c.latest);
        self.book.chains.insert(key, ChainRecords { latest: record, previous });
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ingest::{decode, tests::{message, opts}};
    use crate::registry::StaticRegistry;
    use proptest::prelude::*;

    pub(crate) fn update(network: Network, para_id: u32, block: u64, ts: u64, extrinsics: u64) -> ConsumptionUpdate {
        decode(&message(network.name(), para_id, block, ts, extrinsics, 1024.0), &opts()).unwrap()
    }

    fn recorder(max: usize) -> Recorder {
        Recorder::new(max, Arc::new(StaticRegistry::default()))
    }

    #[test]
    fn accepts_increasing_and_rejects_stale() {
        let mut rec = recorder(16);
        let key = ChainKey::new(Network::Polkadot, 2000);
        assert!(rec.accept(&update(Network::Polkadot, 2000, 5, 1_000, 3)).is_ok());
        assert_eq!(rec.accept(&update(Network::Polkadot, 2000, 5, 2_000, 3)), Err(Rejection::Stale { last: 5 }));
        assert_eq!(rec.accept(&update(Network::Polkadot, 2000, 4, 2_000, 3)), Err(Rejection::Stale { last: 5 }));
        assert_eq!(rec.last_block(&key), Some(5));
        assert_eq!(rec.book().buffer(Network::Polkadot).len(), 1);
    }

    #[test]
    fn chain_keys_are_independent_across_networks() {
        let mut rec = recorder(16);
        rec.accept(&update(Network::Polkadot, 1000, 9, 1_000, 3)).unwrap();
        rec.accept(&update(Network::Kusama, 1000, 1, 1_000, 3)).unwrap();
        assert_eq!(rec.book().buffer(Network::Polkadot).len(), 1);
        assert_eq!(rec.book().buffer(Network::Kusama).len(), 1);
    }

    #[test]
    fn rejects_chains_outside_registry() {
        let mut rec = recorder(16);
        assert_eq!(rec.accept(&update(Network::Kusama, 4242, 1, 1_000, 3)), Err(Rejection::UnknownChain));
        assert!(rec.book().buffer(Network::Kusama).is_empty());
    }

    #[test]
    fn evicts_oldest_first() {
        let mut rec = recorder(3);
        for b in 1..=5 {
            rec.accept(&update(Network::Kusama, 0, b, b * 1_000, 3)).unwrap();
        }
        let blocks: Vec<u64> = rec.book().buffer(Network::Kusama).iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![3, 4, 5]);
    }

    #[test]
    fn readers_keep_their_buffer_snapshot() {
        let mut rec = recorder(4);
        rec.accept(&update(Network::Kusama, 0, 1, 1_000, 3)).unwrap();
        let before = rec.book().buffer(Network::Kusama);
        rec.accept(&update(Network::Kusama, 0, 2, 2_000, 3)).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(rec.book().buffer(Network::Kusama).len(), 2);
    }

    #[test]
    fn tracks_latest_and_previous_record() {
        let mut rec = recorder(4);
        let key = ChainKey::new(Network::Kusama, 1000);
        rec.accept(&update(Network::Kusama, 1000, 1, 1_000, 3)).unwrap();
        rec.accept(&update(Network::Kusama, 1000, 2, 7_000, 4)).unwrap();
        let _ = rec.accept(&update(Network::Kusama, 1000, 2, 8_000, 9));
        let chain = rec.book().chain(&key).unwrap();
        assert_eq!(chain.latest.block_number, 2);
        assert_eq!(chain.latest.extrinsics, 4);
        assert_eq!(chain.previous.unwrap().block_number, 1);
    }

    proptest! {
        #[test]
        fn buffer_length_is_bounded(n in 1usize..300, max in 1usize..64) {
            let mut rec = recorder(max);
            for b in 0..n as u64 {
                rec.accept(&update(Network::Polkadot, 2000, b, b * 6_000, 3)).unwrap();
            }
            prop_assert_eq!(rec.book().buffer(Network::Polkadot).len(), n.min(max));
        }

        #[test]
        fn accepted_block_numbers_strictly_increase(blocks in proptest::collection::vec(0u64..50, 1..80)) {
            let mut rec = recorder(1_000);
            for (i, b) in blocks.iter().enumerate() {
                let _ = rec.accept(&update(Network::Polkadot, 2000, *b, i as u64 * 1_000, 3));
            }
            let buf = rec.book().buffer(Network::Polkadot);
            prop_assert!(buf.windows(2).all(|w| w[0].block_number < w[1].block_number));
        }
    }
}
