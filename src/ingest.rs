use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;

use crate::config::AggregatorConfig;
use crate::network::{ChainKey, Network, UnknownNetwork};
use crate::registry::ChainRegistry;

/// One validated feed message.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumptionUpdate {
    pub para_id: u32,
    pub network: Network,
    pub block_number: u64,
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub extrinsics: u64,
    /// Mandatory-class consumption reported under `ref_time.mandatory`.
    pub proof_size_mandatory: f64,
    pub proof_size_total: f64,
    /// Always positive; the configured default replaces missing or bogus values.
    pub block_time_secs: f64,
    /// `None` when the feed reports the count as unknown.
    pub authorities: Option<u32>,
}

impl ConsumptionUpdate {
    pub fn key(&self) -> ChainKey {
        ChainKey::new(self.network, self.para_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error(transparent)]
    Network(#[from] UnknownNetwork),
    #[error("field `{field}` is out of range")]
    Invalid { field: &'static str },
}

#[derive(Deserialize)]
struct WireUpdate {
    para_id: Option<u32>,
    relay: Option<String>,
    block_number: Option<u64>,
    extrinsics_num: Option<u64>,
    authorities_num: Option<u64>,
    timestamp: Option<u64>,
    block_time_seconds: Option<f64>,
    #[serde(default)]
    ref_time: Option<WireRefTime>,
    total_proof_size: Option<f64>,
}

#[derive(Deserialize)]
struct WireRefTime {
    mandatory: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub unknown_authorities_sentinel: u64,
    pub default_block_time_secs: f64,
}

impl From<&AggregatorConfig> for DecodeOptions {
    fn from(cfg: &AggregatorConfig) -> Self {
        Self {
            unknown_authorities_sentinel: cfg.unknown_authorities_sentinel,
            default_block_time_secs: cfg.default_block_time_secs,
        }
    }
}

fn proof_units(field: &'static str, v: f64) -> Result<f64, DecodeError> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(DecodeError::Invalid { field })
    }
}

/// Validates a raw feed message. Unvalidated fields never leave this function.
pub fn decode(raw: &[u8], opts: &DecodeOptions) -> Result<ConsumptionUpdate, DecodeError> {
    let wire: WireUpdate = serde_json::from_slice(raw)?;

    let network: Network = wire.relay.ok_or(DecodeError::Missing("relay"))?.parse()?;
    let proof_size_total =
        proof_units("total_proof_size", wire.total_proof_size.ok_or(DecodeError::Missing("total_proof_size"))?)?;
    let proof_size_mandatory = match wire.ref_time.and_then(|r| r.mandatory) {
        Some(v) => proof_units("ref_time.mandatory", v)?,
        None => 0.0,
    };
    let block_time_secs = wire
        .block_time_seconds
        .filter(|t| t.is_finite() && *t > 0.0)
        .unwrap_or(opts.default_block_time_secs);
    let authorities = match wire.authorities_num {
        Some(n) if n == opts.unknown_authorities_sentinel => None,
        Some(n) => Some(u32::try_from(n).map_err(|_| DecodeError::Invalid { field: "authorities_num" })?),
        None => None,
    };

    Ok(ConsumptionUpdate {
        para_id: wire.para_id.ok_or(DecodeError::Missing("para_id"))?,
        network,
        block_number: wire.block_number.ok_or(DecodeError::Missing("block_number"))?,
        timestamp: wire.timestamp.ok_or(DecodeError::Missing("timestamp"))?,
        extrinsics: wire.extrinsics_num.ok_or(DecodeError::Missing("extrinsics_num"))?,
        proof_size_mandatory,
        proof_size_total,
        block_time_secs,
        authorities,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct LatestUpdate {
    pub current: ConsumptionUpdate,
    pub previous: Option<ConsumptionUpdate>,
}

/// Decodes feed messages and keeps the last two decoded updates per chain-key.
/// Only chains known to the registry are cached, so the cache stays bounded.
#[derive(Clone)]
pub struct Ingestor {
    opts: DecodeOptions,
    registry: Arc<dyn ChainRegistry>,
    latest: Arc<DashMap<ChainKey, LatestUpdate>>,
}

impl Ingestor {
    pub fn new(opts: DecodeOptions, registry: Arc<dyn ChainRegistry>) -> Self {
        Self { opts, registry, latest: Arc::new(DashMap::new()) }
    }

    pub fn ingest(&self, raw: &[u8]) -> Result<ConsumptionUpdate, DecodeError> {
        let update = decode(raw, &self.opts)?;
        let key = update.key();
        if self.registry.lookup(key.network, key.para_id).is_none() {
            return Ok(update);
        }
        let previous = self.latest.get(&key).map(|e| e.current.clone());
        self.latest.insert(key, LatestUpdate { current: update.clone(), previous });
        Ok(update)
    }

    pub fn latest(&self, key: &ChainKey) -> Option<LatestUpdate> {
        self.latest.get(key).map(|e| e.value().clone())
    }
}
