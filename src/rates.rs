use serde::Serialize;

use crate::config::Conversion;
use crate::recorder::BlockRecord;
use crate::window::WindowSums;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Rates {
    pub tps: f64,
    pub mbps: f64,
    pub mgas: f64,
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

impl Rates {
    pub const ZERO: Rates = Rates { tps: 0.0, mbps: 0.0, mgas: 0.0 };

    fn compute(extrinsics: f64, proof_size: f64, elapsed_ms: f64, conv: &Conversion) -> Rates {
        if elapsed_ms <= 0.0 || !elapsed_ms.is_finite() {
            return Rates::ZERO;
        }
        let tps = finite_or_zero(extrinsics * 1000.0 / elapsed_ms);
        let mbps = finite_or_zero(proof_size / conv.proof_units_per_mb * 1000.0 / elapsed_ms);
        let mgas = finite_or_zero(mbps * conv.megagas_per_mb());
        Rates { tps, mbps, mgas }
    }

    /// Rates over a trailing window; insufficient data gives all zeros.
    pub fn from_window(sums: Option<WindowSums>, conv: &Conversion) -> Rates {
        match sums {
            Some(s) => Self::compute(s.sum_extrinsics as f64, s.sum_proof_size, s.elapsed_ms as f64, conv),
            None => Rates::ZERO,
        }
    }

    /// Rates of a single block spread over its own block time.
    pub fn for_block(record: &BlockRecord, system_extrinsic_offset: u64, conv: &Conversion) -> Rates {
        let extrinsics = record.extrinsics.saturating_sub(system_extrinsic_offset) as f64;
        Self::compute(extrinsics, record.proof_size, record.block_time_secs * 1000.0, conv)
    }
}
