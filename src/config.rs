/// Fixed unit conversions used by the rate calculator.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    /// Proof units (bytes) in one megabyte.
    pub proof_units_per_mb: f64,
    /// Proof budget of one block, in MB.
    pub block_proof_budget_mb: f64,
    /// Gas equivalent of a full block proof budget.
    pub gas_per_proof_budget: f64,
    pub gas_per_megagas: f64,
    megagas_per_mb: f64,
}

impl Conversion {
    pub fn new(
        proof_units_per_mb: f64,
        block_proof_budget_mb: f64,
        gas_per_proof_budget: f64,
        gas_per_megagas: f64,
    ) -> Self {
        let megagas_per_mb = gas_per_proof_budget / block_proof_budget_mb / gas_per_megagas;
        Self { proof_units_per_mb, block_proof_budget_mb, gas_per_proof_budget, gas_per_megagas, megagas_per_mb }
    }

    pub fn megagas_per_mb(&self) -> f64 {
        self.megagas_per_mb
    }
}

impl Default for Conversion {
    fn default() -> Self {
        // 60M gas per 5MB proof budget
        Self::new(1024.0 * 1024.0, 5.0, 60_000_000.0, 1_000_000.0)
    }
}

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    pub window_ms: u64,
    pub max_blocks_store: usize,
    pub alpha: f64,
    /// Non-user extrinsics included in every block (timestamp, inherents).
    pub system_extrinsic_offset: u64,
    pub default_block_time_secs: f64,
    /// `authorities_num` value the feed uses for "unknown".
    pub unknown_authorities_sentinel: u64,
    pub conversion: Conversion,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_blocks_store: 1_024,
            alpha: 0.3,
            system_extrinsic_offset: 2,
            default_block_time_secs: 6.0,
            unknown_authorities_sentinel: u32::MAX as u64,
            conversion: Conversion::default(),
        }
    }
}

/// clap value parser for smoothing factors in `(0, 1]`.
pub fn parse_alpha(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if v > 0.0 && v <= 1.0 {
        Ok(v)
    } else {
        Err(format!("alpha must be in (0, 1], got {v}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gas_factor_is_twelve_megagas_per_mb() {
        let c = Conversion::default();
        assert!((c.megagas_per_mb() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn alpha_bounds() {
        assert_eq!(parse_alpha("1").unwrap(), 1.0);
        assert_eq!(parse_alpha("0.3").unwrap(), 0.3);
        assert!(parse_alpha("0").is_err());
        assert!(parse_alpha("1.5").is_err());
        assert!(parse_alpha("abc").is_err());
    }
}
