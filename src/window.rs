use crate::recorder::BlockRecord;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WindowSums {
    pub sum_extrinsics: u64,
    pub sum_proof_size: f64,
    pub elapsed_ms: u64,
}

/// Reduces the records inside `[now - window_ms, now]` to sums and the time
/// they span. Returns `None` when there is not enough data for a rate: fewer
/// than two records, or no positive time between the first and last.
pub fn window_sums(
    buffer: &[BlockRecord],
    now_ms: u64,
    window_ms: u64,
    system_extrinsic_offset: u64,
) -> Option<WindowSums> {
    let start = now_ms.saturating_sub(window_ms);
    let mut in_window: Vec<&BlockRecord> =
        buffer.iter().filter(|r| r.timestamp >= start && r.timestamp <= now_ms).collect();
    if in_window.len() < 2 {
        return None;
    }
    // arrival order is not timestamp order across chains
    in_window.sort_by_key(|r| r.timestamp);

    let first = in_window.first()?.timestamp;
    let last = in_window.last()?.timestamp;
    let elapsed_ms = last.checked_sub(first).filter(|e| *e > 0)?;

    let sum_extrinsics = in_window
        .iter()
        .map(|r| r.extrinsics.saturating_sub(system_extrinsic_offset))
        .fold(0u64, u64::saturating_add);
    let sum_proof_size = in_window.iter().map(|r| r.proof_size).sum();
    Some(WindowSums { sum_extrinsics, sum_proof_size, elapsed_ms })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ChainKey, Network};

    fn rec(para_id: u32, block: u64, ts: u64, extrinsics: u64, proof: f64) -> BlockRecord {
        BlockRecord {
            key: ChainKey::new(Network::Polkadot, para_id),
            block_number: block,
            timestamp: ts,
            extrinsics,
            proof_size: proof,
            block_time_secs: 6.0,
            authorities: None,
        }
    }

    #[test]
    fn fewer_than_two_records_is_insufficient() {
        assert_eq!(window_sums(&[], 10_000, 60_000, 2), None);
        assert_eq!(window_sums(&[rec(0, 1, 9_000, 10, 1.0)], 10_000, 60_000, 2), None);
    }

    #[test]
    fn sums_two_blocks_one_second_apart() {
        let buf = [rec(0, 1, 5_000, 10, 100.0), rec(0, 2, 6_000, 20, 50.0)];
        let sums = window_sums(&buf, 6_000, 60_000, 2).unwrap();
        assert_eq!(sums, WindowSums { sum_extrinsics: 26, sum_proof_size: 150.0, elapsed_ms: 1_000 });
    }

    #[test]
    fn offset_never_goes_negative() {
        let buf = [rec(0, 1, 5_000, 1, 0.0), rec(0, 2, 6_000, 0, 0.0)];
        assert_eq!(window_sums(&buf, 6_000, 60_000, 2).unwrap().sum_extrinsics, 0);
    }

    #[test]
    fn huge_extrinsic_counts_saturate() {
        let buf = [rec(0, 1, 5_000, u64::MAX / 2 + 10, 0.0), rec(0, 2, 6_000, u64::MAX / 2 + 10, 0.0)];
        assert_eq!(window_sums(&buf, 6_000, 60_000, 2).unwrap().sum_extrinsics, u64::MAX);
    }

    #[test]
    fn ignores_records_outside_window() {
        let buf = [
            rec(0, 1, 1_000, 500, 9.0),
            rec(0, 2, 50_000, 10, 1.0),
            rec(2000, 7, 55_000, 12, 1.0),
            rec(2000, 8, 70_000, 900, 9.0),
        ];
        let sums = window_sums(&buf, 60_000, 20_000, 2).unwrap();
        assert_eq!(sums.sum_extrinsics, 8 + 10);
        assert_eq!(sums.elapsed_ms, 5_000);
    }

    #[test]
    fn sorts_out_of_order_arrivals() {
        let buf = [rec(2000, 3, 9_000, 4, 0.0), rec(0, 1, 3_000, 4, 0.0), rec(1000, 2, 6_000, 4, 0.0)];
        assert_eq!(window_sums(&buf, 10_000, 60_000, 2).unwrap().elapsed_ms, 6_000);
    }

    #[test]
    fn simultaneous_timestamps_are_insufficient() {
        let buf = [rec(0, 1, 5_000, 10, 1.0), rec(2000, 1, 5_000, 20, 1.0)];
        assert_eq!(window_sums(&buf, 6_000, 60_000, 2), None);
    }
}
