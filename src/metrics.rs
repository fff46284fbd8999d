use crate::network::Network;
use crate::rates::Rates;

pub struct Ema {
    alpha: f64,
    value: f64,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: 0.0 }
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        self.value = self.alpha * raw + (1.0 - self.alpha) * self.value;
        self.value
    }

    pub fn reset(&mut self, raw: f64) {
        self.value = raw;
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Smoothed tps/mbps/mgas for the network currently selected. State never
/// blends values computed under two different selections.
pub struct Smoother {
    scope: Network,
    tps: Ema,
    mbps: Ema,
    mgas: Ema,
}

impl Smoother {
    pub fn new(alpha: f64, scope: Network) -> Self {
        Self { scope, tps: Ema::new(alpha), mbps: Ema::new(alpha), mgas: Ema::new(alpha) }
    }

    pub fn scope(&self) -> Network {
        self.scope
    }

    pub fn update(&mut self, scope: Network, raw: Rates) -> Rates {
        if scope != self.scope {
            self.scope = scope;
            self.tps.reset(raw.tps);
            self.mbps.reset(raw.mbps);
            self.mgas.reset(raw.mgas);
        } else {
            self.tps.update(raw.tps);
            self.mbps.update(raw.mbps);
            self.mgas.update(raw.mgas);
        }
        self.current()
    }

    pub fn current(&self) -> Rates {
        Rates { tps: self.tps.value(), mbps: self.mbps.value(), mgas: self.mgas.value() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(v: f64) -> Rates {
        Rates { tps: v, mbps: v / 10.0, mgas: v * 2.0 }
    }

    #[test]
    fn ewma_carries_state_between_updates() {
        let mut ema = Ema::new(0.3);
        ema.update(10.0);
        let v = ema.update(20.0);
        assert!((v - 8.1).abs() < 1e-12);
    }

    #[test]
    fn alpha_one_tracks_raw_value() {
        let mut ema = Ema::new(1.0);
        ema.update(10.0);
        assert_eq!(ema.update(3.0), 3.0);
    }

    #[test]
    fn smoother_damps_within_scope() {
        let mut s = Smoother::new(0.3, Network::Polkadot);
        let r1 = s.update(Network::Polkadot, rates(100.0));
        let r2 = s.update(Network::Polkadot, rates(0.0));
        assert!(r1.tps > r2.tps);
        assert!(r2.tps > 0.0);
    }

    #[test]
    fn selection_change_resets_to_raw() {
        let mut s = Smoother::new(0.3, Network::Polkadot);
        s.update(Network::Polkadot, rates(100.0));
        s.update(Network::Polkadot, rates(100.0));
        let switched = s.update(Network::Kusama, rates(7.0));
        assert_eq!(switched, rates(7.0));
        assert_eq!(s.scope(), Network::Kusama);

        let next = s.update(Network::Kusama, rates(17.0));
        assert!((next.tps - (0.3 * 17.0 + 0.7 * 7.0)).abs() < 1e-12);
    }
}
