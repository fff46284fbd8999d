use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Top-level relay network a chain belongs to.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Polkadot,
    Kusama,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Polkadot, Network::Kusama];

    pub fn name(self) -> &'static str {
        match self {
            Network::Polkadot => "Polkadot",
            Network::Kusama => "Kusama",
        }
    }

    pub fn toggle(self) -> Network {
        match self {
            Network::Polkadot => Network::Kusama,
            Network::Kusama => Network::Polkadot,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown network {0:?}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polkadot" => Ok(Network::Polkadot),
            "kusama" => Ok(Network::Kusama),
            _ => Err(UnknownNetwork(s.to_string())),
        }
    }
}

/// Identifies one chain's data stream: (network, numeric chain id).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub network: Network,
    pub para_id: u32,
}

impl ChainKey {
    pub fn new(network: Network, para_id: u32) -> Self {
        Self { network, para_id }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.para_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainIdentity {
    pub network: Network,
    pub name: String,
    pub para_id: u32,
}

impl ChainIdentity {
    pub fn key(&self) -> ChainKey {
        ChainKey::new(self.network, self.para_id)
    }
}
