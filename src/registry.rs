use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::network::{ChainIdentity, Network};

/// Numeric id every network uses for its own relay chain.
pub const RELAY_PARA_ID: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("reading registry file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing registry json")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate para_id {para_id} in {network}")]
    Duplicate { network: Network, para_id: u32 },
    #[error("no chains listed for {0}")]
    Empty(Network),
}

/// Read-only name <-> id lookups for the chains shown per network.
pub trait ChainRegistry: Send + Sync {
    fn lookup(&self, network: Network, para_id: u32) -> Option<&ChainIdentity>;
    fn chains(&self, network: Network) -> &[ChainIdentity];

    fn relay_id(&self, _network: Network) -> u32 {
        RELAY_PARA_ID
    }
}

pub struct StaticRegistry {
    chains: HashMap<Network, Vec<ChainIdentity>>,
}

const POLKADOT_CHAINS: &[(&str, u32)] = &[
    ("Polkadot", RELAY_PARA_ID),
    ("AssetHub", 1000),
    ("Collectives", 1001),
    ("BridgeHub", 1002),
    ("People", 1004),
    ("Coretime", 1005),
    ("Acala", 2000),
    ("Moonbeam", 2004),
    ("Astar", 2006),
    ("Bifrost", 2030),
    ("Centrifuge", 2031),
    ("Hydration", 2034),
    ("Phala", 2035),
    ("Mythos", 3369),
];

const KUSAMA_CHAINS: &[(&str, u32)] = &[
    ("Kusama", RELAY_PARA_ID),
    ("AssetHub", 1000),
    ("BridgeHub", 1002),
    ("People", 1004),
    ("Coretime", 1005),
    ("Karura", 2000),
    ("Bifrost", 2001),
    ("Moonriver", 2023),
    ("Shiden", 2007),
    ("Basilisk", 2090),
];

impl Default for StaticRegistry {
    fn default() -> Self {
        let mut chains = HashMap::new();
        for (network, list) in [(Network::Polkadot, POLKADOT_CHAINS), (Network::Kusama, KUSAMA_CHAINS)] {
            let ids = list
                .iter()
                .map(|(name, para_id)| ChainIdentity { network, name: (*name).to_string(), para_id: *para_id })
                .collect();
            chains.insert(network, ids);
        }
        Self { chains }
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    polkadot: Vec<RegistryEntry>,
    #[serde(default)]
    kusama: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct RegistryEntry {
    name: String,
    para_id: u32,
}

impl StaticRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| RegistryError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        let mut chains = HashMap::new();
        for (network, entries) in [(Network::Polkadot, file.polkadot), (Network::Kusama, file.kusama)] {
            if entries.is_empty() {
                return Err(RegistryError::Empty(network));
            }
            let mut seen = HashSet::new();
            let mut ids = Vec::with_capacity(entries.len() + 1);
            for entry in entries {
                if !seen.insert(entry.para_id) {
                    return Err(RegistryError::Duplicate { network, para_id: entry.para_id });
                }
                ids.push(ChainIdentity { network, name: entry.name, para_id: entry.para_id });
            }
            if !seen.contains(&RELAY_PARA_ID) {
                ids.insert(0, ChainIdentity { network, name: network.name().to_string(), para_id: RELAY_PARA_ID });
            }
            chains.insert(network, ids);
        }
        Ok(Self { chains })
    }
}

impl ChainRegistry for StaticRegistry {
    fn lookup(&self, network: Network, para_id: u32) -> Option<&ChainIdentity> {
        self.chains.get(&network)?.iter().find(|c| c.para_id == para_id)
    }

    fn chains(&self, network: Network) -> &[ChainIdentity] {
        self.chains.get(&network).map(Vec::as_slice).unwrap_or(&[])
    }
}
