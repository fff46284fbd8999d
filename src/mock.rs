use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use tungstenite::Message;

use crate::aggregator::now_ms;
use crate::network::{ChainIdentity, Network};
use crate::registry::ChainRegistry;

const UNKNOWN_AUTHORITIES: u64 = u32::MAX as u64;

/// Serves synthetic consumption updates over WebSocket for local runs.
pub struct MockFeed {
    listener: TcpListener,
    chains: Vec<ChainIdentity>,
    relay_ids: Vec<(Network, u32)>,
    interval: Duration,
}

impl MockFeed {
    pub fn bind(
        host: SocketAddr,
        registry: Arc<dyn ChainRegistry>,
        networks: Vec<Network>,
        interval: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(host).with_context(|| format!("Binding mock feed at {host}"))?;
        listener.set_nonblocking(true).context("Setting mock listener non-blocking")?;
        let chains = networks.iter().flat_map(|n| registry.chains(*n).iter().cloned()).collect();
        let relay_ids = networks.iter().map(|n| (*n, registry.relay_id(*n))).collect();
        Ok(Self { listener, chains, relay_ids, interval })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn serve(self, stop: Arc<AtomicBool>) -> Result<()> {
        info!(addr = %self.local_addr()?, chains = self.chains.len(), "Mock feed listening");
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!(%addr, "Mock client connected");
                    let chains = self.chains.clone();
                    let relay_ids = self.relay_ids.clone();
                    let interval = self.interval;
                    let stop = Arc::clone(&stop);
                    thread::spawn(move || {
                        if let Err(e) = stream_updates(stream, chains, relay_ids, interval, stop) {
                            info!(%addr, error = %e, "Mock client gone");
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(50)),
                Err(e) => warn!(?e, "Mock accept failed"),
            }
        }
        info!("Mock feed stopped");
        Ok(())
    }
}

/// Deterministic block contents so runs are comparable.
pub(crate) fn mock_update(chain: &ChainIdentity, block: u64, timestamp: u64, is_relay: bool) -> serde_json::Value {
    let seed = block.wrapping_mul(31).wrapping_add(chain.para_id as u64);
    let extrinsics = 3 + seed % 40;
    let proof_kb = 16 + seed % 256;
    serde_json::json!({
        "para_id": chain.para_id,
        "relay": chain.network.name(),
        "block_number": block,
        "extrinsics_num": extrinsics,
        "authorities_num": if is_relay { 297 } else { UNKNOWN_AUTHORITIES },
        "timestamp": timestamp,
        "block_time_seconds": 6.0,
        "ref_time": { "normal": seed % 1_000_000, "operational": 0, "mandatory": proof_kb * 8 },
        "proof_size": { "normal": proof_kb * 1024, "operational": 0, "mandatory": 0 },
        "total_proof_size": proof_kb * 1024,
    })
}

fn stream_updates(
    stream: TcpStream,
    chains: Vec<ChainIdentity>,
    relay_ids: Vec<(Network, u32)>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut socket = tungstenite::accept(stream).map_err(|e| anyhow!("websocket handshake failed: {e}"))?;

    let mut block: u64 = 1;
    while !stop.load(Ordering::Relaxed) {
        let ts = now_ms();
        for chain in &chains {
            let is_relay = relay_ids.contains(&(chain.network, chain.para_id));
            let msg = mock_update(chain, block, ts, is_relay).to_string();
            socket.send(Message::Text(msg))?;
            // retransmit the previous block now and then
            if block > 1 && block % 7 == 0 {
                let dup = mock_update(chain, block - 1, ts, is_relay).to_string();
                socket.send(Message::Text(dup))?;
            }
        }
        block += 1;
        thread::sleep(interval);
    }
    let _ = socket.close(None);
    let _ = socket.flush();
    Ok(())
}
