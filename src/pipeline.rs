use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info};

use crate::aggregator::{now_ms, Aggregator};
use crate::network::Network;

/// Upper bound on messages folded into one recompute.
const MAX_BATCH: usize = 512;

#[derive(Clone, Debug)]
pub enum PipelineEvent {
    Raw(Bytes),
    Select(Network),
    Shutdown,
}

/// Runs the aggregator on its own thread. Every event is fully processed
/// before the next one; the thread is the only writer of engine state.
pub fn spawn_pipeline(
    aggregator: Aggregator,
    events: Receiver<PipelineEvent>,
    status_tx: Option<Sender<String>>,
) -> JoinHandle<()> {
    thread::spawn(move || run_pipeline(aggregator, events, status_tx, now_ms))
}

pub(crate) fn run_pipeline(
    mut aggregator: Aggregator,
    events: Receiver<PipelineEvent>,
    status_tx: Option<Sender<String>>,
    clock: fn() -> u64,
) {
    info!(network = %aggregator.selected(), "Pipeline started");
    let mut batch: Vec<Bytes> = Vec::with_capacity(MAX_BATCH);
    'outer: while let Ok(first) = events.recv() {
        let mut next = Some(first);
        while let Some(event) = next.take() {
            match event {
                PipelineEvent::Raw(raw) => batch.push(raw),
                PipelineEvent::Select(network) => {
                    flush(&mut aggregator, &mut batch, clock());
                    let snap = aggregator.select(network, clock());
                    if let Some(tx) = &status_tx {
                        let _ = tx.send(format!("Selected {}", snap.network));
                    }
                }
                PipelineEvent::Shutdown => {
                    flush(&mut aggregator, &mut batch, clock());
                    break 'outer;
                }
            }
            if batch.len() >= MAX_BATCH {
                break;
            }
            next = match events.try_recv() {
                Ok(e) => Some(e),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
            };
        }
        flush(&mut aggregator, &mut batch, clock());
    }
    aggregator.dispose();
    info!("Pipeline stopped");
}

fn flush(aggregator: &mut Aggregator, batch: &mut Vec<Bytes>, now_ms: u64) {
    if batch.is_empty() {
        return;
    }
    let published = aggregator.update(batch.iter().map(|b| &b[..]), now_ms);
    debug!(messages = batch.len(), published, "Batch processed");
    batch.clear();
}
