use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use relaypulse::aggregator::{Aggregator, MetricsHandle};
use relaypulse::feed::spawn_feed;
use relaypulse::mock::MockFeed;
use relaypulse::network::Network;
use relaypulse::pipeline::{spawn_pipeline, PipelineEvent};
use relaypulse::registry::{ChainRegistry, StaticRegistry};
use tracing::{info, warn};

use crate::cli::{Mock, Watch};
use crate::ui::dashboard::run_dashboard;

/// Queue between the feed and the pipeline; the feed blocks when it is full.
const EVENT_QUEUE: usize = 4_096;

pub(crate) fn load_registry(path: Option<&std::path::Path>) -> Result<Arc<dyn ChainRegistry>> {
    let registry: Arc<dyn ChainRegistry> = match path {
        Some(p) => Arc::new(StaticRegistry::load(p).with_context(|| format!("Loading chain registry {}", p.display()))?),
        None => Arc::new(StaticRegistry::default()),
    };
    Ok(registry)
}

fn stop_on_ctrlc() -> Arc<AtomicBool> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }
    stop_flag
}

pub fn run_watch(watch: Watch) -> Result<()> {
    let registry = load_registry(watch.registry.as_deref())?;
    let stop_flag = stop_on_ctrlc();
    info!(url = %watch.url, network = %watch.network, window_ms = watch.window_ms, "Starting relaypulse");

    let aggregator = Aggregator::new(watch.aggregator_config(), registry, watch.network);
    let handle = aggregator.handle();

    let (events_tx, events_rx) = channel::bounded::<PipelineEvent>(EVENT_QUEUE);
    let (status_tx, status_rx) = channel::unbounded::<String>();
    // status lines only matter while the dashboard is drawing them
    let status_for_workers = (!watch.headless).then(|| status_tx.clone());
    drop(status_tx);

    let pipeline = spawn_pipeline(aggregator, events_rx, status_for_workers.clone());
    let mut feed = spawn_feed(watch.feed_config(), events_tx.clone(), status_for_workers);

    let ui_result = if watch.headless {
        report_throughput(&handle, &stop_flag, Duration::from_secs(watch.report_secs.max(1)));
        Ok(())
    } else {
        run_dashboard(handle, events_tx.clone(), status_rx, stop_flag.clone(), watch.network)
    };

    info!("Shutting down");
    stop_flag.store(true, Ordering::Relaxed);
    feed.shutdown();
    if events_tx.send(PipelineEvent::Shutdown).is_err() {
        warn!("Pipeline already stopped");
    }
    if pipeline.join().is_err() {
        warn!("Pipeline thread panicked");
    }
    ui_result
}

/// Logs the pushed snapshot at most once per `every`.
fn report_throughput(handle: &MetricsHandle, stop: &AtomicBool, every: Duration) {
    let mut updates = handle.subscribe(64);
    let mut latest = handle.snapshot();
    let mut last_report = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        match updates.recv_timeout(Duration::from_millis(200)) {
            Ok(snap) => latest = snap,
            Err(channel::RecvTimeoutError::Timeout) => {}
            // dropped for lagging behind; pick up again from the current snapshot
            Err(channel::RecvTimeoutError::Disconnected) => {
                updates = handle.subscribe(64);
                latest = handle.snapshot();
            }
        }
        if last_report.elapsed() >= every {
            let ratios = latest.ratios();
            info!(
                network = %latest.network,
                tps = format_args!("{:.2}", latest.aggregate.tps),
                mbps = format_args!("{:.3}", latest.aggregate.mbps),
                mgas = format_args!("{:.2}", latest.aggregate.mgas),
                tps_ratio = %ratios.tps,
                mgas_ratio = %ratios.mgas,
                mbps_ratio = %ratios.mbps,
                "Throughput"
            );
            last_report = Instant::now();
        }
    }
}

pub fn run_mock(mock: Mock) -> Result<()> {
    let registry = load_registry(mock.registry.as_deref())?;
    let networks = match mock.network {
        Some(n) => vec![n],
        None => Network::ALL.to_vec(),
    };
    let stop_flag = stop_on_ctrlc();
    let feed = MockFeed::bind(mock.host, registry, networks, Duration::from_millis(mock.interval_ms.max(1)))?;
    feed.serve(stop_flag)
}
