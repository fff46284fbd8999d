use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Sender;
use tracing::{info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};

use crate::pipeline::PipelineEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Socket read timeout; bounds how long shutdown waits on a quiet feed.
const READ_POLL: Duration = Duration::from_millis(200);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connecting to {url}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("reading from feed")]
    Read(#[source] tungstenite::Error),
    #[error("feed closed the connection")]
    Closed,
    #[error("pipeline stopped accepting events")]
    PipelineClosed,
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub url: String,
    pub retry: Duration,
}

/// Single-flight marker: at most one connection attempt holds it.
pub struct ConnectGuard {
    flag: Arc<AtomicBool>,
}

impl ConnectGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: Arc::clone(flag) })
    }
}

impl Drop for ConnectGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the feed worker. Dropping it stops the worker and closes the socket.
pub struct FeedHandle {
    stop: Arc<AtomicBool>,
    connecting: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn spawn_feed(config: FeedConfig, events: Sender<PipelineEvent>, status_tx: Option<Sender<String>>) -> FeedHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let connecting = Arc::new(AtomicBool::new(false));
    let worker = {
        let stop = Arc::clone(&stop);
        let connecting = Arc::clone(&connecting);
        thread::spawn(move || run_feed(config, events, status_tx, stop, connecting))
    };
    FeedHandle { stop, connecting, worker: Some(worker) }
}

fn run_feed(
    config: FeedConfig,
    events: Sender<PipelineEvent>,
    status_tx: Option<Sender<String>>,
    stop: Arc<AtomicBool>,
    connecting: Arc<AtomicBool>,
) {
    let status = |msg: String| {
        if let Some(tx) = &status_tx {
            let _ = tx.send(msg);
        }
    };

    while !stop.load(Ordering::Relaxed) {
        let result = match ConnectGuard::try_acquire(&connecting) {
            Some(guard) => connect(&config.url, guard).and_then(|socket| {
                info!(url = %config.url, "Connected to feed");
                status(format!("Connected: {}", config.url));
                pump(socket, &events, &stop)
            }),
            None => Ok(()),
        };
        match result {
            Ok(()) if stop.load(Ordering::Relaxed) => break,
            Ok(()) => {}
            Err(FeedError::PipelineClosed) => {
                info!("Pipeline gone, stopping feed");
                break;
            }
            Err(e) => {
                warn!(error = %e, source = ?std::error::Error::source(&e), "Feed error");
                status(format!("Feed error: {e}"));
            }
        }
        status(format!("Reconnecting in {}s", config.retry.as_secs_f32()));
        sleep_unless_stopped(config.retry, &stop);
    }
    info!("Feed stopped");
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(s) => s.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(s) => s.sock.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

/// Connects with bounded timeouts; the guard is held until the handshake ends.
fn connect(url: &str, _guard: ConnectGuard) -> Result<Socket, FeedError> {
    let wrap = |source: tungstenite::Error| FeedError::Connect { url: url.to_string(), source };

    let request = url.into_client_request().map_err(wrap)?;
    let uri = request.uri();
    let host = uri.host().unwrap_or_default().trim_start_matches('[').trim_end_matches(']').to_string();
    let port = uri.port_u16().unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let addr = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| wrap(e.into()))?
        .next()
        .ok_or_else(|| wrap(io::Error::new(io::ErrorKind::NotFound, "no address for host").into()))?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|e| wrap(e.into()))?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT)).map_err(|e| wrap(e.into()))?;
    let _ = stream.set_nodelay(true);

    let (socket, _response) = tungstenite::client_tls(request, stream).map_err(|e| match e {
        HandshakeError::Failure(err) => wrap(err),
        HandshakeError::Interrupted(_) => wrap(io::Error::from(io::ErrorKind::TimedOut).into()),
    })?;
    set_read_timeout(&socket, READ_POLL).map_err(|e| wrap(e.into()))?;
    Ok(socket)
}

fn pump(mut socket: Socket, events: &Sender<PipelineEvent>, stop: &AtomicBool) -> Result<(), FeedError> {
    loop {
        if stop.load(Ordering::Relaxed) {
            let _ = socket.close(None);
            let _ = socket.flush();
            return Ok(());
        }
        let payload = match socket.read() {
            Ok(Message::Text(text)) => Bytes::from(text),
            Ok(Message::Binary(data)) => Bytes::from(data),
            Ok(Message::Close(_)) => return Err(FeedError::Closed),
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e)) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Err(FeedError::Closed)
            }
            Err(e) => return Err(FeedError::Read(e)),
        };
        events.send(PipelineEvent::Raw(payload)).map_err(|_| FeedError::PipelineClosed)?;
    }
}
