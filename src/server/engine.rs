//! The serving engine: listener setup, the accept loop, the pending-
//! connection queue, pre-spawned worker tasks, the dedicated 503 responder
//! and the idle sweeper.
//!
//! Accepted sockets are paired with a slot token and queued; workers pop,
//! validate the token against the pool (the sweeper may have expired it in
//! the meantime) and drive the connection. When the slot table is full the
//! socket goes straight to the 503 responder instead.

use crate::{
    errors::{StartupError, AT_CAPACITY_RESPONSE},
    server::{
        connection::drive,
        pool::{ConnectionPool, ResponsePool, SlotToken},
    },
    AppState,
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// How long an idle worker sleeps before polling the queue again.
const WORKER_POLL: Duration = Duration::from_millis(1);
/// Cadence of the idle-connection sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Budget for delivering the canned 503 to a rejected connection.
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

struct PendingConn {
    stream: TcpStream,
    peer: SocketAddr,
    token: SlotToken,
    accepted: Instant,
}

type PendingQueue = Arc<SegQueue<PendingConn>>;
type RejectQueue = Arc<SegQueue<TcpStream>>;

/// Binds the configured address and serves until the task is dropped.
pub async fn serve(state: Arc<AppState>) -> Result<(), StartupError> {
    let listener = bind_listener(&state.config)?;
    run(state, listener).await
}

/// Serves on an already-bound listener. Split from [`serve`] so tests can
/// use an ephemeral port.
pub async fn run(state: Arc<AppState>, listener: TcpListener) -> Result<(), StartupError> {
    state.metrics.spawn(state.probe.clone());
    state.networking.spawn(state.probe.clone());

    let pool = Arc::new(ConnectionPool::new(state.config.max_conns));
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, workers = state.config.threads, slots = pool.capacity(), "listening");
    }
    let responses = Arc::new(ResponsePool::new());
    let pending: PendingQueue = Arc::new(SegQueue::new());
    let rejected: RejectQueue = Arc::new(SegQueue::new());

    for worker_id in 0..state.config.threads {
        tokio::spawn(worker(
            worker_id,
            state.clone(),
            pool.clone(),
            responses.clone(),
            pending.clone(),
        ));
    }
    tokio::spawn(capacity_responder(rejected.clone()));
    tokio::spawn(sweeper(pool.clone(), state.config.conn_timeout));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        match pool.acquire() {
            Some(token) => pending.push(PendingConn {
                stream,
                peer,
                token,
                accepted: Instant::now(),
            }),
            None => {
                debug!(%peer, occupied = pool.occupied(), "slot table full, rejecting");
                rejected.push(stream);
            }
        }
    }
}

/// Listener with address reuse and non-blocking mode, handed to tokio.
fn bind_listener(config: &crate::config::Config) -> Result<TcpListener, StartupError> {
    let addr_text = config.listen_addr();
    let addr: SocketAddr = addr_text.parse().map_err(|_| StartupError::Bind {
        addr: addr_text.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "unparseable address"),
    })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(StartupError::Listener)?;
    socket
        .set_reuse_address(true)
        .map_err(StartupError::Listener)?;
    socket.bind(&addr.into()).map_err(|source| StartupError::Bind {
        addr: addr_text,
        source,
    })?;
    socket.listen(1024).map_err(StartupError::Listener)?;
    socket.set_nonblocking(true).map_err(StartupError::Listener)?;

    TcpListener::from_std(socket.into()).map_err(StartupError::Listener)
}

async fn worker(
    worker_id: usize,
    state: Arc<AppState>,
    pool: Arc<ConnectionPool>,
    responses: Arc<ResponsePool>,
    pending: PendingQueue,
) {
    debug!(worker_id, "worker up");
    loop {
        let Some(conn) = pending.pop() else {
            tokio::time::sleep(WORKER_POLL).await;
            continue;
        };

        let PendingConn {
            mut stream,
            peer,
            token,
            accepted,
        } = conn;

        // Stale-token defense: the sweeper may have expired this slot
        // while the connection sat in the queue.
        if !pool.validate(token) {
            debug!(%peer, "dropping connection with stale slot token");
            continue;
        }

        drive(&state, &responses, &mut stream, peer, accepted).await;
        let _ = stream.shutdown().await;
        pool.release(token);
    }
}

/// Delivers the canned 503 to connections refused at accept time.
async fn capacity_responder(rejected: RejectQueue) {
    loop {
        let Some(mut stream) = rejected.pop() else {
            tokio::time::sleep(WORKER_POLL).await;
            continue;
        };

        let write = stream.write_all(AT_CAPACITY_RESPONSE);
        if tokio::time::timeout(REJECT_WRITE_TIMEOUT, write).await.is_err() {
            debug!("503 delivery timed out");
        }
        let _ = stream.shutdown().await;
    }
}

/// Force-releases slots older than the connection timeout. Workers holding
/// a swept slot notice the stale token on release and never touch the next
/// occupant.
async fn sweeper(pool: Arc<ConnectionPool>, conn_timeout: Duration) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        let swept = pool.sweep_older_than(conn_timeout);
        if swept > 0 {
            debug!(swept, "expired idle connections");
        }
    }
}
