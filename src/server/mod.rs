//! Data server lifecycle
//!
//! Owns the embedded KV, runs the trackers and serves the signed proxy
//! endpoint. `ready` resolves after the first fully successful tracker
//! cycle so the miner never starts against an empty store; `stop` drains
//! in-flight requests, cancels the trackers and flushes the KV.

pub mod proxy;

pub use proxy::ProxyHandler;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::tracker::{self, TrackerRunner};

/// The data server: KV owner, tracker host, proxy endpoint
pub struct DataServerOps {
    store: Arc<Store>,
    handler: Arc<ProxyHandler>,
    listen_host: String,
    listen_port: u16,
    runner: Mutex<Option<TrackerRunner>>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    ready_rx: watch::Receiver<bool>,
    ready_tx: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DataServerOps {
    /// Assemble the server from configuration
    pub fn new(cfg: &Config, store: Arc<Store>, chain: Arc<dyn Chain>) -> Result<Self> {
        let whitelist = cfg.whitelist()?;
        let address = cfg.address()?;
        let handler = Arc::new(ProxyHandler::new(store.clone(), whitelist));
        let trackers = tracker::enabled_trackers(cfg, store.clone(), chain, address);
        let runner = TrackerRunner::new(trackers, cfg.trackers.sleep_cycle.get());
        let (ready_tx, ready_rx) = watch::channel(false);
        Ok(Self {
            store,
            handler,
            listen_host: cfg.data_server.listen_host.clone(),
            listen_port: cfg.data_server.listen_port,
            runner: Mutex::new(Some(runner)),
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            ready_rx,
            ready_tx,
            local_addr: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Bind the endpoint and start the tracker loop
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::invalid_state("data server already running"));
        }
        let bind = format!("{}:{}", self.listen_host, self.listen_port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| Error::network(format!("binding data server to {bind}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| Error::network(format!("reading bound address: {e}")))?;
        *self.local_addr.lock() = Some(local);
        info!(%local, "data server listening");

        let app = Router::new()
            .route("/", post(handle_request))
            .with_state(self.handler.clone());
        let serve_cancel = self.cancel.clone();
        let serve = tokio::spawn(async move {
            let graceful = axum::serve(listener, app)
                .with_graceful_shutdown(serve_cancel.cancelled_owned());
            if let Err(err) = graceful.await {
                warn!(%err, "data server endpoint stopped with error");
            }
        });

        let runner = self
            .runner
            .lock()
            .take()
            .ok_or_else(|| Error::invalid_state("tracker runner already consumed"))?;
        let tracker_cancel = self.cancel.clone();
        let ready_tx = self.ready_tx.clone();
        let trackers = tokio::spawn(async move {
            runner.run(tracker_cancel, ready_tx).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.push(serve);
        tasks.push(trackers);
        Ok(())
    }

    /// Wait until the first successful tracker cycle has populated the KV
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Graceful shutdown; safe to call more than once
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        futures::future::join_all(tasks).await;
        if let Err(err) = self.store.flush() {
            warn!(%err, "flushing KV store on shutdown");
        }
        if self.running.swap(false, Ordering::SeqCst) {
            info!("data server stopped");
        }
    }

    /// Whether the server currently holds its listener and trackers
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the endpoint actually bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

/// POST / with an octet-stream body; every outcome is a 200 with an encoded
/// response payload
async fn handle_request(
    State(handler): State<Arc<ProxyHandler>>,
    body: Bytes,
) -> impl IntoResponse {
    let out = handler.handle(&body);
    ([(header::CONTENT_TYPE, "application/octet-stream")], out)
}
