use crate::{
    connection::{CloseCallback, ConnectionHandler},
    protocol::link::LinkConfig,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use gridlink_core::{gateway::Component, PointListener, PointStore, SubscriptionId};
use gridlink_error::{GatewayError, GwResult};
use gridlink_models::{constants, settings, Point};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};
use tokio::{net::TcpSocket, select, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_ip: String,
    pub port: u16,
    pub max_connections: usize,
    pub listen_backlog: u32,
    pub link: LinkConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: constants::IEC104_BIND_IP.to_string(),
            port: constants::IEC104_PORT,
            max_connections: constants::IEC104_MAX_CONNECTIONS,
            listen_backlog: constants::IEC104_LISTEN_BACKLOG,
            link: LinkConfig::default(),
        }
    }
}

impl From<&settings::Server> for ServerConfig {
    fn from(s: &settings::Server) -> Self {
        Self {
            bind_ip: s.bind_ip.clone(),
            port: s.port,
            max_connections: s.max_connections,
            listen_backlog: s.listen_backlog,
            link: LinkConfig::default(),
        }
    }
}

/// The 104 server: accepts SCADA clients, caps admissions, serves
/// interrogations through per-connection handlers and broadcasts store
/// updates spontaneously.
pub struct Iec104Server {
    config: ServerConfig,
    store: Arc<PointStore>,
    handlers: DashMap<u64, Arc<ConnectionHandler>>,
    next_handler_id: AtomicU64,
    subscription: Mutex<Option<SubscriptionId>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    cancel: CancellationToken,
    weak: Weak<Self>,

    // rejection rate limiting
    rejected_since_log: AtomicU64,
    last_rejection_log_ms: AtomicI64,

    // broadcast counters
    broadcast_sent: AtomicU64,
    handlers_removed: AtomicU64,
}

impl Iec104Server {
    pub fn new(config: ServerConfig, store: Arc<PointStore>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            store,
            handlers: DashMap::new(),
            next_handler_id: AtomicU64::new(1),
            subscription: Mutex::new(None),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
            cancel: CancellationToken::new(),
            weak: weak.clone(),
            rejected_since_log: AtomicU64::new(0),
            last_rejection_log_ms: AtomicI64::new(0),
            broadcast_sent: AtomicU64::new(0),
            handlers_removed: AtomicU64::new(0),
        })
    }

    /// Bind, start accepting, and subscribe for spontaneous broadcast.
    /// A bind failure is fatal and propagates to the caller.
    pub async fn activate(&self) -> GwResult<()> {
        let this = self.weak.upgrade().ok_or_else(|| {
            GatewayError::InvalidStateError("server dropped before activation".to_string())
        })?;

        let addr: SocketAddr = format!("{}:{}", self.config.bind_ip, self.config.port)
            .parse()
            .map_err(|e| {
                GatewayError::InitializationError(format!(
                    "invalid bind address {}:{}: {e}",
                    self.config.bind_ip, self.config.port
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.config.listen_backlog)?;
        let bound = listener.local_addr()?;
        self.local_addr.lock().unwrap().replace(bound);

        info!(addr = %bound, backlog = self.config.listen_backlog, "IEC 104 server listening");

        let server = Arc::clone(&this);
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => server.handle_new_connection(stream, peer),
                            Err(e) => warn!(error = %e, "Connection attempt failed"),
                        }
                    }
                }
            }
            info!("IEC 104 server stopped listening");
        });
        self.accept_task.lock().unwrap().replace(task);

        // register for spontaneous updates
        let listener_ref: Arc<dyn PointListener> = this as Arc<dyn PointListener>;
        let id = self.store.subscribe(listener_ref);
        self.subscription.lock().unwrap().replace(id);
        info!("Registered for spontaneous data updates");

        Ok(())
    }

    /// Unsubscribe, close every client and stop the accept loop.
    pub async fn deactivate(&self) {
        info!("Deactivating IEC 104 server");

        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.store.unsubscribe(id);
        }

        // snapshot first: close() re-enters the handler map via the close
        // callback, which must not run under the iteration lock
        let handlers: Vec<Arc<ConnectionHandler>> = self
            .handlers
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        info!(count = handlers.len(), "Closing active connections");
        self.handlers.clear();
        for handler in handlers {
            handler.close();
        }

        self.cancel.cancel();
        let task = self.accept_task.lock().unwrap().take();
        if let Some(handle) = task {
            let mut handle = handle;
            select! {
                _ = &mut handle => {}
                _ = sleep(Duration::from_secs(constants::SHUTDOWN_TIMEOUT_SECS)) => {
                    warn!("Forcing accept loop stop");
                    handle.abort();
                }
            }
        }

        info!("IEC 104 server deactivated");
    }

    pub fn connection_count(&self) -> usize {
        self.handlers.len()
    }

    /// Address the listener actually bound to; useful when the configured
    /// port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    pub fn broadcast_sent(&self) -> u64 {
        self.broadcast_sent.load(Ordering::Relaxed)
    }

    pub fn handlers_removed(&self) -> u64 {
        self.handlers_removed.load(Ordering::Relaxed)
    }

    fn handle_new_connection(&self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        debug!(%peer, "New client connection");

        if self.handlers.len() >= self.config.max_connections {
            self.log_rejection(peer);
            drop(stream);
            return;
        }

        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let weak = self.weak.clone();
        let on_close: CloseCallback = Arc::new(move |handler_id| {
            if let Some(server) = weak.upgrade() {
                server.on_connection_closed(handler_id);
            }
        });

        let handler = ConnectionHandler::new(
            id,
            peer,
            Arc::clone(&self.store),
            self.config.link,
            on_close,
        );
        self.handlers.insert(id, Arc::clone(&handler));

        info!(%peer, total = self.handlers.len(), "Client connected");
        tokio::spawn(handler.run(stream));
    }

    /// At most one WARN per rate-limit window, carrying the rejections
    /// accumulated since the last one and the latest peer.
    fn log_rejection(&self, peer: SocketAddr) {
        self.rejected_since_log.fetch_add(1, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis();
        let last = self.last_rejection_log_ms.load(Ordering::Relaxed);
        if now - last > constants::REJECTION_LOG_INTERVAL_MS
            && self
                .last_rejection_log_ms
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            let rejected = self.rejected_since_log.swap(0, Ordering::Relaxed);
            warn!(
                max = self.config.max_connections,
                rejected,
                latest = %peer,
                "Max connections reached, rejecting"
            );
        }
    }

    fn on_connection_closed(&self, handler_id: u64) {
        if let Some((_, handler)) = self.handlers.remove(&handler_id) {
            info!(
                client = handler.client_id(),
                remaining = self.handlers.len(),
                "Client disconnected"
            );
        }
    }
}

#[async_trait]
impl PointListener for Iec104Server {
    /// Spontaneous broadcast: one traversal, dead handlers marked in-line
    /// and removed in a single sweep afterwards.
    async fn on_point(&self, point: Arc<Point>) -> GwResult<()> {
        if self.handlers.is_empty() {
            info!(ioa = point.ioa, "No active connections, skipping update");
            return Ok(());
        }

        debug!(ioa = point.ioa, value = %point.value, "Broadcasting spontaneous update");

        let mut dead: Vec<u64> = Vec::new();
        let mut success = 0u64;

        for entry in self.handlers.iter() {
            let handler = entry.value();
            if !handler.is_active() {
                dead.push(handler.id());
                continue;
            }
            match handler.send_spontaneous(&point) {
                Ok(()) => success += 1,
                Err(e) => {
                    warn!(
                        client = handler.client_id(),
                        error = %e,
                        "Send failed, marking for removal"
                    );
                    dead.push(handler.id());
                }
            }
        }

        if !dead.is_empty() {
            for id in &dead {
                if let Some((_, handler)) = self.handlers.remove(id) {
                    handler.close();
                }
            }
            self.handlers_removed
                .fetch_add(dead.len() as u64, Ordering::Relaxed);
            info!(
                removed = dead.len(),
                remaining = self.handlers.len(),
                "Removed dead connections"
            );
        }

        self.broadcast_sent.fetch_add(success, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "iec104-server"
    }
}

#[async_trait]
impl Component for Iec104Server {
    fn name(&self) -> &str {
        "iec104-server"
    }

    async fn start(&self) -> GwResult<()> {
        self.activate().await
    }

    async fn stop(&self) -> GwResult<()> {
        self.deactivate().await;
        Ok(())
    }
}
