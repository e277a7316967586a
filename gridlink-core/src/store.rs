use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use gridlink_error::GwResult;
use gridlink_models::{constants, settings, Point};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinHandle,
    time::{interval, sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle returned by [`PointStore::subscribe`]; identifies the listener
/// precisely for removal.
pub type SubscriptionId = u64;

/// Callback seam for components that want every coalesced point update.
///
/// Invocations run on pooled tasks; implementations must not block the
/// runtime and must not mutate the point.
#[async_trait]
pub trait PointListener: Send + Sync {
    async fn on_point(&self, point: Arc<Point>) -> GwResult<()>;

    /// Short name used in dispatch logs.
    fn name(&self) -> &str {
        "listener"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Dispatcher tick; one delivery per changed IOA per tick.
    pub batch_interval: Duration,
    /// Concurrent listener invocations across all points.
    pub fanout_permits: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_millis(constants::STORE_BATCH_INTERVAL_MS),
            fanout_permits: constants::STORE_FANOUT_PERMITS,
        }
    }
}

impl From<&settings::Store> for StoreConfig {
    fn from(s: &settings::Store) -> Self {
        Self {
            batch_interval: Duration::from_millis(s.batch_interval_ms),
            fanout_permits: s.fanout_permits,
        }
    }
}

/// Observational counters. `estimated_memory_kb` is the original crude
/// points-times-500-bytes heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub point_count: usize,
    pub listener_count: usize,
    pub pending_notifications: usize,
    pub total_updates: u64,
    pub coalesced_updates: u64,
    pub estimated_memory_kb: u64,
}

/// Concurrent latest-value cache with coalescing batched fan-out.
///
/// One instance per process, created at startup and shared by `Arc`;
/// adapters write, the 104 server and any diagnostics subscribe. Updates
/// replace the stored value per IOA and queue a pending notification keyed
/// by IOA, so a burst collapses to a single delivery of the newest value on
/// the next dispatcher tick.
pub struct PointStore {
    points: DashMap<u32, Arc<Point>>,
    pending: DashMap<u32, Arc<Point>>,
    listeners: DashMap<SubscriptionId, Arc<dyn PointListener>>,
    next_subscription: AtomicU64,
    total_updates: AtomicU64,
    coalesced_updates: AtomicU64,
    config: StoreConfig,
    fanout: Arc<Semaphore>,
    cancel: CancellationToken,
    running: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    weak: Weak<Self>,
}

impl PointStore {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        info!(
            batch_interval_ms = config.batch_interval.as_millis() as u64,
            fanout_permits = config.fanout_permits,
            "Initializing point store"
        );
        Arc::new_cyclic(|weak| Self {
            points: DashMap::new(),
            pending: DashMap::new(),
            listeners: DashMap::new(),
            next_subscription: AtomicU64::new(1),
            total_updates: AtomicU64::new(0),
            coalesced_updates: AtomicU64::new(0),
            fanout: Arc::new(Semaphore::new(config.fanout_permits)),
            config,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            weak: weak.clone(),
        })
    }

    /// Spawn the dispatcher. Starting twice is an invalid state, not a
    /// silent re-initialization.
    pub async fn start(&self) -> GwResult<()> {
        let mut guard = self.dispatcher.lock().await;
        if guard.is_some() {
            return Err(gridlink_error::GatewayError::InvalidStateError(
                "point store dispatcher already running".to_string(),
            ));
        }
        let store = self.weak.upgrade().ok_or_else(|| {
            gridlink_error::GatewayError::InvalidStateError(
                "point store dropped before start".to_string(),
            )
        })?;
        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move { store.run_dispatcher().await });
        guard.replace(handle);
        info!("Point store dispatcher started");
        Ok(())
    }

    /// Non-blocking write. Replaces the live value at the point's IOA and
    /// queues it for the next dispatch tick, displacing any notification
    /// already pending for that IOA.
    pub fn update(&self, mut point: Point) {
        if point.ioa == 0 {
            warn!("IOA=0, ignoring update");
            return;
        }

        point.last_updated = Utc::now().timestamp_millis();
        let point = Arc::new(point);

        let previous = self.points.insert(point.ioa, Arc::clone(&point));
        self.total_updates.fetch_add(1, Ordering::Relaxed);

        match previous {
            None => debug!(
                ioa = point.ioa,
                value = %point.value,
                total = self.points.len(),
                "New point"
            ),
            Some(prev) if prev.value != point.value => debug!(
                ioa = point.ioa,
                old = %prev.value,
                new = %point.value,
                "Updated point"
            ),
            Some(_) => {}
        }

        if self.pending.insert(point.ioa, point).is_some() {
            // burst on the same IOA within one tick; older notification lost
            self.coalesced_updates.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Latest value for an IOA.
    pub fn get(&self, ioa: u32) -> Option<Arc<Point>> {
        self.points.get(&ioa).map(|e| Arc::clone(e.value()))
    }

    /// Weak snapshot of the live set for interrogation replies: per-key
    /// consistent, concurrent writes may or may not appear.
    pub fn snapshot(&self) -> std::collections::HashMap<u32, Arc<Point>> {
        self.points
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect()
    }

    /// All known IOAs.
    pub fn keys(&self) -> Vec<u32> {
        self.points.iter().map(|e| *e.key()).collect()
    }

    pub fn subscribe(&self, listener: Arc<dyn PointListener>) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        let count = self.listeners.len();
        info!(subscription = id, total = count, "Listener subscribed");
        if count > constants::LISTENER_SOFT_CEILING {
            warn!(total = count, "High listener count, check for leaks");
        }
        id
    }

    /// Idempotent; removing an unknown id only logs.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        match self.listeners.remove(&id) {
            Some(_) => info!(
                subscription = id,
                remaining = self.listeners.len(),
                "Listener removed"
            ),
            None => warn!(subscription = id, "Listener not found"),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            point_count: self.points.len(),
            listener_count: self.listeners.len(),
            pending_notifications: self.pending.len(),
            total_updates: self.total_updates.load(Ordering::Relaxed),
            coalesced_updates: self.coalesced_updates.load(Ordering::Relaxed),
            estimated_memory_kb: (self.points.len() as u64 * 500) / 1024,
        }
    }

    /// Stop the dispatcher, bounded: join within the shutdown timeout or
    /// abort, then drain the fan-out pool within the same bound. Pending
    /// notifications still queued are dropped and counted.
    pub async fn shutdown(&self) {
        info!("Shutting down point store");
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let deadline = Duration::from_secs(constants::SHUTDOWN_TIMEOUT_SECS);

        if let Some(handle) = self.dispatcher.lock().await.take() {
            let mut handle = handle;
            tokio::select! {
                _ = &mut handle => {}
                _ = sleep(deadline) => {
                    warn!("Forcing dispatcher stop");
                    handle.abort();
                }
            }
        }

        // wait for in-flight listener invocations to release their permits
        let permits = self.config.fanout_permits as u32;
        match timeout(deadline, self.fanout.acquire_many(permits)).await {
            Ok(Ok(drained)) => drop(drained),
            _ => warn!("Forcing fan-out pool shutdown"),
        }

        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            warn!(dropped, "Dropped pending notifications at shutdown");
        }
        info!("Point store shutdown complete");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_dispatcher(self: Arc<Self>) {
        info!("Notification dispatcher started");
        let mut tick = interval(self.config.batch_interval);
        // the first tick completes immediately; skip it so an update never
        // sees a shorter-than-interval first batch window
        tick.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {
                    if self.pending.is_empty() {
                        continue;
                    }
                    self.dispatch_batch().await;
                }
            }
        }
        info!("Notification dispatcher stopped");
    }

    /// Drain the pending map and fan each unique point out to every
    /// listener. The keys removed here are exactly the keys delivered;
    /// writes racing the drain land in the map for the next tick.
    async fn dispatch_batch(&self) {
        let keys: Vec<u32> = self.pending.iter().map(|e| *e.key()).collect();
        let mut batch = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, point)) = self.pending.remove(&key) {
                batch.push(point);
            }
        }

        // copy-on-write view: iteration is stable against concurrent
        // subscribe/unsubscribe, and no map guard is held across awaits
        let listeners: Vec<Arc<dyn PointListener>> = self
            .listeners
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        for point in batch {
            for listener in &listeners {
                let listener = Arc::clone(listener);
                let point = Arc::clone(&point);
                let permit = match Arc::clone(&self.fanout).acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return, // semaphore closed, shutting down
                };
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = listener.on_point(Arc::clone(&point)).await {
                        error!(
                            ioa = point.ioa,
                            listener = listener.name(),
                            error = %e,
                            "Listener error"
                        );
                    }
                });
            }
        }
    }
}
