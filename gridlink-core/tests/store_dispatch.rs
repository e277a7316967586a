use async_trait::async_trait;
use gridlink_core::{PointListener, PointStore, StoreConfig};
use gridlink_error::GwResult;
use gridlink_models::{AsduType, Point, Value};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_millis(50);

fn test_store() -> Arc<PointStore> {
    PointStore::new(StoreConfig {
        batch_interval: INTERVAL,
        fanout_permits: 24,
    })
}

fn float_point(ioa: u32, value: f32) -> Point {
    Point::new(ioa, 1, AsduType::MMeNc1, Value::Float32(value), 0, true)
}

/// Records every delivery it sees.
struct Recorder {
    invocations: AtomicU64,
    seen: Mutex<Vec<Arc<Point>>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU64::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    fn last_value_for(&self, ioa: u32) -> Option<Value> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.ioa == ioa)
            .map(|p| p.value.clone())
    }
}

#[async_trait]
impl PointListener for Recorder {
    async fn on_point(&self, point: Arc<Point>) -> GwResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(point);
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

/// Always fails; the dispatcher must isolate it.
struct Failing;

#[async_trait]
impl PointListener for Failing {
    async fn on_point(&self, _point: Arc<Point>) -> GwResult<()> {
        Err(gridlink_error::GatewayError::from("deliberate failure"))
    }
}

#[tokio::test]
async fn latest_value_wins_per_ioa() {
    let store = test_store();
    for v in 0..10 {
        store.update(float_point(1001, v as f32));
    }
    let live = store.get(1001).expect("point present");
    assert_eq!(live.value, Value::Float32(9.0));
    assert!(store.get(9999).is_none());
}

#[tokio::test]
async fn zero_ioa_is_rejected() {
    let store = test_store();
    store.update(float_point(0, 1.0));
    assert_eq!(store.stats().point_count, 0);
    assert_eq!(store.stats().total_updates, 0);
}

#[tokio::test]
async fn listener_sees_latest_value_within_two_intervals() {
    let store = test_store();
    store.start().await.unwrap();
    let recorder = Recorder::new();
    store.subscribe(recorder.clone());

    store.update(float_point(1001, 123.45));
    sleep(INTERVAL * 2 + Duration::from_millis(20)).await;

    assert!(recorder.count() >= 1);
    assert_eq!(recorder.last_value_for(1001), Some(Value::Float32(123.45)));
    store.shutdown().await;
}

#[tokio::test]
async fn burst_coalesces_to_single_delivery() {
    let store = test_store();
    store.start().await.unwrap();
    let recorder = Recorder::new();
    store.subscribe(recorder.clone());

    // phase-sync with the dispatcher: once the primer is delivered a tick
    // just fired, leaving a full interval for the burst
    store.update(float_point(9999, 0.0));
    while recorder.count() == 0 {
        sleep(Duration::from_millis(5)).await;
    }

    // burst well inside one batch interval
    for v in 0..1000 {
        store.update(float_point(1001, v as f32));
    }
    sleep(INTERVAL * 4).await;

    assert_eq!(
        recorder.count(),
        2,
        "primer plus exactly one coalesced delivery"
    );
    assert_eq!(recorder.last_value_for(1001), Some(Value::Float32(999.0)));
    assert!(store.stats().coalesced_updates >= 999);
    store.shutdown().await;
}

#[tokio::test]
async fn distinct_ioas_deliver_independently() {
    let store = test_store();
    store.start().await.unwrap();
    let recorder = Recorder::new();
    store.subscribe(recorder.clone());

    store.update(float_point(1001, 1.0));
    store.update(float_point(1002, 2.0));
    store.update(float_point(1003, 3.0));
    sleep(INTERVAL * 3).await;

    assert_eq!(recorder.count(), 3);
    store.shutdown().await;
}

#[tokio::test]
async fn snapshot_holds_only_live_values() {
    let store = test_store();
    store.update(float_point(1001, 10.0));
    store.update(float_point(1002, 20.0));
    store.update(float_point(1001, 11.0));

    let snap = store.snapshot();
    assert_eq!(snap.len(), 2);
    assert_eq!(snap[&1001].value, Value::Float32(11.0));
    assert_eq!(snap[&1002].value, Value::Float32(20.0));

    let mut keys = store.keys();
    keys.sort_unstable();
    assert_eq!(keys, vec![1001, 1002]);
}

#[tokio::test]
async fn failing_listener_does_not_starve_others() {
    let store = test_store();
    store.start().await.unwrap();
    let recorder = Recorder::new();
    store.subscribe(Arc::new(Failing));
    store.subscribe(recorder.clone());

    store.update(float_point(1001, 5.0));
    sleep(INTERVAL * 3).await;
    assert_eq!(recorder.count(), 1);

    // subsequent deliveries keep flowing
    store.update(float_point(1001, 6.0));
    sleep(INTERVAL * 3).await;
    assert_eq!(recorder.count(), 2);
    store.shutdown().await;
}

#[tokio::test]
async fn unsubscribe_is_precise_and_idempotent() {
    let store = test_store();
    store.start().await.unwrap();
    let kept = Recorder::new();
    let dropped = Recorder::new();
    let _keep_id = store.subscribe(kept.clone());
    let drop_id = store.subscribe(dropped.clone());

    store.unsubscribe(drop_id);
    store.unsubscribe(drop_id); // second removal is a no-op

    store.update(float_point(1001, 1.0));
    sleep(INTERVAL * 3).await;

    assert_eq!(kept.count(), 1);
    assert_eq!(dropped.count(), 0);
    assert_eq!(store.stats().listener_count, 1);
    store.shutdown().await;
}

#[tokio::test]
async fn double_start_is_rejected() {
    let store = test_store();
    store.start().await.unwrap();
    assert!(store.start().await.is_err());
    store.shutdown().await;
}

#[tokio::test]
async fn shutdown_drops_pending_and_stops_delivery() {
    let store = test_store();
    store.start().await.unwrap();
    let recorder = Recorder::new();
    store.subscribe(recorder.clone());

    store.shutdown().await;
    assert!(!store.is_running());

    // writes after shutdown still land in the live map but are never
    // dispatched
    store.update(float_point(1001, 1.0));
    sleep(INTERVAL * 3).await;
    assert_eq!(recorder.count(), 0);
    assert_eq!(store.get(1001).unwrap().value, Value::Float32(1.0));
}

#[tokio::test]
async fn stats_reflect_store_contents() {
    let store = test_store();
    for ioa in 1..=100u32 {
        store.update(float_point(ioa, ioa as f32));
    }
    let stats = store.stats();
    assert_eq!(stats.point_count, 100);
    assert_eq!(stats.total_updates, 100);
    assert_eq!(stats.pending_notifications, 100);
    assert_eq!(stats.estimated_memory_kb, 100 * 500 / 1024);
}

#[tokio::test]
async fn write_path_keeps_last_updated_monotonic() {
    let store = test_store();
    store.update(float_point(1001, 1.0));
    let first = store.get(1001).unwrap().last_updated;
    sleep(Duration::from_millis(5)).await;
    store.update(float_point(1001, 2.0));
    let second = store.get(1001).unwrap().last_updated;
    assert!(second >= first);
}
