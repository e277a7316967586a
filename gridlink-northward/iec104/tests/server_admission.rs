mod common;

use common::{init_tracing, start_test_server, TestClient};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn connections_beyond_cap_are_closed_immediately() {
    init_tracing();
    let (store, server, addr) = start_test_server(2).await;

    let mut a = TestClient::connect(addr).await;
    a.start_dt().await;
    let mut b = TestClient::connect(addr).await;
    b.start_dt().await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 2);

    // a burst of further attempts must never become active
    let mut rejected = Vec::new();
    for _ in 0..50 {
        rejected.push(TestClient::connect(addr).await);
        assert!(server.connection_count() <= 2);
    }
    for client in rejected {
        assert!(
            client.closed_by_server(Duration::from_secs(2)).await,
            "rejected connection must be closed by the server"
        );
    }

    assert_eq!(server.connection_count(), 2, "cap held throughout");

    server.deactivate().await;
    store.shutdown().await;
}

#[tokio::test]
async fn slot_freed_by_disconnect_can_be_reused() {
    init_tracing();
    let (store, server, addr) = start_test_server(1).await;

    let first = TestClient::connect(addr).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 1);
    drop(first);

    // wait for the handler to notice the close
    for _ in 0..40 {
        if server.connection_count() == 0 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(server.connection_count(), 0);

    let mut second = TestClient::connect(addr).await;
    second.start_dt().await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 1);

    server.deactivate().await;
    store.shutdown().await;
}
