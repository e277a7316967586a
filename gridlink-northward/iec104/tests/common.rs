#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use gridlink_core::{PointStore, StoreConfig};
use gridlink_iec104::{
    protocol::{
        codec::Codec,
        frame::{
            apci::{new_iframe, new_uframe, ApciKind, U_STARTDT_ACTIVE, U_STARTDT_CONFIRM},
            asdu::Asdu,
        },
        link::{LinkConfig, SessionState},
    },
    Iec104Server, ServerConfig,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub const TEST_BATCH_INTERVAL: Duration = Duration::from_millis(50);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Store + server on an ephemeral port, dispatcher running.
pub async fn start_test_server(max_connections: usize) -> (Arc<PointStore>, Arc<Iec104Server>, SocketAddr) {
    let store = PointStore::new(StoreConfig {
        batch_interval: TEST_BATCH_INTERVAL,
        fanout_permits: 24,
    });
    store.start().await.expect("store start");

    let server = Iec104Server::new(
        ServerConfig {
            bind_ip: "127.0.0.1".into(),
            port: 0,
            max_connections,
            listen_backlog: 10,
            link: LinkConfig::default(),
        },
        Arc::clone(&store),
    );
    server.activate().await.expect("server activate");
    let addr = server.local_addr().expect("bound address");
    (store, server, addr)
}

/// Minimal 104 master for driving the server in tests.
pub struct TestClient {
    framed: Framed<TcpStream, Codec>,
    send_sn: u16,
    rcv_sn: u16,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        stream.set_nodelay(true).ok();
        Self {
            framed: Framed::new(stream, Codec),
            send_sn: 0,
            rcv_sn: 0,
        }
    }

    /// STARTDT activation handshake.
    pub async fn start_dt(&mut self) {
        self.framed
            .send(new_uframe(U_STARTDT_ACTIVE))
            .await
            .expect("send STARTDT");
        let deadline = Duration::from_secs(2);
        let confirmed = tokio::time::timeout(deadline, async {
            while let Some(Ok(apdu)) = self.framed.next().await {
                if let ApciKind::U(u) = apdu.apci.into() {
                    if u.function == U_STARTDT_CONFIRM {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(confirmed, "no STARTDT confirm");
    }

    pub async fn send_asdu(&mut self, asdu: Asdu) {
        let apdu = new_iframe(asdu, self.send_sn, self.rcv_sn);
        self.framed.send(apdu).await.expect("send i-frame");
        self.send_sn = SessionState::seq_add(self.send_sn, 1);
    }

    /// Next I-frame ASDU, skipping U and S frames. `None` on timeout or
    /// connection close.
    pub async fn next_asdu(&mut self, deadline: Duration) -> Option<Asdu> {
        tokio::time::timeout(deadline, async {
            loop {
                match self.framed.next().await {
                    Some(Ok(apdu)) => {
                        if let ApciKind::I(_) = apdu.apci.into() {
                            self.rcv_sn = SessionState::seq_add(self.rcv_sn, 1);
                            if let Some(asdu) = apdu.asdu {
                                return Some(asdu);
                            }
                        }
                    }
                    _ => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Collect I-frame ASDUs until `count` arrive or the deadline passes.
    pub async fn collect_asdus(&mut self, count: usize, deadline: Duration) -> Vec<Asdu> {
        let mut out = Vec::with_capacity(count);
        let start = tokio::time::Instant::now();
        while out.len() < count {
            let remaining = deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            match self.next_asdu(remaining).await {
                Some(asdu) => out.push(asdu),
                None => break,
            }
        }
        out
    }

    /// True when the server closed the connection (EOF) within `deadline`.
    pub async fn closed_by_server(mut self, deadline: Duration) -> bool {
        matches!(
            tokio::time::timeout(deadline, async {
                loop {
                    match self.framed.next().await {
                        Some(Ok(_)) => continue,
                        _ => return true,
                    }
                }
            })
            .await,
            Ok(true)
        )
    }
}
