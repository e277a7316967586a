use crate::{
    builder::build_asdu,
    protocol::{
        codec::Codec,
        error::{Error, Result},
        frame::{
            apci::{
                new_iframe, new_sframe, new_uframe, ApciKind, U_STARTDT_ACTIVE, U_STARTDT_CONFIRM,
                U_STOPDT_ACTIVE, U_STOPDT_CONFIRM, U_TESTFR_ACTIVE, U_TESTFR_CONFIRM,
            },
            asdu::{Asdu, Cause, TypeID},
        },
        link::{ApplicationState, ApplicationStateCell, LinkConfig, SessionState},
    },
};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use gridlink_core::PointStore;
use gridlink_models::Point;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpStream, select, sync::mpsc, time::interval};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, error, info, warn};

/// Callback the server installs to drop a closed handler from its active
/// set.
pub type CloseCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// One accepted SCADA client connection.
///
/// Owns the link session exclusively: the I/O loop below is the only place
/// that touches the socket, and everything else talks to it through the
/// outbound queue. The `active` flag gates spontaneous sends and makes
/// `close` idempotent.
pub struct ConnectionHandler {
    id: u64,
    client_id: String,
    peer: SocketAddr,
    store: Arc<PointStore>,
    config: LinkConfig,
    active: ApplicationStateCell,
    sender: ArcSwapOption<mpsc::Sender<Asdu>>,
    cancel: CancellationToken,
    on_close: CloseCallback,
    close_fired: AtomicBool,
}

impl ConnectionHandler {
    pub fn new(
        id: u64,
        peer: SocketAddr,
        store: Arc<PointStore>,
        config: LinkConfig,
        on_close: CloseCallback,
    ) -> Arc<Self> {
        let client_id = format!("client-{peer}");
        info!(client = %client_id, "Connection handler created");
        Arc::new(Self {
            id,
            client_id,
            peer,
            store,
            config,
            active: ApplicationStateCell::new(ApplicationState::Active),
            sender: ArcSwapOption::from(None),
            cancel: CancellationToken::new(),
            on_close,
            close_fired: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    /// Queue a spontaneous update for this client. Dropped silently when
    /// the handler is no longer active.
    pub fn send_spontaneous(&self, point: &Point) -> Result<()> {
        if !self.active.is_active() {
            return Ok(());
        }

        let asdu = build_asdu(point, Cause::Spontaneous)?;
        match self.sender.load_full() {
            Some(sender) => match sender.try_send(asdu) {
                Ok(()) => {
                    debug!(client = %self.client_id, ioa = point.ioa, "Queued spontaneous");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Full(_)) => Err(Error::ErrSendQueueFull),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::ErrUseClosedConnection),
            },
            None => Err(Error::ErrUseClosedConnection),
        }
    }

    /// Idempotent close: flip the active flag, stop the I/O loop, fire the
    /// close callback once.
    pub fn close(&self) {
        if !self.active.is_active() {
            return;
        }
        info!(client = %self.client_id, "Closing connection");
        self.active.store(ApplicationState::Inactive);
        self.cancel.cancel();
        self.fire_close();
    }

    fn fire_close(&self) {
        if !self.close_fired.swap(true, Ordering::SeqCst) {
            (self.on_close)(self.id);
        }
    }

    /// Drive the link until the peer disconnects or the handler is closed.
    pub async fn run(self: Arc<Self>, stream: TcpStream) {
        if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay) {
            warn!(client = %self.client_id, error = %e, "set TCP_NODELAY failed");
        }
        let mut framed = Framed::new(stream, Codec);
        let (tx, mut rx) = mpsc::channel::<Asdu>(self.config.send_queue_capacity);
        self.sender.store(Some(Arc::new(tx)));

        let mut state = SessionState::new(Utc::now());
        let mut tick = interval(Duration::from_millis(100));

        loop {
            select! {
                _ = self.cancel.cancelled() => break,

                _ = tick.tick() => {
                    let now = Utc::now();
                    // t3: idle test frame
                    if now.signed_duration_since(state.idle_since).num_milliseconds() as u64
                        >= self.config.t3_ms
                    {
                        if let Err(e) = framed.send(new_uframe(U_TESTFR_ACTIVE)).await {
                            warn!(client = %self.client_id, error = %e, "send TESTFR failed");
                            break;
                        }
                        state.idle_since = now;
                    }
                    // t2/w: aggregated receive acknowledge
                    if state.should_send_s_ack(now, self.config.t2_ms, self.config.w_threshold) {
                        if let Err(e) = framed.send(new_sframe(state.rcv_sn)).await {
                            warn!(client = %self.client_id, error = %e, "send S-ACK failed");
                            break;
                        }
                        state.mark_s_ack_sent();
                    }
                }

                // gateway -> client
                maybe_asdu = rx.recv() => {
                    match maybe_asdu {
                        Some(asdu) => {
                            if let Err(e) = Self::send_iframe(&mut framed, &mut state, asdu).await {
                                warn!(client = %self.client_id, error = %e, "send i-frame failed");
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // client -> gateway
                maybe_apdu = framed.next() => {
                    match maybe_apdu {
                        Some(Ok(apdu)) => {
                            state.idle_since = Utc::now();
                            match apdu.apci.into() {
                                ApciKind::I(iapci) => {
                                    if !state.update_send_ack(iapci.rcv_sn)
                                        || !state.advance_receive_seq(iapci.send_sn)
                                    {
                                        error!(client = %self.client_id, "invalid ack or seq");
                                        break;
                                    }
                                    state.mark_unacked_receive(Utc::now());

                                    if let Some(asdu) = apdu.asdu {
                                        if let Err(e) =
                                            self.handle_command(&mut framed, &mut state, asdu).await
                                        {
                                            warn!(client = %self.client_id, error = %e, "command reply failed");
                                            break;
                                        }
                                    }
                                }
                                ApciKind::U(uapci) => {
                                    if let Err(e) =
                                        self.handle_uframe(&mut framed, uapci.function).await
                                    {
                                        warn!(client = %self.client_id, error = %e, "u-frame reply failed");
                                        break;
                                    }
                                }
                                ApciKind::S(sapci) => {
                                    if !state.update_send_ack(sapci.rcv_sn) {
                                        error!(client = %self.client_id, "invalid s-ack");
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(client = %self.client_id, error = %e, "frame decode failed");
                            break;
                        }
                        None => {
                            info!(client = %self.client_id, "Connection closed by peer");
                            break;
                        }
                    }
                }
            }
        }

        self.active.store(ApplicationState::Inactive);
        self.sender.store(None);
        let _ = framed.close().await;
        self.fire_close();
        info!(client = %self.client_id, "Connection handler stopped");
    }

    async fn send_iframe(
        framed: &mut Framed<TcpStream, Codec>,
        state: &mut SessionState,
        asdu: Asdu,
    ) -> Result<()> {
        let apdu = new_iframe(asdu, state.send_sn, state.rcv_sn);
        framed.send(apdu).await?;
        // an I-frame implicitly acknowledges everything received so far
        state.ack_rcvsn = state.rcv_sn;
        state.send_sn = SessionState::seq_add(state.send_sn, 1);
        Ok(())
    }

    async fn handle_uframe(
        &self,
        framed: &mut Framed<TcpStream, Codec>,
        function: u8,
    ) -> Result<()> {
        match function {
            U_STARTDT_ACTIVE => {
                framed.send(new_uframe(U_STARTDT_CONFIRM)).await?;
                info!(client = %self.client_id, "Data transfer started");
            }
            U_STOPDT_ACTIVE => {
                framed.send(new_uframe(U_STOPDT_CONFIRM)).await?;
                // observational; spontaneous sends are not gated on it
                debug!(client = %self.client_id, "Data transfer stopped");
            }
            U_TESTFR_ACTIVE => {
                framed.send(new_uframe(U_TESTFR_CONFIRM)).await?;
            }
            U_TESTFR_CONFIRM | U_STARTDT_CONFIRM | U_STOPDT_CONFIRM => {}
            other => debug!(client = %self.client_id, function = other, "Unhandled U function"),
        }
        Ok(())
    }

    /// Dispatch on the ASDU type of the client's command.
    async fn handle_command(
        &self,
        framed: &mut Framed<TcpStream, Codec>,
        state: &mut SessionState,
        asdu: Asdu,
    ) -> Result<()> {
        debug!(client = %self.client_id, type_id = ?asdu.identifier.type_id, "Received ASDU");

        match asdu.identifier.type_id {
            TypeID::C_IC_NA_1 => {
                info!(client = %self.client_id, "General interrogation");
                Self::send_iframe(framed, state, asdu.mirror(Cause::ActivationCon)).await?;
                self.send_all_points(framed, state).await?;
                Self::send_iframe(framed, state, asdu.mirror(Cause::ActivationTerm)).await?;
            }
            TypeID::C_CI_NA_1 => {
                // replies with the full snapshot, same as GI: this gateway
                // emits no integrated totals, so a type filter would always
                // produce an empty response
                info!(client = %self.client_id, "Counter interrogation");
                Self::send_iframe(framed, state, asdu.mirror(Cause::ActivationCon)).await?;
                self.send_all_points(framed, state).await?;
                Self::send_iframe(framed, state, asdu.mirror(Cause::ActivationTerm)).await?;
            }
            TypeID::C_CS_NA_1 => {
                // confirm only; the gateway clock is not adjusted
                debug!(client = %self.client_id, "Clock synchronization");
                Self::send_iframe(framed, state, asdu.mirror(Cause::ActivationCon)).await?;
            }
            other => {
                warn!(client = %self.client_id, type_id = ?other, "Unsupported ASDU type");
                Self::send_iframe(framed, state, asdu.mirror(Cause::UnknownTypeID)).await?;
            }
        }
        Ok(())
    }

    /// One data ASDU per stored point, COT = interrogated-by-station. The
    /// qualifier of interrogation is not honoured: every point is returned
    /// whatever group the client asked for.
    async fn send_all_points(
        &self,
        framed: &mut Framed<TcpStream, Codec>,
        state: &mut SessionState,
    ) -> Result<()> {
        let snapshot = self.store.snapshot();
        info!(client = %self.client_id, count = snapshot.len(), "Sending data points");

        let mut sent = 0usize;
        for point in snapshot.values() {
            match build_asdu(point, Cause::InterrogatedByStation) {
                Ok(data) => {
                    Self::send_iframe(framed, state, data).await?;
                    sent += 1;
                }
                Err(e) => {
                    error!(client = %self.client_id, ioa = point.ioa, error = %e, "Skipping point");
                }
            }
        }

        info!(client = %self.client_id, sent, "Interrogation data complete");
        Ok(())
    }
}
