//! Link-transport state for accepted connections: sequence counters,
//! acknowledge bookkeeping and the active-state cell. The server role
//! tracks only what it needs — w/t2 S-ack aggregation and t3 idle test
//! frames; master-side k-window enforcement and t1 retransmission are not
//! part of this transport.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};

/// Link-layer tuning for an accepted connection.
///
/// - t2: acknowledge aggregation timeout for S-frames
/// - t3: idle test frame interval
/// - w: acknowledge aggregation threshold (number of I-frames)
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    pub t2_ms: u64,
    pub t3_ms: u64,
    pub w_threshold: u16,
    pub send_queue_capacity: usize,
    pub tcp_nodelay: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            t2_ms: 10_000,
            t3_ms: 20_000,
            w_threshold: 8,
            send_queue_capacity: 1024,
            tcp_nodelay: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    Inactive = 0,
    Active = 1,
}

/// Lock-free per-connection active flag. Flipped once on close and read on
/// every spontaneous send.
#[derive(Debug)]
pub struct ApplicationStateCell(AtomicU8);

impl ApplicationStateCell {
    pub fn new(initial: ApplicationState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn load(&self) -> ApplicationState {
        match self.0.load(Ordering::Relaxed) {
            1 => ApplicationState::Active,
            _ => ApplicationState::Inactive,
        }
    }

    pub fn store(&self, state: ApplicationState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        matches!(self.load(), ApplicationState::Active)
    }
}

/// Sequence counters and timers for one accepted link.
///
/// The server side needs far less than a master: it tracks its own send
/// sequence, the peer's, and when an aggregated S-ack is due.
#[derive(Debug)]
pub struct SessionState {
    pub send_sn: u16,
    pub ack_sendsn: u16,
    pub rcv_sn: u16,
    pub ack_rcvsn: u16,

    pub idle_since: DateTime<Utc>,
    pub unacked_rcv_since: DateTime<Utc>,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            send_sn: 0,
            ack_sendsn: 0,
            rcv_sn: 0,
            ack_rcvsn: 0,
            idle_since: now,
            unacked_rcv_since: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// Update send acknowledge given the remote ack in an incoming I/S
    /// frame. Returns false when the ack falls outside the valid window.
    pub fn update_send_ack(&mut self, ack_rcv_no: u16) -> bool {
        if !Self::seq_in_range_inclusive(self.ack_sendsn, self.send_sn, ack_rcv_no) {
            return false;
        }
        self.ack_sendsn = ack_rcv_no;
        true
    }

    /// Advance the local receive sequence on an incoming I-frame.
    /// Returns false when the peer's send sequence is not the expected one.
    pub fn advance_receive_seq(&mut self, incoming_send_sn: u16) -> bool {
        if incoming_send_sn != self.rcv_sn {
            return false;
        }
        self.rcv_sn = Self::seq_add(self.rcv_sn, 1);
        true
    }

    /// Whether an aggregated S-ack is due, on the w threshold or the t2
    /// timer.
    pub fn should_send_s_ack(&self, now: DateTime<Utc>, t2_ms: u64, w_threshold: u16) -> bool {
        if self.ack_rcvsn == self.rcv_sn {
            return false;
        }
        let unacked = Self::seq_distance(self.ack_rcvsn, self.rcv_sn);
        if unacked >= w_threshold {
            return true;
        }
        now.signed_duration_since(self.unacked_rcv_since)
            .num_milliseconds() as u64
            >= t2_ms
    }

    /// Record the moment unacknowledged receive data started accumulating.
    pub fn mark_unacked_receive(&mut self, now: DateTime<Utc>) {
        if self.ack_rcvsn == self.rcv_sn {
            self.unacked_rcv_since = now;
        }
    }

    pub fn mark_s_ack_sent(&mut self) {
        self.ack_rcvsn = self.rcv_sn;
    }

    /// Add with sequence wrap modulo 32768.
    pub fn seq_add(seq: u16, delta: u16) -> u16 {
        ((seq as u32 + delta as u32) % 32768) as u16
    }

    /// Distance from `from` to `to` in modulo space [0, 32767].
    pub fn seq_distance(from: u16, to: u16) -> u16 {
        ((to as i32 - from as i32 + 32768) % 32768) as u16
    }

    /// Is x within [start, end] inclusive in modulo order.
    pub fn seq_in_range_inclusive(start: u16, end: u16, x: u16) -> bool {
        Self::seq_distance(start, x) <= Self::seq_distance(start, end)
    }
}
