//! The per-connection protocol engine.
//!
//! A [`Connection`] owns one send path (sequence numbering, the `unacked`
//! table, retransmission timers), one receive path (the `reasm` reassembly
//! buffer, flow-control accounting), and the six-state teardown machine
//! below. It is driven exclusively by its four public methods, each
//! corresponding to one external event: [`Connection::on_input`],
//! [`Connection::on_segment`], [`Connection::on_drain`],
//! [`Connection::on_tick`].

use crate::config::Config;
use crate::error::Error;
use crate::segment::{Segment, ACK, FIN, HEADER_SIZE};
use crate::substrate::Substrate;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    DataTransfer,
    FinSent,
    WaitLastFin,
    WaitLastAck,
    Linger,
    Closed,
}

/// A sent segment awaiting cumulative acknowledgment, kept in wire form so
/// retransmission never re-encodes.
#[derive(Debug)]
struct SentRecord {
    seq_end: u32,
    payload_len: usize,
    encoded: Vec<u8>,
    elapsed: u16,
    retries: u8,
}

/// A received segment awaiting in-order delivery. A pure FIN is represented
/// as an empty-payload record with `fin: true`, occupying the seqno it
/// consumes — this lets [`Connection::deliver`] process data and FIN
/// through the same ordered queue, delivering any buffered payload ahead
/// of a FIN that arrived in the same segment before acting on it.
#[derive(Debug)]
struct ReasmRecord {
    seqno: u32,
    data: Vec<u8>,
    fin: bool,
}

/// The per-connection protocol engine.
pub struct Connection<S> {
    substrate: S,
    state: State,

    seqno: u32,
    ackno: u32,
    send_window: u16,
    recv_window: u16,
    bytes_outstanding: u16,
    bytes_buffered: u16,

    unacked: std::collections::VecDeque<SentRecord>,
    reasm: Vec<ReasmRecord>,

    linger_elapsed: u16,
    fin_seqno_sent: u32,

    tick_period: u16,
    rt_timeout: u16,
}

/// After this many unsuccessful retransmissions of the same segment, the
/// peer is treated as unreachable.
const MAX_RETRIES: u8 = 5;

/// Linger grace period, in multiples of `rt_timeout`.
const LINGER_TIMEOUTS: u32 = 50;

impl<S: Substrate> Connection<S> {
    /// Creates a connection already in `DataTransfer` with initial sequence
    /// number 1. Peers are assumed paired from the start — there is no
    /// connection-establishment handshake.
    pub fn init(substrate: S, config: Config) -> Result<Self, Error> {
        config.validate()?;
        if HEADER_SIZE + substrate.max_seg_data_size() > u16::MAX as usize {
            return Err(Error::InvalidConfig(
                "substrate's max_seg_data_size + header size overflows the segment len field",
            ));
        }
        Ok(Connection {
            substrate,
            state: State::DataTransfer,
            seqno: 1,
            ackno: 1,
            send_window: config.send_window,
            recv_window: config.recv_window,
            bytes_outstanding: 0,
            bytes_buffered: 0,
            unacked: std::collections::VecDeque::new(),
            reasm: Vec::new(),
            linger_elapsed: 0,
            fin_seqno_sent: 0,
            tick_period: config.timer,
            rt_timeout: config.rt_timeout,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Whether this connection has reached `Closed` and should be removed
    /// from the registry.
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn substrate_mut(&mut self) -> &mut S {
        &mut self.substrate
    }

    /// `bytes_outstanding`, for tests and invariant checks.
    pub fn bytes_outstanding(&self) -> u16 {
        self.bytes_outstanding
    }

    /// `bytes_buffered`, for tests and invariant checks.
    pub fn bytes_buffered(&self) -> u16 {
        self.bytes_buffered
    }

    pub fn ackno(&self) -> u32 {
        self.ackno
    }

    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    // ---- send path ----------------------------------------------------

    /// Application input is available, or the application closed its input.
    pub fn on_input(&mut self) {
        if self.state != State::DataTransfer {
            return;
        }

        let cap = self.substrate.max_seg_data_size();
        let room = (self.send_window as u32).saturating_sub(self.bytes_outstanding as u32);
        if room < cap as u32 {
            return; // backpressure
        }

        let mut buf = vec![0u8; cap];
        let n = self.substrate.app_read(&mut buf);

        if n < 0 {
            self.send_fin();
            self.state = State::FinSent;
        } else if n > 0 {
            self.send_data(&buf[..n as usize]);
        }
    }

    fn send_data(&mut self, bytes: &[u8]) {
        let seg = Segment {
            seqno: self.seqno,
            ackno: self.ackno,
            flags: ACK,
            window: self.recv_window,
            data: bytes.to_vec(),
        };
        let encoded = seg.encode();

        self.unacked.push_back(SentRecord {
            seq_end: seg.seq_end(),
            payload_len: bytes.len(),
            encoded: encoded.clone(),
            elapsed: 0,
            retries: 0,
        });
        self.seqno = seg.seq_end();
        self.bytes_outstanding = self.bytes_outstanding.saturating_add(bytes.len() as u16);

        self.transmit(&encoded);
    }

    fn send_fin(&mut self) {
        let seg = Segment {
            seqno: self.seqno,
            ackno: self.ackno,
            flags: FIN,
            window: self.recv_window,
            data: Vec::new(),
        };
        let encoded = seg.encode();

        self.fin_seqno_sent = self.seqno;
        self.unacked.push_back(SentRecord {
            seq_end: seg.seq_end(),
            payload_len: 0,
            encoded: encoded.clone(),
            elapsed: 0,
            retries: 0,
        });
        self.seqno = seg.seq_end();

        self.transmit(&encoded);
    }

    fn send_ack(&mut self, extra_flags: u32) {
        let seg = Segment {
            seqno: self.seqno,
            ackno: self.ackno,
            flags: ACK | extra_flags,
            window: self.recv_window,
            data: Vec::new(),
        };
        self.transmit(&seg.encode());
    }

    fn transmit(&mut self, wire: &[u8]) {
        if self.substrate.send(wire) < 0 {
            tracing::warn!("transient substrate send failure; retransmission will retry");
        }
    }

    /// Removes every `unacked` record whose covered seqno range ends at or
    /// before `ackno`. Out-of-range or duplicate acks are idempotent since
    /// the loop simply finds nothing to remove.
    fn process_ack(&mut self, ackno: u32) {
        while let Some(front) = self.unacked.front() {
            if seq_le(front.seq_end, ackno) {
                let rec = self.unacked.pop_front().unwrap();
                self.bytes_outstanding = self.bytes_outstanding.saturating_sub(rec.payload_len as u16);
            } else {
                break;
            }
        }
    }

    // ---- receive path ---------------------------------------------------

    /// A wire-format frame arrived from the substrate.
    pub fn on_segment(&mut self, bytes: &[u8]) {
        let Some(seg) = Segment::decode(bytes) else {
            tracing::debug!("dropping invalid segment (truncated or checksum mismatch)");
            return;
        };

        if seg.flag(ACK) {
            self.process_ack(seg.ackno);
        }

        match self.state {
            State::DataTransfer => self.on_segment_data_transfer(seg),
            State::FinSent => self.on_segment_fin_sent(seg),
            State::WaitLastFin => self.on_segment_wait_last_fin(seg),
            State::WaitLastAck => self.on_segment_wait_last_ack(seg),
            State::Linger => self.on_segment_linger(seg),
            State::Closed => {}
        }
    }

    fn on_segment_data_transfer(&mut self, seg: Segment) {
        let has_fin = seg.flag(FIN);
        let payload_len = seg.data.len();

        if payload_len == 0 && !has_fin {
            return; // pure ACK, already processed above
        }

        if wrapping_lt(seg.seqno, self.ackno) {
            tracing::debug!(seqno = seg.seqno, ackno = self.ackno, "stale duplicate; re-acking");
            self.send_ack(0);
            return;
        }

        if self.bytes_buffered as usize + payload_len > self.recv_window as usize {
            tracing::debug!(seqno = seg.seqno, "incoming segment exceeds recv_window; dropping");
            return;
        }

        match self.reasm.binary_search_by_key(&seg.seqno, |r| r.seqno) {
            Ok(_) => {} // exact duplicate seqno already buffered
            Err(idx) => {
                self.bytes_buffered = self.bytes_buffered.saturating_add(payload_len as u16);
                self.reasm.insert(
                    idx,
                    ReasmRecord {
                        seqno: seg.seqno,
                        data: seg.data,
                        fin: has_fin,
                    },
                );
            }
        }

        self.deliver();
    }

    fn on_segment_fin_sent(&mut self, seg: Segment) {
        if seg.flag(ACK) && wrapping_lt(self.fin_seqno_sent, seg.ackno) {
            self.state = State::WaitLastFin;
        }
        if seg.flag(FIN) {
            self.ackno = seg.seqno.wrapping_add(1);
            self.send_ack(0);
            self.state = State::Closed;
        }
    }

    fn on_segment_wait_last_fin(&mut self, seg: Segment) {
        if seg.flag(FIN) {
            self.ackno = seg.seqno.wrapping_add(1);
            self.send_ack(0);
            self.state = State::Linger;
            self.linger_elapsed = 0;
        }
    }

    fn on_segment_wait_last_ack(&mut self, seg: Segment) {
        if seg.flag(ACK) && wrapping_lt(self.fin_seqno_sent, seg.ackno) {
            self.state = State::Closed;
        }
    }

    fn on_segment_linger(&mut self, seg: Segment) {
        if seg.flag(FIN) {
            self.ackno = seg.seqno.wrapping_add(1);
            self.send_ack(0);
            self.linger_elapsed = 0;
        }
    }

    /// Delivers as many in-order, buffer-space-permitting segments from
    /// `reasm` as possible, stopping at the first gap or the first segment
    /// that would overflow the downstream output buffer.
    fn deliver(&mut self) {
        loop {
            let Some(front) = self.reasm.first() else {
                break;
            };
            if front.seqno != self.ackno {
                break;
            }
            if front.data.len() as u32 > self.substrate.app_bufspace() {
                break;
            }

            let rec = self.reasm.remove(0);
            self.bytes_buffered = self.bytes_buffered.saturating_sub(rec.data.len() as u16);

            if !rec.data.is_empty() && self.substrate.app_write(&rec.data) < 0 {
                tracing::warn!("application write failed; closing connection");
                self.state = State::Closed;
                return;
            }
            self.ackno = self.ackno.wrapping_add(rec.data.len() as u32);

            if rec.fin {
                self.substrate.app_write(&[]); // signal EOF downstream
                self.ackno = self.ackno.wrapping_add(1);
                self.send_ack(0); // ack of peer's FIN
                self.send_fin();
                self.state = State::WaitLastAck;
                return;
            }

            self.send_ack(0);
        }
    }

    /// The downstream output buffer has drained; resume delivery.
    pub fn on_drain(&mut self) {
        self.deliver();
    }

    // ---- tick: retransmission clock and linger -------------------------

    pub fn on_tick(&mut self) {
        if self.state == State::Closed {
            return;
        }

        let mut abandoned = false;
        if self.state != State::Linger {
            abandoned = self.retransmit_due_segments();
            if abandoned {
                self.enter_linger();
            }
        }

        if self.state == State::Linger && !abandoned {
            self.linger_elapsed = self.linger_elapsed.saturating_add(self.tick_period);
            if (self.linger_elapsed as u32) >= LINGER_TIMEOUTS * self.rt_timeout as u32 {
                self.state = State::Closed;
            }
        }
    }

    /// Advances every `unacked` record's elapsed counter, retransmitting
    /// (oldest-first) any that have timed out. Returns `true` if a record
    /// exhausted its retransmission budget this tick.
    fn retransmit_due_segments(&mut self) -> bool {
        for rec in &mut self.unacked {
            rec.elapsed = rec.elapsed.saturating_add(self.tick_period);
            if rec.elapsed < self.rt_timeout {
                continue;
            }

            if self.substrate.send(&rec.encoded) < 0 {
                tracing::warn!("transient substrate send failure during retransmission");
            }
            rec.elapsed = 0;
            rec.retries += 1;

            if rec.retries >= MAX_RETRIES {
                return true;
            }
        }
        false
    }

    fn enter_linger(&mut self) {
        tracing::info!("retransmission budget exhausted; entering linger");
        self.state = State::Linger;
        self.linger_elapsed = 0;
        self.unacked.clear();
        self.bytes_outstanding = 0;
    }
}

/// From RFC 1323: a sequence number is "old" if it lies more than 2**31
/// bytes behind the left edge of the window. `true` iff `lhs` precedes
/// `rhs` in this wrapped ordering.
fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1 << 31)
}

fn seq_le(lhs: u32, rhs: u32) -> bool {
    lhs == rhs || wrapping_lt(lhs, rhs)
}
