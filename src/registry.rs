//! Process-wide connection registry.
//!
//! One process may host many connections; the registry owns them all and
//! fans `on_tick` out across the whole set each period, sweeping out
//! connections that reach `Closed` in the same pass.

use crate::connection::Connection;
use crate::substrate::Substrate;

/// Opaque handle to a registered connection. Connections have no network
/// address in cTCP, so this is a bare per-registry counter rather than an
/// address-derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// Owns a set of connections and drives their shared tick clock.
#[derive(Default)]
pub struct Registry<S> {
    next_id: u64,
    connections: Vec<(ConnectionId, Connection<S>)>,
}

impl<S: Substrate> Registry<S> {
    pub fn new() -> Self {
        Registry {
            next_id: 0,
            connections: Vec::new(),
        }
    }

    /// Registers a connection and returns its handle.
    pub fn insert(&mut self, conn: Connection<S>) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.push((id, conn));
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection<S>> {
        self.connections.iter().find(|(cid, _)| *cid == id).map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.connections
            .iter_mut()
            .find(|(cid, _)| *cid == id)
            .map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().map(|(id, _)| *id)
    }

    /// Dispatches `on_input` to one connection, then sweeps it if it closed.
    pub fn on_input(&mut self, id: ConnectionId) {
        self.dispatch(id, |c| c.on_input());
    }

    /// Dispatches an inbound segment to one connection, then sweeps it if it
    /// closed.
    pub fn on_segment(&mut self, id: ConnectionId, bytes: &[u8]) {
        self.dispatch(id, |c| c.on_segment(bytes));
    }

    /// Dispatches `on_drain` to one connection, then sweeps it if it closed.
    pub fn on_drain(&mut self, id: ConnectionId) {
        self.dispatch(id, |c| c.on_drain());
    }

    fn dispatch(&mut self, id: ConnectionId, f: impl FnOnce(&mut Connection<S>)) {
        let Some(pos) = self.connections.iter().position(|(cid, _)| *cid == id) else {
            return;
        };
        f(&mut self.connections[pos].1);
        self.sweep_if_closed(pos);
    }

    /// Advances every connection's tick clock by one period and removes any
    /// that reached `Closed` this round, tearing down their substrate
    /// resources first.
    pub fn tick_all(&mut self) {
        let mut closed = Vec::new();
        for (idx, (_, conn)) in self.connections.iter_mut().enumerate() {
            conn.on_tick();
            if conn.is_closed() {
                closed.push(idx);
            }
        }
        // remove back-to-front so earlier indices stay valid
        for idx in closed.into_iter().rev() {
            let (_, mut conn) = self.connections.remove(idx);
            teardown(&mut conn);
        }
    }

    fn sweep_if_closed(&mut self, idx: usize) {
        if self.connections[idx].1.is_closed() {
            let (_, mut conn) = self.connections.remove(idx);
            teardown(&mut conn);
        }
    }
}

/// Releases a connection's substrate resources and signals teardown, in
/// that order, each time a connection leaves the registry.
fn teardown<S: Substrate>(conn: &mut Connection<S>) {
    conn.substrate_mut().remove();
    conn.substrate_mut().end_session();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct NullSubstrate {
        removed: bool,
        ended: Rc<Cell<bool>>,
        input: Option<Vec<u8>>,
    }

    impl Substrate for NullSubstrate {
        fn send(&mut self, _bytes: &[u8]) -> i32 {
            0
        }
        fn app_read(&mut self, buf: &mut [u8]) -> i32 {
            match self.input.take() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    bytes.len() as i32
                }
                None => 0,
            }
        }
        fn app_write(&mut self, _bytes: &[u8]) -> i32 {
            0
        }
        fn app_bufspace(&self) -> u32 {
            1440
        }
        fn remove(&mut self) {
            self.removed = true;
        }
        fn end_session(&mut self) {
            self.ended.set(true);
        }
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let mut reg: Registry<NullSubstrate> = Registry::new();
        let conn = Connection::init(NullSubstrate::default(), Config::default()).unwrap();
        let id = reg.insert(conn);
        assert!(reg.get(id).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn closed_connection_is_swept_and_released() {
        let mut reg: Registry<NullSubstrate> = Registry::new();
        let conn = Connection::init(NullSubstrate::default(), Config::default()).unwrap();
        let id = reg.insert(conn);

        let fin = crate::segment::Segment {
            seqno: 1,
            ackno: 1,
            flags: crate::segment::FIN,
            window: 1440,
            data: Vec::new(),
        };
        // peer FIN -> WAIT_LAST_ACK; ack of our FIN -> CLOSED
        reg.on_segment(id, &fin.encode());
        let our_fin_end = reg.get(id).unwrap().seqno();
        let ack = crate::segment::Segment {
            seqno: 2,
            ackno: our_fin_end,
            flags: crate::segment::ACK,
            window: 1440,
            data: Vec::new(),
        };
        reg.on_segment(id, &ack.encode());

        assert!(reg.is_empty());
        assert!(reg.get(id).is_none());
    }

    #[test]
    fn tick_all_sweeps_every_closed_connection() {
        let mut reg: Registry<NullSubstrate> = Registry::new();
        for _ in 0..3 {
            let conn = Connection::init(NullSubstrate::default(), Config::default()).unwrap();
            reg.insert(conn);
        }
        assert_eq!(reg.len(), 3);
        reg.tick_all();
        assert_eq!(reg.len(), 3); // nothing closed yet
    }

    /// Teardown releases substrate resources and signals end-of-session,
    /// in that order, every time a connection leaves the registry.
    #[test]
    fn sweeping_a_closed_connection_calls_remove_then_end_session() {
        let mut reg: Registry<NullSubstrate> = Registry::new();
        let ended = Rc::new(Cell::new(false));
        let conn = Connection::init(
            NullSubstrate {
                removed: false,
                ended: ended.clone(),
                input: None,
            },
            Config::default(),
        )
        .unwrap();
        let id = reg.insert(conn);

        let fin = crate::segment::Segment {
            seqno: 1,
            ackno: 1,
            flags: crate::segment::FIN,
            window: 1440,
            data: Vec::new(),
        };
        reg.on_segment(id, &fin.encode());
        let our_fin_end = reg.get(id).unwrap().seqno();
        let ack = crate::segment::Segment {
            seqno: 2,
            ackno: our_fin_end,
            flags: crate::segment::ACK,
            window: 1440,
            data: Vec::new(),
        };
        reg.on_segment(id, &ack.encode());

        assert!(ended.get());
    }

    /// The `tick_all` sweep path (as opposed to the per-event dispatch path)
    /// also signals end-of-session.
    #[test]
    fn tick_all_sweep_calls_end_session() {
        let mut reg: Registry<NullSubstrate> = Registry::new();
        let ended = Rc::new(Cell::new(false));
        let mut cfg = Config::default();
        cfg.timer = 200;
        cfg.rt_timeout = 200;
        let conn = Connection::init(
            NullSubstrate {
                removed: false,
                ended: ended.clone(),
                input: Some(b"hi".to_vec()),
            },
            cfg,
        )
        .unwrap();
        let id = reg.insert(conn);

        // one real segment in flight so the retransmission timer has
        // something to give up on
        reg.on_input(id);
        assert_eq!(reg.get(id).unwrap().bytes_outstanding(), 2);

        // 5 retransmission timeouts abandon it straight into LINGER; 50 more
        // close it.
        for _ in 0..55 {
            reg.tick_all();
        }

        assert!(reg.is_empty());
        assert!(ended.get());
    }
}
