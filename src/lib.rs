//! cTCP: a simplified reliable byte-stream protocol over an unreliable,
//! lossy, reordering datagram substrate.
//!
//! This crate is the protocol engine only — it has no opinion on how
//! datagrams actually reach a peer, how application bytes are buffered, or
//! how its tick clock is driven. Those collaborators are abstracted behind
//! [`Substrate`]; a caller plugs in a real socket, a real app buffer, and a
//! real timer, or (as in the test suite) an in-memory fake.
//!
//! The engine is single-threaded and carries no internal locking: one
//! [`Connection`] is driven exclusively by its four event-handling methods,
//! and many connections are held in one [`Registry`] so their shared tick
//! clock can be fanned out in one call.

pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod segment;
pub mod substrate;

pub use config::Config;
pub use connection::{Connection, State};
pub use error::Error;
pub use registry::{ConnectionId, Registry};
pub use segment::Segment;
pub use substrate::Substrate;
