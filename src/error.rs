//! Crate error type.
//!
//! The engine itself never raises errors across the
//! `on_input`/`on_segment`/`on_drain`/`on_tick` boundary: every failure mode
//! there is absorbed and surfaced only as connection state (a drop, a log
//! line, or a transition to `Closed`). `Error` exists for the one fallible
//! boundary that *is* part of the public API: validating a `Config`.

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}
