//! Per-connection configuration.
//!
//! This crate does not read config from a file or the CLI (that is the
//! embedding application's job); it just defines the shape and validates it.

use crate::error::Error;

/// Options recognized by [`crate::connection::Connection::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Tick period, in milliseconds. Informational for the caller driving
    /// `on_tick`; the engine itself only ever counts ticks, never wall time.
    pub timer: u16,
    /// Per-segment retransmission timeout, in tick-periods worth of
    /// milliseconds (i.e. the same unit as `timer`).
    pub rt_timeout: u16,
    /// Maximum `bytes_outstanding` this side will carry.
    pub send_window: u16,
    /// Maximum `bytes_buffered` this side will carry; also advertised to the
    /// peer as our receive window.
    pub recv_window: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timer: 40,
            rt_timeout: 200,
            send_window: 1440,
            recv_window: 1440,
        }
    }
}

impl Config {
    /// Checks the structural invariants a `Config` must hold for the engine
    /// to operate correctly: nonzero windows and timers. The payload-cap
    /// check against the segment length field depends on the substrate in
    /// use, so it lives in `Connection::init` instead.
    pub fn validate(&self) -> Result<(), Error> {
        if self.timer == 0 {
            return Err(Error::InvalidConfig("timer must be nonzero"));
        }
        if self.rt_timeout == 0 {
            return Err(Error::InvalidConfig("rt_timeout must be nonzero"));
        }
        if self.send_window == 0 {
            return Err(Error::InvalidConfig("send_window must be nonzero"));
        }
        if self.recv_window == 0 {
            return Err(Error::InvalidConfig("recv_window must be nonzero"));
        }
        Ok(())
    }
}
