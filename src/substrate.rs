//! The external collaborator contract a `Connection` is generic over. The
//! real datagram transport, application I/O wiring, and timer driver are
//! out of scope for this crate; this trait is the seam where a caller plugs
//! them in.

/// Non-blocking send/recv/buffer-query collaborator for one connection.
///
/// All methods are expected to be non-blocking; the engine never waits on a
/// `Substrate` call to complete.
pub trait Substrate {
    /// Transmits one datagram. A negative return indicates failure; the
    /// engine logs it and relies on the retransmission timer to retry.
    fn send(&mut self, bytes: &[u8]) -> i32;

    /// Reads up to `buf.len()` bytes of application input into `buf`.
    /// Returns the byte count, `0` for "no data right now", or `-1` for EOF.
    fn app_read(&mut self, buf: &mut [u8]) -> i32;

    /// Writes `bytes` to the application's output. A negative return is
    /// fatal for the connection.
    fn app_write(&mut self, bytes: &[u8]) -> i32;

    /// Free bytes in the downstream application output buffer.
    fn app_bufspace(&self) -> u32;

    /// Largest payload `send` can carry in one datagram for this substrate,
    /// header excluded. Substrates sit on different underlying MTUs, so this
    /// is queried per substrate rather than assumed fixed for every caller.
    fn max_seg_data_size(&self) -> usize {
        1400
    }

    /// Releases substrate resources for this connection. Called exactly
    /// once, when the connection leaves the registry.
    fn remove(&mut self);

    /// Signals program-level teardown (e.g. the last connection closed).
    /// The default implementation does nothing; most substrates only care
    /// about this when running as a single-connection demo program.
    fn end_session(&mut self) {}
}
