//! In-memory `Substrate` for integration tests: no real datagram transport,
//! no real sockets, no real timer. Two connections are wired directly to
//! each other's inbound queue so a test can drive `on_tick` and inspect
//! delivery without a network.

use std::collections::VecDeque;

use ctcp::Substrate;

/// One side of a fake wire. Segments pushed with [`FakeSubstrate::deliver`]
/// land in `inbox`; a test pops them and feeds them to the peer's
/// `on_segment` to simulate datagram delivery (with arbitrary reordering,
/// loss, or corruption applied in between).
#[derive(Default)]
pub struct FakeSubstrate {
    pub sent: Vec<Vec<u8>>,
    pub app_input: VecDeque<u8>,
    pub app_input_eof: bool,
    pub app_output: Vec<u8>,
    pub app_output_eof: bool,
    pub bufspace: u32,
    pub removed: bool,
    pub max_seg_data_size: usize,
}

impl FakeSubstrate {
    pub fn new() -> Self {
        FakeSubstrate {
            bufspace: 1440,
            max_seg_data_size: 1400,
            ..Default::default()
        }
    }

    pub fn queue_input(&mut self, bytes: &[u8]) {
        self.app_input.extend(bytes.iter().copied());
    }

    pub fn close_input(&mut self) {
        self.app_input_eof = true;
    }

    /// Drains every segment `send` queued since the last call.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl Substrate for FakeSubstrate {
    fn send(&mut self, bytes: &[u8]) -> i32 {
        self.sent.push(bytes.to_vec());
        bytes.len() as i32
    }

    fn app_read(&mut self, buf: &mut [u8]) -> i32 {
        if self.app_input.is_empty() {
            return if self.app_input_eof { -1 } else { 0 };
        }
        let n = buf.len().min(self.app_input.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.app_input.pop_front().unwrap();
        }
        n as i32
    }

    fn app_write(&mut self, bytes: &[u8]) -> i32 {
        if bytes.is_empty() {
            self.app_output_eof = true;
        } else {
            self.app_output.extend_from_slice(bytes);
        }
        bytes.len() as i32
    }

    fn app_bufspace(&self) -> u32 {
        self.bufspace
    }

    fn max_seg_data_size(&self) -> usize {
        self.max_seg_data_size
    }

    fn remove(&mut self) {
        self.removed = true;
    }
}
