//! Mock clock and radio shared by the in-crate tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::radio::{Frame, RfConfig, Transceiver};

/// Virtual wall clock: `sleep_until` jumps straight to the deadline.
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    pub fn new(start_ms: u64) -> Self {
        MockClock { now: AtomicU64::new(start_ms) }
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, deadline_ms: u64) {
        self.now.fetch_max(deadline_ms, Ordering::SeqCst);
    }
}

/// Records transmits with their virtual timestamps and replays queued
/// receive frames. Receiving consumes no virtual time.
pub struct MockRadio {
    clock: Arc<MockClock>,
    transmitted: Mutex<Vec<(u64, Frame)>>,
    rx_queue: Mutex<VecDeque<Frame>>,
}

impl MockRadio {
    pub fn new(clock: Arc<MockClock>) -> Self {
        MockRadio {
            clock,
            transmitted: Mutex::new(Vec::new()),
            rx_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_rx(&self, payload: &[u8]) {
        let mut frame = Frame::new();
        frame.extend_from_slice(payload).unwrap();
        self.rx_queue.lock().unwrap().push_back(frame);
    }

    pub fn rx_is_empty(&self) -> bool {
        self.rx_queue.lock().unwrap().is_empty()
    }

    pub fn transmitted(&self) -> Vec<Frame> {
        self.transmitted.lock().unwrap().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn transmit_times(&self) -> Vec<u64> {
        self.transmitted.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

impl Transceiver for MockRadio {
    type Error = &'static str;

    fn enable(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn disable(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn configure(&self, config: &RfConfig) -> Result<(), Self::Error> {
        if config.is_valid() {
            Ok(())
        } else {
            Err("parameter rejected")
        }
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), Self::Error> {
        let mut copy = Frame::new();
        copy.extend_from_slice(frame).map_err(|()| "frame too long")?;
        self.transmitted.lock().unwrap().push((self.clock.now_ms(), copy));
        Ok(())
    }

    fn receive(&self, _deadline: Duration) -> Frame {
        self.rx_queue.lock().unwrap().pop_front().unwrap_or_default()
    }
}
