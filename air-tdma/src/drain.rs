//! Idle-window draining of the shared receiver.
//!
//! Half-duplex modules queue edge events while nobody is listening; left
//! alone, those stale events would be the first thing a later `receive`
//! call sees. A background consumer polls the radio whenever no slot
//! binding holds it, keeping the queue empty between windows.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::radio::Transceiver;

const DRAIN_POLL_MS: u64 = 2;

/// Occupancy count of the shared radio: non-zero while some slot binding
/// is inside its transmit or receive window.
#[derive(Debug, Default)]
pub struct RadioHold {
    windows: AtomicUsize,
}

impl RadioHold {
    pub fn new() -> Arc<Self> {
        Arc::new(RadioHold::default())
    }

    pub fn is_idle(&self) -> bool {
        self.windows.load(Ordering::Acquire) == 0
    }

    pub(crate) fn acquire(&self) -> HoldGuard<'_> {
        self.windows.fetch_add(1, Ordering::AcqRel);
        HoldGuard(self)
    }
}

pub(crate) struct HoldGuard<'a>(&'a RadioHold);

impl Drop for HoldGuard<'_> {
    fn drop(&mut self) {
        self.0.windows.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Spawns the idle-window drain thread. It runs until `active` clears,
/// discarding whatever the radio heard outside any slot window.
pub fn spawn_drain<R>(
    radio: Arc<R>,
    hold: Arc<RadioHold>,
    active: Arc<AtomicBool>,
) -> JoinHandle<()>
where
    R: Transceiver + Send + Sync + 'static,
{
    thread::spawn(move || {
        while active.load(Ordering::Relaxed) {
            if hold.is_idle() {
                let stale = radio.receive(Duration::from_millis(DRAIN_POLL_MS));
                if !stale.is_empty() {
                    log::trace!("drained {} stale bytes", stale.len());
                }
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{MockClock, MockRadio};

    #[test]
    fn hold_guard_tracks_occupancy() {
        let hold = RadioHold::new();
        assert!(hold.is_idle());
        let guard = hold.acquire();
        assert!(!hold.is_idle());
        drop(guard);
        assert!(hold.is_idle());
    }

    #[test]
    fn drains_stale_frames_while_idle() {
        let clock = Arc::new(MockClock::new(0));
        let radio = Arc::new(MockRadio::new(clock));
        radio.queue_rx(b"stale");
        radio.queue_rx(b"staler");

        let active = Arc::new(AtomicBool::new(true));
        let handle = spawn_drain(radio.clone(), RadioHold::new(), active.clone());
        std::thread::sleep(Duration::from_millis(20));
        active.store(false, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(radio.rx_is_empty());
    }
}
