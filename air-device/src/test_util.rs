//! A broadcast test medium standing in for the shared radio channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use air_encoding::types::Span;
use air_tdma::radio::{Frame, RfConfig, Transceiver};

use crate::requester::Motion;

/// Frames older than this at receive time were on the air outside the
/// caller's window and are dropped, the way a half-duplex receiver only
/// hears what overlaps its open window.
const STALE_MS: u64 = 15;

#[derive(Default)]
struct Station {
    inbox: Mutex<Vec<(Instant, Frame)>>,
    heard: Condvar,
    total_heard: AtomicUsize,
}

#[derive(Default)]
struct MediumInner {
    stations: Mutex<Vec<Arc<Station>>>,
}

/// Every transmit reaches every other station on the medium.
#[derive(Clone, Default)]
pub struct Medium {
    inner: Arc<MediumInner>,
}

impl Medium {
    pub fn new() -> Self {
        Medium::default()
    }

    pub fn join(&self) -> TestRadio {
        let station = Arc::new(Station::default());
        let mut stations = self.inner.stations.lock().unwrap();
        stations.push(station.clone());
        TestRadio {
            inner: self.inner.clone(),
            station,
            index: stations.len() - 1,
        }
    }
}

pub struct TestRadio {
    inner: Arc<MediumInner>,
    station: Arc<Station>,
    index: usize,
}

impl TestRadio {
    /// Frames this station has ever heard, fresh or stale.
    pub fn total_heard(&self) -> usize {
        self.station.total_heard.load(Ordering::SeqCst)
    }
}

impl Transceiver for TestRadio {
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

        let stations = self.inner.stations.lock().unwrap();
        for (i, station) in stations.iter().enumerate() {
            if i == self.index {
                continue;
            }
            station.inbox.lock().unwrap().push((Instant::now(), copy.clone()));
            station.total_heard.fetch_add(1, Ordering::SeqCst);
            station.heard.notify_all();
        }
        Ok(())
    }

    fn receive(&self, deadline: Duration) -> Frame {
        let start = Instant::now();
        let stale = Duration::from_millis(STALE_MS);
        let mut inbox = self.station.inbox.lock().unwrap();

        loop {
            inbox.retain(|(arrived, _)| start.duration_since(*arrived) <= stale);
            if !inbox.is_empty() {
                return inbox.remove(0).1;
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Frame::new();
            }
            let (guard, _) = self
                .station
                .heard
                .wait_timeout(inbox, deadline - elapsed)
                .unwrap();
            inbox = guard;
        }
    }
}

/// Motion stub: waits out a fixed traversal time and records the spans it
/// was asked to drive.
pub struct TestMotion {
    delay: Duration,
    driven: Arc<Mutex<Vec<Span>>>,
}

impl TestMotion {
    pub fn new(delay: Duration) -> Self {
        TestMotion { delay, driven: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn driven(&self) -> Arc<Mutex<Vec<Span>>> {
        self.driven.clone()
    }
}

impl Motion for TestMotion {
    type Error = &'static str;

    fn traverse(&mut self, span: Span) -> Result<(), Self::Error> {
        thread::sleep(self.delay);
        self.driven.lock().unwrap().push(span);
        Ok(())
    }
}
