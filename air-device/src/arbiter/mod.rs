//! The intersection arbiter: one sub-machine per inbound slot, all
//! deciding against a single segment lock table.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use air_encoding::types::{NodeId, Span};
use air_tdma::clock::Clock;
use air_tdma::drain::RadioHold;
use air_tdma::radio::Transceiver;
use air_tdma::{Scheme, SlotClock};

use crate::locks::SegmentLocks;

use state::{Record, State};

pub(crate) mod state;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// Number of physical segments in the intersection.
    pub segments: usize,
    pub scheme: Scheme,
    pub tx_offset_ms: i64,
    pub rx_offset_ms: i64,
}

/// What the slot workers report over the outbound event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterEvent {
    CheckinAnswered { slot: u8 },
    Granted { slot: u8, car: NodeId, span: Span },
    Deferred { slot: u8, car: NodeId, span: Span },
    /// The peer never acknowledged; with `granted` the reservation stays
    /// parked until its clear arrives or an operator resets.
    AckTimeout { slot: u8, car: NodeId, granted: bool },
    Cleared { slot: u8, car: NodeId, span: Span },
    /// A clear arrived with no record to match it.
    ClearIgnored { slot: u8 },
}

/// Handle over the per-slot worker threads. Dropping the handle leaves
/// the workers running; call [`Arbiter::shutdown`] to stop them.
pub struct Arbiter {
    active: Arc<AtomicBool>,
    locks: Arc<SegmentLocks>,
    workers: Vec<JoinHandle<()>>,
    events: Receiver<ArbiterEvent>,
}

impl Arbiter {
    /// Binds one worker to every slot of the scheme and starts them.
    pub fn spawn<R, C>(
        radio: Arc<R>,
        clock: Arc<C>,
        hold: Arc<RadioHold>,
        id: NodeId,
        config: ArbiterConfig,
    ) -> io::Result<Arbiter>
    where
        R: Transceiver + Send + Sync + 'static,
        C: Clock + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let locks = Arc::new(SegmentLocks::new(config.segments));
        let (sender, events) = mpsc::channel();

        let mut workers = Vec::with_capacity(config.scheme.slots() as usize);
        for slot in 0..config.scheme.slots() {
            let mut slot_clock = SlotClock::new(
                radio.clone(),
                clock.clone(),
                hold.clone(),
                active.clone(),
                slot,
                config.scheme,
            );
            slot_clock.set_tx_offset(config.tx_offset_ms);
            slot_clock.set_rx_offset(config.rx_offset_ms);

            let mut worker =
                SlotWorker::new(slot_clock, id.clone(), locks.clone(), sender.clone());
            let active = active.clone();
            let handle = thread::Builder::new()
                .name(format!("air-slot-{slot}"))
                .spawn(move || worker.run(&active))?;
            workers.push(handle);
        }

        Ok(Arbiter { active, locks, workers, events })
    }

    pub fn locks(&self) -> &SegmentLocks {
        &self.locks
    }

    pub fn try_event(&self) -> Option<ArbiterEvent> {
        self.events.try_recv().ok()
    }

    pub fn wait_event(&self, timeout: Duration) -> Option<ArbiterEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Stops the workers cooperatively; returns once every slot thread
    /// has wound down (bounded by one slot window plus one radio call).
    pub fn shutdown(self) {
        self.active.store(false, Ordering::Relaxed);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// One inbound slot's sub-machine plus everything it owns.
pub(crate) struct SlotWorker<R, C> {
    pub(crate) slot: SlotClock<R, C>,
    pub(crate) id: NodeId,
    pub(crate) locks: Arc<SegmentLocks>,
    pub(crate) events: Sender<ArbiterEvent>,
    pub(crate) state: State,
    /// Granted-but-unacknowledged reservations whose locks survive until
    /// a clear arrives on this slot. Oldest first.
    pub(crate) parked: VecDeque<Record>,
}

impl<R, C> SlotWorker<R, C>
where
    R: Transceiver,
    C: Clock,
{
    pub(crate) fn new(
        slot: SlotClock<R, C>,
        id: NodeId,
        locks: Arc<SegmentLocks>,
        events: Sender<ArbiterEvent>,
    ) -> Self {
        SlotWorker {
            slot,
            id,
            locks,
            events,
            state: State::default(),
            parked: VecDeque::new(),
        }
    }

    fn run(&mut self, active: &AtomicBool) {
        while active.load(Ordering::Relaxed) {
            self.step();
        }
    }

    pub(crate) fn step(&mut self) {
        let state = mem::take(&mut self.state);
        self.state = state.handle(self);
    }

    pub(crate) fn emit(&self, event: ArbiterEvent) {
        let _ = self.events.send(event);
    }
}
