/*

Per-slot arbiter states, mirroring the car:

  WaitCheckin ──CHK──> WaitRequest ──request──> Deciding
      ^  ^                  ^                      │ lock table
      │  │                  │  ACK after SBY       v
      │  └── timeouts ──────┴─────────────── AwaitAck
      │                                            │ ACK after GRQ
      └──────────── CLR / FIN ─── Tracking <───────┘

A granted reservation whose peer goes quiet is parked: its locks stay
until the clear eventually arrives on this slot or an operator resets.

*/
use air_encoding::creator;
use air_encoding::parser::{parse_slot, SlotMessage};
use air_encoding::types::{Disposition, NodeId, Span};
use air_encoding::{Error as CodecError, PAYLOAD_LEN};
use air_tdma::clock::Clock;
use air_tdma::radio::Transceiver;

use log::{debug, info, warn};

use super::{ArbiterEvent, SlotWorker};
use crate::MESSAGE_TIMEOUT_FRAMES;

/// Conversation phase of the car bound to this slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Checkin,
    Standby,
    Moving,
}

/// One car's coordination record: created on a valid request, destroyed
/// on clear.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) car_id: NodeId,
    pub(crate) span: Span,
    pub(crate) phase: Phase,
}

pub(crate) enum State {
    WaitCheckin(WaitCheckin),
    WaitRequest(WaitRequest),
    Deciding(Deciding),
    AwaitAck(AwaitAck),
    Tracking(Tracking),
}

macro_rules! into_state {
    ($($from:tt),*) => {
    $(
        impl From<$from> for State
        {
            fn from(s: $from) -> State {
                State::$from(s)
            }
        }
    )*};
}

into_state!(WaitCheckin, WaitRequest, Deciding, AwaitAck, Tracking);

impl Default for State {
    fn default() -> Self {
        State::WaitCheckin(WaitCheckin)
    }
}

impl State {
    pub(crate) fn handle<R, C>(self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        match self {
            State::WaitCheckin(s) => s.handle(worker),
            State::WaitRequest(s) => s.handle(worker),
            State::Deciding(s) => s.handle(worker),
            State::AwaitAck(s) => s.handle(worker),
            State::Tracking(s) => s.handle(worker),
        }
    }
}

/// Formats a frame with `build` and transmits it in the slot's next
/// window. Workers are long-running; transmit trouble is logged and the
/// conversation left to time out.
fn send<R, C>(
    worker: &SlotWorker<R, C>,
    build: impl FnOnce(&mut [u8]) -> Result<&[u8], CodecError>,
) -> bool
where
    R: Transceiver,
    C: Clock,
{
    let mut buf = [0u8; PAYLOAD_LEN];
    let frame = match build(&mut buf) {
        Ok(frame) => frame,
        Err(error) => {
            warn!("slot {}: frame build failed: {error:?}", worker.slot.slot());
            return false;
        }
    };
    match worker.slot.tx_sync(frame) {
        Ok(()) => true,
        Err(error) => {
            warn!("slot {}: transmit failed: {error:?}", worker.slot.slot());
            false
        }
    }
}

/// Releases the oldest parked reservation against an incoming clear, or
/// records the clear as unmatched.
fn clear_parked<R, C>(worker: &mut SlotWorker<R, C>)
where
    R: Transceiver,
    C: Clock,
{
    let slot = worker.slot.slot();
    match worker.parked.pop_front() {
        Some(record) => {
            worker.locks.release(record.span);
            send(worker, creator::fin);
            info!("slot {slot}: parked reservation {} cleared", record.span);
            worker.emit(ArbiterEvent::Cleared { slot, car: record.car_id, span: record.span });
        }
        None => {
            warn!("slot {slot}: CLR with no active record");
            worker.emit(ArbiterEvent::ClearIgnored { slot });
        }
    }
}

pub(crate) struct WaitCheckin;

impl WaitCheckin {
    fn handle<R, C>(self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        let frame = worker.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        if frame.is_empty() {
            return self.into();
        }

        match parse_slot(&frame) {
            Ok(SlotMessage::CheckIn) => {
                if !send(worker, |buf| creator::identity(buf, &worker.id)) {
                    return self.into();
                }
                worker.emit(ArbiterEvent::CheckinAnswered { slot: worker.slot.slot() });
                WaitRequest.into()
            }
            Ok(SlotMessage::Clear) => {
                clear_parked(worker);
                self.into()
            }
            Err(CodecError::UnsupportedContent) => {
                // AIR header, unknown content: answer the sentinel.
                send(worker, |buf| creator::unsupported(buf, &worker.id));
                self.into()
            }
            other => {
                debug!("slot {}: dropped frame in checkin wait: {other:?}", worker.slot.slot());
                self.into()
            }
        }
    }
}

pub(crate) struct WaitRequest;

impl WaitRequest {
    fn handle<R, C>(self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        let frame = worker.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        if frame.is_empty() {
            return WaitCheckin.into();
        }

        match parse_slot(&frame) {
            Ok(SlotMessage::Request { car_id, span }) => match NodeId::new(car_id) {
                Ok(car_id) => {
                    let record = Record { car_id, span, phase: Phase::Checkin };
                    Deciding { record }.into()
                }
                Err(_) => self.into(),
            },
            Ok(SlotMessage::Clear) => {
                clear_parked(worker);
                WaitCheckin.into()
            }
            Err(CodecError::UnsupportedContent) => {
                send(worker, |buf| creator::unsupported(buf, &worker.id));
                WaitCheckin.into()
            }
            other => {
                debug!("slot {}: dropped frame in request wait: {other:?}", worker.slot.slot());
                self.into()
            }
        }
    }
}

pub(crate) struct Deciding {
    pub(crate) record: Record,
}

impl Deciding {
    fn handle<R, C>(mut self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        let slot = worker.slot.slot();
        let granted = worker.locks.try_acquire(self.record.span);
        let disposition = if granted {
            Disposition::GoRequested
        } else {
            self.record.phase = Phase::Standby;
            Disposition::Standby
        };

        if !send(worker, |buf| creator::command(buf, disposition)) {
            // A grant that never went on the air holds no promise.
            if granted {
                worker.locks.release(self.record.span);
            }
            return WaitCheckin.into();
        }

        let event = if granted {
            ArbiterEvent::Granted {
                slot,
                car: self.record.car_id.clone(),
                span: self.record.span,
            }
        } else {
            ArbiterEvent::Deferred {
                slot,
                car: self.record.car_id.clone(),
                span: self.record.span,
            }
        };
        worker.emit(event);

        AwaitAck { record: self.record, granted }.into()
    }
}

pub(crate) struct AwaitAck {
    pub(crate) record: Record,
    pub(crate) granted: bool,
}

impl AwaitAck {
    fn handle<R, C>(mut self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        let frame = worker.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        match parse_slot(&frame) {
            Ok(SlotMessage::Ack) => {
                if self.granted {
                    self.record.phase = Phase::Moving;
                    debug!(
                        "slot {}: car {} {:?} through {}",
                        worker.slot.slot(),
                        self.record.car_id,
                        self.record.phase,
                        self.record.span
                    );
                    Tracking { record: self.record }.into()
                } else {
                    // Deferred and acknowledged; the car will re-request.
                    WaitRequest.into()
                }
            }
            _ => {
                worker.emit(ArbiterEvent::AckTimeout {
                    slot: worker.slot.slot(),
                    car: self.record.car_id.clone(),
                    granted: self.granted,
                });
                if self.granted {
                    // The car may have heard the grant and be inside the
                    // span already; the locks must not be taken back.
                    warn!(
                        "slot {}: grant for {} unacknowledged, parking",
                        worker.slot.slot(),
                        self.record.span
                    );
                    worker.parked.push_back(self.record);
                }
                WaitCheckin.into()
            }
        }
    }
}

pub(crate) struct Tracking {
    pub(crate) record: Record,
}

impl Tracking {
    fn handle<R, C>(self, worker: &mut SlotWorker<R, C>) -> State
    where
        R: Transceiver,
        C: Clock,
    {
        let frame = worker.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        if frame.is_empty() {
            // Still traversing; free the slot for new conversations and
            // keep the reservation parked.
            worker.parked.push_back(self.record);
            return WaitCheckin.into();
        }

        match parse_slot(&frame) {
            Ok(SlotMessage::Clear) => {
                let slot = worker.slot.slot();
                worker.locks.release(self.record.span);
                send(worker, creator::fin);
                worker.emit(ArbiterEvent::Cleared {
                    slot,
                    car: self.record.car_id,
                    span: self.record.span,
                });
                WaitCheckin.into()
            }
            other => {
                debug!("slot {}: dropped frame while tracking: {other:?}", worker.slot.slot());
                self.into()
            }
        }
    }
}
