//! The car-side requester: a blocking state machine that negotiates one
//! intersection traversal at a time over its slot binding.

use core::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use air_encoding::types::{NodeId, Segment, Span};
use air_tdma::clock::Clock;
use air_tdma::radio::Transceiver;
use air_tdma::SlotClock;

use log::debug;

use state::State;

pub(crate) mod state;

/// Check-in attempts before the requester reports no arbiter.
pub const CHECKIN_ATTEMPTS: u32 = 5;
/// Standby re-polls before the requester gives up on a grant.
pub const STANDBY_POLLS: u32 = 16;
/// Clear transmissions before the release is assumed.
pub const CLEAR_ATTEMPTS: u32 = 4;

/// The car's movement subsystem. `traverse` blocks until the car's rear
/// has passed the final requested segment boundary.
pub trait Motion {
    type Error: fmt::Debug;

    fn traverse(&mut self, span: Span) -> Result<(), Self::Error>;
}

/// Outcome of one requester step, surfaced to the caller for logging and
/// the final verdict of a coordination pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A bounded wait elapsed without a usable frame; the machine retries.
    NoReply,
    /// The arbiter identified itself.
    CheckedIn(NodeId),
    RequestSent,
    /// Deferred by the arbiter; the request will be re-polled.
    Standing,
    Granted,
    /// The motion subsystem reports the span traversed.
    Traversed,
    /// The arbiter confirmed the release.
    Released,
    /// No confirmation arrived; the release is assumed after the bounded
    /// retries.
    ReleaseUnconfirmed,
    Cancelled,
}

pub enum Error<R: Transceiver, M: Motion> {
    Radio(air_tdma::Error<R::Error>),
    Motion(M::Error),
    Codec(air_encoding::Error),
    /// A coordination pass is already in flight.
    Busy,
    /// Check-in attempts exhausted.
    NoArbiter,
    /// The arbiter answered with the `UN` sentinel.
    UnsupportedPeer,
    /// Standby re-polls exhausted.
    Deferred,
    /// No grant and no standby within the bounded wait.
    CommandTimeout,
}

impl<R: Transceiver, M: Motion> fmt::Debug for Error<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Radio(e) => write!(f, "Radio({e:?})"),
            Error::Motion(e) => write!(f, "Motion({e:?})"),
            Error::Codec(e) => write!(f, "Codec({e:?})"),
            Error::Busy => f.write_str("Busy"),
            Error::NoArbiter => f.write_str("NoArbiter"),
            Error::UnsupportedPeer => f.write_str("UnsupportedPeer"),
            Error::Deferred => f.write_str("Deferred"),
            Error::CommandTimeout => f.write_str("CommandTimeout"),
        }
    }
}

impl<R: Transceiver, M: Motion> From<air_tdma::Error<R::Error>> for Error<R, M> {
    fn from(error: air_tdma::Error<R::Error>) -> Self {
        Error::Radio(error)
    }
}

impl<R: Transceiver, M: Motion> From<air_encoding::Error> for Error<R, M> {
    fn from(error: air_encoding::Error) -> Self {
        Error::Codec(error)
    }
}

pub(crate) struct Shared<R, C, M> {
    pub(crate) slot: SlotClock<R, C>,
    pub(crate) id: NodeId,
    pub(crate) motion: M,
    pub(crate) position: Segment,
    pub(crate) active: Arc<AtomicBool>,
}

/// One requester per car. Strictly serial: a single outstanding request
/// at any time.
pub struct Requester<R, C, M>
where
    R: Transceiver,
    C: Clock,
    M: Motion,
{
    state: State,
    shared: Shared<R, C, M>,
}

impl<R, C, M> Requester<R, C, M>
where
    R: Transceiver,
    C: Clock,
    M: Motion,
{
    pub fn new(
        slot: SlotClock<R, C>,
        id: NodeId,
        motion: M,
        position: Segment,
        active: Arc<AtomicBool>,
    ) -> Self {
        Requester {
            state: State::default(),
            shared: Shared { slot, id, motion, position, active },
        }
    }

    pub fn position(&self) -> Segment {
        self.shared.position
    }

    /// Runs one full coordination pass: check in, request the span up to
    /// `desired`, traverse on grant, clear. Returns the terminal response
    /// or the first unrecoverable error.
    pub fn run(&mut self, desired: Segment) -> Result<Response, Error<R, M>> {
        if !matches!(self.state, State::Idle(_)) {
            return Err(Error::Busy);
        }
        let span = Span::new(self.shared.position, desired)?;
        self.state = state::CheckingIn::begin(span);

        loop {
            if !self.shared.active.load(Ordering::Relaxed) {
                self.state = State::default();
                return Ok(Response::Cancelled);
            }

            let current = mem::take(&mut self.state);
            let (next, result) = current.handle(&mut self.shared);
            self.state = next;

            if !self.shared.active.load(Ordering::Relaxed) {
                self.state = State::default();
                return Ok(Response::Cancelled);
            }

            match result {
                Ok(response) => {
                    debug!("requester {}: {response:?}", self.shared.id);
                    if matches!(self.state, State::Idle(_)) {
                        return Ok(response);
                    }
                }
                Err(error) => {
                    self.state = State::default();
                    return Err(error);
                }
            }
        }
    }
}
