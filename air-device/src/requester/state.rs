/*

Car-side coordination states. Each state performs its slot I/O and hands
back the follow-up state plus a response for the caller:

  Idle ──begin──> CheckingIn ──identity──> Requesting ──sent──> AwaitCommand
                      │ ^                      ^                    │
              timeout │ └── bounded retry ─────┴──── ACK SBY ───────┤
                      v                                             │ ACK GRQ
                    Idle <── Clearing <── Driving <─────────────────┘

*/
use air_encoding::creator;
use air_encoding::parser::{parse_slot, SlotMessage};
use air_encoding::types::{Disposition, NodeId, Span};
use air_encoding::PAYLOAD_LEN;
use air_tdma::clock::Clock;
use air_tdma::radio::Transceiver;

use log::{debug, warn};

use super::{Error, Motion, Response, Shared, CHECKIN_ATTEMPTS, CLEAR_ATTEMPTS, STANDBY_POLLS};
use crate::MESSAGE_TIMEOUT_FRAMES;

pub(crate) enum State {
    Idle(Idle),
    CheckingIn(CheckingIn),
    Requesting(Requesting),
    AwaitCommand(AwaitCommand),
    Driving(Driving),
    Clearing(Clearing),
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

into_state!(Idle, CheckingIn, Requesting, AwaitCommand, Driving, Clearing);

impl Default for State {
    fn default() -> Self {
        State::Idle(Idle)
    }
}

impl State {
    pub(crate) fn handle<R, C, M>(
        self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        match self {
            State::Idle(s) => (s.into(), Ok(Response::NoReply)),
            State::CheckingIn(s) => s.handle(shared),
            State::Requesting(s) => s.handle(shared),
            State::AwaitCommand(s) => s.handle(shared),
            State::Driving(s) => s.handle(shared),
            State::Clearing(s) => s.handle(shared),
        }
    }
}

/// Formats a frame with `build` and transmits it in the next slot window.
fn send<R, C, M>(
    shared: &Shared<R, C, M>,
    build: impl FnOnce(&mut [u8]) -> Result<&[u8], air_encoding::Error>,
) -> Result<(), Error<R, M>>
where
    R: Transceiver,
    C: Clock,
    M: Motion,
{
    let mut buf = [0u8; PAYLOAD_LEN];
    let frame = build(&mut buf)?;
    shared.slot.tx_sync(frame)?;
    Ok(())
}

pub(crate) struct Idle;

pub(crate) struct CheckingIn {
    span: Span,
    attempts: u32,
}

impl CheckingIn {
    pub(crate) fn begin(span: Span) -> State {
        CheckingIn { span, attempts: 0 }.into()
    }

    fn handle<R, C, M>(
        mut self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        if let Err(e) = send(shared, creator::checkin) {
            return (Idle.into(), Err(e));
        }

        let reply = shared.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        match parse_slot(&reply) {
            Ok(SlotMessage::Identity(id)) => match NodeId::new(id) {
                Ok(arbiter) => {
                    let span = self.span;
                    (
                        Requesting { span, arbiter: arbiter.clone(), polls: 0 }.into(),
                        Ok(Response::CheckedIn(arbiter)),
                    )
                }
                Err(_) => self.retry(),
            },
            Ok(SlotMessage::Unsupported(_)) => (Idle.into(), Err(Error::UnsupportedPeer)),
            // Silence, or a frame this machine has no use for: dropped.
            _ => self.retry(),
        }
    }

    fn retry<R, M>(mut self) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        M: Motion,
    {
        self.attempts += 1;
        if self.attempts >= CHECKIN_ATTEMPTS {
            (Idle.into(), Err(Error::NoArbiter))
        } else {
            (self.into(), Ok(Response::NoReply))
        }
    }
}

pub(crate) struct Requesting {
    span: Span,
    arbiter: NodeId,
    polls: u32,
}

impl Requesting {
    fn handle<R, C, M>(
        self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        if let Err(e) = send(shared, |buf| creator::request(buf, &shared.id, self.span)) {
            return (Idle.into(), Err(e));
        }
        let Requesting { span, arbiter, polls } = self;
        (AwaitCommand { span, arbiter, polls }.into(), Ok(Response::RequestSent))
    }
}

pub(crate) struct AwaitCommand {
    span: Span,
    arbiter: NodeId,
    polls: u32,
}

impl AwaitCommand {
    fn handle<R, C, M>(
        mut self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        let reply = shared.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        match parse_slot(&reply) {
            Ok(SlotMessage::Command(Disposition::GoRequested)) => {
                if let Err(e) = send(shared, creator::ack) {
                    return (Idle.into(), Err(e));
                }
                (Driving { span: self.span }.into(), Ok(Response::Granted))
            }
            Ok(SlotMessage::Command(Disposition::Standby)) => {
                if let Err(e) = send(shared, creator::ack) {
                    return (Idle.into(), Err(e));
                }
                self.polls += 1;
                if self.polls >= STANDBY_POLLS {
                    return (Idle.into(), Err(Error::Deferred));
                }
                let AwaitCommand { span, arbiter, polls } = self;
                (Requesting { span, arbiter, polls }.into(), Ok(Response::Standing))
            }
            _ => {
                // No grant and no standby inside the bounded wait.
                (Idle.into(), Err(Error::CommandTimeout))
            }
        }
    }
}

pub(crate) struct Driving {
    span: Span,
}

impl Driving {
    fn handle<R, C, M>(
        self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        if let Err(e) = shared.motion.traverse(self.span) {
            // The reservation stays with the arbiter until an operator
            // intervenes; this car cannot honestly report clear.
            warn!("traversal failed inside {}", self.span);
            return (Idle.into(), Err(Error::Motion(e)));
        }
        shared.position = self.span.requested();
        (Clearing { attempts: 0 }.into(), Ok(Response::Traversed))
    }
}

pub(crate) struct Clearing {
    attempts: u32,
}

impl Clearing {
    fn handle<R, C, M>(
        mut self,
        shared: &mut Shared<R, C, M>,
    ) -> (State, Result<Response, Error<R, M>>)
    where
        R: Transceiver,
        C: Clock,
        M: Motion,
    {
        if let Err(e) = send(shared, creator::clear) {
            return (Idle.into(), Err(e));
        }

        let reply = shared.slot.rx_sync(MESSAGE_TIMEOUT_FRAMES);
        match parse_slot(&reply) {
            Ok(SlotMessage::Final) => (Idle.into(), Ok(Response::Released)),
            _ => {
                self.attempts += 1;
                if self.attempts >= CLEAR_ATTEMPTS {
                    warn!("no release confirmation; reservation assumed cleared");
                    (Idle.into(), Ok(Response::ReleaseUnconfirmed))
                } else {
                    debug!("clear unanswered, retrying");
                    (self.into(), Ok(Response::NoReply))
                }
            }
        }
    }
}
