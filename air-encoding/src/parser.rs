//! Provides types and methods for parsing AIR frames.
//!
//! # Examples
//!
//! ```
//! use air_encoding::parser::{parse_slot, SlotMessage};
//! use air_encoding::types::{Segment, Span};
//!
//! let frame = [b'C', b'A', b'R', b'1', b' ', 0x01, 0x03, 0, 0, 0, 0, 0, 0, 0, 0];
//! match parse_slot(&frame) {
//!     Ok(SlotMessage::Request { car_id, span }) => {
//!         assert_eq!(car_id, "CAR1");
//!         assert_eq!(span, Span::new(Segment(1), Segment(3)).unwrap());
//!     }
//!     other => panic!("unexpected parse: {other:?}"),
//! }
//! ```

use core::str;

use crate::types::{is_valid_id, Disposition, Segment, Span};
use crate::{
    Error, ACKNOWLEDGE, CHECK, CLEAR, END_MARKER, FINAL, GO_REQUESTED, HEADER, STANDBY,
    START_MARKER, UNSUPPORTED,
};

/// One decoded slot-grammar frame, borrowing its tokens from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMessage<'a> {
    /// `AIRv1.0 CHK`: requester entering its slot.
    CheckIn,
    /// Bare arbiter identity answering a check-in.
    Identity(&'a str),
    /// `<car_id> <current><requested>`: reservation request.
    Request { car_id: &'a str, span: Span },
    /// `ACK SBY` / `ACK GRQ`: arbiter disposition.
    Command(Disposition),
    /// Bare `ACK`: requester's final acknowledgement.
    Ack,
    /// `CLR`: requester reports its reserved segments cleared.
    Clear,
    /// `FIN`: arbiter confirms the release.
    Final,
    /// `UN <id>`: unsupported-peer sentinel.
    Unsupported(&'a str),
}

/// A decoded structured (three-line) message, borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuredMessage<'a> {
    pub caller_id: &'a str,
    pub receiver_id: &'a str,
    pub body: &'a str,
}

/// Strips the trailing NUL padding every on-air frame carries.
fn strip_padding(frame: &[u8]) -> &[u8] {
    let end = frame.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    &frame[..end]
}

/// Splits on single spaces; at most three tokens are meaningful in the
/// slot grammar.
fn tokens(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.split(|b| *b == b' ').filter(|t| !t.is_empty())
}

fn id_token(token: &[u8]) -> Result<&str, Error> {
    let id = str::from_utf8(token).map_err(|_| Error::InvalidId)?;
    if !is_valid_id(id) {
        return Err(Error::InvalidId);
    }
    Ok(id)
}

/// Parses a single slot-grammar frame.
///
/// Keyword tokens always win over identity parses: a peer named `FIN`
/// cannot exist on the wire. Frames starting with the AIR header but
/// carrying unknown content yield [`Error::UnsupportedContent`], which
/// arbiters answer with the `UN` sentinel; everything else malformed
/// yields an error the caller drops silently.
pub fn parse_slot(frame: &[u8]) -> Result<SlotMessage<'_>, Error> {
    let frame = strip_padding(frame);
    let mut toks = tokens(frame);
    let first = toks.next().ok_or(Error::UnknownMessage)?;

    if first == HEADER.as_bytes() {
        return match toks.next() {
            Some(t) if t == CHECK.as_bytes() && toks.next().is_none() => Ok(SlotMessage::CheckIn),
            _ => Err(Error::UnsupportedContent),
        };
    }

    if first == ACKNOWLEDGE.as_bytes() {
        return match toks.next() {
            None => Ok(SlotMessage::Ack),
            Some(t) if t == STANDBY.as_bytes() => Ok(SlotMessage::Command(Disposition::Standby)),
            Some(t) if t == GO_REQUESTED.as_bytes() => {
                Ok(SlotMessage::Command(Disposition::GoRequested))
            }
            Some(_) => Err(Error::UnknownMessage),
        };
    }

    if first == CLEAR.as_bytes() && toks.next().is_none() {
        return Ok(SlotMessage::Clear);
    }
    if first == FINAL.as_bytes() && toks.next().is_none() {
        return Ok(SlotMessage::Final);
    }

    if first == UNSUPPORTED.as_bytes() {
        let id = toks.next().ok_or(Error::UnknownMessage)?;
        // The sentinel carries the arbiter's own (valid) identity.
        let id = id_token(id)?;
        return match toks.next() {
            None => Ok(SlotMessage::Unsupported(id)),
            Some(_) => Err(Error::UnknownMessage),
        };
    }

    let id = id_token(first)?;
    match toks.next() {
        None => Ok(SlotMessage::Identity(id)),
        Some(request) => {
            if toks.next().is_some() || request.len() != 2 {
                return Err(Error::UnknownMessage);
            }
            let span = Span::new(Segment(request[0]), Segment(request[1]))?;
            Ok(SlotMessage::Request { car_id: id, span })
        }
    }
}

/// Parses a structured three-line message:
/// `AIRv1.0 <receiver> SM`, the body, `EM <caller>`.
pub fn parse_structured(message: &[u8]) -> Result<StructuredMessage<'_>, Error> {
    let text = str::from_utf8(strip_padding(message)).map_err(|_| Error::InvalidEncoding)?;

    let (head, rest) = text.split_once('\n').ok_or(Error::MissingMarker)?;
    let (body, tail) = rest.rsplit_once('\n').ok_or(Error::MissingMarker)?;

    let mut head_toks = head.split(' ').filter(|t| !t.is_empty());
    match head_toks.next() {
        Some(h) if h == HEADER => {}
        _ => return Err(Error::UnknownMessage),
    }
    let receiver_id = head_toks.next().ok_or(Error::UnknownMessage)?;
    if !is_valid_id(receiver_id) {
        return Err(Error::InvalidId);
    }
    match (head_toks.next(), head_toks.next()) {
        (Some(m), None) if m == START_MARKER => {}
        _ => return Err(Error::MissingMarker),
    }

    let mut tail_toks = tail.split(' ').filter(|t| !t.is_empty());
    match tail_toks.next() {
        Some(m) if m == END_MARKER => {}
        _ => return Err(Error::MissingMarker),
    }
    let caller_id = tail_toks.next().ok_or(Error::UnknownMessage)?;
    if !is_valid_id(caller_id) {
        return Err(Error::InvalidId);
    }
    if tail_toks.next().is_some() {
        return Err(Error::UnknownMessage);
    }

    Ok(StructuredMessage { caller_id, receiver_id, body })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_is_ignored() {
        let mut frame = [0u8; 15];
        frame[..3].copy_from_slice(b"CLR");
        assert_eq!(parse_slot(&frame), Ok(SlotMessage::Clear));
    }

    #[test]
    fn keywords_win_over_identities() {
        assert_eq!(parse_slot(b"FIN"), Ok(SlotMessage::Final));
        assert_eq!(parse_slot(b"ACK"), Ok(SlotMessage::Ack));
        assert_eq!(parse_slot(b"CTRL-1"), Ok(SlotMessage::Identity("CTRL-1")));
    }

    #[test]
    fn wrong_header_is_not_a_checkin() {
        assert_eq!(parse_slot(b"AIRV1 CHK"), Err(Error::UnknownMessage));
        assert_eq!(parse_slot(b"AIRv1.0 CHK CHK"), Err(Error::UnsupportedContent));
        assert_eq!(parse_slot(b"AIRv1.0 NOP"), Err(Error::UnsupportedContent));
    }

    #[test]
    fn reserved_prefix_rejected() {
        assert_eq!(parse_slot(b"UNKNOWN"), Err(Error::InvalidId));
    }
}
