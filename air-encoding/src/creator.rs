// Copyright (c) 2024 the AIR project developers
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Provides methods for building AIR frames into caller-provided buffers.
//!
//! Every builder writes the formatted frame into the front of `buf` and
//! returns the filled prefix; the TDMA layer pads it to the fixed on-air
//! length. Buffers of [`crate::PAYLOAD_LEN`] bytes fit every slot frame.

use crate::parser::StructuredMessage;
use crate::types::{Disposition, NodeId, Span};
use crate::{
    Error, ACKNOWLEDGE, CHECK, CLEAR, END_MARKER, FINAL, HEADER, START_MARKER, UNSUPPORTED,
};

struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(Error::BufferTooShort);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn finish(self) -> &'a [u8] {
        &self.buf[..self.pos]
    }
}

/// `AIRv1.0 CHK`
pub fn checkin(buf: &mut [u8]) -> Result<&[u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(HEADER.as_bytes())?;
    c.put(b" ")?;
    c.put(CHECK.as_bytes())?;
    Ok(c.finish())
}

/// The bare arbiter identity answering a check-in.
pub fn identity<'a>(buf: &'a mut [u8], id: &NodeId) -> Result<&'a [u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(id.as_str().as_bytes())?;
    Ok(c.finish())
}

/// `<car_id> <current><requested>` with the two segments as raw bytes,
/// current first.
pub fn request<'a>(buf: &'a mut [u8], car_id: &NodeId, span: Span) -> Result<&'a [u8], Error> {
    let wire = [span.current().to_wire()?, span.requested().to_wire()?];
    let mut c = Cursor::new(buf);
    c.put(car_id.as_str().as_bytes())?;
    c.put(b" ")?;
    c.put(&wire)?;
    Ok(c.finish())
}

/// `ACK SBY` or `ACK GRQ`.
pub fn command(buf: &mut [u8], disposition: Disposition) -> Result<&[u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(ACKNOWLEDGE.as_bytes())?;
    c.put(b" ")?;
    c.put(disposition.token().as_bytes())?;
    Ok(c.finish())
}

/// Bare `ACK`.
pub fn ack(buf: &mut [u8]) -> Result<&[u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(ACKNOWLEDGE.as_bytes())?;
    Ok(c.finish())
}

/// `CLR`
pub fn clear(buf: &mut [u8]) -> Result<&[u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(CLEAR.as_bytes())?;
    Ok(c.finish())
}

/// `FIN`
pub fn fin(buf: &mut [u8]) -> Result<&[u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(FINAL.as_bytes())?;
    Ok(c.finish())
}

/// `UN <id>`: the unsupported-peer sentinel, carrying the sender's own
/// identity.
pub fn unsupported<'a>(buf: &'a mut [u8], id: &NodeId) -> Result<&'a [u8], Error> {
    let mut c = Cursor::new(buf);
    c.put(UNSUPPORTED.as_bytes())?;
    c.put(b" ")?;
    c.put(id.as_str().as_bytes())?;
    Ok(c.finish())
}

/// The three-line structured envelope:
/// `AIRv1.0 <receiver> SM`, the body, `EM <caller>`.
///
/// The body must not contain a line consisting of the `SM` or `EM`
/// markers; round-tripping is only defined for such bodies.
pub fn structured<'a>(buf: &'a mut [u8], message: &StructuredMessage<'_>) -> Result<&'a [u8], Error> {
    if !crate::types::is_valid_id(message.receiver_id) || !crate::types::is_valid_id(message.caller_id)
    {
        return Err(Error::InvalidId);
    }
    let mut c = Cursor::new(buf);
    c.put(HEADER.as_bytes())?;
    c.put(b" ")?;
    c.put(message.receiver_id.as_bytes())?;
    c.put(b" ")?;
    c.put(START_MARKER.as_bytes())?;
    c.put(b"\n")?;
    c.put(message.body.as_bytes())?;
    c.put(b"\n")?;
    c.put(END_MARKER.as_bytes())?;
    c.put(b" ")?;
    c.put(message.caller_id.as_bytes())?;
    Ok(c.finish())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Segment;
    use crate::PAYLOAD_LEN;

    #[test]
    fn slot_frames_fit_the_payload() {
        let id = NodeId::new("CAR/LONGEST1").unwrap();
        let span = Span::new(Segment(0), Segment(3)).unwrap();
        let mut buf = [0u8; PAYLOAD_LEN];
        let frame = request(&mut buf, &id, span).unwrap();
        assert_eq!(frame.len(), PAYLOAD_LEN);
    }

    #[test]
    fn oversized_segment_rejected() {
        let id = NodeId::new("CAR1").unwrap();
        let span = Span::new(Segment(0x20), Segment(0x21)).unwrap();
        let mut buf = [0u8; PAYLOAD_LEN];
        assert_eq!(request(&mut buf, &id, span), Err(Error::InvalidSegment));
    }
}
