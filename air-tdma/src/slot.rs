//! One node's binding to a transmit/receive slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::drain::RadioHold;
use crate::radio::{Frame, Transceiver, FRAME_LEN};
use crate::{Scheme, SLOT_MS};

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// Payload longer than one on-air frame.
    PayloadTooLong,
    /// The radio rejected the transmit.
    Radio(E),
}

/// Binds a node to one slot of the frame schedule and drives the shared
/// radio inside that slot's windows.
///
/// Transmit and receive carry independent offsets, usually negative, to
/// compensate radio turnaround, PLL lock, and host scheduling latency
/// ahead of the nominal window boundary.
pub struct SlotClock<R, C> {
    radio: Arc<R>,
    clock: Arc<C>,
    hold: Arc<RadioHold>,
    active: Arc<AtomicBool>,
    slot: u8,
    scheme: Scheme,
    tx_offset_ms: i64,
    rx_offset_ms: i64,
}

impl<R: Transceiver, C: Clock> SlotClock<R, C> {
    pub fn new(
        radio: Arc<R>,
        clock: Arc<C>,
        hold: Arc<RadioHold>,
        active: Arc<AtomicBool>,
        slot: u8,
        scheme: Scheme,
    ) -> Self {
        debug_assert!(slot < scheme.slots());
        SlotClock {
            radio,
            clock,
            hold,
            active,
            slot,
            scheme,
            tx_offset_ms: 0,
            rx_offset_ms: 0,
        }
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn tx_offset(&self) -> i64 {
        self.tx_offset_ms
    }

    pub fn rx_offset(&self) -> i64 {
        self.rx_offset_ms
    }

    pub fn set_tx_offset(&mut self, offset_ms: i64) {
        self.tx_offset_ms = offset_ms;
    }

    pub fn set_rx_offset(&mut self, offset_ms: i64) {
        self.rx_offset_ms = offset_ms;
    }

    /// Transmits `payload` in the next opening of this slot's window,
    /// NUL-padded to the fixed frame length.
    pub fn tx_sync(&self, payload: &[u8]) -> Result<(), Error<R::Error>> {
        if payload.len() > FRAME_LEN {
            return Err(Error::PayloadTooLong);
        }
        let mut frame = [0u8; FRAME_LEN];
        frame[..payload.len()].copy_from_slice(payload);

        self.clock.sleep_until(self.next_window(self.tx_offset_ms));
        let _hold = self.hold.acquire();
        self.radio.transmit(&frame).map_err(Error::Radio)
    }

    /// Listens during up to `max_frames` successive openings of this
    /// slot's window and returns the first non-empty frame. An empty frame
    /// means every window timed out (or cancellation was requested).
    pub fn rx_sync(&self, max_frames: u32) -> Frame {
        for _ in 0..max_frames {
            if !self.active.load(Ordering::Relaxed) {
                break;
            }

            let open = self.next_window(self.rx_offset_ms);
            self.clock.sleep_until(open);
            let _hold = self.hold.acquire();
            // Clamp to the window end so a late wakeup cannot bleed into
            // the neighboring slot.
            let deadline = (open + SLOT_MS).saturating_sub(self.clock.now_ms());
            let frame = self.radio.receive(Duration::from_millis(deadline));
            if !frame.is_empty() {
                return frame;
            }
        }

        Frame::new()
    }

    /// Transmits the current wall-clock ms-of-second as a decimal string
    /// and returns the value sent. Only used while trimming offsets.
    pub fn tx_ts_sync(&self) -> Result<u64, Error<R::Error>> {
        self.clock.sleep_until(self.next_window(self.tx_offset_ms));
        let ms = self.clock.ms_of_second();

        let text = ms.to_string();
        let mut frame = [0u8; FRAME_LEN];
        frame[..text.len()].copy_from_slice(text.as_bytes());

        let _hold = self.hold.acquire();
        self.radio.transmit(&frame).map_err(Error::Radio)?;
        Ok(ms)
    }

    /// Absolute wall-clock instant at which this slot's window next opens,
    /// shifted by `offset_ms`.
    ///
    /// With the offset backed out of the current time: extract the
    /// ms-of-second, locate the current frame and slot, and pick this
    /// slot in the current frame if its window is still ahead, otherwise
    /// in the next frame (wrapping past the final frame to the top of the
    /// next second).
    fn next_window(&self, offset_ms: i64) -> u64 {
        let frame_ms = self.scheme.frame_ms() as i64;
        let fps = self.scheme.frames_per_second() as i64;
        let slot = i64::from(self.slot);

        let now_adj = self.clock.now_ms() as i64 - offset_ms;
        let mut second = now_adj.div_euclid(1000);
        let ms = now_adj.rem_euclid(1000);

        let mut frame = ms / frame_ms;
        let cur_slot = (ms % frame_ms) / SLOT_MS as i64;

        // `frame == fps` is the dead air trailing the last whole frame of
        // the second.
        if frame >= fps {
            second += 1;
            frame = 0;
        } else if cur_slot >= slot {
            frame += 1;
            if frame >= fps {
                second += 1;
                frame = 0;
            }
        }

        (second * 1000 + frame * frame_ms + slot * SLOT_MS as i64 + offset_ms) as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{MockClock, MockRadio};

    fn slot_clock(
        slot: u8,
        scheme: Scheme,
        start_ms: u64,
    ) -> (SlotClock<MockRadio, MockClock>, Arc<MockRadio>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(start_ms));
        let radio = Arc::new(MockRadio::new(clock.clone()));
        let active = Arc::new(AtomicBool::new(true));
        let sc = SlotClock::new(
            radio.clone(),
            clock.clone(),
            RadioHold::new(),
            active,
            slot,
            scheme,
        );
        (sc, radio, clock)
    }

    #[test]
    fn scheme_b_slot_3_alignment() {
        // Frame = 160 ms, 6 frames per second: the first opening past
        // t=12.000 s is 12.000 + 0 * 160 + 3 * 20.
        let (sc, radio, clock) = slot_clock(3, Scheme::B, 12_000);
        sc.tx_sync(b"x").unwrap();
        assert_eq!(radio.transmit_times()[0], 12_060);
        assert_eq!(clock.now_ms(), 12_060);
    }

    #[test]
    fn window_already_passed_advances_a_frame() {
        // At 12.070 slot 3's window of frame 0 is open, so the next
        // opening is in frame 1: 12.160 + 0.060.
        let (sc, radio, _) = slot_clock(3, Scheme::B, 12_070);
        sc.tx_sync(b"x").unwrap();
        assert_eq!(radio.transmit_times()[0], 12_220);
    }

    #[test]
    fn dead_air_wraps_to_next_second() {
        // Scheme A: 12 frames cover 960 ms; 12.970 is dead air.
        let (sc, radio, _) = slot_clock(0, Scheme::A, 12_970);
        sc.tx_sync(b"x").unwrap();
        assert_eq!(radio.transmit_times()[0], 13_000);
    }

    #[test]
    fn last_frame_wraps_to_next_second() {
        // Scheme A frame 11 begins at 880 ms; slot 0's window there has
        // passed by 12.900, so the next opening is the top of second 13.
        let (sc, radio, _) = slot_clock(0, Scheme::A, 12_900);
        sc.tx_sync(b"x").unwrap();
        assert_eq!(radio.transmit_times()[0], 13_000);
    }

    #[test]
    fn negative_offset_opens_early() {
        let (mut sc, radio, _) = slot_clock(3, Scheme::B, 12_000);
        sc.set_tx_offset(-70);
        sc.tx_sync(b"x").unwrap();
        // Nominal opening 12.220 (frame 1), issued 70 ms ahead: at
        // 12.000+70 the adjusted clock sits inside slot 3 of frame 0.
        assert_eq!(radio.transmit_times()[0], 12_150);
    }

    #[test]
    fn oversized_payload_rejected() {
        let (sc, radio, _) = slot_clock(0, Scheme::A, 0);
        assert_eq!(sc.tx_sync(&[0u8; 16]), Err(Error::PayloadTooLong));
        assert!(radio.transmit_times().is_empty());
    }

    #[test]
    fn payload_padded_to_frame_len() {
        let (sc, radio, _) = slot_clock(0, Scheme::A, 5);
        sc.tx_sync(b"CLR").unwrap();
        let frames = radio.transmitted();
        assert_eq!(frames[0].len(), FRAME_LEN);
        assert_eq!(&frames[0][..3], b"CLR");
        assert!(frames[0][3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn rx_sync_gives_up_after_max_frames() {
        let (sc, _, clock) = slot_clock(1, Scheme::A, 0);
        let frame = sc.rx_sync(4);
        assert!(frame.is_empty());
        // Four windows were slept through: slot 1 of frames 0-3. The mock
        // receive consumes no virtual time, so the clock rests at the last
        // window's opening.
        assert_eq!(clock.now_ms(), 3 * 80 + 20);
    }

    #[test]
    fn rx_sync_returns_scripted_frame() {
        let (sc, radio, _) = slot_clock(1, Scheme::A, 0);
        radio.queue_rx(b"CTRL-1");
        let frame = sc.rx_sync(4);
        assert_eq!(frame.as_slice(), b"CTRL-1");
    }

    #[test]
    fn tx_ts_sync_reports_ms_of_second() {
        let (sc, radio, _) = slot_clock(2, Scheme::A, 41_003);
        let sent = sc.tx_ts_sync().unwrap();
        assert_eq!(sent, 40);
        assert_eq!(&radio.transmitted()[0][..2], b"40");
    }
}
