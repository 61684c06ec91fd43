//! Transmit-offset calibration against a stationary helper with a
//! known-good clock.
//!
//! The node under calibration transmits its ms-of-second in its slot; the
//! helper answers with its own ms-of-second at the moment the frame
//! arrived (it backs its reply turnaround out of the value). The residual
//! between the echo and the node's nominal window is folded into the
//! transmit offset until it settles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};

use crate::clock::Clock;
use crate::radio::{Frame, Transceiver, FRAME_LEN};
use crate::slot::{self, SlotClock};

/// A residual is acceptable when its magnitude is below this.
pub const RESIDUAL_TOLERANCE_MS: i64 = 5;
/// Consecutive acceptable residuals required to declare convergence.
pub const CONVERGENCE_STREAK: usize = 5;
/// Calibration passes before giving up.
pub const MAX_ITERATIONS: usize = 20;
/// The helper's reply turnaround, backed out of every echo.
pub const TURNAROUND_MS: u64 = 13;

/// How long the calibrating node waits for each echo. The helper answers
/// immediately, outside any slot schedule.
const ECHO_DEADLINE: Duration = Duration::from_millis(50);

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// Residuals failed to settle within the pass limit.
    Diverged,
    Radio(slot::Error<E>),
}

impl<E> From<slot::Error<E>> for Error<E> {
    fn from(error: slot::Error<E>) -> Self {
        Error::Radio(error)
    }
}

/// Iteratively trims the slot's transmit offset until five consecutive
/// residuals land within ±5 ms. Returns the negotiated offset, which the
/// caller persists in the calibration profile.
pub fn trim_tx_offset<R: Transceiver, C: Clock>(
    slot: &mut SlotClock<R, C>,
) -> Result<i64, Error<R::Error>> {
    let mut streak = 0;

    for pass in 0..MAX_ITERATIONS {
        let sent = slot.tx_ts_sync()?;
        let echo = slot.radio().receive(ECHO_DEADLINE);
        let Some(echo_ms) = parse_ms(&echo) else {
            debug!("calibration pass {pass}: no echo");
            streak = 0;
            continue;
        };

        // Echo minus the value sent is the clock skew seen by the helper;
        // relative to the nominal window boundary the residual also
        // carries the current offset.
        let mut delta = echo_ms - sent as i64;
        if delta > 500 {
            delta -= 1000;
        } else if delta < -500 {
            delta += 1000;
        }
        let residual = delta + slot.tx_offset();

        if residual.abs() < RESIDUAL_TOLERANCE_MS {
            streak += 1;
        } else {
            streak = 0;
        }
        slot.set_tx_offset(slot.tx_offset() - residual);
        debug!(
            "calibration pass {pass}: residual {residual} ms, offset {} ms",
            slot.tx_offset()
        );

        if streak >= CONVERGENCE_STREAK {
            info!("tx offset calibrated to {} ms", slot.tx_offset());
            return Ok(slot.tx_offset());
        }
    }

    Err(Error::Diverged)
}

/// The stationary helper loop: answer every frame heard on the
/// calibration channel with the local ms-of-second at its arrival.
/// Runs until `active` clears.
pub fn assist<R: Transceiver, C: Clock>(
    radio: &R,
    clock: &C,
    active: &AtomicBool,
) -> Result<(), R::Error> {
    while active.load(Ordering::Relaxed) {
        let request = radio.receive(Duration::from_millis(50));
        if request.is_empty() {
            continue;
        }

        let ms = (clock.ms_of_second() + 1000 - TURNAROUND_MS) % 1000;
        let text = ms.to_string();
        let mut frame = [0u8; FRAME_LEN];
        frame[..text.len()].copy_from_slice(text.as_bytes());
        radio.transmit(&frame)?;
    }

    Ok(())
}

fn parse_ms(frame: &Frame) -> Option<i64> {
    let end = frame.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    let text = core::str::from_utf8(&frame[..end]).ok()?;
    let ms: i64 = text.parse().ok()?;
    (0..1000).contains(&ms).then_some(ms)
}
