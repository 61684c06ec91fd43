//! The transceiver contract the slot layer drives.

use core::fmt;
use std::time::Duration;

/// Payload bytes carried by one on-air frame.
pub const FRAME_LEN: usize = 15;

/// A received frame, empty on timeout.
pub type Frame = heapless::Vec<u8, FRAME_LEN>;

/// Demo channel frequency in kHz.
pub const FREQ_DEMO_KHZ: u32 = 433_900;
/// Calibration channel frequency in kHz.
pub const FREQ_CALIBRATION_KHZ: u32 = 434_900;
/// Live coordination channel frequency in kHz.
pub const FREQ_LIVE_KHZ: u32 = 435_900;

/// Serial and FSK bitrates understood by the radio module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataRate {
    Dr1200 = 0,
    Dr2400 = 1,
    Dr4800 = 2,
    Dr9600 = 3,
    Dr19200 = 4,
    Dr38400 = 5,
    Dr57600 = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Even = 1,
    Odd = 2,
}

/// RF parameter set. The module echoes the parameters back on
/// [`Transceiver::configure`]; a mismatch is a configuration rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfConfig {
    pub freq_khz: u32,
    pub fsk_rate: DataRate,
    pub power: u8,
    pub uart_rate: DataRate,
    pub parity: Parity,
}

impl RfConfig {
    pub fn new(freq_khz: u32) -> Self {
        RfConfig {
            freq_khz,
            fsk_rate: DataRate::Dr9600,
            power: 9,
            uart_rate: DataRate::Dr9600,
            parity: Parity::None,
        }
    }

    /// Checks the module's accepted parameter ranges: 418000-455000 kHz,
    /// FSK rate 2400-19200 bps, power 0-9.
    pub fn is_valid(&self) -> bool {
        (418_000..=455_000).contains(&self.freq_khz)
            && (DataRate::Dr2400..=DataRate::Dr19200).contains(&self.fsk_rate)
            && self.power <= 9
    }
}

/// Half-duplex byte-frame radio. One instance is shared by every slot
/// binding on a node; the slot clock serializes access, so methods take
/// `&self` and implementations keep any serial-port state behind their own
/// interior mutability.
pub trait Transceiver {
    type Error: fmt::Debug;

    /// Idempotent; the module settles within 50 ms.
    fn enable(&self) -> Result<(), Self::Error>;

    /// Idempotent; the module settles within 50 ms.
    fn disable(&self) -> Result<(), Self::Error>;

    /// Applies an RF parameter set. Fails if the module does not echo the
    /// expected confirmation.
    fn configure(&self, config: &RfConfig) -> Result<(), Self::Error>;

    /// Transmits one frame of at most [`FRAME_LEN`] bytes; succeeds or
    /// fails atomically.
    fn transmit(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Blocks up to the deadline; an empty frame means nothing was heard.
    fn receive(&self, deadline: Duration) -> Frame;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_ranges() {
        assert!(RfConfig::new(FREQ_LIVE_KHZ).is_valid());
        assert!(!RfConfig::new(400_000).is_valid());
        let mut cfg = RfConfig::new(FREQ_DEMO_KHZ);
        cfg.fsk_rate = DataRate::Dr38400;
        assert!(!cfg.is_valid());
        cfg.fsk_rate = DataRate::Dr2400;
        cfg.power = 10;
        assert!(!cfg.is_valid());
    }
}
