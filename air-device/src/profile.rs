//! The node's calibration profile file.
//!
//! Plain-text sections of `key value` lines:
//!
//! ```text
//! [servo]
//! left 520
//! right 1480
//! center 1000
//! [tdma]
//! tx -70
//! rx -5
//! ```
//!
//! A corrupt or missing section leaves that profile absent; only `[tdma]`
//! matters to the coordination core, the rest parameterize the drive and
//! sensor subsystems.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use log::warn;

/// Default location of the profile on a provisioned node.
pub const DEFAULT_PROFILE_PATH: &str = "/etc/air/profile";

const SECTION_SERVO: &str = "[servo]";
const SECTION_TDMA: &str = "[tdma]";
const SECTION_US: &str = "[us]";
const SECTION_TURN: &str = "[turn]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoProfile {
    pub max_left: u32,
    pub max_right: u32,
    pub center: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TdmaProfile {
    pub tx_offset_ms: i64,
    pub rx_offset_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsProfile {
    pub threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnProfile {
    pub right_ms: u32,
    pub right_delay_ms: u32,
    pub left_ms: u32,
    pub left_delay_ms: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Profile {
    servo: Option<ServoProfile>,
    tdma: Option<TdmaProfile>,
    us: Option<UsProfile>,
    turn: Option<TurnProfile>,
}

impl Profile {
    pub fn load(path: &Path) -> io::Result<Profile> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Profile {
        let mut profile = Profile::default();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            match line.trim_end() {
                SECTION_SERVO => {
                    profile.servo = (|| {
                        Some(ServoProfile {
                            max_left: field(&mut lines, "left")?,
                            max_right: field(&mut lines, "right")?,
                            center: field(&mut lines, "center")?,
                        })
                    })();
                    if profile.servo.is_none() {
                        warn!("corrupt [servo] section ignored");
                    }
                }
                SECTION_TDMA => {
                    profile.tdma = (|| {
                        Some(TdmaProfile {
                            tx_offset_ms: field(&mut lines, "tx")?,
                            rx_offset_ms: field(&mut lines, "rx")?,
                        })
                    })();
                    if profile.tdma.is_none() {
                        warn!("corrupt [tdma] section ignored");
                    }
                }
                SECTION_US => {
                    profile.us = (|| Some(UsProfile { threshold: field(&mut lines, "threshold")? }))();
                    if profile.us.is_none() {
                        warn!("corrupt [us] section ignored");
                    }
                }
                SECTION_TURN => {
                    profile.turn = (|| {
                        Some(TurnProfile {
                            right_ms: field(&mut lines, "right")?,
                            right_delay_ms: field(&mut lines, "right_delay")?,
                            left_ms: field(&mut lines, "left")?,
                            left_delay_ms: field(&mut lines, "left_delay")?,
                        })
                    })();
                    if profile.turn.is_none() {
                        warn!("corrupt [turn] section ignored");
                    }
                }
                _ => {}
            }
        }

        profile
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = String::new();

        if let Some(servo) = &self.servo {
            let _ = writeln!(out, "{SECTION_SERVO}");
            let _ = writeln!(out, "left {}", servo.max_left);
            let _ = writeln!(out, "right {}", servo.max_right);
            let _ = writeln!(out, "center {}", servo.center);
        }
        if let Some(tdma) = &self.tdma {
            let _ = writeln!(out, "{SECTION_TDMA}");
            let _ = writeln!(out, "tx {}", tdma.tx_offset_ms);
            let _ = writeln!(out, "rx {}", tdma.rx_offset_ms);
        }
        if let Some(us) = &self.us {
            let _ = writeln!(out, "{SECTION_US}");
            let _ = writeln!(out, "threshold {}", us.threshold);
        }
        if let Some(turn) = &self.turn {
            let _ = writeln!(out, "{SECTION_TURN}");
            let _ = writeln!(out, "right {}", turn.right_ms);
            let _ = writeln!(out, "right_delay {}", turn.right_delay_ms);
            let _ = writeln!(out, "left {}", turn.left_ms);
            let _ = writeln!(out, "left_delay {}", turn.left_delay_ms);
        }

        fs::write(path, out)
    }

    pub fn servo(&self) -> Option<&ServoProfile> {
        self.servo.as_ref()
    }

    pub fn tdma(&self) -> Option<&TdmaProfile> {
        self.tdma.as_ref()
    }

    pub fn us(&self) -> Option<&UsProfile> {
        self.us.as_ref()
    }

    pub fn turn(&self) -> Option<&TurnProfile> {
        self.turn.as_ref()
    }

    pub fn set_servo(&mut self, servo: ServoProfile) {
        self.servo = Some(servo);
    }

    pub fn set_tdma(&mut self, tdma: TdmaProfile) {
        self.tdma = Some(tdma);
    }

    pub fn set_us(&mut self, us: UsProfile) {
        self.us = Some(us);
    }

    pub fn set_turn(&mut self, turn: TurnProfile) {
        self.turn = Some(turn);
    }

    /// A car is drivable once both its servo and TDMA sections exist.
    pub fn is_complete(&self) -> bool {
        self.servo.is_some() && self.tdma.is_some()
    }
}

/// Reads the next line as `<key> <value>`; anything else spoils the
/// section.
fn field<T: FromStr>(lines: &mut std::str::Lines<'_>, key: &str) -> Option<T> {
    let line = lines.next()?;
    let (file_key, value) = line.trim_end().split_once(' ')?;
    if file_key != key {
        return None;
    }
    value.parse().ok()
}
