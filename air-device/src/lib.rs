//! Car requester and intersection arbiter for the AIR slotted-radio
//! coordination protocol.
//!
//! A car binds one [`requester::Requester`] to its slot and negotiates
//! one traversal at a time; the stationary [`arbiter::Arbiter`] binds a
//! sub-machine to every inbound slot and admits at most one vehicle per
//! segment through the shared [`locks::SegmentLocks`] table.
//!
//! Hardware stays outside: the radio is anything implementing
//! `air_tdma::radio::Transceiver`, movement anything implementing
//! [`requester::Motion`], and the wall clock anything implementing
//! `air_tdma::clock::Clock`.

pub mod arbiter;
pub mod identity;
pub mod locks;
pub mod profile;
pub mod requester;

mod entry;
pub use entry::{run_arbiter, run_car, ArbiterNode, CarError, CarOptions, StartError};

/// Every protocol wait spans at most this many frames.
pub const MESSAGE_TIMEOUT_FRAMES: u32 = 4;

#[cfg(test)]
mod test_util;
