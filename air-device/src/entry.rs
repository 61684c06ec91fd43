//! Programmatic entry points for provisioned nodes: identity and profile
//! come from their persistent stores, the radio is brought up on the live
//! channel, and the idle-window drain runs alongside the coordination
//! threads.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use air_encoding::types::Segment;
use air_tdma::clock::Clock;
use air_tdma::drain::{spawn_drain, RadioHold};
use air_tdma::radio::{RfConfig, Transceiver, FREQ_LIVE_KHZ};
use air_tdma::{Scheme, SlotClock};

use log::info;

use crate::arbiter::{Arbiter, ArbiterConfig};
use crate::identity;
use crate::profile::{Profile, DEFAULT_PROFILE_PATH};
use crate::requester::{Motion, Requester, Response};

/// Conditions that keep a node from starting at all.
#[derive(Debug)]
pub enum StartError<E> {
    /// No `[tdma]` calibration on record; configure before use.
    Unconfigured,
    /// The radio rejected enable or configuration.
    RadioConfig(E),
    Identity(identity::Error),
    Profile(io::Error),
    Spawn(io::Error),
}

pub enum CarError<R: Transceiver, M: Motion> {
    Start(StartError<R::Error>),
    Coordination(crate::requester::Error<R, M>),
}

impl<R: Transceiver, M: Motion> std::fmt::Debug for CarError<R, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CarError::Start(e) => write!(f, "Start({e:?})"),
            CarError::Coordination(e) => write!(f, "Coordination({e:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CarOptions {
    pub slot: u8,
    pub scheme: Scheme,
    /// Segment the car currently occupies.
    pub position: Segment,
}

/// Brings the radio up and runs one coordination pass toward `desired`.
/// Blocks until the pass terminates or `active` clears.
pub fn run_car<R, C, M>(
    radio: Arc<R>,
    clock: Arc<C>,
    motion: M,
    options: CarOptions,
    desired: Segment,
    active: Arc<AtomicBool>,
) -> Result<Response, CarError<R, M>>
where
    R: Transceiver + Send + Sync + 'static,
    C: Clock + 'static,
    M: Motion,
{
    let id = identity::node_id()
        .map_err(|e| CarError::Start(StartError::Identity(e)))?
        .clone();
    let profile = Profile::load(Path::new(DEFAULT_PROFILE_PATH))
        .map_err(|e| CarError::Start(StartError::Profile(e)))?;
    let tdma = profile.tdma().ok_or(CarError::Start(StartError::Unconfigured))?;

    radio.enable().map_err(|e| CarError::Start(StartError::RadioConfig(e)))?;
    radio
        .configure(&RfConfig::new(FREQ_LIVE_KHZ))
        .map_err(|e| CarError::Start(StartError::RadioConfig(e)))?;

    let hold = RadioHold::new();
    let (drain, drain_active) = start_drain(radio.clone(), hold.clone());

    let mut slot = SlotClock::new(radio, clock, hold, active.clone(), options.slot, options.scheme);
    slot.set_tx_offset(tdma.tx_offset_ms);
    slot.set_rx_offset(tdma.rx_offset_ms);

    info!("car {id} entering slot {} toward segment {desired}", options.slot);
    let mut requester = Requester::new(slot, id, motion, options.position, active);
    let result = requester.run(desired).map_err(CarError::Coordination);

    drain_active.store(false, Ordering::Relaxed);
    let _ = drain.join();
    result
}

/// A running arbiter node: the per-slot workers plus the idle-window
/// drain.
pub struct ArbiterNode {
    pub arbiter: Arbiter,
    drain: JoinHandle<()>,
    drain_active: Arc<AtomicBool>,
}

impl ArbiterNode {
    pub fn shutdown(self) {
        self.arbiter.shutdown();
        self.drain_active.store(false, Ordering::Relaxed);
        let _ = self.drain.join();
    }
}

/// Brings the radio up and binds an arbiter worker to every slot of the
/// scheme. Returns the running node.
pub fn run_arbiter<R, C>(
    radio: Arc<R>,
    clock: Arc<C>,
    segments: usize,
    scheme: Scheme,
) -> Result<ArbiterNode, StartError<R::Error>>
where
    R: Transceiver + Send + Sync + 'static,
    C: Clock + 'static,
{
    let id = identity::node_id().map_err(StartError::Identity)?.clone();
    let profile = Profile::load(Path::new(DEFAULT_PROFILE_PATH)).map_err(StartError::Profile)?;
    let tdma = profile.tdma().ok_or(StartError::Unconfigured)?;

    radio.enable().map_err(StartError::RadioConfig)?;
    radio
        .configure(&RfConfig::new(FREQ_LIVE_KHZ))
        .map_err(StartError::RadioConfig)?;

    let hold = RadioHold::new();
    let (drain, drain_active) = start_drain(radio.clone(), hold.clone());

    let config = ArbiterConfig {
        segments,
        scheme,
        tx_offset_ms: tdma.tx_offset_ms,
        rx_offset_ms: tdma.rx_offset_ms,
    };
    info!("arbiter {id} watching {segments} segments on {scheme:?}");
    let arbiter = match Arbiter::spawn(radio, clock, hold, id, config) {
        Ok(arbiter) => arbiter,
        Err(error) => {
            drain_active.store(false, Ordering::Relaxed);
            let _ = drain.join();
            return Err(StartError::Spawn(error));
        }
    };

    Ok(ArbiterNode { arbiter, drain, drain_active })
}

fn start_drain<R>(radio: Arc<R>, hold: Arc<RadioHold>) -> (JoinHandle<()>, Arc<AtomicBool>)
where
    R: Transceiver + Send + Sync + 'static,
{
    let drain_active = Arc::new(AtomicBool::new(true));
    let drain = spawn_drain(radio, hold, drain_active.clone());
    (drain, drain_active)
}
