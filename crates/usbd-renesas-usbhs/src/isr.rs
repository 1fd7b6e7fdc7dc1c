//! ISR decoding (spec §4.1 "ISR decoding").
//!
//! The hardware ISR is one long dispatch switch in the original driver;
//! here it decomposes into small handlers per interrupt source, each
//! returning the events it produced, invoked from [`dispatch`] - a single
//! top-level function that reads the snapshot of register state once
//! ([`IsrSnapshot`]) and writes nothing back except through the handlers.
//! `Regs::dummy_read_x3` is called last, to force register-write
//! ordering before interrupt return (spec §1.2 supplement).

use heapless::Vec;

use crate::fifo::DfifoChannel;
use crate::regs::{Ctsq, DeviceState, Regs};

const MAX_EVENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IsrEvent {
    VbusChanged(bool),
    Reset,
    Addressed(u8),
    Configured,
    HighSpeedDetected,
    SetupReceived([u8; 8]),
    DmaComplete(DfifoChannel),
    BufferEmpty(u8),
    BufferReady(u8),
}

/// A single ISR entry's worth of raw observations, gathered by the
/// caller from the register block (or, in tests, fabricated directly).
/// Splitting inputs out like this keeps the decoding logic testable
/// without needing a full bit-accurate register simulation.
#[derive(Default, Clone)]
pub struct IsrSnapshot {
    pub vbus_sample: Option<bool>,
    pub device_state: Option<DeviceState>,
    pub ctsq: Option<Ctsq>,
    pub setup_fields: Option<[u8; 8]>,
    pub dma_complete: Option<DfifoChannel>,
    pub bemp_endpoints: Vec<u8, 16>,
    pub brdy_endpoints: Vec<u8, 16>,
}

/// Three-sample VBUS debounce (spec §4.1): three reads spaced 10 µs
/// apart must agree before a VBUS change is reported.
#[derive(Default)]
pub struct VbusDebounce {
    last_reported: Option<bool>,
}

impl VbusDebounce {
    pub const fn new() -> Self {
        Self { last_reported: None }
    }

    /// `samples` must already be spaced at the debounce interval; returns
    /// `Some(level)` only when all agree and it differs from the last
    /// reported level.
    pub fn evaluate(&mut self, samples: &[bool]) -> Option<bool> {
        if samples.is_empty() || !samples.iter().all(|&s| s == samples[0]) {
            return None;
        }
        let level = samples[0];
        if self.last_reported == Some(level) {
            return None;
        }
        self.last_reported = Some(level);
        Some(level)
    }
}

fn handle_device_state(prev: &mut Option<DeviceState>, state: DeviceState, addr: u8, events: &mut Vec<IsrEvent, MAX_EVENTS>) {
    if *prev == Some(state) {
        return;
    }
    match state {
        DeviceState::Default => {
            let _ = events.push(IsrEvent::Reset);
        }
        DeviceState::Addressed => {
            let _ = events.push(IsrEvent::Addressed(addr));
        }
        DeviceState::Configured => {
            let _ = events.push(IsrEvent::Configured);
        }
        DeviceState::Powered => {}
    }
    *prev = Some(state);
}

fn handle_ctsq(ctsq: Ctsq, setup_fields: Option<[u8; 8]>, events: &mut Vec<IsrEvent, MAX_EVENTS>) {
    // RD_DATA, WR_DATA and WR_STATUS_NDATA all indicate a fresh setup
    // stage the stack hasn't seen yet (spec §4.1).
    if matches!(ctsq, Ctsq::ReadDataStage | Ctsq::WriteDataStage | Ctsq::WriteStatusNoDataStage) {
        if let Some(fields) = setup_fields {
            let _ = events.push(IsrEvent::SetupReceived(fields));
        }
    }
}

/// Decodes one ISR entry's snapshot into the ordered events it produced.
/// `prev_device_state` is threaded across calls by the caller so repeated
/// reports of the same state don't re-fire `reset`/`addr`/`configured`.
pub fn dispatch<R: Regs>(
    regs: &R,
    snapshot: &IsrSnapshot,
    debounce: &mut VbusDebounce,
    prev_device_state: &mut Option<DeviceState>,
) -> Vec<IsrEvent, MAX_EVENTS> {
    let mut events = Vec::new();

    if let Some(sample) = snapshot.vbus_sample {
        if let Some(level) = debounce.evaluate(&[sample]) {
            let _ = events.push(IsrEvent::VbusChanged(level));
        }
    }

    if let Some(state) = snapshot.device_state {
        let addr = regs.usbaddr();
        handle_device_state(prev_device_state, state, addr, &mut events);
    }

    if regs.is_high_speed() {
        let _ = events.push(IsrEvent::HighSpeedDetected);
    }

    if let Some(ctsq) = snapshot.ctsq {
        handle_ctsq(ctsq, snapshot.setup_fields, &mut events);
    }

    if let Some(channel) = snapshot.dma_complete {
        let _ = events.push(IsrEvent::DmaComplete(channel));
    }

    for &ep in &snapshot.brdy_endpoints {
        let _ = events.push(IsrEvent::BufferReady(ep));
    }
    for &ep in &snapshot.bemp_endpoints {
        let _ = events.push(IsrEvent::BufferEmpty(ep));
    }

    regs.dummy_read_x3();
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::fake::FakeRegs;

    #[test]
    fn vbus_debounce_requires_three_agreeing_samples() {
        let mut d = VbusDebounce::new();
        assert_eq!(d.evaluate(&[true, true, false]), None);
        assert_eq!(d.evaluate(&[true, true, true]), Some(true));
        // Reporting the same stable level again produces nothing new.
        assert_eq!(d.evaluate(&[true, true, true]), None);
    }

    #[test]
    fn bus_reset_to_addressed_yields_reset_then_addressed() {
        let mut regs = FakeRegs::default();
        regs.write16(crate::regs::offset::USBADDR, 7);
        let mut debounce = VbusDebounce::new();
        let mut prev_state = None;

        let reset_snapshot = IsrSnapshot {
            device_state: Some(DeviceState::Default),
            ..Default::default()
        };
        let events = dispatch(&regs, &reset_snapshot, &mut debounce, &mut prev_state);
        assert_eq!(events.as_slice(), &[IsrEvent::Reset]);

        let addr_snapshot = IsrSnapshot {
            device_state: Some(DeviceState::Addressed),
            ..Default::default()
        };
        let events = dispatch(&regs, &addr_snapshot, &mut debounce, &mut prev_state);
        assert_eq!(events.as_slice(), &[IsrEvent::Addressed(7)]);

        // Repeating the same state produces no further event.
        let events = dispatch(&regs, &addr_snapshot, &mut debounce, &mut prev_state);
        assert!(events.is_empty());
    }

    #[test]
    fn ctsq_read_data_stage_surfaces_setup_fields() {
        let regs = FakeRegs::default();
        let mut debounce = VbusDebounce::new();
        let mut prev_state = None;
        let snapshot = IsrSnapshot {
            ctsq: Some(Ctsq::ReadDataStage),
            setup_fields: Some([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]),
            ..Default::default()
        };
        let events = dispatch(&regs, &snapshot, &mut debounce, &mut prev_state);
        assert_eq!(
            events.as_slice(),
            &[IsrEvent::SetupReceived([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00])]
        );
    }
}
