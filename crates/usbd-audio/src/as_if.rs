//! AS IF table and the top-level subsystem owner (spec §3 "AudioStreaming
//! Interface (AS IF)", §9 Design Notes).
//!
//! The source's cyclic `AS_IF <-> Settings <-> Alt_Cfg` globals become one
//! arena of fixed-capacity slots owned by [`AudioProcessingState`]; every
//! cross-reference a caller holds onto across an `await` or an ISR boundary
//! is a stable `u8` index plus the generation-counted [`AsIfHandle`], never
//! a pointer into the arena.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use usbd_hal_api::config::AudioStreamingCfg;
use usbd_hal_api::error::AudioError;
use usbd_hal_api::stats::AsIfStats;
use usbd_hal_api::types::{AsIfHandle, EpAddr, StreamDirection};

use crate::entities::EntityTable;
use crate::settings::AsIfSettings;

/// The endpoint addresses and max-packet-size of whichever alternate
/// setting is currently selected for an AS IF (spec §3 "AudioStreaming
/// Interface (AS IF)"). `None` while the interface sits on alt-setting 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActiveAltSetting {
    pub data_ep: EpAddr,
    pub synch_ep: Option<EpAddr>,
    pub max_packet_size: u16,
}

/// Everything guarded by the per-AS-IF lock (spec §5 "Per-AS-IF lock"):
/// the active alt-setting descriptor and the streaming settings together,
/// since `SET_INTERFACE` and stream start/stop mutate both atomically.
pub struct AsIfState<const N: usize> {
    pub alt: Option<ActiveAltSetting>,
    pub settings: AsIfSettings<N>,
}

/// One AS IF arena slot. Allocation state and the generation counter live
/// outside the lock so a handle can be validated before paying for lock
/// acquisition (spec §3 "Handle (Generation Counter)").
pub struct AsIf<const N: usize> {
    direction: StreamDirection,
    allocated: AtomicBool,
    generation: AtomicU8,
    state: Mutex<CriticalSectionRawMutex, AsIfState<N>>,
    pub stats: AsIfStats,
}

impl<const N: usize> AsIf<N> {
    const fn new(cfg: AudioStreamingCfg, direction: StreamDirection) -> Self {
        Self {
            direction,
            allocated: AtomicBool::new(false),
            generation: AtomicU8::new(0),
            state: Mutex::new(AsIfState { alt: None, settings: AsIfSettings::new(cfg) }),
            stats: AsIfStats::new(),
        }
    }

    pub fn direction(&self) -> StreamDirection {
        self.direction
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    fn generation(&self) -> u8 {
        self.generation.load(Ordering::Acquire)
    }

    /// Checks a handle against the slot's current generation, the guard
    /// every deferred completion runs before touching this slot's state
    /// (spec §5 "Cancellation").
    pub fn validate(&self, handle: AsIfHandle) -> bool {
        self.allocated.load(Ordering::Acquire) && handle.generation() == self.generation()
    }

    /// Locks the AS IF state with the configured timeout (spec §5
    /// "Per-AS-IF lock ... Acquired with a 1000 ms timeout; timeout is
    /// logged and the operation abandoned"). `embassy-sync`'s mutex has no
    /// built-in timeout, so this races the lock future against
    /// `embassy_time::Timer::after_millis`.
    pub async fn lock(
        &self,
        timeout_ms: u32,
    ) -> Result<embassy_sync::mutex::MutexGuard<'_, CriticalSectionRawMutex, AsIfState<N>>, AudioError> {
        use embassy_futures::select::{select, Either};
        match select(self.state.lock(), embassy_time::Timer::after_millis(timeout_ms as u64)).await {
            Either::First(guard) => Ok(guard),
            Either::Second(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("AS IF lock timed out after {} ms", timeout_ms);
                Err(AudioError::LockTimeout)
            }
        }
    }

    /// Claims this slot for a newly opened AS IF, returning a handle built
    /// from the slot's current generation (bumped by the prior `release`,
    /// if any, so a stale handle from a past occupant no longer validates).
    fn allocate(&self, index: u8) -> Option<AsIfHandle> {
        if self.allocated.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return None;
        }
        Some(AsIfHandle::new(index, self.generation()))
    }

    /// Releases this slot (spec §5 "Cancellation" - "AS-IF-stop invalidates
    /// the handle"). Wrapping add is intentional: a generation that cycles
    /// back to a stale value after 256 opens is an accepted, documented
    /// limitation (see DESIGN.md), not a correctness bug this code guards.
    fn release(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.allocated.store(false, Ordering::Release);
    }
}

/// Deprecated Record-path buffer-free hook (spec §9 Open Questions): the
/// source exposed `USBD_Audio_RecordBufFree` for manual buffer release,
/// made redundant once the ring buffer queue tracks consumption itself.
/// Kept here as a no-op so callers ported from the original API keep
/// compiling; no caller may depend on it having any effect.
pub fn record_buf_free(_handle: AsIfHandle) {}

/// Owns the entity graph and the AS IF arena - the single
/// `AudioProcessingState` spec §9 Design Notes calls for in place of the
/// source's scattered globals. `SLOTS` bounds how many AS IFs (isochronous
/// interfaces) the function supports; `N` is the ring buffer queue depth
/// shared by every AS IF's settings.
pub struct AudioProcessingState<const SLOTS: usize, const N: usize> {
    entities: EntityTable,
    as_ifs: [AsIf<N>; SLOTS],
}

impl<const SLOTS: usize, const N: usize> AudioProcessingState<SLOTS, N> {
    /// `directions[i]` fixes AS IF slot `i`'s role for the function's
    /// lifetime - record and playback endpoints are distinct interfaces
    /// in the descriptor set, so this never changes after construction.
    pub fn new(cfg: AudioStreamingCfg, directions: [StreamDirection; SLOTS]) -> Self {
        let mut i = 0;
        Self {
            entities: EntityTable::new(),
            as_ifs: core::array::from_fn(|_| {
                let dir = directions[i];
                i += 1;
                AsIf::new(cfg, dir)
            }),
        }
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityTable {
        &mut self.entities
    }

    pub fn as_if(&self, index: u8) -> Option<&AsIf<N>> {
        self.as_ifs.get(index as usize)
    }

    /// Finds the first free slot matching `direction` and allocates it
    /// (spec §3 "AudioStreaming Interface (AS IF)" opening sequence).
    /// `Err(AudioError::NoFreeAsIf)` surfaces resource exhaustion to the
    /// caller rather than panicking (spec §9 Edge Cases).
    pub fn open(&self, direction: StreamDirection) -> Result<AsIfHandle, AudioError> {
        for (index, as_if) in self.as_ifs.iter().enumerate() {
            if as_if.direction() != direction {
                continue;
            }
            if let Some(handle) = as_if.allocate(index as u8) {
                return Ok(handle);
            }
        }
        Err(AudioError::NoFreeAsIf)
    }

    /// Releases the slot named by `handle` after validating it, the
    /// counterpart to [`Self::open`] (spec §5 "Cancellation").
    pub fn close(&self, handle: AsIfHandle) -> Result<(), AudioError> {
        let as_if = self.as_if(handle.index()).ok_or(AudioError::StaleHandle)?;
        if !as_if.validate(handle) {
            return Err(AudioError::StaleHandle);
        }
        as_if.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AudioProcessingState<2, 8> {
        AudioProcessingState::new(AudioStreamingCfg::default(), [StreamDirection::Record, StreamDirection::Playback])
    }

    #[test]
    fn open_picks_the_slot_matching_direction() {
        let state = state();
        let handle = state.open(StreamDirection::Playback).unwrap();
        assert_eq!(handle.index(), 1);
    }

    #[test]
    fn open_fails_once_the_matching_direction_is_exhausted() {
        let state = state();
        state.open(StreamDirection::Record).unwrap();
        let err = state.open(StreamDirection::Record).unwrap_err();
        assert_eq!(err, AudioError::NoFreeAsIf);
    }

    #[test]
    fn close_bumps_generation_so_the_old_handle_goes_stale() {
        let state = state();
        let handle = state.open(StreamDirection::Record).unwrap();
        state.close(handle).unwrap();
        let as_if = state.as_if(handle.index()).unwrap();
        assert!(!as_if.validate(handle));

        let reopened = state.open(StreamDirection::Record).unwrap();
        assert_eq!(reopened.index(), handle.index());
        assert_ne!(reopened.generation(), handle.generation());
    }

    #[test]
    fn close_rejects_a_handle_from_a_prior_generation() {
        let state = state();
        let handle = state.open(StreamDirection::Record).unwrap();
        state.close(handle).unwrap();
        state.open(StreamDirection::Record).unwrap();
        let err = state.close(handle).unwrap_err();
        assert_eq!(err, AudioError::StaleHandle);
    }
}
