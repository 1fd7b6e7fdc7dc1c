//! Optional per-AS-IF statistics aggregation (spec §6 "Stats").

use portable_atomic::{AtomicU32, Ordering};

/// Correction-event counters, broken out by severity and by
/// direction-in-safe-zone the way the built-in/synch correction tables
/// in spec §4.4 partition the buffer-difference axis.
#[derive(Default)]
pub struct CorrectionStats {
    safe: AtomicU32,
    light_overrun: AtomicU32,
    light_underrun: AtomicU32,
    heavy_overrun: AtomicU32,
    heavy_underrun: AtomicU32,
}

impl CorrectionStats {
    const fn new() -> Self {
        Self {
            safe: AtomicU32::new(0),
            light_overrun: AtomicU32::new(0),
            light_underrun: AtomicU32::new(0),
            heavy_overrun: AtomicU32::new(0),
            heavy_underrun: AtomicU32::new(0),
        }
    }

    pub fn note_safe(&self) {
        self.safe.fetch_add(1, Ordering::Relaxed);
    }
    pub fn note_light_overrun(&self) {
        self.light_overrun.fetch_add(1, Ordering::Relaxed);
    }
    pub fn note_light_underrun(&self) {
        self.light_underrun.fetch_add(1, Ordering::Relaxed);
    }
    pub fn note_heavy_overrun(&self) {
        self.heavy_overrun.fetch_add(1, Ordering::Relaxed);
    }
    pub fn note_heavy_underrun(&self) {
        self.heavy_underrun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn safe(&self) -> u32 {
        self.safe.load(Ordering::Relaxed)
    }
    pub fn light_overrun(&self) -> u32 {
        self.light_overrun.load(Ordering::Relaxed)
    }
    pub fn light_underrun(&self) -> u32 {
        self.light_underrun.load(Ordering::Relaxed)
    }
    pub fn heavy_overrun(&self) -> u32 {
        self.heavy_overrun.load(Ordering::Relaxed)
    }
    pub fn heavy_underrun(&self) -> u32 {
        self.heavy_underrun.load(Ordering::Relaxed)
    }
}

/// Aggregate counters for one AS IF.
#[derive(Default)]
pub struct AsIfStats {
    pub transfer_completions: AtomicU32,
    pub transfer_submit_errors: AtomicU32,
    pub ring_catchups: AtomicU32,
    pub correction: CorrectionStats,
    pub synch_events: AtomicU32,
}

impl AsIfStats {
    pub const fn new() -> Self {
        Self {
            transfer_completions: AtomicU32::new(0),
            transfer_submit_errors: AtomicU32::new(0),
            ring_catchups: AtomicU32::new(0),
            correction: CorrectionStats::new(),
            synch_events: AtomicU32::new(0),
        }
    }

    pub fn note_completion(&self) {
        self.transfer_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_submit_error(&self) {
        self.transfer_submit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_ring_catchup(&self) {
        self.ring_catchups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_synch_event(&self) {
        self.synch_events.fetch_add(1, Ordering::Relaxed);
    }
}
