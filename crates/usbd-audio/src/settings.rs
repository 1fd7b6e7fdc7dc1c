//! AS IF Settings (spec §3 "AS IF Settings") and the Ring Buffer Queue's
//! per-stream state built on top of [`usbd_ring::CursorRing`].
//!
//! Shared across alternate settings/configurations because the stream
//! characteristics here (rate, buffer geometry, correction state) are
//! speed-independent - only the AS IF's active alt-setting (descriptor,
//! endpoint addresses, max-packet-size) changes with the connection speed.

use usbd_hal_api::config::AudioStreamingCfg;
use usbd_ring::CursorRing;

/// One buffer descriptor's current length. The nominal length
/// (`BufTotalLen`) is fixed at open; the current length varies by ±1
/// frame under built-in correction or rate adjustment.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferDescriptor {
    pub len: u16,
}

/// Record-path non-integer-rate adjustment (spec §4.3 Open, §1.2
/// supplement). Every `period` transfers the emitted buffer is one frame
/// longer than `base_len`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordRateAdjust {
    pub base_len: u16,
    /// Transfers between a +1-frame buffer; `0` means no adjustment (the
    /// rate divides 1000 evenly).
    pub period: u32,
    counter: u32,
}

impl RecordRateAdjust {
    /// Looks up the adjustment period for the three non-integer rates the
    /// original implementation special-cases; any other rate gets `period
    /// = 0` (no adjustment needed).
    pub fn period_for_rate(sample_rate_hz: u32) -> u32 {
        match sample_rate_hz {
            11025 => 40,
            22050 => 20,
            44100 => 10,
            _ => 0,
        }
    }

    pub fn new(base_len: u16, sample_rate_hz: u32) -> Self {
        Self {
            base_len,
            period: Self::period_for_rate(sample_rate_hz),
            counter: 0,
        }
    }

    /// Called once per emitted buffer. Returns the length to use for the
    /// *next* buffer. The counter is intentionally never reset by a
    /// mid-stream SET_CUR (spec §9 Open Questions) - only `new` resets it.
    pub fn note_frame(&mut self, frame_bytes: u16) -> u16 {
        if self.period == 0 {
            return self.base_len;
        }
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            self.base_len + frame_bytes
        } else {
            self.base_len
        }
    }
}

/// Playback synch (explicit feedback) state (spec §4.4 "Playback
/// correction - Synch feedback").
#[derive(Debug, Clone, Copy)]
pub struct PlaybackSynch {
    pub nominal: i32,
    pub current: i32,
    /// Single feedback-buffer free flag; a dropped refresh due to the
    /// buffer being busy is intentional (spec §9 Open Questions).
    free: bool,
    frames_since_refresh: u32,
    refresh_period_frames: u32,
}

const MIN_ADJ: i32 = 1 << 3; // 1/2048 of a sample in 10.14 units (2^14/2048).
const MAX_ADJ: i32 = 1 << 14; // one full sample in 10.14 units.

impl PlaybackSynch {
    pub fn new(nominal: i32, b_refresh: u8) -> Self {
        Self {
            nominal,
            current: nominal,
            free: true,
            frames_since_refresh: 0,
            refresh_period_frames: 1u32 << b_refresh,
        }
    }

    /// Evaluates the controller-variable table (spec §4.4) for the given
    /// buffer-difference metric, updating `current`.
    pub fn evaluate(&mut self, diff: i32, cfg: &AudioStreamingCfg) {
        if diff <= cfg.corr_boundary_heavy_neg {
            self.current = self.nominal + MAX_ADJ;
        } else if diff <= cfg.corr_boundary_light_neg {
            let adjustment = ((cfg.corr_boundary_light_pos.unsigned_abs() as i32) << 14)
                / diff.unsigned_abs().max(1) as i32;
            let adjustment = adjustment.clamp(MIN_ADJ, MAX_ADJ);
            self.current += adjustment;
        } else if diff < cfg.corr_boundary_light_pos {
            self.current = self.nominal;
        } else if diff < cfg.corr_boundary_heavy_pos {
            let adjustment = ((cfg.corr_boundary_light_pos.unsigned_abs() as i32) << 14)
                / diff.unsigned_abs().max(1) as i32;
            let adjustment = adjustment.clamp(MIN_ADJ, MAX_ADJ);
            self.current -= adjustment;
        } else {
            self.current = self.nominal - MAX_ADJ;
        }
    }

    /// Called once per USB (micro)frame. Returns `Some(value)` to
    /// transmit if `2^bRefresh` frames have elapsed since the last
    /// refresh and the single feedback buffer is free; otherwise `None`
    /// (including the case where the buffer was busy - that refresh is
    /// silently dropped, spec §9 Open Questions).
    pub fn on_refresh(&mut self) -> Option<i32> {
        self.frames_since_refresh += 1;
        if self.frames_since_refresh < self.refresh_period_frames {
            return None;
        }
        self.frames_since_refresh = 0;
        if !self.free {
            return None;
        }
        self.free = false;
        Some(self.current)
    }

    /// Called when the synch IN transfer completes, freeing the buffer
    /// for the next refresh.
    pub fn on_transfer_complete(&mut self) {
        self.free = true;
    }
}

/// Streaming flags and buffer-geometry state shared by one AS IF's active
/// and idle alt-settings (spec §3 "AS IF Settings").
pub struct AsIfSettings<const N: usize> {
    pub ring: CursorRing<N>,
    pub cfg: AudioStreamingCfg,
    pub stream_started: bool,
    pub stream_priming_done: bool,
    pub record_rate_adjust: Option<RecordRateAdjust>,
    pub playback_synch: Option<PlaybackSynch>,
    /// USB frame number captured when priming completed; correction is
    /// evaluated only after `corr_period_frames` have elapsed since.
    pub corr_baseline_frame: u16,
}

impl<const N: usize> AsIfSettings<N> {
    pub const fn new(cfg: AudioStreamingCfg) -> Self {
        Self {
            ring: CursorRing::new(),
            cfg,
            stream_started: false,
            stream_priming_done: false,
            record_rate_adjust: None,
            playback_synch: None,
            corr_baseline_frame: 0,
        }
    }

    /// Resets streaming state for a fresh open (spec §4.3/§4.4 "Start").
    pub fn reset_for_start(&mut self) {
        self.ring.reset();
        self.stream_started = true;
        self.stream_priming_done = false;
    }

    pub fn stop(&mut self) {
        self.stream_started = false;
        self.stream_priming_done = false;
        self.record_rate_adjust = None;
        self.playback_synch = None;
    }

    /// Declares priming done once enough buffers have been produced
    /// (spec §4.3/§4.4 "Pre-buffer"); returns whether this call is the
    /// transition (so the caller fires `stream_start` / `RecordPrime`
    /// exactly once).
    pub fn note_produced_and_check_priming(&mut self, current_frame: u16) -> bool {
        if self.stream_priming_done {
            return false;
        }
        if self.ring.producer_consumer_span() as u16 >= self.cfg.stream_pre_buf_max {
            self.stream_priming_done = true;
            self.corr_baseline_frame = current_frame;
            true
        } else {
            false
        }
    }

    /// Whether the correction period has elapsed since the baseline.
    pub fn correction_due(&self, current_frame: u16) -> bool {
        self.stream_priming_done
            && current_frame.wrapping_sub(self.corr_baseline_frame) as u32 >= self.cfg.corr_period_frames
    }

    pub fn rebaseline_correction(&mut self, current_frame: u16) {
        self.corr_baseline_frame = current_frame;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CorrectionOutcome {
    Safe,
    LightOverrun,
    LightUnderrun,
    HeavyOverrun,
    HeavyUnderrun,
}

/// Classifies a buffer-difference metric against the two-threshold
/// heavy/light partition used by both built-in and synch correction
/// (spec §4.3 "Built-in record correction", §4.4 "Synch feedback").
pub fn classify_diff(diff: i32, cfg: &AudioStreamingCfg) -> CorrectionOutcome {
    if diff >= cfg.corr_boundary_heavy_pos {
        CorrectionOutcome::HeavyOverrun
    } else if diff <= cfg.corr_boundary_heavy_neg {
        CorrectionOutcome::HeavyUnderrun
    } else if diff >= cfg.corr_boundary_light_pos {
        CorrectionOutcome::LightOverrun
    } else if diff <= cfg.corr_boundary_light_neg {
        CorrectionOutcome::LightUnderrun
    } else {
        CorrectionOutcome::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_rate_adjust_44100_lengthens_every_tenth_buffer() {
        let mut adj = RecordRateAdjust::new(176, 44100);
        let mut lengths = heapless::Vec::<u16, 40>::new();
        for _ in 0..40 {
            lengths.push(adj.note_frame(4)).unwrap();
        }
        let long_count = lengths.iter().filter(|&&l| l == 180).count();
        assert_eq!(long_count, 4);
        assert_eq!(lengths[9], 180);
        assert_eq!(lengths[19], 180);
    }

    #[test]
    fn record_rate_adjust_integer_rate_never_lengthens() {
        let mut adj = RecordRateAdjust::new(192, 48000);
        for _ in 0..100 {
            assert_eq!(adj.note_frame(4), 192);
        }
    }

    #[test]
    fn classify_diff_partitions_into_five_zones() {
        let cfg = AudioStreamingCfg::default();
        assert_eq!(classify_diff(0, &cfg), CorrectionOutcome::Safe);
        assert_eq!(classify_diff(2, &cfg), CorrectionOutcome::LightOverrun);
        assert_eq!(classify_diff(-2, &cfg), CorrectionOutcome::LightUnderrun);
        assert_eq!(classify_diff(4, &cfg), CorrectionOutcome::HeavyOverrun);
        assert_eq!(classify_diff(-4, &cfg), CorrectionOutcome::HeavyUnderrun);
    }

    #[test]
    fn synch_heavy_overrun_subtracts_one_sample_from_nominal() {
        let cfg = AudioStreamingCfg::default();
        let mut synch = PlaybackSynch::new(0x0B00000, 0);
        synch.evaluate(10, &cfg); // >= heavy_pos(4)
        assert_eq!(synch.current, 0x0B00000 - (1 << 14));
    }

    #[test]
    fn synch_refresh_respects_period_and_busy_buffer() {
        let mut synch = PlaybackSynch::new(1000, 2); // period = 4 frames
        assert_eq!(synch.on_refresh(), None);
        assert_eq!(synch.on_refresh(), None);
        assert_eq!(synch.on_refresh(), None);
        assert_eq!(synch.on_refresh(), Some(1000));
        // Buffer still busy (no transfer-complete yet): next due refresh drops.
        for _ in 0..3 {
            assert_eq!(synch.on_refresh(), None);
        }
        assert_eq!(synch.on_refresh(), None);
        synch.on_transfer_complete();
        for _ in 0..3 {
            assert_eq!(synch.on_refresh(), None);
        }
        assert_eq!(synch.on_refresh(), Some(1000));
    }

    #[test]
    fn priming_transition_fires_exactly_once() {
        let mut settings: AsIfSettings<8> = AsIfSettings::new(AudioStreamingCfg {
            stream_pre_buf_max: 4,
            ..AudioStreamingCfg::default()
        });
        for i in 0..3 {
            settings.ring.producer_start_next();
            settings.ring.producer_end_next();
            assert!(!settings.note_produced_and_check_priming(i));
        }
        settings.ring.producer_start_next();
        settings.ring.producer_end_next();
        assert!(settings.note_produced_and_check_priming(100));
        // A fifth completion must not re-fire the transition.
        settings.ring.producer_start_next();
        settings.ring.producer_end_next();
        assert!(!settings.note_produced_and_check_priming(200));
    }
}
