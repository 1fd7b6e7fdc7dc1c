//! Record path (spec §4.3 "Audio Processing — Record Path").
//!
//! Functions here are free functions over [`AsIfSettings`] rather than
//! methods on a stateful path object: the driver ISR, the deferred
//! completion context and the record worker task each hold the per-AS-IF
//! lock for the duration of one call, so there is no path-local state to
//! own beyond what already lives in `AsIfSettings`.

use usbd_hal_api::codec::AudioCodec;
use usbd_hal_api::error::AudioError;
use usbd_hal_api::stats::AsIfStats;

use crate::settings::{AsIfSettings, RecordRateAdjust};

/// Per-millisecond record buffer length in bytes (spec §4.3 "Open").
pub const fn per_ms_buffer_len(sample_rate_hz: u32, subframe_size: u16, channels: u8) -> u16 {
    ((sample_rate_hz / 1000) as u16) * subframe_size * channels as u16
}

/// Opens the record path: computes the nominal per-millisecond buffer
/// length and installs the non-integer-rate adjustment period, if any.
pub fn open<const N: usize>(
    settings: &mut AsIfSettings<N>,
    sample_rate_hz: u32,
    subframe_size: u16,
    channels: u8,
) -> u16 {
    let base_len = per_ms_buffer_len(sample_rate_hz, subframe_size, channels);
    settings.record_rate_adjust = Some(RecordRateAdjust::new(base_len, sample_rate_hz));
    base_len
}

/// Starts the record stream: resets the ring, invokes the codec's
/// `stream_start`, marks the AS IF active (spec §4.3 "Start").
pub fn start<const N: usize>(
    settings: &mut AsIfSettings<N>,
    codec: &mut impl AudioCodec,
    handle: u16,
    term_id: u8,
) -> Result<(), AudioError> {
    settings.reset_for_start();
    codec.stream_start(handle, term_id)
}

/// Reserves the consumer slot an outgoing isoc-IN transfer will drain
/// (spec §4.3 "submits as many queued IN transfers"/"RecordPrime"):
/// called once per transfer handed to the controller, before its
/// completion is known. Returns `None` if the ring has nothing produced
/// yet to claim (the controller must not submit in that case).
pub fn submit_in_transfer<const N: usize>(settings: &mut AsIfSettings<N>) -> Option<usize> {
    settings.ring.consumer_start_next()
}

/// Evaluates built-in record correction for one frame against the
/// buffer-difference metric, returning the byte delta to apply to the
/// *next* buffer's length (spec §4.3 "Built-in record correction"): only
/// the heavy thresholds apply to the record path, unlike playback synch
/// which also reacts to the light ones.
pub fn correction_delta_bytes<const N: usize>(settings: &AsIfSettings<N>, frame_bytes: u16) -> i32 {
    let diff = settings.ring.buffer_diff(settings.cfg.stream_pre_buf_max);
    if diff >= settings.cfg.corr_boundary_heavy_pos {
        -(frame_bytes as i32)
    } else if diff <= settings.cfg.corr_boundary_heavy_neg {
        frame_bytes as i32
    } else {
        0
    }
}

/// Runs one isoc-IN completion's worth of record steady-state work (spec
/// §4.3 "Steady state"): advances `ConsumerEnd`, computes the next
/// buffer's length from the rate-adjustment schedule, and folds in
/// built-in correction if the correction period has elapsed.
///
/// `frame_bytes` is one sample-frame's worth of bytes
/// (`subframe_size * channels`), the unit both the rate adjustment and
/// the correction delta operate in.
pub fn on_isoc_in_complete<const N: usize>(
    settings: &mut AsIfSettings<N>,
    stats: &AsIfStats,
    current_frame: u16,
    frame_bytes: u16,
) -> Result<u16, AudioError> {
    stats.note_completion();
    if settings.ring.consumer_end_next().is_none() {
        stats.note_ring_catchup();
        return Err(AudioError::RingExhausted);
    }

    let mut next_len = {
        let adjust = settings.record_rate_adjust.as_mut().ok_or(AudioError::Unsupported)?;
        adjust.note_frame(frame_bytes)
    };

    if settings.correction_due(current_frame) {
        let delta = correction_delta_bytes(settings, frame_bytes);
        next_len = (next_len as i32 + delta).max(0) as u16;
        if delta > 0 {
            stats.correction.note_heavy_underrun();
        } else if delta < 0 {
            stats.correction.note_heavy_overrun();
        } else {
            stats.correction.note_safe();
        }
        settings.rebaseline_correction(current_frame);
    }

    Ok(next_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbd_hal_api::config::AudioStreamingCfg;

    #[test]
    fn per_ms_buffer_len_matches_scenario_4_nominal() {
        // 44.1kHz treated as 44 samples/ms * 2 bytes * 2 channels = 176.
        assert_eq!(per_ms_buffer_len(44100, 2, 2), 176);
    }

    #[test]
    fn correction_delta_shortens_on_heavy_overrun() {
        let mut settings: AsIfSettings<8> = AsIfSettings::new(AudioStreamingCfg::default());
        for _ in 0..5 {
            settings.ring.producer_start_next();
            settings.ring.producer_end_next();
        }
        // span=5, pre_buf_max default=4 -> diff=1, not yet heavy(4); push more.
        for _ in 0..3 {
            settings.ring.producer_start_next();
            settings.ring.producer_end_next();
        }
        let delta = correction_delta_bytes(&settings, 4);
        assert_eq!(delta, -4);
    }

    #[test]
    fn correction_delta_is_zero_in_safe_zone() {
        let settings: AsIfSettings<8> = AsIfSettings::new(AudioStreamingCfg::default());
        assert_eq!(correction_delta_bytes(&settings, 4), 0);
    }

    #[test]
    fn isoc_in_complete_requires_a_reserved_consumer_slot() {
        let mut settings: AsIfSettings<8> = AsIfSettings::new(AudioStreamingCfg::default());
        settings.reset_for_start();
        open(&mut settings, 44100, 2, 2);
        let stats = AsIfStats::new();

        // The codec must produce before the controller can submit an IN
        // transfer draining that data.
        settings.ring.producer_start_next().unwrap();
        settings.ring.producer_end_next().unwrap();

        submit_in_transfer(&mut settings).unwrap();
        let next_len = on_isoc_in_complete(&mut settings, &stats, 0, 176).unwrap();
        assert_eq!(next_len, 176);
    }
}
