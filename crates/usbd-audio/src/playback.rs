//! Playback path (spec §4.4 "Audio Processing — Playback Path").

use usbd_hal_api::codec::AudioCodec;
use usbd_hal_api::error::AudioError;
use usbd_hal_api::stats::AsIfStats;

use crate::correction::{insert_sample, remove_sample, SampleWidth};
use crate::settings::{classify_diff, AsIfSettings, CorrectionOutcome, PlaybackSynch};

/// Computes the 10.14-format nominal feedback value for a full-speed
/// synch endpoint (spec §4.4 "Open"): `((rate/1000) << 14) |
/// (((rate%1000) << 14) / 1000)`.
pub const fn nominal_feedback_fs(sample_rate_hz: u32) -> i32 {
    let whole = (sample_rate_hz / 1000) << 14;
    let frac = ((sample_rate_hz % 1000) << 14) / 1000;
    (whole | frac) as i32
}

/// High-speed equivalent: the feedback value carries samples per
/// microframe (125 µs), an extra factor of 8 relative to full-speed's
/// per-millisecond cadence.
pub const fn nominal_feedback_hs(sample_rate_hz: u32) -> i32 {
    let per_uframe_whole = (sample_rate_hz / 8000) << 14;
    let per_uframe_frac = (((sample_rate_hz % 8000) as u64) << 14) / 8000;
    (per_uframe_whole as i64 | per_uframe_frac as i64) as i32
}

/// Opens the playback path. If `b_refresh` is `Some`, a synch endpoint
/// is configured and feedback state is initialized (spec §4.4 "Open");
/// `None` means built-in correction will be used instead.
pub fn open<const N: usize>(settings: &mut AsIfSettings<N>, sample_rate_hz: u32, high_speed: bool, b_refresh: Option<u8>) {
    settings.playback_synch = b_refresh.map(|b_refresh| {
        let nominal = if high_speed {
            nominal_feedback_hs(sample_rate_hz)
        } else {
            nominal_feedback_fs(sample_rate_hz)
        };
        PlaybackSynch::new(nominal, b_refresh)
    });
}

/// Starts the playback stream by priming the ring from the host: submits
/// the first isoc-OUT. Pure bookkeeping here - actual transfer submission
/// is the controller driver's job, invoked by the caller after this
/// returns (spec §4.4 "Start").
pub fn start<const N: usize>(settings: &mut AsIfSettings<N>) {
    settings.reset_for_start();
}

/// Reserves the producer slot an outgoing isoc-OUT transfer will fill
/// (spec §4.4 "submit ... OUT transfers"): called once per transfer handed
/// to the controller, before its completion is known. Returns `None` if
/// the ring has no free slot to reserve (the controller must not submit
/// in that case).
pub fn submit_out_transfer<const N: usize>(settings: &mut AsIfSettings<N>) -> Option<usize> {
    settings.ring.producer_start_next()
}

/// Runs one isoc-OUT completion's worth of pre-buffer/steady-state work
/// (spec §4.4 "Pre-buffer", "Steady state — USB"): advances
/// `ProducerEnd`, and if priming just completed invokes `stream_start`.
pub fn on_isoc_out_complete<const N: usize>(
    settings: &mut AsIfSettings<N>,
    stats: &AsIfStats,
    codec: &mut impl AudioCodec,
    handle: u16,
    term_id: u8,
    current_frame: u16,
) -> Result<bool, AudioError> {
    stats.note_completion();
    if settings.ring.producer_end_next().is_none() {
        stats.note_ring_catchup();
        return Err(AudioError::RingExhausted);
    }
    if settings.note_produced_and_check_priming(current_frame) {
        codec.stream_start(handle, term_id)?;
        return Ok(true);
    }
    Ok(false)
}

/// Runs the playback worker task's per-wake work (spec §4.4 "Steady
/// state — codec"): pulls one ready buffer via `consumer_start_next`,
/// optionally applies correction (synch refresh already handled
/// separately; this covers the built-in path), forwards it to the codec.
pub fn drain_one_ready_buffer<const N: usize>(
    settings: &mut AsIfSettings<N>,
    stats: &AsIfStats,
    codec: &mut impl AudioCodec,
    term_id: u8,
    buf: &[u8],
    geometry: BufferGeometry,
    scratch: &mut [u8],
) -> Result<usize, AudioError> {
    if settings.ring.consumer_start_next().is_none() {
        return Err(AudioError::RingExhausted);
    }
    let len = if settings.playback_synch.is_none() {
        apply_built_in_correction(settings, stats, codec, term_id, buf, geometry, scratch)
    } else {
        scratch[..buf.len()].copy_from_slice(buf);
        buf.len()
    };
    codec.stream_playback_tx(term_id, &scratch[..len])?;
    Ok(len)
}

/// Frame geometry needed to run the byte-level insert/remove correction
/// (spec §4.4 "Built-in correction").
#[derive(Debug, Clone, Copy)]
pub struct BufferGeometry {
    pub frame_count: usize,
    pub channels: usize,
    pub width: SampleWidth,
}

/// Applies built-in overrun/underrun correction when no synch endpoint
/// is configured (spec §4.4): tries the codec's `custom_correction` hook
/// first, falling back to the byte-level insert/remove algorithm.
/// `scratch` must be at least `buf.len() + channels * width.bytes()`
/// long to accommodate an insert. Returns the corrected byte length.
fn apply_built_in_correction<const N: usize>(
    settings: &AsIfSettings<N>,
    stats: &AsIfStats,
    codec: &mut impl AudioCodec,
    term_id: u8,
    buf: &[u8],
    geometry: BufferGeometry,
    scratch: &mut [u8],
) -> usize {
    let diff = settings.ring.buffer_diff(settings.cfg.stream_pre_buf_max);
    let outcome = classify_diff(diff, &settings.cfg);
    scratch[..buf.len()].copy_from_slice(buf);

    match outcome {
        CorrectionOutcome::Safe => {
            stats.correction.note_safe();
            buf.len()
        }
        CorrectionOutcome::HeavyOverrun | CorrectionOutcome::LightOverrun => {
            if matches!(outcome, CorrectionOutcome::HeavyOverrun) {
                stats.correction.note_heavy_overrun();
            } else {
                stats.correction.note_light_overrun();
            }
            match codec.custom_correction(term_id, &mut scratch[..buf.len()], false) {
                Ok(len) => len,
                Err(_) => remove_sample(scratch, geometry.frame_count, geometry.channels, geometry.width),
            }
        }
        CorrectionOutcome::HeavyUnderrun | CorrectionOutcome::LightUnderrun => {
            if matches!(outcome, CorrectionOutcome::HeavyUnderrun) {
                stats.correction.note_heavy_underrun();
            } else {
                stats.correction.note_light_underrun();
            }
            match codec.custom_correction(term_id, &mut scratch[..buf.len()], true) {
                Ok(len) => len,
                Err(_) => insert_sample(scratch, geometry.frame_count, geometry.channels, geometry.width),
            }
        }
    }
}

/// Evaluates and, if due, transmits a synch feedback refresh (spec §4.4
/// "Synch feedback"). Returns the 3-byte 10.14 wire value to send, if
/// any.
pub fn on_synch_refresh<const N: usize>(settings: &mut AsIfSettings<N>, stats: &AsIfStats) -> Option<[u8; 3]> {
    let diff = settings.ring.buffer_diff(settings.cfg.stream_pre_buf_max);
    let cfg = settings.cfg;
    let synch = settings.playback_synch.as_mut()?;
    synch.evaluate(diff, &cfg);
    let value = synch.on_refresh()?;
    stats.note_synch_event();
    let bytes = value.to_le_bytes();
    Some([bytes[0], bytes[1], bytes[2]])
}
