//! The codec-driver contract (spec §6 "To the codec driver").
//!
//! Every method is optional in the original C API (`NULL` meant
//! "unsupported, stall"); here that convention maps to a default method
//! body returning [`AudioError::Unsupported`], so a codec driver only
//! overrides what it actually implements.

use crate::error::AudioError;

/// Feature Unit control selectors (spec §4.5), used as the index into a
/// codec's per-channel capability mask and as the discriminant for
/// `feature_*` trait methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FeatureSelector {
    Mute = 0x01,
    Volume = 0x02,
    Bass = 0x03,
    Mid = 0x04,
    Treble = 0x05,
    GraphicEqualizer = 0x06,
    AutomaticGain = 0x07,
    Delay = 0x08,
    BassBoost = 0x09,
    Loudness = 0x0A,
}

/// Control request kind, restricted to the four the Audio 1.0 class
/// defines. MIN/MAX/RES are rejected outright for Feature Unit controls
/// other than volume/bass/mid/treble/delay (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    Cur,
    Min,
    Max,
    Res,
}

/// A terminal is addressed as the Input Terminal (recording side) or the
/// Output Terminal (playback side) for the Copy-Protect control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TerminalKind {
    Input,
    Output,
}

/// The codec driver backing one or more audio terminals. `term_id`
/// identifies which terminal/unit the call concerns, matching the
/// original API's `TermID` parameter.
pub trait AudioCodec {
    /// Starts streaming on `term_id`, associated with AS IF `handle`.
    /// May block (spec §5 Suspension points).
    fn stream_start(&mut self, handle: u16, term_id: u8) -> Result<(), AudioError> {
        let _ = (handle, term_id);
        Err(AudioError::Unsupported)
    }

    /// Stops streaming on `term_id`.
    fn stream_stop(&mut self, term_id: u8) -> Result<(), AudioError> {
        let _ = term_id;
        Err(AudioError::Unsupported)
    }

    /// Pulls up to `buf_out.len()` recorded bytes from the codec into
    /// `buf_out`, returning the number of bytes actually written.
    fn stream_record_rx(&mut self, term_id: u8, buf_out: &mut [u8]) -> Result<usize, AudioError> {
        let _ = (term_id, buf_out);
        Err(AudioError::Unsupported)
    }

    /// Pushes `buf` to the codec for playback.
    fn stream_playback_tx(&mut self, term_id: u8, buf: &[u8]) -> Result<(), AudioError> {
        let _ = (term_id, buf);
        Err(AudioError::Unsupported)
    }

    /// Gets (`is_set == false`) or sets (`is_set == true`) the codec's
    /// sampling frequency. `freq` is read on set, written on get.
    fn sampling_freq_manage(
        &mut self,
        term_id: u8,
        is_set: bool,
        freq: &mut u32,
    ) -> Result<(), AudioError> {
        let _ = (term_id, is_set, freq);
        Err(AudioError::Unsupported)
    }

    /// Feature Unit control get/set, dispatched by [`FeatureSelector`] and
    /// [`RequestKind`]. `channel` is 0 for the master channel, 1-based for
    /// per-channel controls. `value` carries the control's native width
    /// (boolean, signed 16-bit, signed 8-bit 0.25 dB step) as an `i32`.
    fn feature_control(
        &mut self,
        term_id: u8,
        selector: FeatureSelector,
        channel: u8,
        kind: RequestKind,
        is_set: bool,
        value: &mut i32,
    ) -> Result<(), AudioError> {
        let _ = (term_id, selector, channel, kind, is_set, value);
        Err(AudioError::Unsupported)
    }

    /// Graphic Equalizer get/set; payload is the packed `bmBandsPresent`
    /// (4 bytes LE) followed by one signed byte per set band.
    fn feature_graphic_eq(
        &mut self,
        term_id: u8,
        channel: u8,
        is_set: bool,
        bm_bands_present: &mut u32,
        bands: &mut [i8],
    ) -> Result<usize, AudioError> {
        let _ = (term_id, channel, is_set, bm_bands_present, bands);
        Err(AudioError::Unsupported)
    }

    /// Mixer Unit programmable mixing point get/set.
    fn mixer_control(
        &mut self,
        unit_id: u8,
        in_ch: u8,
        out_ch: u8,
        is_set: bool,
        value: &mut i16,
    ) -> Result<(), AudioError> {
        let _ = (unit_id, in_ch, out_ch, is_set, value);
        Err(AudioError::Unsupported)
    }

    /// Selector Unit current-input-pin get/set.
    fn selector_control(
        &mut self,
        unit_id: u8,
        is_set: bool,
        pin: &mut u8,
    ) -> Result<(), AudioError> {
        let _ = (unit_id, is_set, pin);
        Err(AudioError::Unsupported)
    }

    /// Endpoint pitch-control (boolean) get/set.
    fn pitch_control(&mut self, ep_addr: u8, is_set: bool, enabled: &mut bool) -> Result<(), AudioError> {
        let _ = (ep_addr, is_set, enabled);
        Err(AudioError::Unsupported)
    }

    /// Terminal Copy-Protect control get/set.
    fn copy_protect(
        &mut self,
        term_id: u8,
        kind: TerminalKind,
        is_set: bool,
        level: &mut u8,
    ) -> Result<(), AudioError> {
        let _ = (term_id, kind, is_set, level);
        Err(AudioError::Unsupported)
    }

    /// Optional replacement for the built-in sample-insert/remove
    /// correction algorithm (spec §4.4). Returning `Err(Unsupported)`
    /// (the default) keeps the built-in algorithm active.
    fn custom_correction(
        &mut self,
        term_id: u8,
        buf: &mut [u8],
        insert: bool,
    ) -> Result<usize, AudioError> {
        let _ = (term_id, buf, insert);
        Err(AudioError::Unsupported)
    }
}
