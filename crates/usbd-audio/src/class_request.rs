//! Class-request dispatch (spec §4.5 "Class-Request Surface").
//!
//! Each audio-class control request arriving over EP0 is routed here by
//! recipient (terminal / feature unit / mixer unit / selector unit / AS
//! endpoint). Every function returns `Result<(), AudioError>` rather than
//! touching the wire directly; the caller (the embassy-usb `Handler` glue,
//! out of scope here) turns `Err` into an EP0 stall.

use usbd_hal_api::codec::{AudioCodec, FeatureSelector, RequestKind, TerminalKind};
use usbd_hal_api::error::AudioError;

use crate::entities::EntityTable;

/// Selectors that only ever accept `CUR` (boolean-valued controls); a
/// MIN/MAX/RES request against one of these is always rejected (spec
/// §4.5 "Mute and auto-gain/bass-boost/loudness accept only CUR").
fn selector_is_cur_only(selector: FeatureSelector) -> bool {
    matches!(
        selector,
        FeatureSelector::Mute | FeatureSelector::AutomaticGain | FeatureSelector::BassBoost | FeatureSelector::Loudness
    )
}

fn selector_bit(selector: FeatureSelector) -> u16 {
    1 << (selector as u8 - 1)
}

/// Terminal Copy-Protect (spec §4.5 "Terminal"): GET is only legal on an
/// Input Terminal, SET only on an Output Terminal.
pub fn terminal_copy_protect(
    entities: &EntityTable,
    codec: &mut impl AudioCodec,
    terminal_id: u8,
    is_set: bool,
    level: &mut u8,
) -> Result<(), AudioError> {
    if is_set {
        let ot = entities.output_terminal(terminal_id).ok_or(AudioError::InvalidSelector)?;
        if !ot.copy_protect_capable {
            return Err(AudioError::Unsupported);
        }
        codec.copy_protect(terminal_id, TerminalKind::Output, true, level)
    } else {
        let it = entities.input_terminal(terminal_id).ok_or(AudioError::InvalidSelector)?;
        if !it.copy_protect_capable {
            return Err(AudioError::Unsupported);
        }
        codec.copy_protect(terminal_id, TerminalKind::Input, false, level)
    }
}

/// Feature Unit control dispatch (spec §4.5 "Feature Unit"). `channel ==
/// 0xFF` is the bulk-set second form and is always rejected; MIN/MAX/RES
/// are rejected for CUR-only selectors.
pub fn feature_control(
    entities: &EntityTable,
    codec: &mut impl AudioCodec,
    unit_id: u8,
    selector: FeatureSelector,
    channel: u8,
    kind: RequestKind,
    is_set: bool,
    value: &mut i32,
) -> Result<(), AudioError> {
    if channel == 0xFF {
        return Err(AudioError::ChannelOutOfRange);
    }
    let fu = entities.feature_unit(unit_id).ok_or(AudioError::InvalidSelector)?;
    if channel > fu.channel_count {
        return Err(AudioError::ChannelOutOfRange);
    }
    if is_set && matches!(kind, RequestKind::Min | RequestKind::Max | RequestKind::Res) {
        return Err(AudioError::UnsupportedRequestType);
    }
    if selector_is_cur_only(selector) && !matches!(kind, RequestKind::Cur) {
        return Err(AudioError::UnsupportedRequestType);
    }
    let cap = fu.channel_caps.get(channel as usize).copied().unwrap_or(0);
    if cap & selector_bit(selector) == 0 {
        return Err(AudioError::InvalidSelector);
    }
    codec.feature_control(unit_id, selector, channel, kind, is_set, value)
}

/// Graphic Equalizer get/set (spec §4.5 "graphic-equalizer GET returns
/// `bmBandsPresent`..."). On SET, `payload_band_count` must equal the
/// number of set bits in `bm_bands_present`.
pub fn feature_graphic_eq(
    entities: &EntityTable,
    codec: &mut impl AudioCodec,
    unit_id: u8,
    channel: u8,
    is_set: bool,
    bm_bands_present: &mut u32,
    bands: &mut [i8],
) -> Result<usize, AudioError> {
    let fu = entities.feature_unit(unit_id).ok_or(AudioError::InvalidSelector)?;
    if channel > fu.channel_count {
        return Err(AudioError::ChannelOutOfRange);
    }
    let cap = fu.channel_caps.get(channel as usize).copied().unwrap_or(0);
    if cap & selector_bit(FeatureSelector::GraphicEqualizer) == 0 {
        return Err(AudioError::InvalidSelector);
    }
    if is_set {
        let expected = bm_bands_present.count_ones() as usize;
        if bands.len() != expected {
            return Err(AudioError::InvalidAttribute);
        }
    }
    codec.feature_graphic_eq(unit_id, channel, is_set, bm_bands_present, bands)
}

/// Mixer Unit programmable mixing point get/set (spec §4.5 "Mixer Unit").
/// Rejects the bulk-set forms (`in_ch == 0xFF` or `out_ch == 0`, the 2nd
/// and 3rd request forms the class defines but this surface does not
/// support per-point granularity for).
pub fn mixer_control(
    entities: &EntityTable,
    codec: &mut impl AudioCodec,
    unit_id: u8,
    in_ch: u8,
    out_ch: u8,
    is_set: bool,
    value: &mut i16,
) -> Result<(), AudioError> {
    if in_ch == 0xFF || out_ch == 0 || in_ch == 0 {
        return Err(AudioError::InvalidRequestForm);
    }
    let mu = entities.mixer_unit(unit_id).ok_or(AudioError::InvalidSelector)?;
    if !mu.is_programmable(in_ch, out_ch) {
        if is_set {
            return Err(AudioError::UnsupportedRequestType);
        }
    }
    codec.mixer_control(unit_id, in_ch, out_ch, is_set, value)
}

/// Selector Unit (spec §4.5 "Selector Unit"). `GET_MIN`/`GET_RES` are
/// fixed at 1; `GET_MAX` is the unit's input pin count; `CUR` is
/// delegated to the codec.
pub fn selector_control(
    entities: &EntityTable,
    codec: &mut impl AudioCodec,
    unit_id: u8,
    kind: RequestKind,
    is_set: bool,
    pin: &mut u8,
) -> Result<(), AudioError> {
    let su = entities.selector_unit(unit_id).ok_or(AudioError::InvalidSelector)?;
    match kind {
        RequestKind::Min | RequestKind::Res => {
            if is_set {
                return Err(AudioError::UnsupportedRequestType);
            }
            *pin = 1;
            Ok(())
        }
        RequestKind::Max => {
            if is_set {
                return Err(AudioError::UnsupportedRequestType);
            }
            *pin = su.input_pin_count();
            Ok(())
        }
        RequestKind::Cur => codec.selector_control(unit_id, is_set, pin),
    }
}

/// AS Endpoint sampling-frequency validation (spec §4.5 "AS Endpoint").
#[derive(Clone, Copy)]
pub enum SamplingFreqRange<'a> {
    Continuous { lower: u32, upper: u32 },
    Enumerated(&'a [u32]),
}

impl SamplingFreqRange<'_> {
    pub fn accepts(&self, value: u32) -> bool {
        match self {
            SamplingFreqRange::Continuous { lower, upper } => value >= *lower && value <= *upper,
            SamplingFreqRange::Enumerated(list) => list.contains(&value),
        }
    }
}

/// Validates a 3-byte little-endian sampling-frequency value against the
/// endpoint's advertised range/list.
pub fn validate_sampling_frequency(bytes: [u8; 3], range: SamplingFreqRange) -> Result<u32, AudioError> {
    let value = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
    if range.accepts(value) {
        Ok(value)
    } else {
        Err(AudioError::InvalidSamplingFrequency)
    }
}

/// Endpoint pitch control: CUR only (spec §4.5 "Pitch control accepts
/// only CUR").
pub fn pitch_control(
    codec: &mut impl AudioCodec,
    ep_addr: u8,
    kind: RequestKind,
    is_set: bool,
    enabled: &mut bool,
) -> Result<(), AudioError> {
    if !matches!(kind, RequestKind::Cur) {
        return Err(AudioError::UnsupportedRequestType);
    }
    codec.pitch_control(ep_addr, is_set, enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Entity, FeatureUnit};
    use heapless::Vec as HVec;

    struct NullCodec;
    impl AudioCodec for NullCodec {}

    fn table_with_mute_only_fu() -> EntityTable {
        let mut table = EntityTable::new();
        let mut caps: HVec<u16, 8> = HVec::new();
        caps.push(selector_bit(FeatureSelector::Mute)).unwrap();
        caps.push(selector_bit(FeatureSelector::Mute)).unwrap();
        table
            .insert(Entity::Feature(FeatureUnit {
                id: 3,
                source_id: 1,
                channel_count: 1,
                channel_caps: caps,
            }))
            .ok()
            .unwrap();
        table
    }

    #[test]
    fn mute_rejects_min_max_res() {
        let table = table_with_mute_only_fu();
        let mut codec = NullCodec;
        let mut value = 0;
        let err = feature_control(&table, &mut codec, 3, FeatureSelector::Mute, 1, RequestKind::Min, false, &mut value)
            .unwrap_err();
        assert_eq!(err, AudioError::UnsupportedRequestType);
    }

    #[test]
    fn volume_not_in_capability_mask_is_rejected() {
        let table = table_with_mute_only_fu();
        let mut codec = NullCodec;
        let mut value = 0;
        let err = feature_control(
            &table,
            &mut codec,
            3,
            FeatureSelector::Volume,
            1,
            RequestKind::Cur,
            false,
            &mut value,
        )
        .unwrap_err();
        assert_eq!(err, AudioError::InvalidSelector);
    }

    #[test]
    fn bulk_set_second_form_channel_0xff_always_rejected() {
        let table = table_with_mute_only_fu();
        let mut codec = NullCodec;
        let mut value = 0;
        let err = feature_control(
            &table,
            &mut codec,
            3,
            FeatureSelector::Mute,
            0xFF,
            RequestKind::Cur,
            true,
            &mut value,
        )
        .unwrap_err();
        assert_eq!(err, AudioError::ChannelOutOfRange);
    }

    #[test]
    fn graphic_eq_set_rejects_mismatched_band_count() {
        let mut table = EntityTable::new();
        let mut caps: HVec<u16, 8> = HVec::new();
        caps.push(selector_bit(FeatureSelector::GraphicEqualizer)).unwrap();
        table
            .insert(Entity::Feature(FeatureUnit {
                id: 4,
                source_id: 1,
                channel_count: 0,
                channel_caps: caps,
            }))
            .ok()
            .unwrap();
        let mut codec = NullCodec;
        let mut bm_bands_present = 0b0000_0101u32; // bits 0 and 2 set -> 2 bands
        let mut bands = [0i8; 1]; // payload has only 1 band byte, mismatched
        let err =
            feature_graphic_eq(&table, &mut codec, 4, 0, true, &mut bm_bands_present, &mut bands).unwrap_err();
        assert_eq!(err, AudioError::InvalidAttribute);
    }

    #[test]
    fn sampling_frequency_enumerated_list_rejects_unknown_rate() {
        let range = SamplingFreqRange::Enumerated(&[44100, 48000]);
        let bytes = (32000u32).to_le_bytes();
        let err = validate_sampling_frequency([bytes[0], bytes[1], bytes[2]], range).unwrap_err();
        assert_eq!(err, AudioError::InvalidSamplingFrequency);
    }

    #[test]
    fn sampling_frequency_continuous_range_accepts_boundary() {
        let range = SamplingFreqRange::Continuous { lower: 8000, upper: 48000 };
        let bytes = (48000u32).to_le_bytes();
        assert_eq!(validate_sampling_frequency([bytes[0], bytes[1], bytes[2]], range), Ok(48000));
    }

    #[test]
    fn selector_min_and_res_are_fixed_at_one() {
        let mut table = EntityTable::new();
        let mut source_ids: HVec<u8, 4> = HVec::new();
        source_ids.push(2).unwrap();
        source_ids.push(3).unwrap();
        table
            .insert(Entity::Selector(crate::entities::SelectorUnit { id: 6, source_ids }))
            .ok()
            .unwrap();
        let mut codec = NullCodec;
        let mut pin = 0;
        selector_control(&table, &mut codec, 6, RequestKind::Min, false, &mut pin).unwrap();
        assert_eq!(pin, 1);
        selector_control(&table, &mut codec, 6, RequestKind::Max, false, &mut pin).unwrap();
        assert_eq!(pin, 2);
    }
}
