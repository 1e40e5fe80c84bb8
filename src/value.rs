//! Raw/physical conversions for a single signal.

use serde::Serialize;

use crate::error::{CodegenError, Result};
use crate::schema::Signal;

/// The value of one signal inside a [`crate::codec::Record`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Raw integer of an unscaled signal.
    Integer(i128),
    /// Physical value of a scaled signal.
    Float(f64),
    /// Symbolic name of a declared choice.
    Choice(String),
}

/// Inclusive range of raw values a signal can carry.
pub fn raw_range(length: u32, is_signed: bool) -> (i128, i128) {
    let length = length.clamp(1, 64);
    if is_signed {
        let half = 1i128 << (length - 1);
        (-half, half - 1)
    } else {
        (0, (1i128 << length) - 1)
    }
}

/// Saturates `raw` into the signal's representable range.
pub fn clamp_raw(signal: &Signal, raw: i128) -> i128 {
    let (lo, hi) = raw_range(signal.length, signal.is_signed);
    raw.clamp(lo, hi)
}

/// `raw * scale + offset`
pub fn raw_to_physical(signal: &Signal, raw: i128) -> f64 {
    raw as f64 * signal.scale + signal.offset
}

/// Converts a physical value to the raw value sent on the wire.
///
/// Out-of-range input saturates: first to the declared minimum/maximum, then
/// to what the signal's bits can represent. Ties round away from zero.
pub fn physical_to_raw(signal: &Signal, physical: f64) -> i128 {
    if physical.is_nan() {
        return clamp_raw(signal, 0);
    }
    let mut physical = physical;
    if let Some(minimum) = signal.minimum {
        physical = physical.max(minimum);
    }
    if let Some(maximum) = signal.maximum {
        physical = physical.min(maximum);
    }

    let mut raw = ((physical - signal.offset) / signal.scale).round() as i128;

    // Rounding can step just past a declared bound; pull back one raw step.
    let step = if signal.scale > 0.0 { 1 } else { -1 };
    if let Some(maximum) = signal.maximum {
        if raw_to_physical(signal, raw) > maximum && signal.minimum.is_none_or(|m| m <= maximum) {
            raw -= step;
        }
    }
    if let Some(minimum) = signal.minimum {
        if raw_to_physical(signal, raw) < minimum && signal.maximum.is_none_or(|m| m >= minimum) {
            raw += step;
        }
    }

    clamp_raw(signal, raw)
}

/// Presentation of a decoded raw value: choice name when listed, otherwise
/// the raw integer (unscaled signals) or the physical value.
pub fn decode_value(signal: &Signal, raw: i128) -> FieldValue {
    if let Some(name) = signal.choices.as_ref().and_then(|c| c.get(&raw)) {
        return FieldValue::Choice(name.clone());
    }
    if signal.is_unscaled() {
        FieldValue::Integer(raw)
    } else {
        FieldValue::Float(raw_to_physical(signal, raw))
    }
}

/// Converts a record value to its saturated raw value.
pub fn encode_value(signal: &Signal, value: &FieldValue) -> Result<i128> {
    match value {
        FieldValue::Integer(raw) if signal.is_unscaled() => Ok(clamp_raw(signal, *raw)),
        FieldValue::Integer(physical) => Ok(physical_to_raw(signal, *physical as f64)),
        FieldValue::Float(physical) => Ok(physical_to_raw(signal, *physical)),
        FieldValue::Choice(name) => choice_to_raw(signal, name),
    }
}

/// Looks up the raw value of a choice by name.
pub fn choice_to_raw(signal: &Signal, name: &str) -> Result<i128> {
    signal
        .choices
        .as_ref()
        .and_then(|choices| choices.iter().find(|(_, n)| n.as_str() == name))
        .map(|(raw, _)| *raw)
        .ok_or_else(|| CodegenError::UnknownChoice {
            signal: signal.name.clone(),
            name: name.to_string(),
        })
}

/// Whether a physical value lies inside the declared bounds.
pub fn is_in_range(signal: &Signal, physical: f64) -> bool {
    signal.minimum.is_none_or(|m| physical >= m) && signal.maximum.is_none_or(|m| physical <= m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ByteOrder;

    fn temperature() -> Signal {
        Signal::new("Temperature", 0, 12, ByteOrder::BigEndian)
            .signed()
            .with_scaling(0.01, 250.0)
            .with_range(229.52, 270.47)
    }

    #[test]
    fn test_raw_range() {
        assert_eq!(raw_range(8, false), (0, 255));
        assert_eq!(raw_range(12, true), (-2048, 2047));
        assert_eq!(raw_range(64, false), (0, u64::MAX as i128));
        assert_eq!(raw_range(64, true), (i64::MIN as i128, i64::MAX as i128));
    }

    #[test]
    fn test_physical_round_trip() {
        let signal = temperature();
        let raw = physical_to_raw(&signal, 244.14);
        assert_eq!(raw, -586);
        assert!((raw_to_physical(&signal, raw) - 244.14).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_saturates_to_bounds() {
        let signal = temperature();
        let high = raw_to_physical(&signal, physical_to_raw(&signal, 1000.0));
        let low = raw_to_physical(&signal, physical_to_raw(&signal, -1000.0));
        assert!(high <= 270.47 && high > 270.4);
        assert!(low >= 229.52 && low < 229.6);
    }

    #[test]
    fn test_in_range_input_stays_in_range() {
        let signal = Signal::new("s", 0, 8, ByteOrder::LittleEndian)
            .with_scaling(0.1, 0.0)
            .with_range(0.05, 0.95);
        for physical in [0.05, 0.5, 0.95] {
            let back = raw_to_physical(&signal, physical_to_raw(&signal, physical));
            assert!(is_in_range(&signal, back), "{physical} -> {back}");
        }
    }

    #[test]
    fn test_rounding_past_off_grid_maximum_steps_back() {
        let signal = Signal::new("s", 0, 8, ByteOrder::LittleEndian)
            .with_scaling(0.1, 0.0)
            .with_range(0.0, 0.96);
        // 9.6 rounds to 10, which decodes to 1.0.
        assert_eq!(physical_to_raw(&signal, 0.96), 9);
        assert!(is_in_range(&signal, raw_to_physical(&signal, 9)));
    }

    #[test]
    fn test_rounding_past_off_grid_minimum_steps_back() {
        let signal = Signal::new("s", 0, 8, ByteOrder::LittleEndian)
            .with_scaling(0.1, 0.0)
            .with_range(0.04, 1.0);
        // 0.4 rounds to 0, which decodes to 0.0.
        assert_eq!(physical_to_raw(&signal, 0.04), 1);
    }

    #[test]
    fn test_negative_scale_steps_back_inside_bounds() {
        let signal = Signal::new("s", 0, 8, ByteOrder::LittleEndian)
            .signed()
            .with_scaling(-0.1, 0.0)
            .with_range(-0.96, 0.96);
        assert_eq!(physical_to_raw(&signal, 0.96), -9);
        assert_eq!(physical_to_raw(&signal, -0.96), 9);
        for raw in [-9, 9] {
            assert!(is_in_range(&signal, raw_to_physical(&signal, raw)));
        }
    }

    #[test]
    fn test_saturates_to_bit_width_without_bounds() {
        let signal = Signal::new("s", 0, 4, ByteOrder::LittleEndian).signed();
        assert_eq!(physical_to_raw(&signal, 100.0), 7);
        assert_eq!(physical_to_raw(&signal, -100.0), -8);
        assert_eq!(physical_to_raw(&signal, f64::NAN), 0);
    }

    #[test]
    fn test_ties_round_away_from_zero() {
        let signal = Signal::new("s", 0, 8, ByteOrder::LittleEndian)
            .signed()
            .with_scaling(2.0, 0.0);
        assert_eq!(physical_to_raw(&signal, 3.0), 2);
        assert_eq!(physical_to_raw(&signal, -3.0), -2);
    }

    #[test]
    fn test_choice_decoding() {
        let signal = Signal::new("Enable", 7, 1, ByteOrder::BigEndian)
            .with_choices([(0, "Disabled"), (1, "Enabled")]);
        assert_eq!(decode_value(&signal, 1), FieldValue::Choice("Enabled".into()));
        assert_eq!(choice_to_raw(&signal, "Disabled").unwrap(), 0);
        assert!(matches!(
            choice_to_raw(&signal, "Maybe"),
            Err(CodegenError::UnknownChoice { .. })
        ));
    }

    #[test]
    fn test_unlisted_choice_decodes_numerically() {
        let signal = Signal::new("Gear", 0, 4, ByteOrder::LittleEndian)
            .with_scaling(0.5, 0.0)
            .with_choices([(0, "Park")]);
        assert_eq!(decode_value(&signal, 3), FieldValue::Float(1.5));
    }
}
