//! Bit-layout planning.
//!
//! Maps a signal's declared `(start, length, byte order)` onto the bytes of
//! the wire buffer. The resulting [`BitSegment`] list is the single source of
//! truth for both the runtime codec and the emitted pack/unpack code, so
//! encode and decode are inverses by construction.

use tracing::debug;

use crate::error::{CodegenError, Result};
use crate::schema::{ByteOrder, Message, Signal};

/// One contiguous run of bits inside one byte of the frame.
///
/// `bit_count` bits starting at `bit_offset` (LSB-relative) in
/// `data[byte_index]` hold the bits of the raw value starting at
/// `value_bit_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitSegment {
    pub byte_index: usize,
    pub bit_offset: u8,
    pub bit_count: u8,
    pub value_bit_offset: u8,
}

impl BitSegment {
    /// Mask of the segment's bits in its wire byte.
    pub fn byte_mask(&self) -> u8 {
        (((1u16 << self.bit_count) - 1) as u8) << self.bit_offset
    }

    /// Extracts the segment's bits from `raw` and places them in wire position.
    pub fn pack(&self, raw: u64) -> u8 {
        let bits = (raw >> self.value_bit_offset) as u8;
        (bits << self.bit_offset) & self.byte_mask()
    }

    /// Reads the segment's bits from `byte` and returns them in value position.
    pub fn unpack(&self, byte: u8) -> u64 {
        u64::from((byte & self.byte_mask()) >> self.bit_offset) << self.value_bit_offset
    }
}

/// Converts a DBC "sawtooth" start bit (MSB position counted LSB-first inside
/// each byte) into the network-order position used by [`ByteOrder::BigEndian`].
pub fn dbc_start_to_network_order(start: u32) -> u32 {
    8 * (start / 8) + (7 - start % 8)
}

/// Splits one signal into byte segments.
///
/// Fails with [`CodegenError::LayoutOverflow`] when the signal does not fit in
/// `message_length` bytes.
pub fn plan_signal(message: &str, signal: &Signal, message_length: usize) -> Result<Vec<BitSegment>> {
    let available = message_length as u64 * 8;
    let end = u64::from(signal.start) + u64::from(signal.length);
    if signal.length == 0 || end > available {
        return Err(CodegenError::LayoutOverflow {
            message: message.to_string(),
            signal: signal.name.clone(),
            reason: format!(
                "bits {}..{} exceed the {} bit frame",
                signal.start, end, available
            ),
        });
    }

    let mut segments = Vec::new();
    let mut byte_index = (signal.start / 8) as usize;
    let mut bit = match signal.byte_order {
        ByteOrder::LittleEndian => signal.start % 8,
        ByteOrder::BigEndian => 7 - signal.start % 8,
    };
    let mut remaining = signal.length;

    while remaining > 0 {
        let (bit_count, bit_offset, value_bit_offset, next_bit) = match signal.byte_order {
            ByteOrder::LittleEndian => {
                let count = (8 - bit).min(remaining);
                (count, bit, signal.length - remaining, 0)
            }
            ByteOrder::BigEndian => {
                let count = (bit + 1).min(remaining);
                (count, bit + 1 - count, remaining - count, 7)
            }
        };
        segments.push(BitSegment {
            byte_index,
            bit_offset: bit_offset as u8,
            bit_count: bit_count as u8,
            value_bit_offset: value_bit_offset as u8,
        });
        remaining -= bit_count;
        byte_index += 1;
        bit = next_bit;
    }

    Ok(segments)
}

/// Plans every signal of a message.
///
/// In strict mode a bit claimed by two signals is reported as a
/// [`CodegenError::LayoutOverflow`] naming both signals.
pub fn plan_message(message: &Message, strict: bool) -> Result<Vec<Vec<BitSegment>>> {
    let mut owners: Vec<[Option<usize>; 8]> = vec![[None; 8]; message.length];
    let mut planned = Vec::with_capacity(message.signals.len());

    for (index, signal) in message.signals.iter().enumerate() {
        let segments = plan_signal(&message.name, signal, message.length)?;
        if strict {
            for segment in &segments {
                let start = segment.bit_offset as usize;
                let end = start + segment.bit_count as usize;
                for owner in &mut owners[segment.byte_index][start..end] {
                    if let Some(other) = *owner {
                        return Err(CodegenError::LayoutOverflow {
                            message: message.name.clone(),
                            signal: signal.name.clone(),
                            reason: format!(
                                "overlaps signal '{}' in byte {}",
                                message.signals[other].name, segment.byte_index
                            ),
                        });
                    }
                    *owner = Some(index);
                }
            }
        }
        planned.push(segments);
    }

    debug!(
        message = %message.name,
        signals = planned.len(),
        "planned bit layout"
    );
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(byte_index: usize, bit_offset: u8, bit_count: u8, value_bit_offset: u8) -> BitSegment {
        BitSegment {
            byte_index,
            bit_offset,
            bit_count,
            value_bit_offset,
        }
    }

    #[test]
    fn test_little_endian_spanning_bytes() {
        let signal = Signal::new("s", 4, 12, ByteOrder::LittleEndian);
        let segments = plan_signal("m", &signal, 8).unwrap();
        assert_eq!(segments, vec![seg(0, 4, 4, 0), seg(1, 0, 8, 4)]);
    }

    #[test]
    fn test_big_endian_spanning_bytes() {
        // 12-bit Motorola signal whose MSB is bit 7 of byte 0.
        let signal = Signal::new("s", 0, 12, ByteOrder::BigEndian);
        let segments = plan_signal("m", &signal, 8).unwrap();
        assert_eq!(segments, vec![seg(0, 0, 8, 4), seg(1, 4, 4, 0)]);
    }

    #[test]
    fn test_big_endian_unaligned_start() {
        // MSB at bit 2 of byte 0 (network position 5), 6 bits long.
        let signal = Signal::new("s", 5, 6, ByteOrder::BigEndian);
        let segments = plan_signal("m", &signal, 2).unwrap();
        assert_eq!(segments, vec![seg(0, 0, 3, 3), seg(1, 5, 3, 0)]);
    }

    #[test]
    fn test_segment_bits_sum_to_length() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            for start in 0..8 {
                for length in 1..=56 {
                    let signal = Signal::new("s", start, length, order);
                    let segments = plan_signal("m", &signal, 8).unwrap();
                    let total: u32 = segments.iter().map(|s| u32::from(s.bit_count)).sum();
                    assert_eq!(total, length);
                }
            }
        }
    }

    #[test]
    fn test_full_width_signal() {
        let signal = Signal::new("s", 0, 64, ByteOrder::LittleEndian);
        let segments = plan_signal("m", &signal, 8).unwrap();
        assert_eq!(segments.len(), 8);
        assert_eq!(segments[7], seg(7, 0, 8, 56));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let signal = Signal::new("s", 60, 8, ByteOrder::LittleEndian);
        let err = plan_signal("m", &signal, 8).unwrap_err();
        assert!(matches!(err, CodegenError::LayoutOverflow { .. }));

        let signal = Signal::new("s", 1, 16, ByteOrder::BigEndian);
        assert!(plan_signal("m", &signal, 2).is_err());
    }

    #[test]
    fn test_overlap_is_rejected_in_strict_mode() {
        let message = Message::new(
            1,
            "m",
            1,
            vec![
                Signal::new("a", 0, 5, ByteOrder::LittleEndian),
                Signal::new("b", 4, 4, ByteOrder::LittleEndian),
            ],
        );
        let err = plan_message(&message, true).unwrap_err();
        match err {
            CodegenError::LayoutOverflow { signal, reason, .. } => {
                assert_eq!(signal, "b");
                assert!(reason.contains("'a'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(plan_message(&message, false).is_ok());
    }

    #[test]
    fn test_dbc_start_conversion() {
        assert_eq!(dbc_start_to_network_order(7), 0);
        assert_eq!(dbc_start_to_network_order(0), 7);
        assert_eq!(dbc_start_to_network_order(15), 8);
    }

    #[test]
    fn test_segment_pack_unpack() {
        let segment = seg(0, 4, 4, 8);
        assert_eq!(segment.byte_mask(), 0xf0);
        assert_eq!(segment.pack(0xa00), 0xa0);
        assert_eq!(segment.unpack(0xa5), 0xa00);
    }
}
