//! Record layouts: how each message is stored in the generated structs.

use crate::layout::BitSegment;
use crate::schema::{Message, Signal};

/// Integer storage type of a signal in the emitted record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
}

impl PrimitiveType {
    /// Smallest type holding `length` bits with the given signedness.
    pub fn for_bits(length: u32, is_signed: bool) -> Self {
        match (length, is_signed) {
            (0..=8, false) => PrimitiveType::Uint8,
            (0..=8, true) => PrimitiveType::Int8,
            (9..=16, false) => PrimitiveType::Uint16,
            (9..=16, true) => PrimitiveType::Int16,
            (17..=32, false) => PrimitiveType::Uint32,
            (17..=32, true) => PrimitiveType::Int32,
            (_, false) => PrimitiveType::Uint64,
            (_, true) => PrimitiveType::Int64,
        }
    }

    pub fn c_type(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8_t",
            PrimitiveType::Uint8 => "uint8_t",
            PrimitiveType::Int16 => "int16_t",
            PrimitiveType::Uint16 => "uint16_t",
            PrimitiveType::Int32 => "int32_t",
            PrimitiveType::Uint32 => "uint32_t",
            PrimitiveType::Int64 => "int64_t",
            PrimitiveType::Uint64 => "uint64_t",
        }
    }

    /// Unsigned C type of the same width, used for bit manipulation.
    pub fn c_unsigned_type(self) -> &'static str {
        self.unsigned().c_type()
    }

    pub fn ros2_type(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Uint8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Uint16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Uint32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Uint64 => "uint64",
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            PrimitiveType::Int8 | PrimitiveType::Uint8 => 1,
            PrimitiveType::Int16 | PrimitiveType::Uint16 => 2,
            PrimitiveType::Int32 | PrimitiveType::Uint32 => 4,
            PrimitiveType::Int64 | PrimitiveType::Uint64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.byte_len() as u32 * 8
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8 | PrimitiveType::Int16 | PrimitiveType::Int32 | PrimitiveType::Int64
        )
    }

    fn unsigned(self) -> Self {
        match self {
            PrimitiveType::Int8 => PrimitiveType::Uint8,
            PrimitiveType::Int16 => PrimitiveType::Uint16,
            PrimitiveType::Int32 => PrimitiveType::Uint32,
            PrimitiveType::Int64 => PrimitiveType::Uint64,
            other => other,
        }
    }
}

/// What a record field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    /// Unscaled integer; raw and physical coincide.
    Raw,
    /// Signal with named choices.
    Enumerated,
    /// Scaled signal presented as a floating point physical value.
    Physical,
}

impl StorageClass {
    pub fn of(signal: &Signal) -> Self {
        if signal.choices.as_ref().is_some_and(|c| !c.is_empty()) {
            StorageClass::Enumerated
        } else if signal.is_unscaled() {
            StorageClass::Raw
        } else {
            StorageClass::Physical
        }
    }
}

/// Storage of one signal inside a record.
#[derive(Clone, Debug)]
pub struct FieldLayout {
    /// Index of the signal in its message.
    pub signal: usize,
    pub name: String,
    pub primitive: PrimitiveType,
    /// Bits the field occupies in the record: the signal length when packed
    /// as a bit field, the full primitive width otherwise.
    pub storage_bits: u32,
    pub class: StorageClass,
    pub record_bit_offset: u32,
    pub segments: Vec<BitSegment>,
}

/// Field layout and size of one message's record.
#[derive(Clone, Debug)]
pub struct RecordLayout {
    pub message: String,
    pub fields: Vec<FieldLayout>,
    pub size_bytes: usize,
    pub bit_fields: bool,
}

impl RecordLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Builds the record layout of `message` from its planned segments.
///
/// `segments[i]` belongs to `message.signals[i]`.
pub fn build_record_layout(
    message: &Message,
    segments: Vec<Vec<BitSegment>>,
    bit_fields: bool,
) -> RecordLayout {
    let mut fields = Vec::with_capacity(message.signals.len());
    let mut cursor: u32 = 0;
    let mut max_align: u32 = 1;

    for (index, (signal, segments)) in message.signals.iter().zip(segments).enumerate() {
        let primitive = PrimitiveType::for_bits(signal.length, signal.is_signed);
        let storage_bits = if bit_fields {
            signal.length
        } else {
            primitive.bits()
        };
        let record_bit_offset = if bit_fields {
            cursor
        } else {
            let align = primitive.bits();
            max_align = max_align.max(align);
            cursor.div_ceil(align) * align
        };
        cursor = record_bit_offset + storage_bits;

        fields.push(FieldLayout {
            signal: index,
            name: signal.name.clone(),
            primitive,
            storage_bits,
            class: StorageClass::of(signal),
            record_bit_offset,
            segments,
        });
    }

    let size_bits = if bit_fields {
        cursor
    } else {
        cursor.div_ceil(max_align) * max_align
    };

    RecordLayout {
        message: message.name.clone(),
        fields,
        size_bytes: size_bits.div_ceil(8) as usize,
        bit_fields,
    }
}
