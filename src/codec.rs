//! Runtime encode/decode of messages.
//!
//! A [`MessageCodec`] executes the same segment plan that the C emitter turns
//! into shift/mask statements, which makes the generated bit contract testable
//! from Rust.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{CodegenError, Result};
use crate::layout::plan_message;
use crate::record::{RecordLayout, build_record_layout};
use crate::schema::{Message, Signal};
use crate::value::{FieldValue, decode_value, encode_value, is_in_range, raw_range};

/// Signal values of one message, in declared signal order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: IndexMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Encode/decode capability of one message.
pub trait Codec: Send + Sync {
    fn frame_id(&self) -> u32;

    fn name(&self) -> &str;

    /// Declared payload length in bytes.
    fn wire_length(&self) -> usize;

    fn encode(&self, record: &Record) -> Result<Vec<u8>>;

    fn decode(&self, data: &[u8]) -> Result<Record>;

    /// Decodes the raw integers without applying scaling or choices.
    fn decode_raw(&self, data: &[u8]) -> Result<IndexMap<String, i128>>;
}

/// Codec of one catalog message.
#[derive(Clone, Debug)]
pub struct MessageCodec {
    message: Message,
    layout: RecordLayout,
}

impl MessageCodec {
    /// Plans the message and builds its codec.
    pub fn new(message: &Message, bit_fields: bool, strict: bool) -> Result<Self> {
        let segments = plan_message(message, strict)?;
        Ok(Self {
            message: message.clone(),
            layout: build_record_layout(message, segments, bit_fields),
        })
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    fn check_length(&self, data: &[u8]) -> Result<()> {
        if data.len() < self.message.length {
            return Err(CodegenError::TruncatedFrame {
                frame_id: self.message.frame_id,
                expected: self.message.length,
                actual: data.len(),
            });
        }
        Ok(())
    }

    fn raw_values<'a>(&'a self, data: &'a [u8]) -> impl Iterator<Item = (&'a Signal, i128)> + 'a {
        self.layout.fields.iter().map(move |field| {
            let signal = &self.message.signals[field.signal];
            let bits = field
                .segments
                .iter()
                .fold(0u64, |acc, segment| acc | segment.unpack(data[segment.byte_index]));
            (signal, sign_extend(bits, signal))
        })
    }
}

impl Codec for MessageCodec {
    fn frame_id(&self) -> u32 {
        self.message.frame_id
    }

    fn name(&self) -> &str {
        &self.message.name
    }

    fn wire_length(&self) -> usize {
        self.message.length
    }

    fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.message.length];

        for field in &self.layout.fields {
            let signal = &self.message.signals[field.signal];
            let raw = match record.get(&signal.name) {
                Some(value) => {
                    if let FieldValue::Float(physical) = value {
                        if !is_in_range(signal, *physical) {
                            warn!(
                                message = %self.message.name,
                                signal = %signal.name,
                                physical = %physical,
                                "value clamped to declared range"
                            );
                        }
                    }
                    let raw = encode_value(signal, value)?;
                    if let FieldValue::Integer(requested) = value {
                        if signal.is_unscaled() && *requested != raw {
                            warn!(
                                message = %self.message.name,
                                signal = %signal.name,
                                requested = %requested,
                                raw = %raw,
                                "value saturated to signal range"
                            );
                        }
                    }
                    raw
                }
                None => {
                    debug!(
                        message = %self.message.name,
                        signal = %signal.name,
                        "signal missing from record, using initial value"
                    );
                    let (lo, hi) = raw_range(signal.length, signal.is_signed);
                    signal.initial.unwrap_or(0).clamp(lo, hi)
                }
            };

            // Two's complement truncated to the signal width.
            let bits = raw as u64;
            for segment in &field.segments {
                data[segment.byte_index] |= segment.pack(bits);
            }
        }

        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<Record> {
        self.check_length(data)?;
        let mut record = Record::new();
        for (signal, raw) in self.raw_values(data) {
            record.set(signal.name.clone(), decode_value(signal, raw));
        }
        Ok(record)
    }

    fn decode_raw(&self, data: &[u8]) -> Result<IndexMap<String, i128>> {
        self.check_length(data)?;
        Ok(self
            .raw_values(data)
            .map(|(signal, raw)| (signal.name.clone(), raw))
            .collect())
    }
}

fn sign_extend(bits: u64, signal: &Signal) -> i128 {
    if !signal.is_signed || signal.length >= 64 {
        return if signal.is_signed {
            i128::from(bits as i64)
        } else {
            i128::from(bits)
        };
    }
    let shift = 64 - signal.length;
    i128::from(((bits << shift) as i64) >> shift)
}
