//! Frame-id keyed dispatch over message codecs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::GeneratorConfig;
use crate::codec::{Codec, Record};
use crate::error::{CodegenError, Result};
use crate::generate::plan_codecs;
use crate::schema::Schema;

/// Registry mapping frame identifiers to their codecs.
#[derive(Default)]
pub struct Transceiver {
    codecs: BTreeMap<u32, Box<dyn Codec>>,
    skipped: Vec<CodegenError>,
}

impl Transceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a codec for every message of the schema.
    ///
    /// In strict mode the first layout error aborts; otherwise offending
    /// messages are left out and reported through [`Transceiver::skipped`].
    pub fn from_schema(schema: &Schema, config: &GeneratorConfig) -> Result<Self> {
        let (codecs, skipped) = plan_codecs(schema, config)?;
        let mut transceiver = Self {
            skipped,
            ..Self::default()
        };
        for codec in codecs {
            transceiver.register(Box::new(codec));
        }
        debug!(codecs = transceiver.len(), "transceiver ready");
        Ok(transceiver)
    }

    /// Adds a codec, replacing any codec with the same frame id.
    pub fn register(&mut self, codec: Box<dyn Codec>) {
        self.codecs.insert(codec.frame_id(), codec);
    }

    pub fn codec(&self, frame_id: u32) -> Result<&dyn Codec> {
        self.codecs
            .get(&frame_id)
            .map(|codec| codec.as_ref())
            .ok_or(CodegenError::UnknownMessage { frame_id })
    }

    /// Encodes `record` as the payload of `frame_id`.
    pub fn send(&self, frame_id: u32, record: &Record) -> Result<Vec<u8>> {
        self.codec(frame_id)?.encode(record)
    }

    /// Decodes the payload of `frame_id`.
    pub fn receive(&self, frame_id: u32, data: &[u8]) -> Result<Record> {
        self.codec(frame_id)?.decode(data)
    }

    pub fn frame_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.codecs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Messages left out by a non-strict build.
    pub fn skipped(&self) -> &[CodegenError] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ByteOrder, Message, Signal};
    use crate::value::FieldValue;

    fn schema() -> Schema {
        Schema::new(
            None,
            vec![
                Message::new(
                    0x10,
                    "Speed",
                    2,
                    vec![Signal::new("speed", 0, 16, ByteOrder::LittleEndian)],
                ),
                Message::new(
                    0x20,
                    "Broken",
                    1,
                    vec![Signal::new("wide", 0, 16, ByteOrder::LittleEndian)],
                ),
            ],
        )
        .unwrap()
    }

    fn config(strict: bool) -> GeneratorConfig {
        GeneratorConfig {
            strict,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_non_strict_skips_overflowing_message() {
        let transceiver = Transceiver::from_schema(&schema(), &config(false)).unwrap();
        assert_eq!(transceiver.frame_ids().collect::<Vec<_>>(), vec![0x10]);
        assert_eq!(transceiver.skipped().len(), 1);
    }

    #[test]
    fn test_strict_aborts_on_overflow() {
        let err = Transceiver::from_schema(&schema(), &config(true)).err().unwrap();
        assert!(matches!(err, CodegenError::LayoutOverflow { .. }));
    }

    #[test]
    fn test_dispatch() {
        let transceiver = Transceiver::from_schema(&schema(), &config(false)).unwrap();
        let record = Record::new().with("speed", FieldValue::Integer(0x1234));
        let data = transceiver.send(0x10, &record).unwrap();
        assert_eq!(data, vec![0x34, 0x12]);
        assert_eq!(transceiver.receive(0x10, &data).unwrap(), record);

        assert!(matches!(
            transceiver.receive(0x99, &data),
            Err(CodegenError::UnknownMessage { frame_id: 0x99 })
        ));
        assert!(matches!(
            transceiver.send(0x99, &record),
            Err(CodegenError::UnknownMessage { .. })
        ));
        assert!(matches!(
            transceiver.receive(0x10, &data[..1]),
            Err(CodegenError::TruncatedFrame { .. })
        ));
    }
}
