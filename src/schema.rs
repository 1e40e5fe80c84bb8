//! In-memory message catalog and the JSON catalog reader.
//!
//! A [`Schema`] is the immutable input of one generation run. It is either
//! built directly from [`Message`]/[`Signal`] values or read from the JSON
//! catalog format with [`parse_schema`].

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, bail};
use serde_json::{Map, Value};

use crate::error::{CodegenError, Result};
use crate::value::raw_range;

pub const MAX_STANDARD_FRAME_ID: u32 = 0x7ff;
pub const MAX_EXTENDED_FRAME_ID: u32 = 0x1fff_ffff;
/// Largest payload in bytes (CAN FD).
pub const MAX_MESSAGE_LENGTH: usize = 64;

/// Bit numbering convention of a signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    /// Intel: `start` is the least significant bit, numbering runs upward.
    #[default]
    LittleEndian,
    /// Motorola: `start` is the most significant bit in network order.
    BigEndian,
}

impl ByteOrder {
    pub(crate) fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "little_endian" | "intel" | "little" | "le" => Ok(ByteOrder::LittleEndian),
            "big_endian" | "motorola" | "big" | "be" => Ok(ByteOrder::BigEndian),
            other => bail!("unsupported byte order '{}'", other),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "little_endian",
            ByteOrder::BigEndian => "big_endian",
        }
    }
}

/// One bit-addressed field of a message.
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    pub name: String,
    pub start: u32,
    pub length: u32,
    pub byte_order: ByteOrder,
    pub is_signed: bool,
    pub scale: f64,
    pub offset: f64,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Raw value used when a record leaves the signal unset.
    pub initial: Option<i128>,
    pub unit: Option<String>,
    pub comment: Option<String>,
    pub choices: Option<BTreeMap<i128, String>>,
}

impl Signal {
    pub fn new(name: impl Into<String>, start: u32, length: u32, byte_order: ByteOrder) -> Self {
        Self {
            name: name.into(),
            start,
            length,
            byte_order,
            is_signed: false,
            scale: 1.0,
            offset: 0.0,
            minimum: None,
            maximum: None,
            initial: None,
            unit: None,
            comment: None,
            choices: None,
        }
    }

    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    pub fn with_scaling(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn with_initial(mut self, initial: i128) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = (i128, S)>,
        S: Into<String>,
    {
        self.choices = Some(
            choices
                .into_iter()
                .map(|(value, name)| (value, name.into()))
                .collect(),
        );
        self
    }

    /// True when physical and raw values coincide.
    pub fn is_unscaled(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }
}

/// One frame of the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub frame_id: u32,
    pub is_extended_frame: bool,
    pub name: String,
    /// Payload length in bytes.
    pub length: usize,
    pub signals: Vec<Signal>,
    pub comment: Option<String>,
    pub senders: Vec<String>,
    pub cycle_time_ms: Option<u32>,
}

impl Message {
    pub fn new(frame_id: u32, name: impl Into<String>, length: usize, signals: Vec<Signal>) -> Self {
        Self {
            frame_id,
            is_extended_frame: false,
            name: name.into(),
            length,
            signals,
            comment: None,
            senders: Vec::new(),
            cycle_time_ms: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn extended(mut self) -> Self {
        self.is_extended_frame = true;
        self
    }
}

/// Validated, ordered message catalog.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    version: Option<String>,
    messages: Vec<Message>,
}

impl Schema {
    /// Accepts a catalog, rejecting structural errors before any code is built.
    pub fn new(version: Option<String>, messages: Vec<Message>) -> Result<Self> {
        let mut seen: HashMap<u32, &str> = HashMap::new();
        for message in &messages {
            let id_limit = if message.is_extended_frame {
                MAX_EXTENDED_FRAME_ID
            } else {
                MAX_STANDARD_FRAME_ID
            };
            if message.frame_id > id_limit {
                return Err(CodegenError::InvalidMessage {
                    message: message.name.clone(),
                    reason: format!(
                        "frame id 0x{:x} exceeds the {} id range",
                        message.frame_id,
                        if message.is_extended_frame { "29 bit" } else { "11 bit" }
                    ),
                });
            }
            if message.length > MAX_MESSAGE_LENGTH {
                return Err(CodegenError::InvalidMessage {
                    message: message.name.clone(),
                    reason: format!(
                        "length {} exceeds the {} byte CAN FD payload",
                        message.length, MAX_MESSAGE_LENGTH
                    ),
                });
            }
            if let Some(first) = seen.insert(message.frame_id, &message.name) {
                return Err(CodegenError::DuplicateFrameId {
                    frame_id: message.frame_id,
                    first: first.to_string(),
                    second: message.name.clone(),
                });
            }
            for signal in &message.signals {
                if signal.scale == 0.0 || !signal.scale.is_finite() {
                    return Err(CodegenError::InvalidScale {
                        message: message.name.clone(),
                        signal: signal.name.clone(),
                    });
                }
                if signal.length == 0 || signal.length > 64 {
                    return Err(CodegenError::InvalidSignal {
                        message: message.name.clone(),
                        signal: signal.name.clone(),
                        reason: format!("bit length {} is outside 1..=64", signal.length),
                    });
                }
            }
        }
        Ok(Self { version, messages })
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Checks that every declared choice fits its signal's raw range.
    pub fn check_choices(&self) -> Result<()> {
        for message in &self.messages {
            for signal in &message.signals {
                let Some(choices) = &signal.choices else {
                    continue;
                };
                let (lo, hi) = raw_range(signal.length, signal.is_signed);
                if let Some((value, name)) = choices.iter().find(|(v, _)| **v < lo || **v > hi) {
                    return Err(CodegenError::InvalidChoice {
                        message: message.name.clone(),
                        signal: signal.name.clone(),
                        value: *value,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Reads a catalog from its JSON object form.
pub fn parse_schema(map: &Map<String, Value>, prune_choices: bool) -> anyhow::Result<Schema> {
    let version = map
        .get("version")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let entries = map
        .get("messages")
        .and_then(|v| v.as_array())
        .context("catalog requires a 'messages' array")?;

    let mut messages = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let msg_map = entry
            .as_object()
            .with_context(|| format!("message #{} must be an object", index))?;
        messages.push(parse_message(msg_map, prune_choices)?);
    }

    Ok(Schema::new(version, messages)?)
}

fn parse_message(map: &Map<String, Value>, prune_choices: bool) -> anyhow::Result<Message> {
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .context("message is missing 'name'")?;
    let frame_id = map
        .get("frame_id")
        .and_then(|v| v.as_u64())
        .with_context(|| format!("message '{}' is missing 'frame_id'", name))?;
    let frame_id = u32::try_from(frame_id)
        .with_context(|| format!("frame id of message '{}' does not fit 32 bits", name))?;
    let length = map
        .get("length")
        .and_then(|v| v.as_u64())
        .with_context(|| format!("message '{}' is missing 'length'", name))?;
    let length = usize::try_from(length)
        .with_context(|| format!("length of message '{}' is out of range", name))?;

    let signal_values: &[Value] = match map.get("signals") {
        Some(value) => value
            .as_array()
            .with_context(|| format!("'signals' of message '{}' must be an array", name))?
            .as_slice(),
        None => &[],
    };
    let mut signals = Vec::with_capacity(signal_values.len());
    for value in signal_values {
        let sig_map = value
            .as_object()
            .with_context(|| format!("signal in message '{}' must be an object", name))?;
        let signal = parse_signal(sig_map, prune_choices)
            .with_context(|| format!("invalid signal in message '{}'", name))?;
        signals.push(signal);
    }

    let senders = map
        .get("senders")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|s| s.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let cycle_time_ms = match map.get("cycle_time").and_then(|v| v.as_u64()) {
        Some(value) => Some(u32::try_from(value).with_context(|| {
            format!("cycle time of message '{}' does not fit 32 bits", name)
        })?),
        None => None,
    };

    Ok(Message {
        frame_id,
        is_extended_frame: map
            .get("is_extended_frame")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        name: name.to_string(),
        length,
        signals,
        comment: get_optional_str(map, "comment"),
        senders,
        cycle_time_ms,
    })
}

fn parse_signal(map: &Map<String, Value>, prune_choices: bool) -> anyhow::Result<Signal> {
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .context("signal is missing 'name'")?;
    let start = map
        .get("start")
        .and_then(|v| v.as_u64())
        .with_context(|| format!("signal '{}' is missing 'start'", name))?;
    let start = u32::try_from(start)
        .with_context(|| format!("start bit {} of signal '{}' is out of range", start, name))?;
    let length = map
        .get("length")
        .and_then(|v| v.as_u64())
        .with_context(|| format!("signal '{}' is missing 'length'", name))?;
    let length = u32::try_from(length)
        .with_context(|| format!("bit length {} of signal '{}' is out of range", length, name))?;
    let byte_order = match map.get("byte_order") {
        Some(value) => {
            let text = value
                .as_str()
                .with_context(|| format!("'byte_order' of signal '{}' must be a string", name))?;
            ByteOrder::from_str(text)?
        }
        None => ByteOrder::default(),
    };

    let mut choices = match map.get("choices") {
        Some(value) => {
            let obj = value
                .as_object()
                .with_context(|| format!("'choices' of signal '{}' must be an object", name))?;
            let mut choices = BTreeMap::new();
            for (key, label) in obj {
                let raw: i128 = key.trim().parse().with_context(|| {
                    format!("choice key '{}' of signal '{}' is not an integer", key, name)
                })?;
                let label = label.as_str().with_context(|| {
                    format!("choice {} of signal '{}' must be a string", key, name)
                })?;
                choices.insert(raw, label.to_string());
            }
            Some(choices)
        }
        None => None,
    };
    if prune_choices {
        if let Some(choices) = choices.as_mut() {
            prune_choice_names(choices);
        }
    }

    Ok(Signal {
        name: name.to_string(),
        start,
        length,
        byte_order,
        is_signed: map
            .get("is_signed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        scale: map.get("scale").and_then(|v| v.as_f64()).unwrap_or(1.0),
        offset: map.get("offset").and_then(|v| v.as_f64()).unwrap_or(0.0),
        minimum: map.get("minimum").and_then(|v| v.as_f64()),
        maximum: map.get("maximum").and_then(|v| v.as_f64()),
        initial: map.get("initial").and_then(|v| v.as_i64()).map(i128::from),
        unit: get_optional_str(map, "unit"),
        comment: get_optional_str(map, "comment"),
        choices,
    })
}

fn get_optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Drops the `_`-separated words shared by the start of every choice name.
pub(crate) fn prune_choice_names(choices: &mut BTreeMap<i128, String>) {
    if choices.len() < 2 {
        return;
    }
    let words: Vec<Vec<&str>> = choices.values().map(|n| n.split('_').collect()).collect();
    let shortest = words.iter().map(Vec::len).min().unwrap_or(0);
    let mut common = 0;
    while common + 1 < shortest && words.iter().all(|w| w[common] == words[0][common]) {
        common += 1;
    }
    if common == 0 {
        return;
    }
    let pruned: Vec<String> = words.iter().map(|w| w[common..].join("_")).collect();
    let usable = pruned
        .iter()
        .all(|n| n.chars().next().is_some_and(|c| !c.is_ascii_digit()));
    if !usable {
        return;
    }
    for (name, short) in choices.values_mut().zip(pruned) {
        *name = short;
    }
}
