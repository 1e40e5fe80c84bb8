//! ROS 2 `.msg` interchange definitions.

use std::fmt::Write as FmtWrite;

use indexmap::IndexMap;
use tracing::debug;

use crate::codec::MessageCodec;
use crate::error::Result;
use crate::generate::plan_codecs;
use crate::record::{FieldLayout, StorageClass};
use crate::schema::{Schema, Signal};
use crate::value::raw_to_physical;
use crate::{GeneratorConfig, camel_to_snake_case, to_macro_ident, to_pascal_case};

/// Renders one `.msg` definition per message, keyed by the PascalCase stem.
///
/// Messages skipped by a non-strict plan get no definition.
pub fn generate_ros2_msgs(
    schema: &Schema,
    config: &GeneratorConfig,
) -> Result<IndexMap<String, String>> {
    let (codecs, _skipped) = plan_codecs(schema, config)?;
    let mut files = IndexMap::with_capacity(codecs.len());
    for codec in &codecs {
        let stem = to_pascal_case(&codec.message().name);
        files.insert(stem, render_msg(codec)?);
    }
    Ok(files)
}

/// Text of the `.msg` definition of one message.
pub fn render_msg(codec: &MessageCodec) -> Result<String> {
    let msg = codec.message();
    let mut out = String::new();

    writeln!(
        &mut out,
        "# {} (frame id 0x{:x}{}, {} bytes)",
        msg.name,
        msg.frame_id,
        if msg.is_extended_frame { ", extended" } else { "" },
        msg.length
    )?;
    if let Some(comment) = &msg.comment {
        for line in comment.lines() {
            writeln!(&mut out, "# {}", line)?;
        }
    }
    if let Some(cycle_time) = msg.cycle_time_ms {
        writeln!(&mut out, "# Cycle time: {} ms", cycle_time)?;
    }

    for field in &codec.layout().fields {
        out.push('\n');
        let signal = &msg.signals[field.signal];
        write_field(&mut out, signal, field)?;
    }

    debug!(message = %msg.name, fields = codec.layout().fields.len(), "rendered .msg");
    Ok(out)
}

fn write_field(out: &mut String, signal: &Signal, field: &FieldLayout) -> Result<()> {
    if let Some(comment) = &signal.comment {
        for line in comment.lines() {
            writeln!(out, "# {}", line)?;
        }
    }
    if let Some(unit) = &signal.unit {
        writeln!(out, "# Unit: {}", unit)?;
    }
    match (signal.minimum, signal.maximum) {
        (Some(min), Some(max)) => writeln!(out, "# Range: {}..{}", min, max)?,
        (Some(min), None) => writeln!(out, "# Minimum: {}", min)?,
        (None, Some(max)) => writeln!(out, "# Maximum: {}", max)?,
        (None, None) => {}
    }

    let ros_type = match field.class {
        StorageClass::Physical => "float64",
        StorageClass::Raw | StorageClass::Enumerated => field.primitive.ros2_type(),
    };
    let ident = camel_to_snake_case(&signal.name);

    if let Some(choices) = &signal.choices {
        let choice_type = field.primitive.ros2_type();
        let prefix = to_macro_ident(&ident);
        for (value, name) in choices {
            writeln!(
                out,
                "{} {}_{}={}",
                choice_type,
                prefix,
                to_macro_ident(name),
                value
            )?;
        }
    }

    match signal.initial {
        Some(initial) if field.class == StorageClass::Physical => {
            writeln!(out, "{} {} {:?}", ros_type, ident, raw_to_physical(signal, initial))?
        }
        Some(initial) => writeln!(out, "{} {} {}", ros_type, ident, initial)?,
        None => writeln!(out, "{} {}", ros_type, ident)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ByteOrder, Message};

    fn schema() -> Schema {
        Schema::new(
            Some("1.0".to_string()),
            vec![Message::new(
                0x1f0,
                "ExampleMessage",
                8,
                vec![
                    Signal::new("Enable", 0, 1, ByteOrder::BigEndian)
                        .with_choices([(0, "Disabled"), (1, "Enabled")]),
                    Signal::new("AverageRadius", 1, 6, ByteOrder::BigEndian)
                        .with_scaling(0.1, 0.0)
                        .with_range(0.0, 5.0)
                        .with_unit("m"),
                    Signal::new("Counter", 16, 12, ByteOrder::LittleEndian).with_initial(3),
                ],
            )
            .with_comment("Example message used as template.")],
        )
        .unwrap()
    }

    #[test]
    fn test_msg_fields() {
        let files = generate_ros2_msgs(&schema(), &GeneratorConfig::default()).unwrap();
        let text = &files["ExampleMessage"];
        assert!(text.starts_with("# ExampleMessage (frame id 0x1f0, 8 bytes)\n"));
        assert!(text.contains("# Example message used as template.\n"));
        assert!(text.contains("uint8 ENABLE_ENABLED=1\n"));
        assert!(text.contains("uint8 enable\n"));
        assert!(text.contains("# Unit: m\n# Range: 0..5\nfloat64 average_radius\n"));
        assert!(text.contains("uint16 counter 3\n"));
    }

    #[test]
    fn test_physical_initial_value_is_scaled() {
        let schema = Schema::new(
            None,
            vec![Message::new(
                1,
                "Gauge",
                1,
                vec![
                    Signal::new("level", 0, 8, ByteOrder::LittleEndian)
                        .with_scaling(0.5, 0.0)
                        .with_initial(3),
                ],
            )],
        )
        .unwrap();
        let files = generate_ros2_msgs(&schema, &GeneratorConfig::default()).unwrap();
        assert!(files["Gauge"].contains("float64 level 1.5\n"));
    }
}
