//! Generation entry points producing named text artifacts.

use tracing::{debug, warn};

use crate::codec::MessageCodec;
use crate::emit_cpp::{generate_endec, generate_transceiver_cpp, generate_transceiver_h};
use crate::emit_ros2::render_msg;
use crate::error::{CodegenError, Result};
use crate::schema::Schema;
use crate::{GeneratorConfig, to_pascal_case};

pub const ENDEC_HEADER: &str = "endec.hpp";
pub const TRANSCEIVER_HEADER: &str = "transceiver.h";
pub const TRANSCEIVER_SOURCE: &str = "transceiver.cpp";

/// What an artifact contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    /// Record structs, macros and pack/unpack functions.
    Records,
    DispatchDeclarations,
    DispatchImplementation,
    /// One ROS 2 `.msg` definition.
    InterchangeMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub role: ArtifactRole,
    /// Suggested file name.
    pub name: String,
    pub content: String,
}

/// Output of one generation run.
#[derive(Debug, Default)]
pub struct Generated {
    pub artifacts: Vec<Artifact>,
    /// Messages left out by a non-strict run.
    pub skipped: Vec<CodegenError>,
}

impl Generated {
    /// First artifact with the given role.
    pub fn get(&self, role: ArtifactRole) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.role == role)
    }
}

/// Plans a codec for every message, in catalog order.
///
/// Strict runs validate choices and stop at the first error. Non-strict runs
/// drop messages whose signals do not fit and return them as the second
/// element.
pub fn plan_codecs(
    schema: &Schema,
    config: &GeneratorConfig,
) -> Result<(Vec<MessageCodec>, Vec<CodegenError>)> {
    if config.strict {
        schema.check_choices()?;
    }

    let mut codecs = Vec::with_capacity(schema.messages().len());
    let mut skipped = Vec::new();
    for message in schema.messages() {
        match MessageCodec::new(message, config.bit_fields, config.strict) {
            Ok(codec) => codecs.push(codec),
            Err(err @ CodegenError::LayoutOverflow { .. }) if !config.strict => {
                warn!(message = %message.name, error = %err, "skipping message");
                skipped.push(err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok((codecs, skipped))
}

/// File names of the transceiver artifacts and how they include each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactNames {
    pub records: String,
    pub declarations: String,
    pub implementation: String,
    /// Include path of the declarations header as seen from the implementation.
    pub declarations_include: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            records: ENDEC_HEADER.to_string(),
            declarations: TRANSCEIVER_HEADER.to_string(),
            implementation: TRANSCEIVER_SOURCE.to_string(),
            declarations_include: TRANSCEIVER_HEADER.to_string(),
        }
    }
}

impl ArtifactNames {
    /// Names of the `include/can_lib` + `src` tree written by the CLI.
    pub fn autogen_tree() -> Self {
        Self {
            records: "endec_autogen.hpp".to_string(),
            declarations: "transceiver_autogen.h".to_string(),
            implementation: "transceiver_autogen.cpp".to_string(),
            declarations_include: "can_lib/transceiver_autogen.h".to_string(),
        }
    }
}

/// Generates the record header and the dispatch layer.
pub fn generate_transceiver(schema: &Schema, config: &GeneratorConfig) -> Result<Generated> {
    generate_transceiver_named(schema, config, &ArtifactNames::default())
}

/// Like [`generate_transceiver`], with custom artifact names.
pub fn generate_transceiver_named(
    schema: &Schema,
    config: &GeneratorConfig,
    names: &ArtifactNames,
) -> Result<Generated> {
    let (codecs, skipped) = plan_codecs(schema, config)?;
    let version = schema.version();

    let records = generate_endec(&codecs, config, version, &names.records)?;
    let declarations =
        generate_transceiver_h(&codecs, config, version, &names.declarations, &names.records)?;
    let implementation =
        generate_transceiver_cpp(&codecs, config, version, &names.declarations_include)?;

    debug!(
        database = %config.database_name,
        messages = codecs.len(),
        skipped = skipped.len(),
        "generated transceiver"
    );

    Ok(Generated {
        artifacts: vec![
            Artifact {
                role: ArtifactRole::Records,
                name: names.records.clone(),
                content: records,
            },
            Artifact {
                role: ArtifactRole::DispatchDeclarations,
                name: names.declarations.clone(),
                content: declarations,
            },
            Artifact {
                role: ArtifactRole::DispatchImplementation,
                name: names.implementation.clone(),
                content: implementation,
            },
        ],
        skipped,
    })
}

/// Generates only the record header.
pub fn generate_records(schema: &Schema, config: &GeneratorConfig) -> Result<Generated> {
    let (codecs, skipped) = plan_codecs(schema, config)?;
    let records = generate_endec(&codecs, config, schema.version(), ENDEC_HEADER)?;
    Ok(Generated {
        artifacts: vec![Artifact {
            role: ArtifactRole::Records,
            name: ENDEC_HEADER.to_string(),
            content: records,
        }],
        skipped,
    })
}

/// Generates one `.msg` artifact per message.
pub fn generate_interchange(schema: &Schema, config: &GeneratorConfig) -> Result<Generated> {
    let (codecs, skipped) = plan_codecs(schema, config)?;
    let mut artifacts = Vec::with_capacity(codecs.len());
    for codec in &codecs {
        artifacts.push(Artifact {
            role: ArtifactRole::InterchangeMessage,
            name: format!("{}.msg", to_pascal_case(&codec.message().name)),
            content: render_msg(codec)?,
        });
    }
    Ok(Generated { artifacts, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ByteOrder, Message, Signal};

    fn schema() -> Schema {
        Schema::new(
            None,
            vec![
                Message::new(
                    0x20,
                    "Wheel",
                    2,
                    vec![Signal::new("speed", 0, 16, ByteOrder::LittleEndian)],
                ),
                Message::new(
                    0x10,
                    "Oversized",
                    1,
                    vec![Signal::new("wide", 4, 8, ByteOrder::LittleEndian)],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_transceiver_artifacts() {
        let config = GeneratorConfig {
            strict: false,
            ..GeneratorConfig::default()
        };
        let generated = generate_transceiver(&schema(), &config).unwrap();
        assert_eq!(generated.artifacts.len(), 3);
        assert_eq!(generated.skipped.len(), 1);

        let records = generated.get(ArtifactRole::Records).unwrap();
        assert_eq!(records.name, "endec.hpp");
        assert!(records.content.contains("CAN_WHEEL_FRAME_ID"));
        assert!(!records.content.contains("OVERSIZED"));

        let declarations = generated.get(ArtifactRole::DispatchDeclarations).unwrap();
        assert!(declarations.content.contains("#include \"endec.hpp\""));
        assert!(declarations.content.contains("#define CAN_MESSAGE_COUNT (1u)"));
    }

    #[test]
    fn test_strict_run_aborts() {
        let err = generate_transceiver(&schema(), &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, CodegenError::LayoutOverflow { .. }));
    }

    #[test]
    fn test_interchange_names() {
        let config = GeneratorConfig {
            strict: false,
            ..GeneratorConfig::default()
        };
        let generated = generate_interchange(&schema(), &config).unwrap();
        let names: Vec<&str> = generated.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Wheel.msg"]);
    }

    #[test]
    fn test_autogen_tree_includes() {
        let config = GeneratorConfig {
            strict: false,
            ..GeneratorConfig::default()
        };
        let generated =
            generate_transceiver_named(&schema(), &config, &ArtifactNames::autogen_tree()).unwrap();
        let declarations = generated.get(ArtifactRole::DispatchDeclarations).unwrap();
        assert_eq!(declarations.name, "transceiver_autogen.h");
        assert!(declarations.content.contains("#include \"endec_autogen.hpp\""));
        let implementation = generated.get(ArtifactRole::DispatchImplementation).unwrap();
        assert!(implementation
            .content
            .contains("#include \"can_lib/transceiver_autogen.h\""));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let schema = Schema::new(
            Some("2".into()),
            vec![Message::new(
                1,
                "A",
                1,
                vec![Signal::new("x", 0, 8, ByteOrder::LittleEndian)],
            )],
        )
        .unwrap();
        let config = GeneratorConfig::default();
        let first = generate_transceiver(&schema, &config).unwrap();
        let second = generate_transceiver(&schema, &config).unwrap();
        assert_eq!(first.artifacts, second.artifacts);
    }
}
