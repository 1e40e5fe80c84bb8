pub mod codec;
pub mod emit_cpp;
pub mod emit_ros2;
pub mod error;
pub mod generate;
pub mod layout;
pub mod record;
pub mod schema;
pub mod transceiver;
pub mod value;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::info;

pub use codec::{Codec, MessageCodec, Record};
pub use emit_ros2::generate_ros2_msgs;
pub use error::CodegenError;
pub use generate::{
    Artifact, ArtifactNames, ArtifactRole, Generated, generate_interchange, generate_records,
    generate_transceiver, generate_transceiver_named,
};
pub use schema::{ByteOrder, Message, Schema, Signal, parse_schema};
pub use transceiver::Transceiver;
pub use value::FieldValue;

/// Options of one generation run.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Prefix of every generated C identifier.
    pub database_name: String,
    /// Store signals as C bit fields of their exact width.
    pub bit_fields: bool,
    /// Abort on the first layout error instead of skipping the message.
    pub strict: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            database_name: "can".to_string(),
            bit_fields: false,
            strict: true,
        }
    }
}

/// CAN message codec and transceiver generator
#[derive(Parser, Debug)]
#[command(name = "can_endec_gen")]
#[command(about = "Generate C/C++ codecs, a transceiver and ROS 2 messages from a CAN catalog", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the record/codec header
    Endec {
        #[command(flatten)]
        database: DatabaseArgs,

        /// Directory the header is written to
        #[arg(long = "output-headers", default_value = ".")]
        output_headers: PathBuf,
    },

    /// Generate the record header plus the transceiver layer
    Transceiver {
        #[command(flatten)]
        database: DatabaseArgs,

        /// Root directory of the include/ and src/ trees
        #[arg(short = 'o', long = "output-directory", default_value = ".")]
        output_directory: PathBuf,
    },

    /// Generate one ROS 2 .msg file per message
    #[command(name = "ros2-msgs")]
    Ros2Msgs {
        #[command(flatten)]
        database: DatabaseArgs,

        #[arg(short = 'o', long = "output-directory", default_value = ".")]
        output_directory: PathBuf,
    },

    /// Decode one frame and print it as JSON
    Decode {
        #[command(flatten)]
        database: DatabaseArgs,

        /// Frame id, decimal or 0x-prefixed hex
        #[arg(long = "frame-id", value_parser = parse_frame_id)]
        frame_id: u32,

        /// Payload as hex, e.g. c00fa0
        data: String,
    },
}

/// Catalog input shared by all subcommands.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// JSON message catalog
    pub infile: PathBuf,

    /// Identifier prefix; defaults to the input file stem
    #[arg(long = "database-name")]
    pub database_name: Option<String>,

    /// Store signals as bit fields
    #[arg(long = "bit-fields")]
    pub bit_fields: bool,

    /// Shorten choice names by their common prefix
    #[arg(long)]
    pub prune: bool,

    /// Skip messages that fail layout checks instead of aborting
    #[arg(long = "no-strict")]
    pub no_strict: bool,
}

pub fn run() -> Result<()> {
    run_with(Cli::parse())
}

/// Executes an already parsed command line.
pub fn run_with(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Endec {
            database,
            output_headers,
        } => {
            let (schema, config) = load_database(&database)?;
            let generated = generate_records(&schema, &config)?;
            for artifact in &generated.artifacts {
                write_output(&output_headers.join(&artifact.name), &artifact.content)?;
            }
            info!(
                "Generated {} in {} for {} message(s), {} skipped.",
                generate::ENDEC_HEADER,
                output_headers.display(),
                schema.messages().len() - generated.skipped.len(),
                generated.skipped.len()
            );
        }
        Command::Transceiver {
            database,
            output_directory,
        } => {
            let (schema, config) = load_database(&database)?;
            let names = ArtifactNames::autogen_tree();
            let generated = generate_transceiver_named(&schema, &config, &names)?;
            for artifact in &generated.artifacts {
                let subdir = match artifact.role {
                    ArtifactRole::DispatchImplementation => "src",
                    _ => "include/can_lib",
                };
                let path = output_directory.join(subdir).join(&artifact.name);
                write_output(&path, &artifact.content)?;
            }
            info!(
                "Generated transceiver in {} for {} message(s), {} skipped.",
                output_directory.display(),
                schema.messages().len() - generated.skipped.len(),
                generated.skipped.len()
            );
        }
        Command::Ros2Msgs {
            database,
            output_directory,
        } => {
            let (schema, config) = load_database(&database)?;
            let generated = generate_interchange(&schema, &config)?;
            for artifact in &generated.artifacts {
                write_output(&output_directory.join(&artifact.name), &artifact.content)?;
            }
            info!(
                "Generated {} .msg file(s) in {}.",
                generated.artifacts.len(),
                output_directory.display()
            );
        }
        Command::Decode {
            database,
            frame_id,
            data,
        } => {
            let (schema, config) = load_database(&database)?;
            let payload = hex::decode(data.trim())
                .with_context(|| format!("payload '{}' is not valid hex", data))?;
            let transceiver = Transceiver::from_schema(&schema, &config)?;
            let record = transceiver.receive(frame_id, &payload)?;
            let name = transceiver.codec(frame_id)?.name().to_string();
            let output = serde_json::json!({ "name": name, "signals": record });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Reads the catalog named by `args` and derives the generator options.
pub fn load_database(args: &DatabaseArgs) -> Result<(Schema, GeneratorConfig)> {
    let raw = fs::read_to_string(&args.infile)
        .with_context(|| format!("failed to read catalog JSON: {}", args.infile.display()))?;
    let schema = load_schema_str(&raw, args.prune)
        .with_context(|| format!("invalid catalog {}", args.infile.display()))?;
    if schema.messages().is_empty() {
        bail!("no message definitions found in {}", args.infile.display());
    }

    let database_name = match &args.database_name {
        Some(name) => to_snake_case(name),
        None => args
            .infile
            .file_stem()
            .map(|stem| to_snake_case(&stem.to_string_lossy()))
            .unwrap_or_else(|| GeneratorConfig::default().database_name),
    };
    let config = GeneratorConfig {
        database_name,
        bit_fields: args.bit_fields,
        strict: !args.no_strict,
    };
    Ok((schema, config))
}

/// Parses a catalog from JSON text.
pub fn load_schema_str(raw: &str, prune_choices: bool) -> Result<Schema> {
    let json: Value = serde_json::from_str(raw).context("failed to parse catalog JSON")?;
    let obj = json
        .as_object()
        .context("top-level JSON must be an object")?;
    parse_schema(obj, prune_choices)
}

/// Writes `content` to `path`, creating parent directories.
pub fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    fs::write(path, content)
        .with_context(|| format!("failed to write output to {}", path.display()))
}

fn parse_frame_id(value: &str) -> std::result::Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid frame id '{}': {}", value, err))
}

pub(crate) fn to_snake_case(name: &str) -> String {
    let mut result = String::new();
    let mut last_was_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            let lower = ch.to_ascii_lowercase();
            if result.is_empty() && lower.is_ascii_digit() {
                result.push('_');
            }
            result.push(lower);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }
    if result.ends_with('_') {
        result.pop();
    }
    if result.is_empty() {
        result.push_str("can");
    }
    result
}

/// `ExampleMessage` -> `example_message`, `ABCValue` -> `abc_value`.
pub(crate) fn camel_to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut split = String::with_capacity(name.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                split.push('_');
            }
        }
        split.push(ch);
    }
    to_snake_case(&split)
}

pub(crate) fn to_macro_ident(name: &str) -> String {
    let mut result = String::new();
    let mut last_was_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            let upper = ch.to_ascii_uppercase();
            if result.is_empty() && upper.is_ascii_digit() {
                result.push('_');
            }
            result.push(upper);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }
    if result.ends_with('_') {
        result.pop();
    }
    if result.is_empty() {
        result.push_str("CAN");
    }
    result
}

/// Capitalizes each `_`/non-alphanumeric separated word, keeping inner case.
pub(crate) fn to_pascal_case(name: &str) -> String {
    let mut result = String::new();
    let mut capitalize = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if result.is_empty() && ch.is_ascii_digit() {
                result.push('M');
            }
            if capitalize {
                result.push(ch.to_ascii_uppercase());
            } else {
                result.push(ch);
            }
            capitalize = false;
        } else {
            capitalize = true;
        }
    }
    if result.is_empty() {
        result.push_str("Msg");
    }
    result
}
