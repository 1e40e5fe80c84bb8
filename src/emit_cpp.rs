//! C/C++ code generator for message codecs.
//!
//! Generates the shared record header (structs, macros, pack/unpack and
//! per-signal conversion functions) and the transceiver dispatch layer.

use std::fmt::Write as FmtWrite;

use crate::codec::MessageCodec;
use crate::error::Result;
use crate::layout::BitSegment;
use crate::record::{FieldLayout, PrimitiveType, StorageClass};
use crate::schema::{Message, Signal};
use crate::value::raw_range;
use crate::{GeneratorConfig, camel_to_snake_case, to_macro_ident, to_pascal_case};

/// C helper functions shared by every generated header.
const HELPER_TEMPLATE: &str = include_str!("msg_template/cpp/endec_helpers.hpp");

/// Generates the record/codec header.
///
/// # Arguments
/// * `codecs` - Planned messages, in emission order
/// * `config` - Generator options; `database_name` prefixes every identifier
/// * `version` - Catalog version, echoed in the banner
/// * `filename` - Name the header is written under (used for the guard)
pub fn generate_endec(
    codecs: &[MessageCodec],
    config: &GeneratorConfig,
    version: Option<&str>,
    filename: &str,
) -> Result<String> {
    let header_guard = header_guard_name(&config.database_name, filename);

    let mut out = String::new();
    write_banner(&mut out, config, version, "Message records and codecs")?;

    writeln!(&mut out, "#ifndef {}", header_guard)?;
    writeln!(&mut out, "#define {}\n", header_guard)?;

    out.push_str(
        "#include <errno.h>\n#include <math.h>\n#include <stdbool.h>\n#include <stddef.h>\n#include <stdint.h>\n#include <string.h>\n\n",
    );
    out.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");
    out.push_str(HELPER_TEMPLATE);

    for codec in codecs {
        out.push('\n');
        generate_message_macros(&mut out, config, codec.message())?;
    }
    for codec in codecs {
        out.push('\n');
        generate_record_struct(&mut out, config, codec)?;
    }
    for codec in codecs {
        out.push('\n');
        generate_pack(&mut out, config, codec)?;
        generate_unpack(&mut out, config, codec)?;
        for field in &codec.layout().fields {
            generate_signal_functions(&mut out, config, codec.message(), field)?;
        }
    }

    out.push_str("\n#ifdef __cplusplus\n}\n#endif\n\n");
    writeln!(&mut out, "#endif /* {} */", header_guard)?;

    Ok(out)
}

/// Generates the dispatch declarations header.
pub fn generate_transceiver_h(
    codecs: &[MessageCodec],
    config: &GeneratorConfig,
    version: Option<&str>,
    filename: &str,
    endec_header: &str,
) -> Result<String> {
    let db = &config.database_name;
    let db_macro = to_macro_ident(db);
    let header_guard = header_guard_name(db, filename);

    let mut out = String::new();
    write_banner(&mut out, config, version, "Transceiver declarations")?;

    writeln!(&mut out, "#ifndef {}", header_guard)?;
    writeln!(&mut out, "#define {}\n", header_guard)?;
    writeln!(&mut out, "#include <stddef.h>\n#include <stdint.h>\n")?;
    writeln!(&mut out, "#include \"{}\"\n", endec_header)?;
    out.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");

    writeln!(&mut out, "#define {}_MESSAGE_COUNT ({}u)\n", db_macro, codecs.len())?;

    writeln!(
        &mut out,
        "typedef int (*{db}_pack_fn_t)(uint8_t *dst_p, const void *src_p, size_t size);"
    )?;
    writeln!(
        &mut out,
        "typedef int (*{db}_unpack_fn_t)(void *dst_p, const uint8_t *src_p, size_t size);\n"
    )?;

    writeln!(&mut out, "struct {db}_codec_entry_t {{")?;
    out.push_str("    uint32_t frame_id;\n");
    out.push_str("    size_t length;\n");
    out.push_str("    size_t record_size;\n");
    writeln!(&mut out, "    {db}_pack_fn_t pack;")?;
    writeln!(&mut out, "    {db}_unpack_fn_t unpack;")?;
    out.push_str("};\n\n");

    out.push_str("/**\n * Find the codec of given frame id.\n *\n * @return Table entry, or NULL if the frame id is unknown.\n */\n");
    writeln!(
        &mut out,
        "const struct {db}_codec_entry_t *{db}_transceiver_lookup(uint32_t frame_id);\n"
    )?;
    out.push_str("/**\n * Pack a record into the payload of given frame id.\n *\n * @return Payload size, -ENOENT for unknown frame ids or -EINVAL\n *         if dst_p is too small.\n */\n");
    writeln!(
        &mut out,
        "int {db}_transceiver_send(uint32_t frame_id, const void *src_p, uint8_t *dst_p, size_t size);\n"
    )?;
    out.push_str("/**\n * Unpack the payload of given frame id into a record.\n *\n * @return zero(0), -ENOENT for unknown frame ids or -EINVAL if the\n *         payload is shorter than the message length.\n */\n");
    writeln!(
        &mut out,
        "int {db}_transceiver_receive(uint32_t frame_id, const uint8_t *src_p, size_t size, void *dst_p);\n"
    )?;

    out.push_str("#ifdef __cplusplus\n}\n\n");
    let class_name = format!("{}Transceiver", to_pascal_case(db));
    writeln!(&mut out, "class {} {{", class_name)?;
    out.push_str("public:\n");
    writeln!(
        &mut out,
        "    int send(uint32_t frame_id, const void *record_p, uint8_t *dst_p, size_t size) const\n    {{\n        return {db}_transceiver_send(frame_id, record_p, dst_p, size);\n    }}\n"
    )?;
    writeln!(
        &mut out,
        "    int receive(uint32_t frame_id, const uint8_t *src_p, size_t size, void *record_p) const\n    {{\n        return {db}_transceiver_receive(frame_id, src_p, size, record_p);\n    }}\n"
    )?;
    writeln!(
        &mut out,
        "    bool knows(uint32_t frame_id) const\n    {{\n        return {db}_transceiver_lookup(frame_id) != NULL;\n    }}\n"
    )?;
    writeln!(
        &mut out,
        "    static size_t message_count()\n    {{\n        return {db_macro}_MESSAGE_COUNT;\n    }}"
    )?;
    out.push_str("};\n#endif\n\n");

    writeln!(&mut out, "#endif /* {} */", header_guard)?;
    Ok(out)
}

/// Generates the dispatch implementation: a table sorted by frame id and a
/// binary-search lookup over it.
pub fn generate_transceiver_cpp(
    codecs: &[MessageCodec],
    config: &GeneratorConfig,
    version: Option<&str>,
    transceiver_header: &str,
) -> Result<String> {
    let db = &config.database_name;
    let db_macro = to_macro_ident(db);

    let mut out = String::new();
    write_banner(&mut out, config, version, "Transceiver implementation")?;
    writeln!(&mut out, "#include <errno.h>\n#include <stddef.h>\n")?;
    writeln!(&mut out, "#include \"{}\"\n", transceiver_header)?;

    let mut sorted: Vec<&MessageCodec> = codecs.iter().collect();
    sorted.sort_by_key(|c| c.message().frame_id);

    for codec in &sorted {
        let base = fn_base(config, codec.message());
        writeln!(
            &mut out,
            "static int {base}_pack_erased(uint8_t *dst_p, const void *src_p, size_t size)\n{{\n    return {base}_pack(dst_p, (const struct {base}_t *)src_p, size);\n}}\n"
        )?;
        writeln!(
            &mut out,
            "static int {base}_unpack_erased(void *dst_p, const uint8_t *src_p, size_t size)\n{{\n    return {base}_unpack((struct {base}_t *)dst_p, src_p, size);\n}}\n"
        )?;
    }

    if sorted.is_empty() {
        writeln!(
            &mut out,
            "static const struct {db}_codec_entry_t *const {db}_codec_table = NULL;\n"
        )?;
    } else {
        out.push_str("/* Sorted by frame id. */\n");
        writeln!(
            &mut out,
            "static const struct {db}_codec_entry_t {db}_codec_table[{db_macro}_MESSAGE_COUNT] = {{"
        )?;
        for codec in &sorted {
            let base = fn_base(config, codec.message());
            let macro_prefix = macro_base(config, codec.message());
            writeln!(
                &mut out,
                "    {{ {macro_prefix}_FRAME_ID, {macro_prefix}_LENGTH, sizeof(struct {base}_t), {base}_pack_erased, {base}_unpack_erased }},"
            )?;
        }
        out.push_str("};\n\n");
    }

    writeln!(
        &mut out,
        "const struct {db}_codec_entry_t *{db}_transceiver_lookup(uint32_t frame_id)\n{{"
    )?;
    out.push_str("    size_t low = 0u;\n");
    writeln!(&mut out, "    size_t high = {db_macro}_MESSAGE_COUNT;\n")?;
    out.push_str("    while (low < high) {\n");
    out.push_str("        size_t mid = low + (high - low) / 2u;\n");
    writeln!(&mut out, "        uint32_t mid_id = {db}_codec_table[mid].frame_id;\n")?;
    writeln!(
        &mut out,
        "        if (mid_id == frame_id) {{\n            return &{db}_codec_table[mid];\n        }}"
    )?;
    out.push_str("        if (mid_id < frame_id) {\n            low = mid + 1u;\n        } else {\n            high = mid;\n        }\n    }\n\n    return NULL;\n}\n\n");

    writeln!(
        &mut out,
        "int {db}_transceiver_send(uint32_t frame_id, const void *src_p, uint8_t *dst_p, size_t size)\n{{"
    )?;
    writeln!(
        &mut out,
        "    const struct {db}_codec_entry_t *entry_p = {db}_transceiver_lookup(frame_id);\n"
    )?;
    out.push_str("    if (entry_p == NULL) {\n        return (-ENOENT);\n    }\n\n");
    out.push_str("    if (size < entry_p->length) {\n        return (-EINVAL);\n    }\n\n");
    out.push_str("    return (entry_p->pack(dst_p, src_p, size));\n}\n\n");

    writeln!(
        &mut out,
        "int {db}_transceiver_receive(uint32_t frame_id, const uint8_t *src_p, size_t size, void *dst_p)\n{{"
    )?;
    writeln!(
        &mut out,
        "    const struct {db}_codec_entry_t *entry_p = {db}_transceiver_lookup(frame_id);\n"
    )?;
    out.push_str("    if (entry_p == NULL) {\n        return (-ENOENT);\n    }\n\n");
    out.push_str("    if (size < entry_p->length) {\n        return (-EINVAL);\n    }\n\n");
    out.push_str("    return (entry_p->unpack(dst_p, src_p, size));\n}\n");

    Ok(out)
}

fn write_banner(
    out: &mut String,
    config: &GeneratorConfig,
    version: Option<&str>,
    role: &str,
) -> Result<()> {
    writeln!(out, "/*")?;
    writeln!(out, " * Auto-generated by can_endec_gen.")?;
    writeln!(out, " * Database: {}", config.database_name)?;
    writeln!(out, " * {}", role)?;
    if let Some(version) = version {
        writeln!(out, " * Catalog version: {}", version)?;
    }
    if config.bit_fields {
        writeln!(out, " * Records use bit fields.")?;
    }
    writeln!(out, " */\n")?;
    Ok(())
}

fn generate_message_macros(out: &mut String, config: &GeneratorConfig, msg: &Message) -> Result<()> {
    let prefix = macro_base(config, msg);
    writeln!(out, "/* Frame ids, lengths and choices of {}. */", msg.name)?;
    writeln!(out, "#define {}_FRAME_ID (0x{:02x}u)", prefix, msg.frame_id)?;
    writeln!(out, "#define {}_LENGTH ({}u)", prefix, msg.length)?;
    writeln!(
        out,
        "#define {}_IS_EXTENDED ({})",
        prefix,
        u8::from(msg.is_extended_frame)
    )?;
    if let Some(cycle_time) = msg.cycle_time_ms {
        writeln!(out, "#define {}_CYCLE_TIME_MS ({}u)", prefix, cycle_time)?;
    }

    for signal in &msg.signals {
        let Some(choices) = &signal.choices else {
            continue;
        };
        let primitive = PrimitiveType::for_bits(signal.length, signal.is_signed);
        let signal_macro = to_macro_ident(&signal.name);
        for (value, name) in choices {
            writeln!(
                out,
                "#define {}_{}_{}_CHOICE ({})",
                prefix,
                signal_macro,
                to_macro_ident(name),
                c_int_literal(*value, primitive)
            )?;
        }
    }
    Ok(())
}

fn generate_record_struct(
    out: &mut String,
    config: &GeneratorConfig,
    codec: &MessageCodec,
) -> Result<()> {
    let msg = codec.message();
    let layout = codec.layout();
    let base = fn_base(config, msg);

    writeln!(out, "/**")?;
    writeln!(out, " * Signals in message {}.", msg.name)?;
    writeln!(out, " *")?;
    if let Some(comment) = &msg.comment {
        writeln!(out, " * {}", comment)?;
        writeln!(out, " *")?;
    }
    if !msg.senders.is_empty() {
        writeln!(out, " * Senders: {}", msg.senders.join(", "))?;
    }
    writeln!(out, " * Record storage: {} bytes.", layout.size_bytes)?;
    writeln!(out, " *")?;
    writeln!(out, " * All signal values are as on the CAN bus.")?;
    writeln!(out, " */")?;
    writeln!(out, "struct {}_t {{", base)?;

    if layout.fields.is_empty() {
        out.push_str("    /**\n     * Dummy signal in empty message.\n     */\n    uint8_t dummy;\n");
    }
    for (index, field) in layout.fields.iter().enumerate() {
        let signal = &msg.signals[field.signal];
        if index > 0 {
            out.push('\n');
        }
        write_signal_doc(out, signal, field, "    ")?;
        let ident = camel_to_snake_case(&field.name);
        if layout.bit_fields {
            writeln!(
                out,
                "    {} {} : {};",
                field.primitive.c_type(),
                ident,
                field.storage_bits
            )?;
        } else {
            writeln!(out, "    {} {};", field.primitive.c_type(), ident)?;
        }
    }
    writeln!(out, "}};")?;
    Ok(())
}

fn write_signal_doc(out: &mut String, signal: &Signal, field: &FieldLayout, indent: &str) -> Result<()> {
    let (lo, hi) = raw_range(signal.length, signal.is_signed);
    writeln!(out, "{indent}/**")?;
    if let Some(comment) = &signal.comment {
        writeln!(out, "{indent} * {}", comment)?;
        writeln!(out, "{indent} *")?;
    }
    let unit = signal.unit.as_deref().unwrap_or("-");
    match (signal.minimum, signal.maximum) {
        (Some(min), Some(max)) => {
            writeln!(out, "{indent} * Range: {}..{} ({}..{} {})", lo, hi, min, max, unit)?
        }
        _ => writeln!(out, "{indent} * Range: {}..{}", lo, hi)?,
    }
    writeln!(out, "{indent} * Scale: {}", signal.scale)?;
    writeln!(out, "{indent} * Offset: {}", signal.offset)?;
    writeln!(
        out,
        "{indent} * Layout: start {}, length {}, {}",
        signal.start,
        signal.length,
        signal.byte_order.display_name()
    )?;
    if field.class == StorageClass::Enumerated {
        writeln!(out, "{indent} * Choices: see *_CHOICE macros.")?;
    }
    writeln!(out, "{indent} */")?;
    Ok(())
}

fn generate_pack(out: &mut String, config: &GeneratorConfig, codec: &MessageCodec) -> Result<()> {
    let msg = codec.message();
    let base = fn_base(config, msg);
    let macro_prefix = macro_base(config, msg);

    writeln!(out, "/**")?;
    writeln!(out, " * Pack message {}.", msg.name)?;
    writeln!(out, " *")?;
    writeln!(out, " * @return Size of packed data, or negative error code.")?;
    writeln!(out, " */")?;
    writeln!(
        out,
        "static inline int {base}_pack(\n    uint8_t *dst_p,\n    const struct {base}_t *src_p,\n    size_t size)\n{{"
    )?;
    let fields = &codec.layout().fields;
    for field in fields {
        writeln!(
            out,
            "    {} {}_raw;",
            field.primitive.c_unsigned_type(),
            camel_to_snake_case(&field.name)
        )?;
    }
    if fields.is_empty() {
        out.push_str("    (void)src_p;\n\n");
    } else {
        out.push('\n');
    }
    writeln!(
        out,
        "    if (size < {macro_prefix}_LENGTH) {{\n        return (-EINVAL);\n    }}\n"
    )?;
    if msg.length > 0 {
        writeln!(out, "    memset(&dst_p[0], 0, {macro_prefix}_LENGTH);")?;
    }

    for field in fields {
        let ident = camel_to_snake_case(&field.name);
        let unsigned = field.primitive.c_unsigned_type();
        writeln!(out, "\n    {ident}_raw = ({unsigned})src_p->{ident};")?;
        for segment in &field.segments {
            writeln!(out, "    {}", pack_stmt(field.primitive, &ident, segment))?;
        }
    }

    writeln!(out, "\n    return ({macro_prefix}_LENGTH);\n}}\n")?;
    Ok(())
}

fn generate_unpack(out: &mut String, config: &GeneratorConfig, codec: &MessageCodec) -> Result<()> {
    let msg = codec.message();
    let base = fn_base(config, msg);
    let macro_prefix = macro_base(config, msg);

    writeln!(out, "/**")?;
    writeln!(out, " * Unpack message {}.", msg.name)?;
    writeln!(out, " *")?;
    writeln!(out, " * @return zero(0) or negative error code.")?;
    writeln!(out, " */")?;
    writeln!(
        out,
        "static inline int {base}_unpack(\n    struct {base}_t *dst_p,\n    const uint8_t *src_p,\n    size_t size)\n{{"
    )?;
    let fields = &codec.layout().fields;
    for field in fields {
        writeln!(
            out,
            "    {} {}_raw;",
            field.primitive.c_unsigned_type(),
            camel_to_snake_case(&field.name)
        )?;
    }
    if fields.is_empty() {
        out.push_str("    (void)dst_p;\n    (void)src_p;\n\n");
    } else {
        out.push('\n');
    }
    writeln!(
        out,
        "    if (size < {macro_prefix}_LENGTH) {{\n        return (-EINVAL);\n    }}"
    )?;

    for field in fields {
        let signal = &msg.signals[field.signal];
        let ident = camel_to_snake_case(&field.name);
        out.push('\n');
        for (index, segment) in field.segments.iter().enumerate() {
            let op = if index == 0 { "=" } else { "|=" };
            writeln!(
                out,
                "    {ident}_raw {op} {};",
                unpack_expr(field.primitive, segment)
            )?;
        }
        if signal.is_signed && signal.length < field.primitive.bits() {
            let sign_bit = c_unsigned_literal(1u64 << (signal.length - 1), field.primitive);
            let extension = c_unsigned_literal(
                width_mask(field.primitive.bits()) & !width_mask(signal.length),
                field.primitive,
            );
            writeln!(
                out,
                "    if (({ident}_raw & {sign_bit}) != 0u) {{\n        {ident}_raw |= {extension};\n    }}"
            )?;
        }
        writeln!(
            out,
            "    dst_p->{ident} = ({}){ident}_raw;",
            field.primitive.c_type()
        )?;
    }

    out.push_str("\n    return (0);\n}\n\n");
    Ok(())
}

fn generate_signal_functions(
    out: &mut String,
    config: &GeneratorConfig,
    msg: &Message,
    field: &FieldLayout,
) -> Result<()> {
    let signal = &msg.signals[field.signal];
    let name = format!("{}_{}", fn_base(config, msg), camel_to_snake_case(&signal.name));
    let c_type = field.primitive.c_type();
    let (lo, hi) = raw_range(signal.length, signal.is_signed);

    writeln!(
        out,
        "/**\n * Encode given physical value of signal {}.\n *\n * Out of range values saturate.\n */",
        signal.name
    )?;
    writeln!(out, "static inline {c_type} {name}_encode(double value)\n{{")?;
    out.push_str("    double raw;\n\n");
    if let Some(min) = signal.minimum {
        writeln!(out, "    if (value < {}) {{\n        value = {};\n    }}", c_double(min), c_double(min))?;
    }
    if let Some(max) = signal.maximum {
        writeln!(out, "    if (value > {}) {{\n        value = {};\n    }}", c_double(max), c_double(max))?;
    }
    writeln!(
        out,
        "    raw = round((value - {}) / {});",
        c_double(signal.offset),
        c_double(signal.scale)
    )?;
    write_bound_correction(out, signal)?;
    writeln!(
        out,
        "    if (raw <= {}) {{\n        return ({});\n    }}",
        c_double(lo as f64),
        c_int_literal(lo, field.primitive)
    )?;
    writeln!(
        out,
        "    if (raw >= {}) {{\n        return ({});\n    }}",
        c_double(hi as f64),
        c_int_literal(hi, field.primitive)
    )?;
    writeln!(out, "\n    return ({c_type})raw;\n}}\n")?;

    writeln!(
        out,
        "/**\n * Decode given raw value of signal {}.\n */",
        signal.name
    )?;
    writeln!(out, "static inline double {name}_decode({c_type} value)\n{{")?;
    writeln!(
        out,
        "    return ((double)value * {} + {});\n}}\n",
        c_double(signal.scale),
        c_double(signal.offset)
    )?;

    writeln!(
        out,
        "/**\n * Check that given raw value of signal {} is in range.\n */",
        signal.name
    )?;
    writeln!(out, "static inline bool {name}_is_in_range({c_type} value)\n{{")?;
    match (signal.minimum, signal.maximum) {
        (None, None) => out.push_str("    (void)value;\n\n    return (true);\n}\n\n"),
        (min, max) => {
            writeln!(out, "    double physical = {name}_decode(value);\n")?;
            let mut checks = Vec::new();
            if let Some(min) = min {
                checks.push(format!("(physical >= {})", c_double(min)));
            }
            if let Some(max) = max {
                checks.push(format!("(physical <= {})", c_double(max)));
            }
            writeln!(out, "    return ({});\n}}\n", checks.join(" && "))?;
        }
    }
    Ok(())
}

/// Steps a rounded raw value one unit back inside the declared bounds,
/// matching [`crate::value::physical_to_raw`].
fn write_bound_correction(out: &mut String, signal: &Signal) -> Result<()> {
    let step = if signal.scale > 0.0 { "1.0" } else { "-1.0" };
    let physical = format!(
        "(raw * {} + {})",
        c_double(signal.scale),
        c_double(signal.offset)
    );
    if let Some(max) = signal.maximum {
        if signal.minimum.is_none_or(|min| min <= max) {
            writeln!(
                out,
                "    if ({} > {}) {{\n        raw -= {};\n    }}",
                physical,
                c_double(max),
                step
            )?;
        }
    }
    if let Some(min) = signal.minimum {
        if signal.maximum.is_none_or(|max| max >= min) {
            writeln!(
                out,
                "    if ({} < {}) {{\n        raw += {};\n    }}",
                physical,
                c_double(min),
                step
            )?;
        }
    }
    Ok(())
}

/// `dst_p[i] |= ...;` for one segment of a signal.
fn pack_stmt(primitive: PrimitiveType, ident: &str, segment: &BitSegment) -> String {
    let width = helper_suffix(primitive);
    let (direction, shift) = if segment.bit_offset >= segment.value_bit_offset {
        ("left", segment.bit_offset - segment.value_bit_offset)
    } else {
        ("right", segment.value_bit_offset - segment.bit_offset)
    };
    format!(
        "dst_p[{}] |= can_endec_pack_{}_shift_{}({}_raw, {}u, 0x{:02x}u);",
        segment.byte_index,
        direction,
        width,
        ident,
        shift,
        segment.byte_mask()
    )
}

/// Expression reading one segment back into value position.
fn unpack_expr(primitive: PrimitiveType, segment: &BitSegment) -> String {
    let width = helper_suffix(primitive);
    let (direction, shift) = if segment.value_bit_offset >= segment.bit_offset {
        ("left", segment.value_bit_offset - segment.bit_offset)
    } else {
        ("right", segment.bit_offset - segment.value_bit_offset)
    };
    format!(
        "can_endec_unpack_{}_shift_{}(src_p[{}], {}u, 0x{:02x}u)",
        direction,
        width,
        segment.byte_index,
        shift,
        segment.byte_mask()
    )
}

fn helper_suffix(primitive: PrimitiveType) -> &'static str {
    match primitive.bits() {
        8 => "u8",
        16 => "u16",
        32 => "u32",
        _ => "u64",
    }
}

fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn c_unsigned_literal(value: u64, primitive: PrimitiveType) -> String {
    if primitive.bits() > 32 {
        format!("0x{:x}ull", value)
    } else {
        format!("0x{:x}u", value)
    }
}

fn c_int_literal(value: i128, primitive: PrimitiveType) -> String {
    let wide = primitive.bits() > 32;
    if primitive.is_signed() {
        if value == i128::from(i64::MIN) {
            "INT64_MIN".to_string()
        } else if value == i128::from(i32::MIN) {
            "INT32_MIN".to_string()
        } else if wide {
            format!("{}ll", value)
        } else {
            format!("{}", value)
        }
    } else if wide {
        format!("{}ull", value)
    } else {
        format!("{}u", value)
    }
}

/// Formats a double so that it is always a valid C floating literal.
fn c_double(value: f64) -> String {
    let text = format!("{:?}", value);
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

fn fn_base(config: &GeneratorConfig, msg: &Message) -> String {
    format!("{}_{}", config.database_name, camel_to_snake_case(&msg.name))
}

fn macro_base(config: &GeneratorConfig, msg: &Message) -> String {
    to_macro_ident(&fn_base(config, msg))
}

fn header_guard_name(database_name: &str, file_name: &str) -> String {
    let mut guard = to_macro_ident(database_name);
    guard.push('_');
    for ch in file_name.chars() {
        if ch.is_ascii_alphanumeric() {
            guard.push(ch.to_ascii_uppercase());
        } else {
            guard.push('_');
        }
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ByteOrder;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            database_name: "motohawk".to_string(),
            ..GeneratorConfig::default()
        }
    }

    fn temperature_codec(bit_fields: bool) -> MessageCodec {
        let message = Message::new(
            0x1f0,
            "ExampleMessage",
            8,
            vec![
                Signal::new("Temperature", 0, 12, ByteOrder::BigEndian)
                    .signed()
                    .with_scaling(0.01, 250.0)
                    .with_range(229.52, 270.47),
                Signal::new("Enable", 12, 1, ByteOrder::BigEndian)
                    .with_choices([(0, "Disabled"), (1, "Enabled")]),
            ],
        );
        MessageCodec::new(&message, bit_fields, true).unwrap()
    }

    #[test]
    fn test_pack_statements_follow_segments() {
        let codec = temperature_codec(false);
        let source = generate_endec(&[codec], &config(), None, "endec.hpp").unwrap();
        assert!(source.contains(
            "dst_p[0] |= can_endec_pack_right_shift_u16(temperature_raw, 4u, 0xffu);"
        ));
        assert!(source.contains(
            "dst_p[1] |= can_endec_pack_left_shift_u16(temperature_raw, 4u, 0xf0u);"
        ));
        assert!(source.contains(
            "temperature_raw = can_endec_unpack_left_shift_u16(src_p[0], 4u, 0xffu);"
        ));
        assert!(source.contains("temperature_raw |= 0xf000u;"));
        assert!(source.contains("#define MOTOHAWK_EXAMPLE_MESSAGE_FRAME_ID (0x1f0u)"));
        assert!(source.contains("#define MOTOHAWK_EXAMPLE_MESSAGE_ENABLE_ENABLED_CHOICE (1u)"));
        assert!(source.contains("#ifndef MOTOHAWK_ENDEC_HPP"));
    }

    #[test]
    fn test_bit_field_struct_members() {
        let codec = temperature_codec(true);
        let source = generate_endec(&[codec], &config(), None, "endec.hpp").unwrap();
        assert!(source.contains("    int16_t temperature : 12;"));
        assert!(source.contains("    uint8_t enable : 1;"));
    }

    #[test]
    fn test_signal_conversion_functions() {
        let codec = temperature_codec(false);
        let source = generate_endec(&[codec], &config(), None, "endec.hpp").unwrap();
        assert!(source.contains(
            "static inline int16_t motohawk_example_message_temperature_encode(double value)"
        ));
        assert!(source.contains("raw = round((value - 250.0) / 0.01);"));
        assert!(source.contains("return ((double)value * 0.01 + 250.0);"));
        assert!(source.contains("return ((physical >= 229.52) && (physical <= 270.47));"));
    }

    #[test]
    fn test_transceiver_table_is_sorted() {
        let first = MessageCodec::new(&Message::new(0x300, "Late", 1, vec![]), false, true).unwrap();
        let second = MessageCodec::new(&Message::new(0x100, "Early", 1, vec![]), false, true).unwrap();
        let source =
            generate_transceiver_cpp(&[first, second], &config(), None, "transceiver.h").unwrap();
        let early = source.find("{ MOTOHAWK_EARLY_FRAME_ID").unwrap();
        let late = source.find("{ MOTOHAWK_LATE_FRAME_ID").unwrap();
        assert!(early < late);
        assert!(source.contains("return (-ENOENT);"));
    }

    #[test]
    fn test_encode_steps_back_inside_off_grid_bounds() {
        let message = Message::new(
            0x10,
            "Level",
            1,
            vec![
                Signal::new("Fill", 0, 8, ByteOrder::LittleEndian)
                    .with_scaling(0.1, 0.0)
                    .with_range(0.04, 0.96),
            ],
        );
        let codec = MessageCodec::new(&message, false, true).unwrap();
        let source = generate_endec(&[codec], &config(), None, "endec.hpp").unwrap();
        let rounding = source.find("raw = round((value - 0.0) / 0.1);").unwrap();
        let upper = source
            .find("    if ((raw * 0.1 + 0.0) > 0.96) {\n        raw -= 1.0;\n    }")
            .unwrap();
        let lower = source
            .find("    if ((raw * 0.1 + 0.0) < 0.04) {\n        raw += 1.0;\n    }")
            .unwrap();
        assert!(rounding < upper && upper < lower);
    }

    #[test]
    fn test_encode_correction_follows_negative_scale() {
        let message = Message::new(
            0x11,
            "Trim",
            1,
            vec![
                Signal::new("Angle", 0, 8, ByteOrder::LittleEndian)
                    .signed()
                    .with_scaling(-0.1, 0.0)
                    .with_range(-0.96, 0.96),
            ],
        );
        let codec = MessageCodec::new(&message, false, true).unwrap();
        let source = generate_endec(&[codec], &config(), None, "endec.hpp").unwrap();
        assert!(source.contains("    if ((raw * -0.1 + 0.0) > 0.96) {\n        raw -= -1.0;\n    }"));
        assert!(source.contains("    if ((raw * -0.1 + 0.0) < -0.96) {\n        raw += -1.0;\n    }"));
    }

    #[test]
    fn test_c_literals() {
        assert_eq!(c_double(250.0), "250.0");
        assert_eq!(c_double(0.01), "0.01");
        assert_eq!(c_int_literal(-2048, PrimitiveType::Int16), "-2048");
        assert_eq!(c_int_literal(i128::from(i64::MIN), PrimitiveType::Int64), "INT64_MIN");
        assert_eq!(c_int_literal(255, PrimitiveType::Uint8), "255u");
    }
}
