//! Pickle stream framing and conversion.
//!
//! Composite artifacts hold several pickles written back to back. The
//! decoder only accepts a single object per buffer: `value_from_slice` and
//! `value_from_reader` fail with trailing bytes after the first `STOP`, and
//! `Deserializer::new` wraps its reader in a `BufReader`, so a shared
//! `Cursor` is read past the object boundary. [`split_stream`] walks opcodes
//! to find each `STOP` and returns one slice per object.

use serde_json::{Map, Number, Value as Json};
use serde_pickle::{DeOptions, HashableValue, Value};

use super::codec::CodecError;

const STOP: u8 = b'.';

/// How an opcode's argument is laid out after the opcode byte.
enum Arg {
    None,
    Fixed(usize),
    /// Length prefix of the given width, little endian, then that many bytes.
    Counted(usize),
    /// Newline-terminated text lines (protocol 0).
    Lines(usize),
}

fn arg_of(opcode: u8) -> Option<Arg> {
    let arg = match opcode {
        // no argument
        b'(' | b'.' | b'0' | b'1' | b'2' | b'N' | b'R' | b'a' | b'b' | b'd' | b'}' | b'e'
        | b'l' | b']' | b'o' | b's' | b't' | b')' | b'u' | b'Q' | 0x81 | 0x85 | 0x86
        | 0x87 | 0x88 | 0x89 | 0x8f | 0x90 | 0x91 | 0x92 | 0x93 | 0x94 | 0x97 | 0x98 => {
            Arg::None
        }
        b'K' | b'h' | b'q' | 0x80 | 0x82 => Arg::Fixed(1),
        b'M' | 0x83 => Arg::Fixed(2),
        b'J' | b'j' | b'r' | 0x84 => Arg::Fixed(4),
        b'G' | 0x95 => Arg::Fixed(8),
        b'U' | b'C' | 0x8a | 0x8c => Arg::Counted(1),
        b'T' | b'X' | b'B' | 0x8b => Arg::Counted(4),
        0x8d | 0x8e | 0x96 => Arg::Counted(8),
        b'I' | b'L' | b'F' | b'S' | b'V' | b'P' | b'g' | b'p' => Arg::Lines(1),
        b'c' | b'i' => Arg::Lines(2),
        _ => return None,
    };
    Some(arg)
}

fn truncated(offset: usize) -> CodecError {
    CodecError::Framing(format!("stream truncated at offset {offset}"))
}

/// Split a buffer of concatenated pickles into one slice per object.
pub fn split_stream(bytes: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let opcode = bytes[pos];
        let arg = arg_of(opcode).ok_or_else(|| {
            CodecError::Framing(format!("unknown opcode 0x{opcode:02x} at offset {pos}"))
        })?;
        pos += 1;

        match arg {
            Arg::None => {}
            Arg::Fixed(n) => pos += n,
            Arg::Counted(width) => {
                let prefix = bytes.get(pos..pos + width).ok_or_else(|| truncated(pos))?;
                let mut le = [0u8; 8];
                le[..width].copy_from_slice(prefix);
                let len = usize::try_from(u64::from_le_bytes(le))
                    .map_err(|_| truncated(pos))?;
                pos = pos
                    .checked_add(width)
                    .and_then(|p| p.checked_add(len))
                    .ok_or_else(|| truncated(pos))?;
            }
            Arg::Lines(count) => {
                for _ in 0..count {
                    let newline = bytes[pos.min(bytes.len())..]
                        .iter()
                        .position(|b| *b == b'\n')
                        .ok_or_else(|| truncated(pos))?;
                    pos += newline + 1;
                }
            }
        }
        if pos > bytes.len() {
            return Err(truncated(bytes.len()));
        }

        if opcode == STOP {
            parts.push(&bytes[start..pos]);
            start = pos;
        }
    }

    if start != bytes.len() {
        return Err(CodecError::Framing(format!(
            "{} trailing bytes without STOP",
            bytes.len() - start
        )));
    }
    Ok(parts)
}

/// Decode a single pickled object.
pub fn decode(part: &[u8]) -> Result<Value, CodecError> {
    Ok(serde_pickle::value_from_slice(part, DeOptions::new())?)
}

/// Convert a decoded pickle value to JSON. Mapping keys become strings and
/// non-finite floats become `null`.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::I64(n) => Json::from(*n),
        Value::Int(n) => Json::String(n.to_string()),
        Value::F64(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        Value::Bytes(b) => Json::String(String::from_utf8_lossy(b).into_owned()),
        Value::String(s) => Json::String(s.clone()),
        Value::List(items) | Value::Tuple(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Set(items) | Value::FrozenSet(items) => Json::Array(
            items
                .iter()
                .map(|h| to_json(&h.clone().into_value()))
                .collect(),
        ),
        Value::Dict(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(key_text(k), to_json(v));
            }
            Json::Object(out)
        }
        #[allow(unreachable_patterns)]
        _ => Json::Null,
    }
}

/// Textual form of a mapping key, matching how the serving side looks it up.
pub fn key_text(key: &HashableValue) -> String {
    match key {
        HashableValue::None => "None".to_string(),
        HashableValue::Bool(true) => "True".to_string(),
        HashableValue::Bool(false) => "False".to_string(),
        HashableValue::I64(n) => n.to_string(),
        HashableValue::Int(n) => n.to_string(),
        HashableValue::F64(f) => f.to_string(),
        HashableValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        HashableValue::String(s) => s.clone(),
        other => to_json(&other.clone().into_value()).to_string(),
    }
}

/// Plain text of a scalar object (the training mode marker).
pub fn scalar_text(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        Value::I64(n) => Ok(n.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::F64(f) => Ok(f.to_string()),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        _ => Err(CodecError::LayoutMismatch(
            "training mode is not a scalar".into(),
        )),
    }
}

/// Per-minute statistics of one feature on one day index.
#[derive(Debug, Clone, PartialEq)]
pub struct DayTable {
    pub feature: String,
    pub day: String,
    pub minutes: Json,
}

/// Flatten a `feature -> day_index -> minute -> stats` mapping into one
/// table per (feature, day) pair.
pub fn day_tables(model: &Value) -> Result<Vec<DayTable>, CodecError> {
    let Value::Dict(features) = model else {
        return Err(CodecError::LayoutMismatch(
            "statistical model is not a feature mapping".into(),
        ));
    };

    let mut tables = Vec::new();
    for (feature, days) in features {
        let feature = key_text(feature);
        let Value::Dict(days) = days else {
            return Err(CodecError::LayoutMismatch(format!(
                "feature {feature} is not a day mapping"
            )));
        };
        for (day, minutes) in days {
            if !matches!(minutes, Value::Dict(_)) {
                return Err(CodecError::LayoutMismatch(format!(
                    "feature {feature} day {} is not a minute mapping",
                    key_text(day)
                )));
            }
            tables.push(DayTable {
                feature: feature.clone(),
                day: key_text(day),
                minutes: to_json(minutes),
            });
        }
    }
    Ok(tables)
}
