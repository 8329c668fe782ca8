//! MAT-file level 5 reader and writer
//!
//! The reader accepts either byte order, small and normal data-element tags,
//! and zlib-compressed variables. Arrays are squeezed on the way in:
//! one-element numeric arrays become scalars, 1×1 structs become records,
//! struct arrays and cells become lists (a one-element cell collapses to its
//! element) and char rows become text.
//!
//! The writer emits uncompressed little-endian files.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use tracing::debug;

use super::{ContainerError, Result, Value};

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;

/// Data element types
mod mi {
    pub const INT8: u32 = 1;
    pub const UINT8: u32 = 2;
    pub const INT16: u32 = 3;
    pub const UINT16: u32 = 4;
    pub const INT32: u32 = 5;
    pub const UINT32: u32 = 6;
    pub const SINGLE: u32 = 7;
    pub const DOUBLE: u32 = 9;
    pub const INT64: u32 = 12;
    pub const UINT64: u32 = 13;
    pub const MATRIX: u32 = 14;
    pub const COMPRESSED: u32 = 15;
    pub const UTF8: u32 = 16;
    pub const UTF16: u32 = 17;
    pub const UTF32: u32 = 18;
}

/// Array classes
mod mx {
    pub const CELL: u32 = 1;
    pub const STRUCT: u32 = 2;
    pub const CHAR: u32 = 4;
    pub const DOUBLE: u32 = 6;
    pub const UINT8: u32 = 9;
    pub const UINT64: u32 = 15;
}

const FLAG_COMPLEX: u32 = 0x0800;
const FLAG_LOGICAL: u32 = 0x0200;

/// Read every variable of a MAT file
pub fn read_mat(path: &Path) -> Result<BTreeMap<String, Value>> {
    let bytes = fs::read(path)?;
    parse_mat(&bytes)
}

/// Parse an in-memory MAT file
pub fn parse_mat(bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
    if bytes.len() < HEADER_LEN {
        return Err(ContainerError::InvalidHeader(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let body = &bytes[HEADER_LEN..];
    match &bytes[126..128] {
        b"IM" => parse_variables::<LittleEndian>(body),
        b"MI" => parse_variables::<BigEndian>(body),
        other => Err(ContainerError::InvalidHeader(format!(
            "unknown endian indicator {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn parse_variables<B: ByteOrder>(body: &[u8]) -> Result<BTreeMap<String, Value>> {
    let mut variables = BTreeMap::new();
    let mut cursor = Cursor::new(body);

    while let Some((kind, data)) = next_element::<B>(&mut cursor)? {
        match kind {
            mi::COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut inflated)?;
                variables.extend(parse_variables::<B>(&inflated)?);
            }
            mi::MATRIX => match parse_matrix::<B>(data) {
                Ok((name, value)) => {
                    variables.insert(name, value);
                }
                Err(ContainerError::Unsupported(what)) => {
                    debug!("skipping variable: {}", what);
                }
                Err(e) => return Err(e),
            },
            other => debug!("skipping top-level element of type {}", other),
        }
    }

    Ok(variables)
}

/// Next data element as (type, payload); `None` once fewer than 8 bytes remain
fn next_element<'a, B: ByteOrder>(cursor: &mut Cursor<&'a [u8]>) -> Result<Option<(u32, &'a [u8])>> {
    let buf: &'a [u8] = *cursor.get_ref();
    let pos = cursor.position() as usize;
    if buf.len().saturating_sub(pos) < 8 {
        return Ok(None);
    }

    let word = cursor.read_u32::<B>()?;
    if word >> 16 != 0 {
        let size = (word >> 16) as usize;
        if size > 4 {
            return Err(ContainerError::Malformed(format!(
                "small element claims {} bytes",
                size
            )));
        }
        cursor.set_position((pos + 8) as u64);
        return Ok(Some((word & 0xffff, &buf[pos + 4..pos + 4 + size])));
    }

    let size = cursor.read_u32::<B>()? as usize;
    let start = pos + 8;
    let end = start + size;
    if end > buf.len() {
        return Err(ContainerError::Malformed(format!(
            "element of type {} with {} bytes overruns its container",
            word, size
        )));
    }
    let next = if word == mi::COMPRESSED {
        end
    } else {
        (start + size.div_ceil(8) * 8).min(buf.len())
    };
    cursor.set_position(next as u64);
    Ok(Some((word, &buf[start..end])))
}

fn expect_element<'a, B: ByteOrder>(
    cursor: &mut Cursor<&'a [u8]>,
    what: &str,
) -> Result<(u32, &'a [u8])> {
    next_element::<B>(cursor)?
        .ok_or_else(|| ContainerError::Malformed(format!("missing {}", what)))
}

/// Parse a miMATRIX payload into its name and squeezed value
fn parse_matrix<B: ByteOrder>(data: &[u8]) -> Result<(String, Value)> {
    if data.is_empty() {
        return Ok((String::new(), Value::Numbers(Vec::new())));
    }

    let mut cursor = Cursor::new(data);
    let (_, flag_bytes) = expect_element::<B>(&mut cursor, "array flags")?;
    if flag_bytes.len() < 4 {
        return Err(ContainerError::Malformed("short array flags".into()));
    }
    let flags = B::read_u32(&flag_bytes[..4]);
    let class = flags & 0xff;

    let (dims_kind, dims_raw) = expect_element::<B>(&mut cursor, "dimensions")?;
    let dims: Vec<usize> = decode_numbers::<B>(dims_kind, dims_raw)?
        .into_iter()
        .map(|d| d.max(0.0) as usize)
        .collect();
    let count: usize = dims.iter().product();

    let (_, name_raw) = expect_element::<B>(&mut cursor, "array name")?;
    let name = String::from_utf8_lossy(name_raw).trim_end_matches('\0').to_string();

    let value = match class {
        mx::DOUBLE..=mx::UINT64 => {
            if flags & FLAG_COMPLEX != 0 {
                return Err(ContainerError::Unsupported(format!("complex array '{}'", name)));
            }
            let values = match next_element::<B>(&mut cursor)? {
                Some((kind, raw)) => decode_numbers::<B>(kind, raw)?,
                None => Vec::new(),
            };
            if flags & FLAG_LOGICAL != 0 {
                let bits: Vec<bool> = values.iter().map(|&x| x != 0.0).collect();
                match bits.as_slice() {
                    [single] => Value::Logical(*single),
                    _ => Value::Flags(bits),
                }
            } else {
                match values.as_slice() {
                    [single] => Value::Scalar(*single),
                    _ => Value::Numbers(values),
                }
            }
        }
        mx::CHAR => {
            let chars = match next_element::<B>(&mut cursor)? {
                Some((kind, raw)) => decode_chars::<B>(kind, raw)?,
                None => Vec::new(),
            };
            squeeze_chars(chars, dims.first().copied().unwrap_or(0))
        }
        mx::STRUCT => parse_struct::<B>(&mut cursor, count)?,
        mx::CELL => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let (kind, raw) = expect_element::<B>(&mut cursor, "cell element")?;
                if kind != mi::MATRIX {
                    return Err(ContainerError::Malformed(format!("cell element of type {}", kind)));
                }
                items.push(parse_matrix::<B>(raw)?.1);
            }
            if items.len() == 1 {
                items.remove(0)
            } else {
                Value::List(items)
            }
        }
        other => {
            return Err(ContainerError::Unsupported(format!(
                "array '{}' of class {}",
                name, other
            )))
        }
    };

    Ok((name, value))
}

fn parse_struct<B: ByteOrder>(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Value> {
    let (_, len_raw) = expect_element::<B>(cursor, "field name length")?;
    if len_raw.len() < 4 {
        return Err(ContainerError::Malformed("short field name length".into()));
    }
    let field_len = B::read_i32(&len_raw[..4]).max(0) as usize;
    let (_, names_raw) = expect_element::<B>(cursor, "field names")?;
    let fields: Vec<String> = if field_len == 0 {
        Vec::new()
    } else {
        names_raw
            .chunks(field_len)
            .map(|chunk| String::from_utf8_lossy(chunk).trim_end_matches('\0').to_string())
            .collect()
    };

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let mut record = BTreeMap::new();
        for field in &fields {
            let (kind, raw) = expect_element::<B>(cursor, field)?;
            if kind != mi::MATRIX {
                return Err(ContainerError::Malformed(format!(
                    "field '{}' has element type {}",
                    field, kind
                )));
            }
            match parse_matrix::<B>(raw) {
                Ok((_, value)) => {
                    record.insert(field.clone(), value);
                }
                Err(ContainerError::Unsupported(what)) => {
                    debug!(field = %field, "skipping field: {}", what);
                }
                Err(e) => return Err(e),
            }
        }
        records.push(Value::Record(record));
    }

    Ok(if records.len() == 1 {
        records.remove(0)
    } else {
        Value::List(records)
    })
}

fn decode_numbers<B: ByteOrder>(kind: u32, raw: &[u8]) -> Result<Vec<f64>> {
    let values = match kind {
        mi::INT8 => raw.iter().map(|&b| b as i8 as f64).collect(),
        mi::UINT8 | mi::UTF8 => raw.iter().map(|&b| b as f64).collect(),
        mi::INT16 => raw.chunks_exact(2).map(|c| B::read_i16(c) as f64).collect(),
        mi::UINT16 | mi::UTF16 => raw.chunks_exact(2).map(|c| B::read_u16(c) as f64).collect(),
        mi::INT32 => raw.chunks_exact(4).map(|c| B::read_i32(c) as f64).collect(),
        mi::UINT32 | mi::UTF32 => raw.chunks_exact(4).map(|c| B::read_u32(c) as f64).collect(),
        mi::SINGLE => raw.chunks_exact(4).map(|c| B::read_f32(c) as f64).collect(),
        mi::DOUBLE => raw.chunks_exact(8).map(B::read_f64).collect(),
        mi::INT64 => raw.chunks_exact(8).map(|c| B::read_i64(c) as f64).collect(),
        mi::UINT64 => raw.chunks_exact(8).map(|c| B::read_u64(c) as f64).collect(),
        other => {
            return Err(ContainerError::Malformed(format!(
                "numeric data of element type {}",
                other
            )))
        }
    };
    Ok(values)
}

fn decode_chars<B: ByteOrder>(kind: u32, raw: &[u8]) -> Result<Vec<char>> {
    Ok(match kind {
        mi::UTF8 => String::from_utf8_lossy(raw).chars().collect(),
        mi::UINT16 | mi::UTF16 => {
            let units: Vec<u16> = raw.chunks_exact(2).map(B::read_u16).collect();
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        _ => decode_numbers::<B>(kind, raw)?
            .into_iter()
            .map(|code| char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect(),
    })
}

/// One row becomes text; a char matrix becomes a list of its (space-trimmed) rows
fn squeeze_chars(chars: Vec<char>, rows: usize) -> Value {
    if rows <= 1 || chars.is_empty() {
        return Value::Text(chars.into_iter().collect());
    }
    let cols = chars.len() / rows;
    Value::List(
        (0..rows)
            .map(|r| {
                let row: String = (0..cols).map(|c| chars[c * rows + r]).collect();
                Value::Text(row.trim_end().to_string())
            })
            .collect(),
    )
}

/// Write variables to `path` as an uncompressed little-endian MAT file
pub fn write_mat(path: &Path, variables: &[(&str, &Value)]) -> Result<()> {
    let mut out = Vec::new();
    write_header(&mut out)?;
    for (name, value) in variables {
        write_matrix(&mut out, name, value)?;
    }
    fs::write(path, out)?;
    Ok(())
}

fn write_header(out: &mut Vec<u8>) -> io::Result<()> {
    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: perturb-tracks",
        std::env::consts::OS
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    out.extend_from_slice(&text);
    out.extend_from_slice(&[0u8; 8]);
    out.write_u16::<LittleEndian>(0x0100)?;
    out.extend_from_slice(b"IM");
    Ok(())
}

fn write_element(out: &mut Vec<u8>, kind: u32, data: &[u8]) -> io::Result<()> {
    if data.len() <= 4 {
        out.write_u32::<LittleEndian>(((data.len() as u32) << 16) | kind)?;
        out.extend_from_slice(data);
        out.resize(out.len() + 4 - data.len(), 0);
        return Ok(());
    }
    out.write_u32::<LittleEndian>(kind)?;
    out.write_u32::<LittleEndian>(data.len() as u32)?;
    out.extend_from_slice(data);
    out.resize(out.len() + data.len().div_ceil(8) * 8 - data.len(), 0);
    Ok(())
}

fn write_matrix(out: &mut Vec<u8>, name: &str, value: &Value) -> io::Result<()> {
    let mut body = Vec::new();
    write_matrix_body(&mut body, name, value)?;
    out.write_u32::<LittleEndian>(mi::MATRIX)?;
    out.write_u32::<LittleEndian>(body.len() as u32)?;
    out.extend_from_slice(&body);
    Ok(())
}

fn write_array_header(
    body: &mut Vec<u8>,
    class: u32,
    logical: bool,
    cols: usize,
    name: &str,
) -> io::Result<()> {
    let flags = class | if logical { FLAG_LOGICAL } else { 0 };
    let mut flag_bytes = Vec::with_capacity(8);
    flag_bytes.write_u32::<LittleEndian>(flags)?;
    flag_bytes.write_u32::<LittleEndian>(0)?;
    write_element(body, mi::UINT32, &flag_bytes)?;

    let mut dims = Vec::with_capacity(8);
    dims.write_i32::<LittleEndian>(1)?;
    dims.write_i32::<LittleEndian>(cols as i32)?;
    write_element(body, mi::INT32, &dims)?;

    write_element(body, mi::INT8, name.as_bytes())
}

fn write_matrix_body(body: &mut Vec<u8>, name: &str, value: &Value) -> io::Result<()> {
    match value {
        Value::Scalar(x) => write_doubles(body, name, std::slice::from_ref(x)),
        Value::Numbers(values) => write_doubles(body, name, values),
        Value::Logical(b) => write_flags(body, name, std::slice::from_ref(b)),
        Value::Flags(bits) => write_flags(body, name, bits),
        Value::Text(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            write_array_header(body, mx::CHAR, false, units.len(), name)?;
            let mut data = Vec::with_capacity(units.len() * 2);
            for unit in units {
                data.write_u16::<LittleEndian>(unit)?;
            }
            write_element(body, mi::UINT16, &data)
        }
        Value::Record(fields) => {
            write_array_header(body, mx::STRUCT, false, 1, name)?;
            let field_len = fields.keys().map(|k| k.len()).max().unwrap_or(0) + 1;
            let mut len_bytes = Vec::with_capacity(4);
            len_bytes.write_i32::<LittleEndian>(field_len as i32)?;
            write_element(body, mi::INT32, &len_bytes)?;

            let mut names = Vec::with_capacity(field_len * fields.len());
            for key in fields.keys() {
                let start = names.len();
                names.extend_from_slice(key.as_bytes());
                names.resize(start + field_len, 0);
            }
            write_element(body, mi::INT8, &names)?;

            for field in fields.values() {
                write_matrix(body, "", field)?;
            }
            Ok(())
        }
        Value::List(items) => {
            write_array_header(body, mx::CELL, false, items.len(), name)?;
            for item in items {
                write_matrix(body, "", item)?;
            }
            Ok(())
        }
    }
}

fn write_doubles(body: &mut Vec<u8>, name: &str, values: &[f64]) -> io::Result<()> {
    write_array_header(body, mx::DOUBLE, false, values.len(), name)?;
    let mut data = Vec::with_capacity(values.len() * 8);
    for &x in values {
        data.write_f64::<LittleEndian>(x)?;
    }
    write_element(body, mi::DOUBLE, &data)
}

fn write_flags(body: &mut Vec<u8>, name: &str, bits: &[bool]) -> io::Result<()> {
    write_array_header(body, mx::UINT8, true, bits.len(), name)?;
    let data: Vec<u8> = bits.iter().map(|&b| b as u8).collect();
    write_element(body, mi::UINT8, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn to_bytes(variables: &[(&str, &Value)]) -> Vec<u8> {
        let mut out = Vec::new();
        write_header(&mut out).unwrap();
        for (name, value) in variables {
            write_matrix(&mut out, name, value).unwrap();
        }
        out
    }

    #[test]
    fn test_header_layout() {
        let bytes = to_bytes(&[]);
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(bytes.starts_with(b"MATLAB 5.0 MAT-file"));
        assert_eq!(&bytes[126..128], b"IM");
        assert!(parse_mat(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_nested_record_survives() {
        let trial = Value::record([
            ("time", Value::Numbers(vec![0.0, 0.002, 0.004])),
            ("F1", Value::Numbers(vec![500.0, f64::NAN, 510.0])),
            ("label", Value::from("shiftUp")),
            ("used", Value::Flags(vec![true, false])),
        ]);
        let table = Value::record([(
            "bed",
            Value::record([("noShift", Value::List(vec![trial.clone(), trial.clone()]))]),
        )]);
        let vars = parse_mat(&to_bytes(&[("f1_data", &table)])).unwrap();

        let back = &vars["f1_data"];
        let Some(Value::List(trials)) = back.get("bed").and_then(|w| w.get("noShift")) else {
            panic!("expected a list of trials, got {:?}", back);
        };
        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].get("label"), Some(&Value::Text("shiftUp".into())));
        assert_eq!(trials[0].get("used"), Some(&Value::Flags(vec![true, false])));
        let Some(Value::Numbers(f1)) = trials[1].get("F1") else {
            panic!("F1 should be numeric");
        };
        assert_eq!(f1[0], 500.0);
        assert!(f1[1].is_nan());
    }

    #[test]
    fn test_single_elements_are_squeezed() {
        let one_cell = Value::List(vec![Value::from("bed")]);
        let vars = parse_mat(&to_bytes(&[
            ("x", &Value::Numbers(vec![4.5])),
            ("flag", &Value::Flags(vec![true])),
            ("words", &one_cell),
        ]))
        .unwrap();
        assert_eq!(vars["x"], Value::Scalar(4.5));
        assert_eq!(vars["flag"], Value::Logical(true));
        assert_eq!(vars["words"], Value::Text("bed".into()));
    }

    #[test]
    fn test_empty_values() {
        let vars = parse_mat(&to_bytes(&[
            ("nothing", &Value::Numbers(vec![])),
            ("blank", &Value::from("")),
            ("none", &Value::List(vec![])),
            ("bare", &Value::empty_record()),
        ]))
        .unwrap();
        assert_eq!(vars["nothing"], Value::Numbers(vec![]));
        assert_eq!(vars["blank"], Value::Text(String::new()));
        assert_eq!(vars["none"], Value::List(vec![]));
        assert_eq!(vars["bare"], Value::empty_record());
    }

    #[test]
    fn test_compressed_variable() {
        let mut plain = Vec::new();
        write_matrix(&mut plain, "signal", &Value::Numbers(vec![0.1, -0.2, 0.3])).unwrap();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut bytes = to_bytes(&[]);
        bytes.write_u32::<LittleEndian>(mi::COMPRESSED).unwrap();
        bytes.write_u32::<LittleEndian>(compressed.len() as u32).unwrap();
        bytes.extend_from_slice(&compressed);

        let vars = parse_mat(&bytes).unwrap();
        assert_eq!(vars["signal"], Value::Numbers(vec![0.1, -0.2, 0.3]));
    }

    #[test]
    fn test_big_endian_int16() {
        // int16 row [1, -2] written big-endian by hand
        let mut body = Vec::new();
        body.write_u32::<BigEndian>(mi::UINT32).unwrap();
        body.write_u32::<BigEndian>(8).unwrap();
        body.write_u32::<BigEndian>(10).unwrap(); // mxINT16
        body.write_u32::<BigEndian>(0).unwrap();
        body.write_u32::<BigEndian>(mi::INT32).unwrap();
        body.write_u32::<BigEndian>(8).unwrap();
        body.write_i32::<BigEndian>(1).unwrap();
        body.write_i32::<BigEndian>(2).unwrap();
        body.write_u32::<BigEndian>((1 << 16) | mi::INT8).unwrap();
        body.extend_from_slice(b"v\0\0\0");
        body.write_u32::<BigEndian>((4 << 16) | mi::INT16).unwrap();
        body.write_i16::<BigEndian>(1).unwrap();
        body.write_i16::<BigEndian>(-2).unwrap();

        let mut bytes = vec![b' '; 126];
        bytes.extend_from_slice(b"MI");
        bytes.write_u32::<BigEndian>(mi::MATRIX).unwrap();
        bytes.write_u32::<BigEndian>(body.len() as u32).unwrap();
        bytes.extend_from_slice(&body);

        let vars = parse_mat(&bytes).unwrap();
        assert_eq!(vars["v"], Value::Numbers(vec![1.0, -2.0]));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(parse_mat(b"short"), Err(ContainerError::InvalidHeader(_))));
        let bytes = vec![0u8; HEADER_LEN];
        assert!(matches!(parse_mat(&bytes), Err(ContainerError::InvalidHeader(_))));
    }

    #[test]
    fn test_char_matrix_rows() {
        // 2x3 column-major "abcdef" -> rows "ace", "bdf"
        let chars: Vec<char> = "abcdef".chars().collect();
        assert_eq!(
            squeeze_chars(chars, 2),
            Value::List(vec![Value::from("ace"), Value::from("bdf")])
        );
    }
}
