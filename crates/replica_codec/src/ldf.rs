//! Typed key/value metadata dictionary.
//!
//! Free-form object configuration travels as one compressed blob rather than
//! field by field. Each entry has a key, a type tag and a value. Three forms
//! are supported:
//!
//! * text, one `key=type:value` entry per line (used in zone metadata files),
//! * binary, a u32 entry count followed by `u8 key length, UTF-16LE key,
//!   u8 type, value` records,
//! * blob, the binary form wrapped in a size-prefixed zlib stream. This is
//!   the form used on the wire.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::bits::{BitReader, BitWriter};
use crate::error::{CodecError, Result};
use crate::types::WString;
use crate::wire::{FieldKind, WireValue};

/// Largest inflated dictionary accepted from the wire.
pub const MAX_DICTIONARY_BYTES: usize = 1 << 20;

/// A single typed dictionary value.
#[derive(Debug, Clone, PartialEq)]
pub enum LdfValue {
    WString(String),
    I32(i32),
    F32(f32),
    F64(f64),
    U32(u32),
    Bool(bool),
    I64(i64),
    ObjectId(i64),
    Utf8(String),
}

impl LdfValue {
    /// Numeric type tag used in both the text and binary forms.
    pub fn type_tag(&self) -> u8 {
        match self {
            LdfValue::WString(_) => 0,
            LdfValue::I32(_) => 1,
            LdfValue::F32(_) => 3,
            LdfValue::F64(_) => 4,
            LdfValue::U32(_) => 5,
            LdfValue::Bool(_) => 7,
            LdfValue::I64(_) => 8,
            LdfValue::ObjectId(_) => 9,
            LdfValue::Utf8(_) => 13,
        }
    }

    fn write_binary(&self, writer: &mut BitWriter) {
        writer.write_u8(self.type_tag());
        match self {
            LdfValue::WString(s) => WString(s.clone()).write_to(writer),
            LdfValue::I32(v) => writer.write_i32(*v),
            LdfValue::F32(v) => writer.write_f32(*v),
            LdfValue::F64(v) => writer.write_f64(*v),
            LdfValue::U32(v) => writer.write_u32(*v),
            LdfValue::Bool(v) => writer.write_u8(*v as u8),
            LdfValue::I64(v) | LdfValue::ObjectId(v) => writer.write_i64(*v),
            LdfValue::Utf8(s) => s.write_to(writer),
        }
    }

    fn read_binary(reader: &mut BitReader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => LdfValue::WString(WString::read_from(reader)?.0),
            1 => LdfValue::I32(reader.read_i32()?),
            3 => LdfValue::F32(reader.read_f32()?),
            4 => LdfValue::F64(reader.read_f64()?),
            5 => LdfValue::U32(reader.read_u32()?),
            7 => LdfValue::Bool(reader.read_u8()? != 0),
            8 => LdfValue::I64(reader.read_i64()?),
            9 => LdfValue::ObjectId(reader.read_i64()?),
            13 => LdfValue::Utf8(String::read_from(reader)?),
            other => return Err(CodecError::UnknownLdfType(other)),
        })
    }

    /// Parses the value half of a `type:value` pair.
    pub fn parse(tag: u8, text: &str) -> Result<Self> {
        let malformed = || CodecError::MalformedLdfText(format!("{tag}:{text}"));
        Ok(match tag {
            0 => LdfValue::WString(text.to_string()),
            1 => LdfValue::I32(text.parse().map_err(|_| malformed())?),
            3 => LdfValue::F32(text.parse().map_err(|_| malformed())?),
            4 => LdfValue::F64(text.parse().map_err(|_| malformed())?),
            5 => LdfValue::U32(text.parse().map_err(|_| malformed())?),
            7 => LdfValue::Bool(match text {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(malformed()),
            }),
            8 => LdfValue::I64(text.parse().map_err(|_| malformed())?),
            9 => LdfValue::ObjectId(text.parse().map_err(|_| malformed())?),
            13 => LdfValue::Utf8(text.to_string()),
            other => return Err(CodecError::UnknownLdfType(other)),
        })
    }
}

impl fmt::Display for LdfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdfValue::WString(s) | LdfValue::Utf8(s) => f.write_str(s),
            LdfValue::I32(v) => write!(f, "{v}"),
            LdfValue::F32(v) => write!(f, "{v}"),
            LdfValue::F64(v) => write!(f, "{v}"),
            LdfValue::U32(v) => write!(f, "{v}"),
            LdfValue::Bool(v) => write!(f, "{}", *v as u8),
            LdfValue::I64(v) | LdfValue::ObjectId(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered key/value dictionary; inserting an existing key replaces its value
/// in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdfDictionary {
    entries: Vec<(String, LdfValue)>,
}

impl LdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: LdfValue) -> Result<Option<LdfValue>> {
        let key = key.into();
        if key.encode_utf16().count() > u8::MAX as usize {
            return Err(CodecError::KeyTooLong(key));
        }
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Ok(Some(std::mem::replace(existing, value)));
        }
        self.entries.push((key, value));
        Ok(None)
    }

    pub fn get(&self, key: &str) -> Option<&LdfValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LdfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parses the text form. Blank lines are skipped.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut dictionary = Self::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, rest) = line
                .split_once('=')
                .ok_or_else(|| CodecError::MalformedLdfText(line.to_string()))?;
            let (tag, value) = rest
                .split_once(':')
                .ok_or_else(|| CodecError::MalformedLdfText(line.to_string()))?;
            let tag: u8 = tag
                .parse()
                .map_err(|_| CodecError::MalformedLdfText(line.to_string()))?;
            dictionary.insert(key, LdfValue::parse(tag, value)?)?;
        }
        Ok(dictionary)
    }

    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={}:{value}", value.type_tag()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_binary(&self, writer: &mut BitWriter) {
        writer.write_u32(self.entries.len() as u32);
        for (key, value) in &self.entries {
            writer.write_u8(key.encode_utf16().count() as u8);
            WString::write_units(key, writer);
            value.write_binary(writer);
        }
    }

    pub fn read_binary(reader: &mut BitReader<'_>) -> Result<Self> {
        let count = reader.read_u32()? as usize;
        // Smallest entry: empty key, tag, one-byte bool.
        reader.ensure_declared(count.saturating_mul(24))?;
        let mut dictionary = Self::new();
        for _ in 0..count {
            let key_len = reader.read_u8()? as usize;
            let key = WString::read_units(reader, key_len)?;
            let value = LdfValue::read_binary(reader)?;
            dictionary.insert(key, value)?;
        }
        Ok(dictionary)
    }

    /// Serializes the binary form into a blob, zlib-compressed when
    /// `compress` is set.
    pub fn to_blob(&self, compress: bool) -> Result<Vec<u8>> {
        let mut raw = BitWriter::new();
        self.write_binary(&mut raw);
        let raw = raw.into_bytes();

        let mut blob = BitWriter::with_capacity(raw.len() + 13);
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            let compressed = encoder.finish()?;
            blob.write_u32((1 + 8 + compressed.len()) as u32);
            blob.write_u8(1);
            blob.write_u32(raw.len() as u32);
            blob.write_u32(compressed.len() as u32);
            blob.write_bytes(&compressed);
        } else {
            blob.write_u32((1 + raw.len()) as u32);
            blob.write_u8(0);
            blob.write_bytes(&raw);
        }
        Ok(blob.into_bytes())
    }

    /// Reads a blob written by [`LdfDictionary::to_blob`].
    pub fn read_blob(reader: &mut BitReader<'_>) -> Result<Self> {
        let blob_len = reader.read_u32()? as usize;
        if blob_len == 0 {
            return Ok(Self::new());
        }
        let blob = reader.read_bytes(blob_len)?;
        let mut blob = BitReader::new(&blob);

        let raw = if blob.read_u8()? != 0 {
            let raw_len = blob.read_u32()? as usize;
            let compressed_len = blob.read_u32()? as usize;
            if raw_len > MAX_DICTIONARY_BYTES {
                return Err(CodecError::DictionaryTooLarge(raw_len));
            }
            let compressed = blob.read_bytes(compressed_len)?;
            let mut raw = Vec::new();
            ZlibDecoder::new(compressed.as_slice())
                .take(raw_len as u64)
                .read_to_end(&mut raw)?;
            if raw.len() != raw_len {
                return Err(CodecError::LengthOverflow {
                    declared: raw_len * 8,
                    remaining: raw.len() * 8,
                });
            }
            raw
        } else {
            blob.read_bytes(blob_len - 1)?
        };

        Self::read_binary(&mut BitReader::new(&raw))
    }
}

impl WireValue for LdfDictionary {
    const KIND: FieldKind = FieldKind::Dictionary;

    fn write_to(&self, writer: &mut BitWriter) {
        if self.is_empty() {
            writer.write_u32(0);
            return;
        }
        let blob = match self.to_blob(true) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("⚠️ Dictionary compression failed, sending uncompressed: {}", e);
                self.to_blob(false).unwrap_or_default()
            }
        };
        writer.write_bytes(&blob);
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        Self::read_blob(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LdfDictionary {
        LdfDictionary::from_text(
            "spawn_name=0:Nimbus Station\n\
             respawn=1:-3\n\
             scale=3:1.5\n\
             template=5:6010\n\
             is_smashable=7:1\n\
             owner=9:1152921510436607007\n\
             custom_script=13:scripts/ai/ag/npc.lua",
        )
        .unwrap()
    }

    #[test]
    fn text_form_parses_typed_values() {
        let dictionary = sample();
        assert_eq!(dictionary.len(), 7);
        assert_eq!(dictionary.get("respawn"), Some(&LdfValue::I32(-3)));
        assert_eq!(dictionary.get("is_smashable"), Some(&LdfValue::Bool(true)));
        assert_eq!(
            dictionary.get("spawn_name"),
            Some(&LdfValue::WString("Nimbus Station".into()))
        );
        assert_eq!(LdfDictionary::from_text(&dictionary.to_text()).unwrap(), dictionary);
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(matches!(
            LdfDictionary::from_text("no_separator"),
            Err(CodecError::MalformedLdfText(_))
        ));
        assert!(matches!(
            LdfDictionary::from_text("key=2:value"),
            Err(CodecError::UnknownLdfType(2))
        ));
        assert!(LdfDictionary::from_text("key=1:not-a-number").is_err());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut dictionary = LdfDictionary::new();
        dictionary.insert("a", LdfValue::U32(1)).unwrap();
        dictionary.insert("b", LdfValue::U32(2)).unwrap();
        let previous = dictionary.insert("a", LdfValue::U32(3)).unwrap();
        assert_eq!(previous, Some(LdfValue::U32(1)));
        let keys: Vec<_> = dictionary.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert!(dictionary.insert("k".repeat(256), LdfValue::Bool(false)).is_err());
    }

    #[test]
    fn compressed_and_plain_blobs_decode_identically() {
        let dictionary = sample();
        for compress in [true, false] {
            let blob = dictionary.to_blob(compress).unwrap();
            let decoded = LdfDictionary::read_blob(&mut BitReader::new(&blob)).unwrap();
            assert_eq!(decoded, dictionary);
        }
    }

    #[test]
    fn wire_form_is_a_single_blob() {
        let dictionary = sample();
        let mut writer = BitWriter::new();
        writer.write_bit(true);
        dictionary.write_to(&mut writer);
        writer.write_u16(0xBEEF);

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        assert_eq!(LdfDictionary::read_from(&mut reader).unwrap(), dictionary);
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
    }

    #[test]
    fn oversized_inflate_claims_are_rejected() {
        let mut writer = BitWriter::new();
        writer.write_u32(9);
        writer.write_u8(1);
        writer.write_u32(u32::MAX);
        writer.write_u32(0);
        let bytes = writer.into_bytes();
        assert!(matches!(
            LdfDictionary::read_blob(&mut BitReader::new(&bytes)),
            Err(CodecError::DictionaryTooLarge(_))
        ));
    }
}
