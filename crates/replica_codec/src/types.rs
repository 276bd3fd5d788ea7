//! Value types with dedicated wire encodings.

use std::fmt;

use crate::bits::{BitReader, BitWriter};
use crate::error::Result;
use crate::wire::{FieldKind, WireValue};

/// Identifier of a game object, unique within its zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId(pub i64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObjectId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl WireValue for ObjectId {
    const KIND: FieldKind = FieldKind::ObjectId;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_i64(self.0);
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self(reader.read_i64()?))
    }
}

/// String transmitted as UTF-16LE code units with a u32 unit count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WString(pub String);

impl WString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn write_units(value: &str, writer: &mut BitWriter) {
        for unit in value.encode_utf16() {
            writer.write_u16(unit);
        }
    }

    pub(crate) fn read_units(reader: &mut BitReader<'_>, count: usize) -> Result<String> {
        reader.ensure_declared(count.saturating_mul(16))?;
        let mut units = Vec::with_capacity(count);
        for _ in 0..count {
            units.push(reader.read_u16()?);
        }
        Ok(String::from_utf16(&units)?)
    }
}

impl From<&str> for WString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for WString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl WireValue for WString {
    const KIND: FieldKind = FieldKind::WStr;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_u32(self.0.encode_utf16().count() as u32);
        Self::write_units(&self.0, writer);
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        let count = reader.read_u32()? as usize;
        Ok(Self(Self::read_units(reader, count)?))
    }
}

/// Unsigned integer written with leading zero bytes folded into single bits.
///
/// Starting from the most significant byte, each zero byte costs one `1` bit.
/// The first non-zero byte emits a `0` bit followed by all remaining bytes
/// raw. When only the lowest byte is left, a `1` bit plus its low nibble is
/// written if its high nibble is zero, otherwise a `0` bit and the full byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Compressed<T>(pub T);

macro_rules! compressed_wire_value {
    ($($ty:ty),*) => {
        $(
            impl WireValue for Compressed<$ty> {
                const KIND: FieldKind = FieldKind::Compressed {
                    width: std::mem::size_of::<$ty>() as u8,
                };

                fn write_to(&self, writer: &mut BitWriter) {
                    write_compressed(&self.0.to_le_bytes(), writer);
                }

                fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    read_compressed(&mut bytes, reader)?;
                    Ok(Self(<$ty>::from_le_bytes(bytes)))
                }
            }
        )*
    };
}

compressed_wire_value!(u16, u32, u64);

fn write_compressed(bytes: &[u8], writer: &mut BitWriter) {
    let mut current = bytes.len() - 1;
    while current > 0 {
        if bytes[current] == 0 {
            writer.write_bit(true);
        } else {
            writer.write_bit(false);
            writer.write_bytes(&bytes[..=current]);
            return;
        }
        current -= 1;
    }

    if bytes[0] & 0xF0 == 0 {
        writer.write_bit(true);
        writer.write_bits(bytes[0] as u64, 4);
    } else {
        writer.write_bit(false);
        writer.write_u8(bytes[0]);
    }
}

fn read_compressed(bytes: &mut [u8], reader: &mut BitReader<'_>) -> Result<()> {
    let mut current = bytes.len() - 1;
    while current > 0 {
        if reader.read_bit()? {
            bytes[current] = 0;
        } else {
            for byte in bytes.iter_mut().take(current + 1) {
                *byte = reader.read_u8()?;
            }
            return Ok(());
        }
        current -= 1;
    }

    bytes[0] = if reader.read_bit()? {
        reader.read_bits(4)? as u8
    } else {
        reader.read_u8()?
    };
    Ok(())
}

/// Position or velocity in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl WireValue for Vector3 {
    const KIND: FieldKind = FieldKind::Vector;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
        })
    }
}

/// Rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl WireValue for Quaternion {
    const KIND: FieldKind = FieldKind::Quaternion;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
        writer.write_f32(self.z);
        writer.write_f32(self.w);
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            z: reader.read_f32()?,
            w: reader.read_f32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: WireValue>(value: &T) -> BitWriter {
        let mut writer = BitWriter::new();
        value.write_to(&mut writer);
        writer
    }

    #[test]
    fn small_compressed_values_use_a_nibble() {
        // Three zero bytes, then the `1` marker and four value bits.
        let writer = encoded(&Compressed(5u32));
        assert_eq!(writer.bit_len(), 3 + 1 + 4);
        assert_eq!(writer.as_bytes(), &[0b1111_0101]);
    }

    #[test]
    fn compressed_values_keep_their_value() {
        for value in [0u32, 0x0F, 0x10, 0xFF, 0x100, 0x00AB_0000, u32::MAX] {
            let writer = encoded(&Compressed(value));
            let bytes = writer.into_bytes();
            let decoded = Compressed::<u32>::read_from(&mut BitReader::new(&bytes)).unwrap();
            assert_eq!(decoded.0, value, "value {value:#x}");
        }
    }

    #[test]
    fn large_compressed_values_cost_one_extra_bit() {
        let writer = encoded(&Compressed(u64::MAX));
        assert_eq!(writer.bit_len(), 1 + 64);
    }

    #[test]
    fn wide_strings_use_utf16_units() {
        let writer = encoded(&WString::from("hé"));
        assert_eq!(writer.as_bytes(), &[2, 0, 0, 0, b'h', 0, 0xE9, 0]);

        let bytes = writer.into_bytes();
        let decoded = WString::read_from(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(decoded.as_str(), "hé");
    }

    #[test]
    fn truncated_wide_string_fails() {
        let mut writer = BitWriter::new();
        writer.write_u32(3);
        writer.write_u16(b'a' as u16);
        let bytes = writer.into_bytes();
        assert!(WString::read_from(&mut BitReader::new(&bytes)).is_err());
    }
}
