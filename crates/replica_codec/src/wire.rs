//! Per-type wire encodings.
//!
//! [`WireValue`] is implemented for every type that may appear as a field of
//! a schema type: primitives, strings, optional values, lists and nested
//! schema structs (the `schema!` macro implements it for the structs it
//! declares).

use crate::bits::{BitReader, BitWriter};
use crate::error::{CodecError, Result};

/// Semantic type tag carried by each property descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// u32 byte count, UTF-8 bytes
    Str,
    /// u32 unit count, UTF-16LE units
    WStr,
    /// Leading zero bytes folded into single bits
    Compressed { width: u8 },
    ObjectId,
    Vector,
    Quaternion,
    /// Presence bit, then the value
    Optional,
    /// u32 element count, then the elements
    List,
    /// Compressed key/value metadata blob
    Dictionary,
    /// Nested schema type
    Struct(&'static str),
}

/// A value with a fixed, symmetric bit encoding.
pub trait WireValue: Sized {
    const KIND: FieldKind;

    fn write_to(&self, writer: &mut BitWriter);

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self>;
}

macro_rules! primitive_wire_value {
    ($($ty:ty => $kind:ident, $write:ident, $read:ident;)*) => {
        $(
            impl WireValue for $ty {
                const KIND: FieldKind = FieldKind::$kind;

                #[inline]
                fn write_to(&self, writer: &mut BitWriter) {
                    writer.$write(*self);
                }

                #[inline]
                fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
                    reader.$read()
                }
            }
        )*
    };
}

primitive_wire_value! {
    bool => Bool, write_bool, read_bool;
    u8 => U8, write_u8, read_u8;
    u16 => U16, write_u16, read_u16;
    u32 => U32, write_u32, read_u32;
    u64 => U64, write_u64, read_u64;
    i8 => I8, write_i8, read_i8;
    i16 => I16, write_i16, read_i16;
    i32 => I32, write_i32, read_i32;
    i64 => I64, write_i64, read_i64;
    f32 => F32, write_f32, read_f32;
    f64 => F64, write_f64, read_f64;
}

impl WireValue for String {
    const KIND: FieldKind = FieldKind::Str;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_u32(self.len() as u32);
        writer.write_bytes(self.as_bytes());
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl<T: WireValue> WireValue for Option<T> {
    const KIND: FieldKind = FieldKind::Optional;

    fn write_to(&self, writer: &mut BitWriter) {
        match self {
            Some(value) => {
                writer.write_bit(true);
                value.write_to(writer);
            }
            None => writer.write_bit(false),
        }
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        if reader.read_bit()? {
            Ok(Some(T::read_from(reader)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: WireValue> WireValue for Vec<T> {
    const KIND: FieldKind = FieldKind::List;

    fn write_to(&self, writer: &mut BitWriter) {
        writer.write_u32(self.len() as u32);
        for item in self {
            item.write_to(writer);
        }
    }

    fn read_from(reader: &mut BitReader<'_>) -> Result<Self> {
        let count = reader.read_u32()? as usize;
        // Every element occupies at least one bit.
        if count > reader.remaining_bits() {
            return Err(CodecError::LengthOverflow {
                declared: count,
                remaining: reader.remaining_bits(),
            });
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(T::read_from(reader)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: WireValue>(value: &T) -> T {
        let mut writer = BitWriter::new();
        value.write_to(&mut writer);
        let bytes = writer.into_bytes();
        T::read_from(&mut BitReader::new(&bytes)).unwrap()
    }

    #[test]
    fn strings_are_length_prefixed_and_never_truncated() {
        let long = "x".repeat(1000);
        let mut writer = BitWriter::new();
        long.write_to(&mut writer);
        assert_eq!(writer.as_bytes().len(), 4 + 1000);
        assert_eq!(round_trip(&long), long);
    }

    #[test]
    fn string_length_beyond_buffer_fails_cleanly() {
        let mut writer = BitWriter::new();
        writer.write_u32(500);
        writer.write_bytes(b"short");
        let bytes = writer.into_bytes();
        let result = String::read_from(&mut BitReader::new(&bytes));
        assert!(matches!(result, Err(CodecError::LengthOverflow { declared: 4000, .. })));
    }

    #[test]
    fn absurd_list_counts_are_rejected_before_allocating() {
        let mut writer = BitWriter::new();
        writer.write_u32(u32::MAX);
        let bytes = writer.into_bytes();
        let result = Vec::<u64>::read_from(&mut BitReader::new(&bytes));
        assert!(matches!(result, Err(CodecError::LengthOverflow { .. })));
    }

    #[test]
    fn optional_values_cost_one_bit_when_absent() {
        let mut writer = BitWriter::new();
        None::<u64>.write_to(&mut writer);
        assert_eq!(writer.bit_len(), 1);
        assert_eq!(round_trip(&Some(7u64)), Some(7));
        assert_eq!(round_trip(&vec![Some(1i16), None, Some(-3)]), vec![Some(1), None, Some(-3)]);
    }
}
