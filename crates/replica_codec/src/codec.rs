//! Descriptor-driven encode and decode.
//!
//! Fields are written in descriptor order. Suppressible fields get a presence
//! bit: `0` means the field held its ignore value and no body follows, `1`
//! is followed by the body. Reading mirrors writing exactly, so for any value
//! without ambiguous suppression `encode(decode(bytes)) == bytes`.

use crate::bits::{BitReader, BitWriter};
use crate::descriptor::{Descriptors, Schema};
use crate::error::{CodecError, Result};

/// Writes `value` field by field using `descriptors`.
pub fn write<T>(value: &T, descriptors: &Descriptors<T>, writer: &mut BitWriter) {
    for property in descriptors {
        match property.suppression() {
            Some(suppression) if (suppression.is_ignored)(value) => writer.write_bit(false),
            Some(_) => {
                writer.write_bit(true);
                property.write_body(value, writer);
            }
            None => property.write_body(value, writer),
        }
    }
}

/// Reads a fresh `T` field by field using `descriptors`.
///
/// Exactly the fields listed are consumed; trailing data is left unread.
pub fn read<T: Default>(reader: &mut BitReader<'_>, descriptors: &Descriptors<T>) -> Result<T> {
    let mut value = T::default();
    for property in descriptors {
        let outcome = match property.suppression() {
            Some(suppression) => match reader.read_bit() {
                Ok(true) => property.read_body(&mut value, reader),
                Ok(false) => {
                    (suppression.restore)(&mut value);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            None => property.read_body(&mut value, reader),
        };

        outcome.map_err(|source| CodecError::Field {
            type_name: descriptors.type_name(),
            field: property.name(),
            source: Box::new(source),
        })?;
    }
    Ok(value)
}

/// Encodes a schema value into a standalone byte buffer.
pub fn encode<T: Schema>(value: &T) -> Vec<u8> {
    let mut writer = BitWriter::new();
    write(value, &T::descriptors(), &mut writer);
    writer.into_bytes()
}

/// Encodes a schema value onto an existing stream, e.g. after a frame header.
pub fn encode_into<T: Schema>(value: &T, writer: &mut BitWriter) {
    write(value, &T::descriptors(), writer);
}

/// Decodes a schema value from the start of `bytes`.
pub fn decode<T: Schema>(bytes: &[u8]) -> Result<T> {
    decode_at(bytes, 0)
}

/// Decodes a schema value whose payload starts at `byte_offset`.
pub fn decode_at<T: Schema>(bytes: &[u8], byte_offset: usize) -> Result<T> {
    let mut reader = BitReader::at_offset(bytes, byte_offset);
    read(&mut reader, &T::descriptors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Compressed, ObjectId, Vector3, WString};
    use crate::wire::{FieldKind, WireValue};

    crate::schema! {
        #[derive(Debug, Clone, PartialEq, Default)]
        struct Teleport {
            position: Vector3,
            no_ground_snap: bool = false,
            skip_all_checks: bool = false,
            target: ObjectId = ObjectId(0),
            zone_clone: Compressed<u32> = Compressed(0),
        }
    }

    crate::schema! {
        #[derive(Debug, Clone, PartialEq, Default)]
        struct Whisper {
            sender: WString,
            text: String = String::new(),
            route: Option<u16>,
            destination: Teleport,
            tags: Vec<String>,
        }
    }

    #[test]
    fn suppressed_field_is_a_single_zero_bit() {
        let teleport = Teleport {
            position: Vector3::new(1.0, 2.0, 3.0),
            ..Default::default()
        };
        let mut writer = BitWriter::new();
        encode_into(&teleport, &mut writer);
        // 96 bits of position, then four zero presence bits.
        assert_eq!(writer.bit_len(), 96 + 4);
        assert_eq!(writer.as_bytes()[12], 0);

        let decoded: Teleport = decode(writer.as_bytes()).unwrap();
        assert_eq!(decoded.target, ObjectId(0));
        assert_eq!(decoded, teleport);
    }

    #[test]
    fn present_fields_carry_a_one_bit_and_body() {
        let teleport = Teleport {
            position: Vector3::ZERO,
            no_ground_snap: true,
            skip_all_checks: false,
            target: ObjectId(500),
            zone_clone: Compressed(3),
        };
        let mut writer = BitWriter::new();
        encode_into(&teleport, &mut writer);
        // bool bodies are one bit, the object id is 64, the compressed clone
        // id folds three zero bytes and a nibble.
        assert_eq!(writer.bit_len(), 96 + (1 + 1) + 1 + (1 + 64) + (1 + 8));
        assert_eq!(decode::<Teleport>(writer.as_bytes()).unwrap(), teleport);
    }

    #[test]
    fn nested_values_decode_field_by_field() {
        let whisper = Whisper {
            sender: WString::from("Ringo"),
            text: "meet at the shrine".into(),
            route: Some(4),
            destination: Teleport {
                position: Vector3::new(-10.5, 0.0, 99.25),
                skip_all_checks: true,
                ..Default::default()
            },
            tags: vec!["party".into(), String::new()],
        };
        let bytes = encode(&whisper);
        let decoded: Whisper = decode(&bytes).unwrap();
        assert_eq!(decoded, whisper);
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn descriptors_follow_declaration_order() {
        let descriptors = Whisper::descriptors();
        let names: Vec<_> = descriptors.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["sender", "text", "route", "destination", "tags"]);
        assert_eq!(descriptors.get("destination").unwrap().kind(), FieldKind::Struct("Teleport"));
        assert!(descriptors.get("text").unwrap().is_suppressible());
        assert!(!descriptors.get("sender").unwrap().is_suppressible());
        assert_eq!(descriptors.get("tags").unwrap().ordinal(), 4);
    }

    #[test]
    fn decode_errors_name_the_failing_field() {
        let mut writer = BitWriter::new();
        WString::from("Ringo").write_to(&mut writer);
        writer.write_bit(true);
        writer.write_u32(1_000_000);
        let bytes = writer.into_bytes();

        let err = decode::<Whisper>(&bytes).unwrap_err();
        match &err {
            CodecError::Field { type_name, field, .. } => {
                assert_eq!(*type_name, "Whisper");
                assert_eq!(*field, "text");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(err.root(), CodecError::LengthOverflow { .. }));
    }

    #[test]
    fn empty_input_is_an_error_not_a_panic() {
        assert!(decode::<Teleport>(&[]).is_err());
        assert!(decode_at::<Teleport>(&[0; 4], 18).is_err());
    }
}
