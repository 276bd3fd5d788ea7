//! # Schema Declaration Macro
//!
//! [`schema!`](crate::schema) declares a struct together with its wire
//! layout. The struct is emitted unchanged (minus the ignore values), and the
//! macro implements [`Schema`](crate::Schema) and
//! [`WireValue`](crate::WireValue) for it, so schema structs can be nested
//! inside each other.
//!
//! A field written as `name: Type = expr` is suppressible: when it equals
//! `expr` only a zero presence bit is written, and a reader that sees that
//! bit restores `expr`. The ignore expression must have the field's type.

/// Declares a struct and its wire schema in one place.
///
/// The struct must derive (or otherwise implement) `Default`; decoding fills
/// a default instance field by field.
///
/// ```rust
/// use replica_codec::{codec, schema, ObjectId};
///
/// schema! {
///     #[derive(Debug, Clone, PartialEq, Default)]
///     pub struct PlayEmote {
///         pub emote_id: i32,
///         pub target: ObjectId = ObjectId(0),
///     }
/// }
///
/// let emote = PlayEmote { emote_id: 7, target: ObjectId(0) };
/// let bytes = codec::encode(&emote);
/// // 32 bits of emote id plus a single suppressed-field bit.
/// assert_eq!(bytes.len(), 5);
/// assert_eq!(codec::decode::<PlayEmote>(&bytes).unwrap(), emote);
/// ```
#[macro_export]
macro_rules! schema {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty $(= $ignore:expr)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::Schema for $name {
            const NAME: &'static str = stringify!($name);

            fn describe() -> ::std::vec::Vec<$crate::PropertyDescriptor<Self>> {
                #[allow(unused_mut)]
                let mut properties = ::std::vec::Vec::new();
                $(
                    let property = $crate::PropertyDescriptor::new(
                        stringify!($field),
                        properties.len(),
                        <$ty as $crate::WireValue>::KIND,
                        |value: &Self, writer: &mut $crate::BitWriter| {
                            $crate::WireValue::write_to(&value.$field, writer)
                        },
                        |value: &mut Self, reader: &mut $crate::BitReader<'_>| {
                            value.$field = <$ty as $crate::WireValue>::read_from(reader)?;
                            Ok(())
                        },
                    );
                    $(
                        let property = property.suppress_if(
                            |value: &Self| value.$field == $ignore,
                            |value: &mut Self| value.$field = $ignore,
                        );
                    )?
                    properties.push(property);
                )*
                properties
            }
        }

        impl $crate::WireValue for $name {
            const KIND: $crate::FieldKind = $crate::FieldKind::Struct(stringify!($name));

            fn write_to(&self, writer: &mut $crate::BitWriter) {
                $crate::codec::write(self, &<Self as $crate::Schema>::descriptors(), writer)
            }

            fn read_from(reader: &mut $crate::BitReader<'_>) -> $crate::Result<Self> {
                $crate::codec::read(reader, &<Self as $crate::Schema>::descriptors())
            }
        }
    };
}
