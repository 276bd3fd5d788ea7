//! Property descriptors and the [`Schema`] trait.
//!
//! A schema type lists its fields once, in declaration order, as a vector of
//! [`PropertyDescriptor`]s. Each descriptor knows the field's name, ordinal
//! and semantic kind, how to write and read the field body, and optionally a
//! suppression policy: when the field equals its ignore value only a single
//! zero bit is emitted.
//!
//! Descriptor lists are built by [`Schema::describe`] (normally generated by
//! the [`schema!`](crate::schema) macro) and memoized per type by the
//! [`DescriptorCache`](crate::cache::DescriptorCache).

use std::fmt;
use std::sync::Arc;

use crate::bits::{BitReader, BitWriter};
use crate::error::Result;
use crate::wire::FieldKind;

/// Writes one field body of `T`.
pub type WriteFn<T> = fn(&T, &mut BitWriter);

/// Reads one field body into an existing `T`.
pub type ReadFn<T> = fn(&mut T, &mut BitReader<'_>) -> Result<()>;

/// Default-value suppression for a single field.
pub struct Suppression<T> {
    /// True when the field currently holds its ignore value
    pub is_ignored: fn(&T) -> bool,
    /// Sets the field back to its ignore value
    pub restore: fn(&mut T),
}

impl<T> Clone for Suppression<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Suppression<T> {}

/// One serializable field of a schema type.
pub struct PropertyDescriptor<T> {
    name: &'static str,
    ordinal: usize,
    kind: FieldKind,
    write: WriteFn<T>,
    read: ReadFn<T>,
    suppression: Option<Suppression<T>>,
}

impl<T> PropertyDescriptor<T> {
    pub fn new(
        name: &'static str,
        ordinal: usize,
        kind: FieldKind,
        write: WriteFn<T>,
        read: ReadFn<T>,
    ) -> Self {
        Self {
            name,
            ordinal,
            kind,
            write,
            read,
            suppression: None,
        }
    }

    /// Attaches a suppress-if-default policy to this field.
    pub fn suppress_if(mut self, is_ignored: fn(&T) -> bool, restore: fn(&mut T)) -> Self {
        self.suppression = Some(Suppression { is_ignored, restore });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn suppression(&self) -> Option<Suppression<T>> {
        self.suppression
    }

    pub fn is_suppressible(&self) -> bool {
        self.suppression.is_some()
    }

    #[inline]
    pub fn write_body(&self, value: &T, writer: &mut BitWriter) {
        (self.write)(value, writer)
    }

    #[inline]
    pub fn read_body(&self, value: &mut T, reader: &mut BitReader<'_>) -> Result<()> {
        (self.read)(value, reader)
    }
}

// Function pointers are not meaningfully comparable, so equality covers the
// observable shape of the field only.
impl<T> PartialEq for PropertyDescriptor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ordinal == other.ordinal
            && self.kind == other.kind
            && self.is_suppressible() == other.is_suppressible()
    }
}

impl<T> fmt::Debug for PropertyDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("kind", &self.kind)
            .field("suppressible", &self.is_suppressible())
            .finish()
    }
}

/// Immutable, ordered descriptor list for one schema type.
pub struct Descriptors<T> {
    type_name: &'static str,
    properties: Vec<PropertyDescriptor<T>>,
}

impl<T> PartialEq for Descriptors<T> {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.properties == other.properties
    }
}

impl<T> fmt::Debug for Descriptors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptors")
            .field("type_name", &self.type_name)
            .field("properties", &self.properties)
            .finish()
    }
}

impl<T: Schema> Descriptors<T> {
    /// Runs the type's `describe` and freezes the result.
    pub fn build() -> Self {
        let properties = T::describe();
        tracing::trace!(
            "🧩 Built {} property descriptors for {}",
            properties.len(),
            T::NAME
        );
        Self {
            type_name: T::NAME,
            properties,
        }
    }
}

impl<T> Descriptors<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor<T>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PropertyDescriptor<T>> {
        self.properties.iter()
    }
}

impl<'a, T> IntoIterator for &'a Descriptors<T> {
    type Item = &'a PropertyDescriptor<T>;
    type IntoIter = std::slice::Iter<'a, PropertyDescriptor<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

/// A type whose wire layout is described by property descriptors.
///
/// `Default` supplies the fresh prototype instance that decoding fills in.
pub trait Schema: Default + Send + Sync + 'static {
    /// Type name used in logs and nested field kinds
    const NAME: &'static str;

    /// Lists the fields in wire order. Called at most once per type by the
    /// global cache; use [`Schema::descriptors`] to obtain the shared list.
    fn describe() -> Vec<PropertyDescriptor<Self>>;

    /// Returns the memoized descriptor list for this type.
    fn descriptors() -> Arc<Descriptors<Self>> {
        crate::cache::DescriptorCache::global().descriptors::<Self>()
    }
}
