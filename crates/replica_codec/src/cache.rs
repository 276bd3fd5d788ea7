//! Per-type memoization of descriptor lists.
//!
//! The first request for a type runs its `describe` and stores the frozen
//! list; every later request, from any thread, gets the same `Arc`. Building
//! happens under the map's entry lock, so concurrent first requests still
//! build exactly once.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::descriptor::{Descriptors, Schema};

static GLOBAL: Lazy<DescriptorCache> = Lazy::new(DescriptorCache::new);

/// Memo table from concrete schema type to its descriptor list.
#[derive(Default)]
pub struct DescriptorCache {
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    builds: AtomicUsize,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache used by [`Schema::descriptors`].
    pub fn global() -> &'static DescriptorCache {
        &GLOBAL
    }

    /// Returns the descriptor list for `T`, building it on first use.
    pub fn descriptors<T: Schema>(&self) -> Arc<Descriptors<T>> {
        let key = TypeId::of::<T>();
        let existing = self.entries.get(&key).map(|entry| entry.value().clone());
        let entry = match existing {
            Some(entry) => entry,
            None => self
                .entries
                .entry(key)
                .or_insert_with(|| {
                    self.builds.fetch_add(1, Ordering::Relaxed);
                    Arc::new(Descriptors::<T>::build())
                })
                .value()
                .clone(),
        };

        match entry.downcast::<Descriptors<T>>() {
            Ok(descriptors) => descriptors,
            Err(_) => unreachable!("descriptor cache entry for {} has a foreign type", T::NAME),
        }
    }

    /// Number of descriptor lists built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of types currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counted {
        value: u32,
    }

    impl Schema for Counted {
        const NAME: &'static str = "Counted";

        fn describe() -> Vec<crate::PropertyDescriptor<Self>> {
            vec![crate::PropertyDescriptor::new(
                "value",
                0,
                crate::FieldKind::U32,
                |v: &Self, w| w.write_u32(v.value),
                |v: &mut Self, r| {
                    v.value = r.read_u32()?;
                    Ok(())
                },
            )]
        }
    }

    crate::schema! {
        #[derive(Default)]
        struct Other {
            flag: bool,
        }
    }

    #[test]
    fn descriptors_are_built_once_per_type() {
        let cache = DescriptorCache::new();
        let first = cache.descriptors::<Counted>();
        let second = cache.descriptors::<Counted>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, Descriptors::<Counted>::build());
        assert_eq!(cache.build_count(), 1);

        cache.descriptors::<Other>();
        assert_eq!(cache.build_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let cache = Arc::new(DescriptorCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.descriptors::<Other>())
            })
            .collect();
        let lists: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.build_count(), 1);
        assert!(lists.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }
}
