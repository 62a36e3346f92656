//! Opaque generational handles.
//!
//! Objects that live across calls (effect descriptors and instances, clips,
//! image memory blocks) are addressed by handle. A handle records the slot
//! generation it was issued for, so using it after the object is gone is
//! reported as a bad handle instead of reaching a recycled object.

use crate::core::error::HandleError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Names the object kind a handle refers to.
pub trait HandleKind: 'static {
    /// Kind name used in error messages.
    const NAME: &'static str;
}

/// Marker for effect descriptor and instance handles.
#[derive(Debug)]
pub enum EffectKind {}

/// Marker for clip handles.
#[derive(Debug)]
pub enum ClipKind {}

/// Marker for image memory handles.
#[derive(Debug)]
pub enum MemoryKind {}

impl HandleKind for EffectKind {
    const NAME: &'static str = "effect";
}

impl HandleKind for ClipKind {
    const NAME: &'static str = "clip";
}

impl HandleKind for MemoryKind {
    const NAME: &'static str = "memory";
}

/// A typed, generational handle.
pub struct Handle<K: HandleKind> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to an effect descriptor or instance.
pub type EffectHandle = Handle<EffectKind>;

/// Handle to a clip.
pub type ClipHandle = Handle<ClipKind>;

/// Handle to a block of host image memory.
pub type MemoryHandle = Handle<MemoryKind>;

impl<K: HandleKind> Handle<K> {
    /// Build a handle from raw parts.
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn stale(&self) -> HandleError {
        HandleError::Stale {
            kind: K::NAME,
            index: self.index,
            generation: self.generation,
        }
    }
}

impl<K: HandleKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for Handle<K> {}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K: HandleKind> Eq for Handle<K> {}

impl<K: HandleKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:{}", K::NAME, self.index, self.generation)
    }
}

impl<K: HandleKind> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Storage addressed by generational handles.
pub struct HandleTable<K: HandleKind, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind, T> Default for HandleTable<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            _kind: PhantomData,
        }
    }
}

impl<K: HandleKind, T> HandleTable<K, T> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and issue a handle for it.
    pub fn insert(&mut self, value: T) -> Handle<K> {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                Handle::from_raw(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                Handle::from_raw(index, 0)
            }
        }
    }

    /// Look up a value.
    pub fn get(&self, handle: Handle<K>) -> Result<&T, HandleError> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_ref())
            .ok_or_else(|| handle.stale())
    }

    /// Look up a value mutably.
    pub fn get_mut(&mut self, handle: Handle<K>) -> Result<&mut T, HandleError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.value.as_mut())
            .ok_or_else(|| handle.stale())
    }

    /// Remove a value; its handle and every copy of it become stale.
    pub fn remove(&mut self, handle: Handle<K>) -> Result<T, HandleError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.value.is_some())
            .ok_or_else(|| handle.stale())?;
        let value = slot.value.take().ok_or_else(|| handle.stale())?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(value)
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live handles and values.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (Handle::from_raw(i as u32, s.generation), v))
        })
    }

    /// Iterate over live handles and values mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<K>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(|v| (Handle::from_raw(i as u32, generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table: HandleTable<ClipKind, &str> = HandleTable::new();
        let a = table.insert("Source");
        let b = table.insert("Output");
        assert_eq!(*table.get(a).unwrap(), "Source");
        assert_eq!(*table.get(b).unwrap(), "Output");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stale_after_remove() {
        let mut table: HandleTable<EffectKind, u32> = HandleTable::new();
        let a = table.insert(1);
        assert_eq!(table.remove(a).unwrap(), 1);
        assert!(matches!(table.get(a), Err(HandleError::Stale { kind: "effect", .. })));
        assert!(table.remove(a).is_err());

        // The slot is reused with a new generation.
        let b = table.insert(2);
        assert_eq!(b.index(), a.index());
        assert_ne!(b, a);
        assert!(table.get(a).is_err());
        assert_eq!(*table.get(b).unwrap(), 2);
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut table: HandleTable<MemoryKind, u8> = HandleTable::new();
        let a = table.insert(1);
        let _b = table.insert(2);
        table.remove(a).unwrap();
        let values: Vec<u8> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
        assert!(!table.is_empty());
    }
}
