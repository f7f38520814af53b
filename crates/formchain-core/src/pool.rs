//! Bounded reuse pool for converter instances.
//!
//! Each converter key gets its own slot: an idle cache capped at `max_size`
//! and a counter of instances constructed on the pool's behalf. Neither
//! `get` nor `put` ever waits for capacity. Once a key has used up its
//! creation budget and has nothing idle, `get` hands out a temporary
//! instance that is not counted, and `put` drops whatever does not fit.

use crate::converter::Converter;
use crate::registry::{ConverterFactory, RegistryError};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, trace};

/// Per-key idle cache and creation counter.
struct Slot {
    idle: Mutex<VecDeque<Box<dyn Converter>>>,
    created: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
        }
    }

    fn pop_idle(&self) -> Option<Box<dyn Converter>> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn idle_len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Claim one creation from the budget. Returns false once `limit` is reached.
    fn try_claim(&self, limit: usize) -> bool {
        loop {
            let current = self.created.load(Ordering::Acquire);
            if current >= limit {
                return false;
            }

            if self
                .created
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
            // CAS failed, retry
        }
    }

    fn release_claim(&self) {
        self.created.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pool of reusable converters, shared across pipeline runs.
pub struct ConverterPool {
    factory: Arc<dyn ConverterFactory>,
    max_size: usize,
    slots: RwLock<IndexMap<String, Arc<Slot>>>,
}

impl std::fmt::Debug for ConverterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterPool")
            .field("max_size", &self.max_size)
            .field("size", &self.size())
            .field("created", &self.created())
            .finish()
    }
}

impl ConverterPool {
    /// Create a pool keeping at most `max_size` instances per key (minimum 1).
    pub fn new(max_size: usize, factory: Arc<dyn ConverterFactory>) -> Self {
        Self {
            factory,
            max_size: max_size.max(1),
            slots: RwLock::new(IndexMap::new()),
        }
    }

    /// Per-key capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn existing_slot(&self, key: &str) -> Option<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Take a converter for `key`.
    ///
    /// Prefers an idle instance, then a new counted one while the key is
    /// under budget, and finally an uncounted temporary instance.
    pub fn get(&self, key: &str) -> Result<Box<dyn Converter>, RegistryError> {
        let slot = self.slot(key);

        if let Some(converter) = slot.pop_idle() {
            trace!(key, "reusing idle converter");
            return Ok(converter);
        }

        if slot.try_claim(self.max_size) {
            return match self.factory.create(key) {
                Ok(converter) => {
                    debug!(
                        key,
                        created = slot.created.load(Ordering::Acquire),
                        "created pooled converter"
                    );
                    Ok(converter)
                }
                Err(e) => {
                    slot.release_claim();
                    Err(e)
                }
            };
        }

        trace!(
            key,
            max_size = self.max_size,
            "pool exhausted, creating temporary converter"
        );
        self.factory.create(key)
    }

    /// Return a converter to its key's idle cache, dropping it if the cache is full.
    pub fn put(&self, converter: Box<dyn Converter>) {
        let key = converter.decl().key();
        let slot = self.slot(&key);
        let mut idle = slot.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_size {
            idle.push_back(converter);
        } else {
            trace!(key = %key, "idle cache full, discarding converter");
        }
    }

    /// Total idle instances across all keys.
    pub fn size(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|slot| slot.idle_len())
            .sum()
    }

    /// Total counted creations across all keys.
    pub fn created(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|slot| slot.created.load(Ordering::Acquire))
            .sum()
    }

    /// Idle instances for one key.
    pub fn size_of(&self, key: &str) -> usize {
        self.existing_slot(key).map_or(0, |slot| slot.idle_len())
    }

    /// Counted creations for one key.
    pub fn created_of(&self, key: &str) -> usize {
        self.existing_slot(key)
            .map_or(0, |slot| slot.created.load(Ordering::Acquire))
    }
}
