//! Channel name/slot registry
//!
//! Learns the mapping between a channel's name (from the envelope or topic)
//! and the numeric slot radios put in each packet. Learning only needs a
//! readable envelope, so the pipeline registers before it tries to decrypt.
//!
//! The mapping is one-to-one and last-writer-wins: a new name for a known
//! slot replaces the old name, and a known name seen on a new slot moves.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback for persisting a changed mapping
///
/// Called outside the registry lock. Failures are logged and otherwise
/// ignored; decode never waits on storage.
pub type PersistCallback = Arc<dyn Fn(&str, u8) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Debug, Default)]
struct Mappings {
    name_to_slot: HashMap<String, u8>,
    slot_to_name: HashMap<u8, String>,
}

/// Thread-safe bidirectional channel name/slot mapping
#[derive(Default)]
pub struct ChannelRegistry {
    mappings: Mutex<Mappings>,
    persist: Option<PersistCallback>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("entries", &self.len())
            .field("persist", &self.persist.is_some())
            .finish()
    }
}

impl ChannelRegistry {
    /// Create an empty registry without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that reports changes to `persist`
    pub fn with_persistence(persist: PersistCallback) -> Self {
        Self {
            mappings: Mutex::new(Mappings::default()),
            persist: Some(persist),
        }
    }

    /// Seed previously persisted entries without calling the callback
    pub fn load<I, S>(&self, entries: I)
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let mut mappings = self.mappings.lock();
        for (name, slot) in entries {
            Self::insert(&mut mappings, name.into(), slot);
        }
    }

    /// Record that `name` uses `slot`
    ///
    /// Returns `true` when the mapping changed. Unchanged mappings are a
    /// no-op and do not reach the persistence callback.
    pub fn register(&self, name: &str, slot: u8) -> bool {
        {
            let mut mappings = self.mappings.lock();
            if mappings.name_to_slot.get(name) == Some(&slot) {
                return false;
            }
            let replaced = Self::insert(&mut mappings, name.to_string(), slot);
            debug!(
                channel = %name,
                slot = slot,
                replaced = ?replaced,
                "Learned channel mapping"
            );
        }

        if let Some(persist) = &self.persist {
            if let Err(e) = persist(name, slot) {
                warn!(channel = %name, slot = slot, error = %e, "Failed to persist channel mapping");
            }
        }
        true
    }

    fn insert(mappings: &mut Mappings, name: String, slot: u8) -> Option<String> {
        if let Some(old_slot) = mappings.name_to_slot.remove(&name) {
            mappings.slot_to_name.remove(&old_slot);
        }
        let replaced = mappings.slot_to_name.insert(slot, name.clone());
        if let Some(old_name) = &replaced {
            mappings.name_to_slot.remove(old_name);
        }
        mappings.name_to_slot.insert(name, slot);
        replaced
    }

    /// Slot for a channel name
    pub fn lookup_index(&self, name: &str) -> Option<u8> {
        self.mappings.lock().name_to_slot.get(name).copied()
    }

    /// Channel name for a slot
    pub fn lookup_name(&self, slot: u8) -> Option<String> {
        self.mappings.lock().slot_to_name.get(&slot).cloned()
    }

    /// All mappings sorted by slot
    pub fn snapshot(&self) -> Vec<(String, u8)> {
        let mappings = self.mappings.lock();
        let mut entries: Vec<(String, u8)> = mappings
            .name_to_slot
            .iter()
            .map(|(name, slot)| (name.clone(), *slot))
            .collect();
        entries.sort_by_key(|(_, slot)| *slot);
        entries
    }

    /// Number of mapped channels
    pub fn len(&self) -> usize {
        self.mappings.lock().name_to_slot.len()
    }

    /// Check if nothing has been learned yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_and_lookup() {
        let registry = ChannelRegistry::new();
        assert!(registry.register("LongFast", 8));
        assert_eq!(registry.lookup_index("LongFast"), Some(8));
        assert_eq!(registry.lookup_name(8).as_deref(), Some("LongFast"));
        assert_eq!(registry.lookup_name(9), None);
    }

    #[test]
    fn test_same_mapping_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = ChannelRegistry::with_persistence(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        assert!(registry.register("Ops", 3));
        assert!(!registry.register("Ops", 3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_writer_wins_per_slot() {
        let registry = ChannelRegistry::new();
        registry.register("Alpha", 4);
        registry.register("Beta", 4);

        assert_eq!(registry.lookup_name(4).as_deref(), Some("Beta"));
        assert_eq!(registry.lookup_index("Alpha"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_name_moves_to_new_slot() {
        let registry = ChannelRegistry::new();
        registry.register("Alpha", 4);
        registry.register("Alpha", 5);

        assert_eq!(registry.lookup_index("Alpha"), Some(5));
        assert_eq!(registry.lookup_name(4), None);
    }

    #[test]
    fn test_persist_failure_does_not_block_learning() {
        let registry =
            ChannelRegistry::with_persistence(Arc::new(|_, _| Err("disk full".to_string())));
        assert!(registry.register("Ops", 1));
        assert_eq!(registry.lookup_index("Ops"), Some(1));
    }

    #[test]
    fn test_load_skips_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = ChannelRegistry::with_persistence(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        registry.load([("LongFast", 8u8), ("Ops", 1u8)]);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            registry.snapshot(),
            vec![("Ops".to_string(), 1), ("LongFast".to_string(), 8)]
        );
    }
}
