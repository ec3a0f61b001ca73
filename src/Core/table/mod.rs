use crate::Core::SharedMemory::{SharedMemoryBackend, ShmView};
use std::sync::Arc;
mod debug;
mod getters;

/// Default cap on simultaneously registered regions.
pub const DEFAULT_MAX_REGIONS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("shared memory table is full ({limit} regions registered)")]
    Full { limit: usize },
    #[error("no shared memory registered under id {0}")]
    UnknownId(u32),
}

/// Slot table mapping small integer ids to registered regions.
///
/// Ids are slot indices. Unregistering empties the slot without shrinking the
/// table, and the next registration takes the lowest empty slot. A live id is
/// never handed out twice.
pub struct SharedMemoryTable {
    slots: Vec<Option<Arc<dyn SharedMemoryBackend>>>,
    live: usize,
    max_regions: usize,
}

impl Default for SharedMemoryTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REGIONS)
    }
}

impl SharedMemoryTable {
    pub fn new(max_regions: usize) -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            max_regions,
        }
    }

    /// Register a region, first-fit over empty slots, appending when none is free.
    pub fn register(&mut self, region: Arc<dyn SharedMemoryBackend>) -> Result<u32, TableError> {
        if self.live >= self.max_regions {
            return Err(TableError::Full {
                limit: self.max_regions,
            });
        }

        let size = region.size();
        let id = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(region);
                free
            }
            None => {
                self.slots.push(Some(region));
                self.slots.len() - 1
            }
        };
        self.live += 1;

        tracing::debug!(id, size, "Registered shared memory");
        Ok(id as u32)
    }

    /// Empty the slot for `id`. Out-of-range or already-empty ids are logged and rejected.
    pub fn unregister(&mut self, id: u32) -> Result<(), TableError> {
        match self.slots.get_mut(id as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.live -= 1;
                tracing::debug!(id, "Unregistered shared memory");
                Ok(())
            }
            _ => {
                tracing::warn!(id, "Unregister of unknown shared memory id");
                Err(TableError::UnknownId(id))
            }
        }
    }

    /// The region registered under `id`.
    pub fn region(&self, id: u32) -> Option<&Arc<dyn SharedMemoryBackend>> {
        self.slots.get(id as usize)?.as_ref()
    }

    /// Base address and byte size of the region registered under `id`.
    pub fn resolve(&self, id: u32) -> Option<(*mut u8, usize)> {
        self.region(id).map(|r| (r.as_ptr(), r.size()))
    }

    /// Bounds-checked window `offset..offset+size` into region `id`.
    pub fn view(&self, id: u32, offset: usize, size: usize) -> Option<ShmView<'_>> {
        self.region(id)?.view().subview(offset, size)
    }
}
