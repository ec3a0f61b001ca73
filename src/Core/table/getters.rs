use super::*;

impl SharedMemoryTable {
    /// Number of slots ever allocated, live or empty.
    ///
    /// This only grows; unregistering leaves a hole for reuse.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently registered regions.
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    pub fn is_registered(&self, id: u32) -> bool {
        self.region(id).is_some()
    }

    /// Ids of all live slots, ascending.
    pub fn live_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as u32)
    }
}
