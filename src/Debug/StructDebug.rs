use std::fmt;

use crate::Core::table::SharedMemoryTable;
use crate::Stream::Buffer::RingBuffer;
use crate::Stream::CommandStreamEngine;

/// Debug function for SharedMemoryTable
///
/// Shows the live ids and their region sizes, never the region contents.
pub fn debug_shared_memory_table(table: &SharedMemoryTable, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let regions = RegionList(table);
    f.debug_struct("SharedMemoryTable")
        .field("live", &table.live_count())
        .field("max_regions", &table.max_regions())
        .field("regions", &regions)
        .finish()
}

struct RegionList<'a>(&'a SharedMemoryTable);

impl fmt::Debug for RegionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.0
                    .live_ids()
                    .filter_map(|id| self.0.region(id).map(|r| (id, r.size()))),
            )
            .finish()
    }
}

/// Debug function for RingBuffer
///
/// Safely displays the cursors and the window without dereferencing it
pub fn debug_ring_buffer(ring: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
        .field("shm_id", &ring.shm_id)
        .field("base", &format_args!("0x{:x}", ring.region.as_ptr() as usize + ring.byte_offset))
        .field("entry_count", &ring.entry_count)
        .field("get", &ring.get)
        .field("put", &ring.put)
        .finish_non_exhaustive()
}

/// Debug function for CommandStreamEngine
pub fn debug_engine<T>(engine: &CommandStreamEngine<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CommandStreamEngine")
        .field("status", &engine.status)
        .field("parse_error", &engine.parse_error)
        .field("token", &engine.token)
        .field("ring", &engine.ring)
        .field("shared_memory", &engine.table)
        .field("pending_signal", &engine.pending_signal)
        .field("queued_signals", &engine.fired.len())
        .finish_non_exhaustive()
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_ring_buffer(self, f)
    }
}

impl<T> fmt::Debug for CommandStreamEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_engine(self, f)
    }
}
