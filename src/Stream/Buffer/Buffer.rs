// A command ring buffer session: a window of words inside a registered region.

use crate::Core::SharedMemory::SharedMemoryBackend;
use std::sync::Arc;

/// Consumer-side view of one ring buffer.
///
/// The words live in shared memory the producer keeps writing to; `get` and
/// `put` live here. Invariant: `get < entry_count` and `put < entry_count`.
///
/// The session holds a reference to its region while bound. The engine drops
/// the session before the region's id is unregistered.
pub struct RingBuffer {
    /// Region the words live in.
    pub(crate) region: Arc<dyn SharedMemoryBackend>,

    /// Id the region was registered under when the session was created.
    pub(crate) shm_id: u32,

    /// Byte offset of word 0 inside the region.
    pub(crate) byte_offset: usize,

    /// Number of words in the ring.
    pub(crate) entry_count: u32,

    /// Next word the consumer will read.
    pub(crate) get: u32,

    /// One past the last word the producer has published.
    pub(crate) put: u32,

    /// Argument words of the command being decoded, copied out of the ring.
    pub(crate) scratch: Vec<u32>,
}
