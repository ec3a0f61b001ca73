pub mod SharedMemory;
pub mod futex;
pub mod table;

pub use SharedMemory::{
    attach_handle, create_shared_memory, HeapSharedMemory, RawHandle, SharedMemoryBackend,
    ShmView,
};
pub use table::{SharedMemoryTable, TableError};
