use super::*;
use std::fmt;

impl fmt::Debug for SharedMemoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_shared_memory_table(self, f)
    }
}
