use super::CommandStreamEngine;
use crate::Core::table::{SharedMemoryTable, DEFAULT_MAX_REGIONS};
use crate::Decoder::{ExecutionTarget, OpcodeDecoder, OpcodeTable};

pub struct EngineBuilder {
    max_regions: usize,
    opcodes: Option<OpcodeTable>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            max_regions: DEFAULT_MAX_REGIONS,
            opcodes: None, // built-in opcode set
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on simultaneously registered shared memory regions.
    pub fn with_max_regions(mut self, max_regions: usize) -> Self {
        self.max_regions = max_regions;
        self
    }

    /// Replace the built-in opcode set.
    pub fn with_opcode_table(mut self, table: OpcodeTable) -> Self {
        self.opcodes = Some(table);
        self
    }

    pub fn build<T: ExecutionTarget>(self, target: T) -> CommandStreamEngine<T> {
        let table = self.opcodes.unwrap_or_else(OpcodeTable::builtin);
        CommandStreamEngine::from_parts(
            SharedMemoryTable::new(self.max_regions),
            OpcodeDecoder::new(table),
            target,
        )
    }
}
