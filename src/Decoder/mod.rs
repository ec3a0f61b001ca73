//! Opcode dispatch.
//!
//! Every opcode is an entry of `(arity, handler)` in an [`OpcodeTable`]. The
//! handler for a [`Command`] first decodes: it checks bit fields, resolves
//! shared memory and copies out whatever it needs. Only a fully decoded
//! command reaches the [`ExecutionTarget`], so a rejected command has no side
//! effects and nothing is read from shared memory twice.

mod commands;
pub mod fields;
mod target;

pub use commands::{
    Clear, CreateResource, DestroyResource, Draw, Noop, ReadData, SetCapability, SetToken,
    WriteData, WriteDataImmediate,
};
pub use target::{
    BufferTarget, Capability, ClearMask, DrawCall, ExecutionTarget, IndexFormat, PrimitiveMode,
    TargetError,
};

use crate::Core::table::SharedMemoryTable;
use crate::Stream::Buffer::layout::MAX_OPCODE;
use crate::Stream::Structs::ParseError;

/// Opcodes of the built-in command set.
pub mod opcodes {
    pub const NOOP: u32 = 0;
    pub const SET_TOKEN: u32 = 1;
    pub const SET_CAPABILITY: u32 = 2;
    pub const CLEAR: u32 = 3;
    pub const DRAW: u32 = 4;
    pub const CREATE_RESOURCE: u32 = 5;
    pub const DESTROY_RESOURCE: u32 = 6;
    pub const WRITE_DATA: u32 = 7;
    pub const WRITE_DATA_IMMEDIATE: u32 = 8;
    pub const READ_DATA: u32 = 9;
}

/// Argument-count rule for an opcode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(u32),
    /// Fixed arguments followed by a variable trailing payload.
    AtLeast(u32),
}

impl Arity {
    #[inline]
    pub fn accepts(self, arg_count: usize) -> bool {
        match self {
            Arity::Exact(n) => arg_count == n as usize,
            Arity::AtLeast(n) => arg_count >= n as usize,
        }
    }
}

/// What a handler may touch while running.
pub struct DecodeContext<'a> {
    pub shm: &'a SharedMemoryTable,
    pub target: &'a mut dyn ExecutionTarget,
    pub token: &'a mut u32,
}

/// A command type: a decoder from argument words plus the action it performs.
pub trait Command: Sized {
    const OPCODE: u32;
    const NAME: &'static str;
    const ARITY: Arity;

    /// Validate `args` and snapshot any shared memory the command reads.
    /// Must not have side effects. `args.len()` already satisfies `ARITY`.
    fn decode(args: &[u32], shm: &SharedMemoryTable) -> Result<Self, ParseError>;

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError>;
}

pub type HandlerFn = fn(&[u32], &mut DecodeContext<'_>) -> Result<(), ParseError>;

#[derive(Copy, Clone)]
pub struct OpcodeEntry {
    pub name: &'static str,
    pub arity: Arity,
    handler: HandlerFn,
}

impl std::fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

fn run_command<C: Command>(args: &[u32], ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
    let cmd = C::decode(args, ctx.shm)?;
    cmd.execute(ctx)
}

/// Opcode-indexed dispatch table.
#[derive(Clone, Debug, Default)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeEntry>>,
}

impl OpcodeTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in command set (see [`opcodes`]).
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table
            .register::<Noop>()
            .register::<SetToken>()
            .register::<SetCapability>()
            .register::<Clear>()
            .register::<Draw>()
            .register::<CreateResource>()
            .register::<DestroyResource>()
            .register::<WriteData>()
            .register::<WriteDataImmediate>()
            .register::<ReadData>();
        table
    }

    pub fn register<C: Command>(&mut self) -> &mut Self {
        self.register_raw(C::OPCODE, C::NAME, C::ARITY, run_command::<C>)
    }

    /// Install a handler directly. Replaces any existing entry for `opcode`.
    pub fn register_raw(
        &mut self,
        opcode: u32,
        name: &'static str,
        arity: Arity,
        handler: HandlerFn,
    ) -> &mut Self {
        if opcode > MAX_OPCODE {
            tracing::warn!(opcode, name, "Opcode not encodable in a header, ignored");
            return self;
        }
        let idx = opcode as usize;
        if self.entries.len() <= idx {
            self.entries.resize(idx + 1, None);
        }
        self.entries[idx] = Some(OpcodeEntry {
            name,
            arity,
            handler,
        });
        self
    }

    pub fn get(&self, opcode: u32) -> Option<&OpcodeEntry> {
        self.entries.get(opcode as usize)?.as_ref()
    }
}

/// Validates arity and dispatches one command to its handler.
#[derive(Debug)]
pub struct OpcodeDecoder {
    table: OpcodeTable,
}

impl OpcodeDecoder {
    pub fn new(table: OpcodeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &OpcodeTable {
        &self.table
    }

    pub fn execute(
        &self,
        opcode: u32,
        args: &[u32],
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(), ParseError> {
        let entry = self.table.get(opcode).ok_or(ParseError::UnknownOpcode)?;
        if !entry.arity.accepts(args.len()) {
            tracing::debug!(
                opcode,
                name = entry.name,
                arg_count = args.len(),
                arity = ?entry.arity,
                "Wrong argument count"
            );
            return Err(ParseError::InvalidArguments);
        }
        (entry.handler)(args, ctx)
    }
}
