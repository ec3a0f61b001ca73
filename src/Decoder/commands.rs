// src/Decoder/commands.rs
//
// Built-in commands. `decode` does every check and every shared-memory read;
// `execute` only applies the result.

use super::fields::{bits, checked_end, finite_f32, reserved_clear};
use super::target::{Capability, ClearMask, DrawCall, IndexFormat, PrimitiveMode, TargetError};
use super::{opcodes, Arity, Command, DecodeContext};
use crate::Core::table::SharedMemoryTable;
use crate::Stream::Structs::ParseError;

fn rejected(name: &'static str, err: TargetError) -> ParseError {
    tracing::debug!(command = name, error = %err, "Target refused command");
    ParseError::InvalidArguments
}

fn enum_field<E: TryFrom<u32>>(v: u32) -> Result<E, ParseError> {
    E::try_from(v).map_err(|_| ParseError::InvalidArguments)
}

/// Producer padding. Any payload is ignored.
#[derive(Debug)]
pub struct Noop;

impl Command for Noop {
    const OPCODE: u32 = opcodes::NOOP;
    const NAME: &'static str = "Noop";
    const ARITY: Arity = Arity::AtLeast(0);

    fn decode(_args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        Ok(Noop)
    }

    fn execute(self, _ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        Ok(())
    }
}

/// In-stream marker readable through `GetToken`.
#[derive(Debug)]
pub struct SetToken {
    pub token: u32,
}

impl Command for SetToken {
    const OPCODE: u32 = opcodes::SET_TOKEN;
    const NAME: &'static str = "SetToken";
    const ARITY: Arity = Arity::Exact(1);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        Ok(SetToken { token: args[0] })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        *ctx.token = self.token;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SetCapability {
    pub cap: Capability,
    pub enabled: bool,
}

impl Command for SetCapability {
    const OPCODE: u32 = opcodes::SET_CAPABILITY;
    const NAME: &'static str = "SetCapability";
    const ARITY: Arity = Arity::Exact(1);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let word = args[0];
        reserved_clear(word, 0x1FF)?;
        Ok(SetCapability {
            cap: enum_field(bits(word, 0, 8))?,
            enabled: bits(word, 8, 1) != 0,
        })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target.set_capability(self.cap, self.enabled);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Clear {
    pub mask: ClearMask,
    pub rgba: [f32; 4],
}

impl Command for Clear {
    const OPCODE: u32 = opcodes::CLEAR;
    const NAME: &'static str = "Clear";
    const ARITY: Arity = Arity::Exact(5);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let mask = ClearMask::new(args[0]).ok_or(ParseError::InvalidArguments)?;
        let mut rgba = [0.0; 4];
        for (c, word) in rgba.iter_mut().zip(&args[1..5]) {
            *c = finite_f32(*word)?;
        }
        Ok(Clear { mask, rgba })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target.clear(self.mask, self.rgba);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Draw {
    pub call: DrawCall,
}

impl Command for Draw {
    const OPCODE: u32 = opcodes::DRAW;
    const NAME: &'static str = "Draw";
    const ARITY: Arity = Arity::Exact(3);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let word = args[0];
        reserved_clear(word, 0x3F)?;
        Ok(Draw {
            call: DrawCall {
                mode: enum_field::<PrimitiveMode>(bits(word, 0, 4))?,
                index_format: enum_field::<IndexFormat>(bits(word, 4, 2))?,
                first: args[1],
                count: args[2],
            },
        })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target.draw(self.call);
        Ok(())
    }
}

#[derive(Debug)]
pub struct CreateResource {
    pub id: u32,
    pub size: u32,
}

impl Command for CreateResource {
    const OPCODE: u32 = opcodes::CREATE_RESOURCE;
    const NAME: &'static str = "CreateResource";
    const ARITY: Arity = Arity::Exact(2);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        if args[0] == 0 {
            return Err(ParseError::InvalidArguments);
        }
        Ok(CreateResource {
            id: args[0],
            size: args[1],
        })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target
            .create_resource(self.id, self.size)
            .map_err(|e| rejected(Self::NAME, e))
    }
}

#[derive(Debug)]
pub struct DestroyResource {
    pub id: u32,
}

impl Command for DestroyResource {
    const OPCODE: u32 = opcodes::DESTROY_RESOURCE;
    const NAME: &'static str = "DestroyResource";
    const ARITY: Arity = Arity::Exact(1);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        Ok(DestroyResource { id: args[0] })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target
            .destroy_resource(self.id)
            .map_err(|e| rejected(Self::NAME, e))
    }
}

/// Upload from a registered shared-memory region.
#[derive(Debug)]
pub struct WriteData {
    pub resource: u32,
    pub dst_offset: u32,
    /// Bytes copied out of shared memory during decode.
    pub data: Vec<u8>,
}

impl Command for WriteData {
    const OPCODE: u32 = opcodes::WRITE_DATA;
    const NAME: &'static str = "WriteData";
    const ARITY: Arity = Arity::Exact(5);

    fn decode(args: &[u32], shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let (resource, dst_offset, size, shm_id, shm_offset) =
            (args[0], args[1], args[2], args[3], args[4]);
        checked_end(dst_offset, size)?;
        let src = shm
            .view(shm_id, shm_offset as usize, size as usize)
            .ok_or(ParseError::InvalidArguments)?;
        Ok(WriteData {
            resource,
            dst_offset,
            data: src.snapshot(),
        })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target
            .write_resource(self.resource, self.dst_offset, &self.data)
            .map_err(|e| rejected(Self::NAME, e))
    }
}

/// Upload carried inline after the three fixed arguments.
#[derive(Debug)]
pub struct WriteDataImmediate {
    pub resource: u32,
    pub dst_offset: u32,
    pub data: Vec<u8>,
}

impl Command for WriteDataImmediate {
    const OPCODE: u32 = opcodes::WRITE_DATA_IMMEDIATE;
    const NAME: &'static str = "WriteDataImmediate";
    const ARITY: Arity = Arity::AtLeast(3);

    fn decode(args: &[u32], _shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let (resource, dst_offset, size) = (args[0], args[1], args[2]);
        checked_end(dst_offset, size)?;
        let payload: &[u8] = bytemuck::cast_slice(&args[3..]);
        let data = payload
            .get(..size as usize)
            .ok_or(ParseError::InvalidArguments)?
            .to_vec();
        Ok(WriteDataImmediate {
            resource,
            dst_offset,
            data,
        })
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        ctx.target
            .write_resource(self.resource, self.dst_offset, &self.data)
            .map_err(|e| rejected(Self::NAME, e))
    }
}

/// Readback into a registered shared-memory region.
#[derive(Debug)]
pub struct ReadData {
    pub resource: u32,
    pub src_offset: u32,
    pub size: u32,
    pub shm_id: u32,
    pub shm_offset: u32,
}

impl Command for ReadData {
    const OPCODE: u32 = opcodes::READ_DATA;
    const NAME: &'static str = "ReadData";
    const ARITY: Arity = Arity::Exact(5);

    fn decode(args: &[u32], shm: &SharedMemoryTable) -> Result<Self, ParseError> {
        let cmd = ReadData {
            resource: args[0],
            src_offset: args[1],
            size: args[2],
            shm_id: args[3],
            shm_offset: args[4],
        };
        checked_end(cmd.src_offset, cmd.size)?;
        shm.view(cmd.shm_id, cmd.shm_offset as usize, cmd.size as usize)
            .ok_or(ParseError::InvalidArguments)?;
        Ok(cmd)
    }

    fn execute(self, ctx: &mut DecodeContext<'_>) -> Result<(), ParseError> {
        let data = ctx
            .target
            .read_resource(self.resource, self.src_offset, self.size)
            .map_err(|e| rejected(Self::NAME, e))?;
        let dst = ctx
            .shm
            .view(self.shm_id, self.shm_offset as usize, data.len())
            .ok_or(ParseError::InvalidArguments)?;
        if !dst.copy_from(&data) {
            return Err(ParseError::InvalidArguments);
        }
        Ok(())
    }
}
