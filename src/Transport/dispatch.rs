// src/Transport/dispatch.rs
use std::sync::Arc;

use super::wire::{self, IdArgs, OffsetArgs, RegisterArgs, SetCommandBufferArgs, SignalArgs};
use super::{CallTag, INVALID_ID, NO_OFFSET, RESULT_BAD_REQUEST, RESULT_OK};
use crate::Core::SharedMemory::{attach_handle, RawHandle};
use crate::Decoder::ExecutionTarget;
use crate::Stream::error::EngineError;
use crate::Stream::Structs::ParseError;
use crate::Stream::CommandStreamEngine;

fn status_code(result: Result<(), EngineError>) -> u32 {
    match result {
        Ok(()) => RESULT_OK,
        Err(e) => e.code(),
    }
}

fn offset_code(get: Option<u32>) -> u32 {
    get.unwrap_or(NO_OFFSET)
}

/// Decode one control call and apply it to `engine`.
///
/// Malformed calls return [`RESULT_BAD_REQUEST`] without touching the engine.
pub fn dispatch<T: ExecutionTarget>(
    engine: &mut CommandStreamEngine<T>,
    tag: u32,
    payload: &[u8],
    handles: &[RawHandle],
) -> u32 {
    let Ok(tag) = CallTag::try_from(tag) else {
        tracing::warn!(tag, "Unknown control call");
        return RESULT_BAD_REQUEST;
    };
    match dispatch_tag(engine, tag, payload, handles) {
        Some(code) => code,
        None => {
            tracing::warn!(?tag, len = payload.len(), handles = handles.len(), "Malformed control call");
            RESULT_BAD_REQUEST
        }
    }
}

fn dispatch_tag<T: ExecutionTarget>(
    engine: &mut CommandStreamEngine<T>,
    tag: CallTag,
    payload: &[u8],
    handles: &[RawHandle],
) -> Option<u32> {
    let code = match tag {
        CallTag::Init => status_code(engine.init_connection()),
        CallTag::Register => {
            let args: RegisterArgs = wire::decode(payload)?;
            let [handle] = handles else {
                return None;
            };
            register(engine, *handle, args.byte_size)
        }
        CallTag::Unregister => {
            let args: IdArgs = wire::decode(payload)?;
            status_code(engine.unregister_shared_memory(args.id))
        }
        CallTag::SetCommandBuffer => {
            let args: SetCommandBufferArgs = wire::decode(payload)?;
            status_code(engine.set_command_buffer(
                args.shm_id,
                args.byte_offset as usize,
                args.byte_size as usize,
                args.start_get,
            ))
        }
        CallTag::Put => {
            let args: OffsetArgs = wire::decode(payload)?;
            status_code(engine.put(args.offset))
        }
        CallTag::Get => offset_code(engine.get()),
        CallTag::GetToken => engine.token(),
        CallTag::WaitGetChanges => {
            let args: OffsetArgs = wire::decode(payload)?;
            offset_code(engine.wait_get_changes(args.offset))
        }
        CallTag::SignalGetChanges => {
            let args: SignalArgs = wire::decode(payload)?;
            engine.signal_get_changes(args.watched, args.callback_id);
            RESULT_OK
        }
        CallTag::GetStatus => engine.status() as u32,
        CallTag::GetParseError => ParseError::to_wire(engine.take_parse_error()),
        CallTag::Close => {
            engine.close_connection();
            RESULT_OK
        }
    };
    Some(code)
}

fn register<T: ExecutionTarget>(
    engine: &mut CommandStreamEngine<T>,
    handle: RawHandle,
    byte_size: u32,
) -> u32 {
    let region = match attach_handle(handle, byte_size as usize) {
        Ok(region) => Arc::from(region),
        Err(e) => {
            let err = EngineError::MapFailed(e.to_string());
            tracing::warn!(?handle, byte_size, error = %err, "Register rejected");
            return INVALID_ID;
        }
    };
    match engine.register_shared_memory(region) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(?handle, error = %e, "Register rejected");
            INVALID_ID
        }
    }
}
