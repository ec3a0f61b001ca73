// src/Transport/proxy.rs
use super::wire::{self, IdArgs, OffsetArgs, RegisterArgs, SetCommandBufferArgs, SignalArgs};
use super::{CallTag, Transport, TransportError, INVALID_ID, NO_OFFSET, RESULT_BAD_REQUEST, RESULT_OK};
use crate::Core::SharedMemory::SharedMemoryBackend;
use crate::Stream::Structs::{ConnectionStatus, ParseError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The engine refused the call; carries the engine's error code.
    #[error("call rejected with code {0}")]
    Rejected(u32),

    #[error("unexpected reply {0}")]
    BadReply(u32),

    #[error("region has no transferable handle")]
    NoHandle,

    #[error("region of {0} bytes does not fit a u32 size field")]
    RegionTooLarge(usize),
}

/// Producer-side stub: one typed method per control call.
pub struct CommandBufferProxy<T> {
    transport: T,
}

impl<T: Transport> CommandBufferProxy<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call(&self, tag: CallTag, payload: &[u8]) -> Result<u32, ProxyError> {
        let reply = self.transport.send(tag, payload, &[])?;
        if reply == RESULT_BAD_REQUEST {
            return Err(ProxyError::BadReply(reply));
        }
        Ok(reply)
    }

    fn call_ok(&self, tag: CallTag, payload: &[u8]) -> Result<(), ProxyError> {
        match self.call(tag, payload)? {
            RESULT_OK => Ok(()),
            code => Err(ProxyError::Rejected(code)),
        }
    }

    pub fn init_connection(&self) -> Result<(), ProxyError> {
        self.call_ok(CallTag::Init, &[])
    }

    /// Share `region` with the engine. Returns its id.
    pub fn register_shared_memory(&self, region: &dyn SharedMemoryBackend) -> Result<u32, ProxyError> {
        let handle = region.raw_handle().ok_or(ProxyError::NoHandle)?;
        let byte_size =
            u32::try_from(region.size()).map_err(|_| ProxyError::RegionTooLarge(region.size()))?;
        let args = RegisterArgs { byte_size };
        match self.transport.send(CallTag::Register, wire::encode(&args), &[handle])? {
            INVALID_ID => Err(ProxyError::Rejected(INVALID_ID)),
            RESULT_BAD_REQUEST => Err(ProxyError::BadReply(RESULT_BAD_REQUEST)),
            id => Ok(id),
        }
    }

    pub fn unregister_shared_memory(&self, id: u32) -> Result<(), ProxyError> {
        self.call_ok(CallTag::Unregister, wire::encode(&IdArgs { id }))
    }

    pub fn set_command_buffer(
        &self,
        shm_id: u32,
        byte_offset: u32,
        byte_size: u32,
        start_get: u32,
    ) -> Result<(), ProxyError> {
        let args = SetCommandBufferArgs {
            shm_id,
            byte_offset,
            byte_size,
            start_get,
        };
        self.call_ok(CallTag::SetCommandBuffer, wire::encode(&args))
    }

    pub fn put(&self, offset: u32) -> Result<(), ProxyError> {
        self.call_ok(CallTag::Put, wire::encode(&OffsetArgs { offset }))
    }

    /// `None` when no ring is bound.
    pub fn get(&self) -> Result<Option<u32>, ProxyError> {
        Ok(offset(self.call(CallTag::Get, &[])?))
    }

    /// Any `u32` is a valid token, so the reply is never checked for a sentinel.
    pub fn token(&self) -> Result<u32, ProxyError> {
        Ok(self.transport.send(CallTag::GetToken, &[], &[])?)
    }

    pub fn wait_get_changes(&self, watched: u32) -> Result<Option<u32>, ProxyError> {
        let reply = self.call(CallTag::WaitGetChanges, wire::encode(&OffsetArgs { offset: watched }))?;
        Ok(offset(reply))
    }

    /// The continuation arrives out of band, through the transport's signal channel.
    pub fn signal_get_changes(&self, watched: u32, callback_id: u32) -> Result<(), ProxyError> {
        let args = SignalArgs {
            watched,
            callback_id,
        };
        self.call_ok(CallTag::SignalGetChanges, wire::encode(&args))
    }

    pub fn status(&self) -> Result<ConnectionStatus, ProxyError> {
        let reply = self.call(CallTag::GetStatus, &[])?;
        ConnectionStatus::try_from(reply).map_err(ProxyError::BadReply)
    }

    /// Read and clear the engine's latched parse error.
    pub fn take_parse_error(&self) -> Result<Option<ParseError>, ProxyError> {
        let reply = self.call(CallTag::GetParseError, &[])?;
        ParseError::from_wire(reply).map_err(ProxyError::BadReply)
    }

    pub fn close_connection(&self) -> Result<(), ProxyError> {
        self.call_ok(CallTag::Close, &[])
    }
}

fn offset(reply: u32) -> Option<u32> {
    (reply != NO_OFFSET).then_some(reply)
}
