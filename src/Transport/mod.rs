//! Control-call transport.
//!
//! A control call is a tag, a small fixed-layout payload and optionally some
//! OS handles. Its result is a single `u32`. [`dispatch`] decodes a call on the
//! engine side; [`CommandBufferProxy`] encodes calls on the producer side over
//! any [`Transport`].

mod dispatch;
mod local;
mod proxy;
pub mod wire;

pub use dispatch::dispatch;
pub use local::{LocalTransport, Service, ServiceBuilder};
pub use proxy::{CommandBufferProxy, ProxyError};

use crate::Core::SharedMemory::RawHandle;

/// Result of an Ok/Err control call that succeeded.
pub const RESULT_OK: u32 = 0;
/// Unknown tag, short payload or wrong handle count. The engine never saw the call.
pub const RESULT_BAD_REQUEST: u32 = 0xFFFF_FFFE;
/// Offset result meaning "no ring bound".
pub const NO_OFFSET: u32 = 0xFFFF_FFFF;
/// `Register` result when registration failed.
pub const INVALID_ID: u32 = 0xFFFF_FFFF;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallTag {
    Init = 1,
    Register = 2,
    Unregister = 3,
    SetCommandBuffer = 4,
    Put = 5,
    Get = 6,
    GetToken = 7,
    WaitGetChanges = 8,
    SignalGetChanges = 9,
    GetStatus = 10,
    GetParseError = 11,
    Close = 12,
}

impl TryFrom<u32> for CallTag {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Self::Init,
            2 => Self::Register,
            3 => Self::Unregister,
            4 => Self::SetCommandBuffer,
            5 => Self::Put,
            6 => Self::Get,
            7 => Self::GetToken,
            8 => Self::WaitGetChanges,
            9 => Self::SignalGetChanges,
            10 => Self::GetStatus,
            11 => Self::GetParseError,
            12 => Self::Close,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
}

/// Synchronous request/reply channel to one engine.
///
/// Calls are executed in the order they are sent. Handles are borrowed: the
/// receiving side duplicates what it keeps.
pub trait Transport: Send + Sync {
    fn send(&self, tag: CallTag, payload: &[u8], handles: &[RawHandle]) -> Result<u32, TransportError>;
}
