// Fixed-layout payloads of the control calls. Native endianness; both ends share a host.

use bytemuck::{Pod, Zeroable};

/// Payload of `Register`. The region itself travels as the call's single handle.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct RegisterArgs {
    pub byte_size: u32,
}

/// Payload of `Unregister`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct IdArgs {
    pub id: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SetCommandBufferArgs {
    pub shm_id: u32,
    pub byte_offset: u32,
    pub byte_size: u32,
    pub start_get: u32,
}

/// Payload of `Put` and `WaitGetChanges`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct OffsetArgs {
    pub offset: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SignalArgs {
    pub watched: u32,
    pub callback_id: u32,
}

pub fn encode<P: Pod>(args: &P) -> &[u8] {
    bytemuck::bytes_of(args)
}

/// Decode a payload. Trailing bytes are ignored; a short payload is `None`.
pub fn decode<P: Pod>(payload: &[u8]) -> Option<P> {
    let bytes = payload.get(..std::mem::size_of::<P>())?;
    bytemuck::try_pod_read_unaligned(bytes).ok()
}
