// Module naming follows project convention (Stream = command stream consumer)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Stream;
#[allow(non_snake_case)]
pub mod Decoder;
#[allow(non_snake_case)]
pub mod Transport;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod ffi;

pub use Core::{create_shared_memory, RawHandle, SharedMemoryBackend, SharedMemoryTable};
pub use Decoder::{BufferTarget, ExecutionTarget, OpcodeTable};
pub use Stream::Structs::{ConnectionStatus, ParseError, SignalFired};
pub use Stream::{CommandStreamEngine, CommandWriter, EngineBuilder, EngineError};
pub use Transport::{CommandBufferProxy, LocalTransport, ServiceBuilder};
