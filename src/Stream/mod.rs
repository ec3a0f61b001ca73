mod builder;
mod engine;
pub mod error;
mod writer;

pub use builder::EngineBuilder;
pub use engine::{CommandStreamEngine, MAX_QUEUED_SIGNALS};
pub use error::EngineError;
pub use writer::{CommandWriter, WriterError};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use layout::Header;
    pub use Buffer::RingBuffer; // re-export for stable path
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub use Buffer_Structs::{ConnectionStatus, ParseError, PendingSignal, SignalFired}; // re-export for stable path
}
