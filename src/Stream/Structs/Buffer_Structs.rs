// Status and error values shared by the parser, the engine and the wire encoding.
// All enums are #[repr(u32)] so they travel as the single scalar a control call returns.

/// Connection state of a command stream engine.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    NotConnected = 0,
    /// Connected, no ring buffer bound yet.
    NoBuffer = 1,
    Parsing = 2,
    /// A structural error halted the stream; a new `SetCommandBuffer` recovers.
    ParseError = 3,
}

impl TryFrom<u32> for ConnectionStatus {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::NotConnected),
            1 => Ok(Self::NoBuffer),
            2 => Ok(Self::Parsing),
            3 => Ok(Self::ParseError),
            other => Err(other),
        }
    }
}

/// Wire code for "no parse error".
pub const PARSE_ERROR_NONE: u32 = 0;

/// Failure of a single command.
///
/// `InvalidSize` and `OutOfBounds` are structural: the bad header is not
/// consumed and the stream halts. `UnknownOpcode` and `InvalidArguments` are
/// semantic: the command is consumed and parsing continues.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ParseError {
    #[error("command header declares a size of zero words")]
    InvalidSize = 1,
    #[error("command extends past the end of the ring buffer")]
    OutOfBounds = 2,
    #[error("unknown opcode")]
    UnknownOpcode = 3,
    #[error("invalid command arguments")]
    InvalidArguments = 4,
}

impl ParseError {
    #[inline]
    pub fn is_structural(self) -> bool {
        matches!(self, Self::InvalidSize | Self::OutOfBounds)
    }

    pub fn to_wire(err: Option<Self>) -> u32 {
        err.map_or(PARSE_ERROR_NONE, |e| e as u32)
    }

    /// Inverse of [`ParseError::to_wire`]. Unknown codes come back as `Err(code)`.
    pub fn from_wire(code: u32) -> Result<Option<Self>, u32> {
        match code {
            PARSE_ERROR_NONE => Ok(None),
            1 => Ok(Some(Self::InvalidSize)),
            2 => Ok(Some(Self::OutOfBounds)),
            3 => Ok(Some(Self::UnknownOpcode)),
            4 => Ok(Some(Self::InvalidArguments)),
            other => Err(other),
        }
    }
}

/// The single outstanding `SignalGetChanges` registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingSignal {
    pub watched: u32,
    pub callback_id: u32,
}

/// Continuation produced when a signal fires; sent back to the producer later.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SignalFired {
    pub callback_id: u32,
    /// `get` at fire time, `None` when no ring buffer is bound.
    pub get: Option<u32>,
}
