use crate::Core::table::TableError;

/// Why a control-protocol call was rejected.
///
/// Rejections leave engine state untouched. Each variant has a stable non-zero
/// wire code; `0` means success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("connection is not initialized")]
    NotConnected,

    #[error("connection is already initialized")]
    AlreadyConnected,

    #[error("no command buffer is bound")]
    NoBuffer,

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("command buffer range offset={offset} size={size} does not fit a region of {region_size} bytes")]
    BadRange {
        offset: usize,
        size: usize,
        region_size: usize,
    },

    #[error("command buffer offset={offset} size={size} must be non-empty and word aligned")]
    Misaligned { offset: usize, size: usize },

    #[error("start offset {start} is outside a ring of {entries} entries")]
    BadStart { start: u32, entries: u32 },

    #[error("shared memory handle could not be mapped: {0}")]
    MapFailed(String),
}

impl EngineError {
    pub fn code(&self) -> u32 {
        match self {
            Self::NotConnected => 1,
            Self::AlreadyConnected => 2,
            Self::NoBuffer => 3,
            Self::Table(TableError::UnknownId(_)) => 4,
            Self::Table(TableError::Full { .. }) => 5,
            Self::BadRange { .. } => 6,
            Self::Misaligned { .. } => 7,
            Self::BadStart { .. } => 8,
            Self::MapFailed(_) => 9,
        }
    }
}
