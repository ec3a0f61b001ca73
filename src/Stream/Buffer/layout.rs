/// Bytes per ring buffer word.
pub const WORD_SIZE: usize = 4;

/// Bits of the header word holding the command size.
pub const SIZE_BITS: u32 = 21;

/// Largest command, in words including the header.
pub const MAX_COMMAND_WORDS: u32 = (1 << SIZE_BITS) - 1;

/// Largest encodable opcode.
pub const MAX_OPCODE: u32 = (1 << (32 - SIZE_BITS)) - 1;

/// Header word at the start of every command.
///
/// Layout (one native-endian `u32`):
/// - bits 0..21: `size`, the command length in words including this header
/// - bits 21..32: `opcode`
///
/// A command is `[Header][arg0 .. arg(size-2)]`, so `size - 1` is the argument count.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub opcode: u32,
    pub size: u32,
}

impl Header {
    /// Header for a command with `arg_count` argument words.
    pub fn new(opcode: u32, arg_count: usize) -> Option<Self> {
        let size = u32::try_from(arg_count).ok()?.checked_add(1)?;
        if opcode > MAX_OPCODE || size > MAX_COMMAND_WORDS {
            return None;
        }
        Some(Self { opcode, size })
    }

    #[inline]
    pub fn from_word(word: u32) -> Self {
        Self {
            opcode: word >> SIZE_BITS,
            size: word & MAX_COMMAND_WORDS,
        }
    }

    #[inline]
    pub fn to_word(self) -> u32 {
        (self.opcode << SIZE_BITS) | (self.size & MAX_COMMAND_WORDS)
    }

    #[inline]
    pub fn arg_count(self) -> u32 {
        self.size.saturating_sub(1)
    }
}
