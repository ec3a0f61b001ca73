// src/Stream/writer.rs
use std::sync::Arc;

use crate::Core::SharedMemory::{SharedMemoryBackend, ShmView};
use crate::Decoder::opcodes;
use crate::Stream::Buffer::layout::{Header, MAX_COMMAND_WORDS, MAX_OPCODE, WORD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriterError {
    #[error("ring full: command needs {needed} words, {free} free")]
    Full { needed: u32, free: u32 },

    #[error("command of {words} words cannot fit a ring of {entries} entries")]
    TooLarge { words: usize, entries: u32 },

    #[error("opcode {0} is not encodable")]
    BadOpcode(u32),

    #[error("ring range offset={offset} size={size} is invalid for a region of {region_size} bytes")]
    BadRange {
        offset: usize,
        size: usize,
        region_size: usize,
    },

    #[error("start or get offset {0} is outside the ring")]
    BadCursor(u32),
}

/// Producer side of a command ring.
///
/// Writes `[Header][args]` at `put` with volatile stores. A command that would
/// cross the end of the ring is preceded by `Noop` padding up to the end, so
/// the consumer never sees a command straddle the wrap. One word always stays
/// free so that `get == put` means empty.
///
/// The caller publishes the returned `put` through the control protocol.
pub struct CommandWriter {
    region: Arc<dyn SharedMemoryBackend>,
    byte_offset: usize,
    entry_count: u32,
    put: u32,
}

impl CommandWriter {
    pub fn new(
        region: Arc<dyn SharedMemoryBackend>,
        byte_offset: usize,
        byte_size: usize,
        start: u32,
    ) -> Result<Self, WriterError> {
        let region_size = region.size();
        let bad_range = WriterError::BadRange {
            offset: byte_offset,
            size: byte_size,
            region_size,
        };
        if byte_offset % WORD_SIZE != 0 || byte_size % WORD_SIZE != 0 || byte_size < WORD_SIZE {
            return Err(bad_range);
        }
        if byte_offset.checked_add(byte_size).map_or(true, |end| end > region_size) {
            return Err(bad_range);
        }
        let entry_count = u32::try_from(byte_size / WORD_SIZE).map_err(|_| bad_range)?;
        if start >= entry_count {
            return Err(WriterError::BadCursor(start));
        }
        Ok(Self {
            region,
            byte_offset,
            entry_count,
            put: start,
        })
    }

    pub fn put(&self) -> u32 {
        self.put
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Words that can be written before running into `get`.
    pub fn free_words(&self, get: u32) -> u32 {
        let get = get % self.entry_count;
        let used = (self.put + self.entry_count - get) % self.entry_count;
        self.entry_count - 1 - used
    }

    /// Append one command. Returns the new `put`.
    pub fn write(&mut self, opcode: u32, args: &[u32], get: u32) -> Result<u32, WriterError> {
        if get >= self.entry_count {
            return Err(WriterError::BadCursor(get));
        }
        if opcode > MAX_OPCODE {
            return Err(WriterError::BadOpcode(opcode));
        }
        let too_large = WriterError::TooLarge {
            words: args.len() + 1,
            entries: self.entry_count,
        };
        let header = Header::new(opcode, args.len()).ok_or(too_large.clone())?;
        if header.size >= self.entry_count {
            return Err(too_large);
        }

        let pad = if self.put + header.size > self.entry_count {
            self.entry_count - self.put
        } else {
            0
        };
        let needed = pad + header.size;
        let free = self.free_words(get);
        if needed > free {
            return Err(WriterError::Full { needed, free });
        }

        let words = self.words()?;
        let mut at = self.put;
        let mut remaining = pad;
        while remaining > 0 {
            let chunk = remaining.min(MAX_COMMAND_WORDS);
            store(&words, at, Header { opcode: opcodes::NOOP, size: chunk }.to_word());
            at += chunk;
            remaining -= chunk;
        }
        if pad > 0 {
            at = 0;
        }

        store(&words, at, header.to_word());
        for (i, arg) in args.iter().enumerate() {
            store(&words, at + 1 + i as u32, *arg);
        }

        self.put = (at + header.size) % self.entry_count;
        Ok(self.put)
    }

    /// Append raw words with no framing or padding, wrapping at the end of the ring.
    ///
    /// Lets callers lay down headers the parser must reject.
    pub fn write_words(&mut self, raw: &[u32], get: u32) -> Result<u32, WriterError> {
        if get >= self.entry_count {
            return Err(WriterError::BadCursor(get));
        }
        let free = self.free_words(get);
        let needed = u32::try_from(raw.len()).unwrap_or(u32::MAX);
        if needed > free {
            return Err(WriterError::Full { needed, free });
        }
        let words = self.words()?;
        let mut put = self.put;
        for word in raw {
            store(&words, put, *word);
            put = (put + 1) % self.entry_count;
        }
        self.put = put;
        Ok(put)
    }

    fn words(&self) -> Result<ShmView<'_>, WriterError> {
        self.region
            .view()
            .subview(self.byte_offset, self.entry_count as usize * WORD_SIZE)
            .ok_or(WriterError::BadRange {
                offset: self.byte_offset,
                size: self.entry_count as usize * WORD_SIZE,
                region_size: self.region.size(),
            })
    }
}

#[inline]
fn store(words: &ShmView<'_>, index: u32, value: u32) {
    let _ = words.write_u32(index as usize * WORD_SIZE, value);
}
