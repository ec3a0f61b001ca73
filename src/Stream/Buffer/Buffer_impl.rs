use std::sync::Arc;

use super::layout::{Header, WORD_SIZE};
use super::Buffer::RingBuffer;
use crate::Core::SharedMemory::{SharedMemoryBackend, ShmView};
use crate::Stream::error::EngineError;
use crate::Stream::Structs::Buffer_Structs::ParseError;

impl RingBuffer {
    /// Bind a ring of `byte_size / 4` words at `byte_offset` inside `region`,
    /// with `get = put = start`.
    pub fn new(
        region: Arc<dyn SharedMemoryBackend>,
        shm_id: u32,
        byte_offset: usize,
        byte_size: usize,
        start: u32,
    ) -> Result<Self, EngineError> {
        if byte_offset % WORD_SIZE != 0 || byte_size % WORD_SIZE != 0 || byte_size < WORD_SIZE {
            return Err(EngineError::Misaligned {
                offset: byte_offset,
                size: byte_size,
            });
        }
        let region_size = region.size();
        match byte_offset.checked_add(byte_size) {
            Some(end) if end <= region_size => {}
            _ => {
                return Err(EngineError::BadRange {
                    offset: byte_offset,
                    size: byte_size,
                    region_size,
                })
            }
        }
        let entry_count = u32::try_from(byte_size / WORD_SIZE).map_err(|_| EngineError::BadRange {
            offset: byte_offset,
            size: byte_size,
            region_size,
        })?;
        if start >= entry_count {
            return Err(EngineError::BadStart {
                start,
                entries: entry_count,
            });
        }

        Ok(Self {
            region,
            shm_id,
            byte_offset,
            entry_count,
            get: start,
            put: start,
            scratch: Vec::new(),
        })
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.get
    }

    #[inline]
    pub fn put(&self) -> u32 {
        self.put
    }

    #[inline]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    #[inline]
    pub fn shm_id(&self) -> u32 {
        self.shm_id
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.get == self.put
    }

    /// Publish a new `put`. An offset outside the ring is a structural error
    /// and leaves `put` untouched.
    pub fn set_put(&mut self, put: u32) -> Result<(), ParseError> {
        if put >= self.entry_count {
            return Err(ParseError::OutOfBounds);
        }
        self.put = put;
        Ok(())
    }

    /// Parse and hand off the command at `get`.
    ///
    /// An empty ring is a no-op. A zero-size header or one running past the
    /// end of the ring is returned without moving `get`. Otherwise the argument
    /// words are copied out, `decode(opcode, args)` runs, and `get` advances
    /// past the command whatever `decode` returned.
    pub fn process_one<F>(&mut self, mut decode: F) -> Result<(), ParseError>
    where
        F: FnMut(u32, &[u32]) -> Result<(), ParseError>,
    {
        if self.is_empty() {
            return Ok(());
        }

        let get = self.get;
        let entry_count = self.entry_count;
        // Field borrow only, so `scratch` stays writable below.
        let words: ShmView<'_> = self
            .region
            .view()
            .subview(self.byte_offset, entry_count as usize * WORD_SIZE)
            .ok_or(ParseError::OutOfBounds)?;
        let header = words
            .read_u32(get as usize * WORD_SIZE)
            .map(Header::from_word)
            .ok_or(ParseError::OutOfBounds)?;

        if header.size == 0 {
            return Err(ParseError::InvalidSize);
        }
        // Commands never wrap; the producer pads to the end of the ring instead.
        if u64::from(get) + u64::from(header.size) > u64::from(entry_count) {
            return Err(ParseError::OutOfBounds);
        }

        let arg_count = header.arg_count() as usize;
        let args = words
            .subview((get as usize + 1) * WORD_SIZE, arg_count * WORD_SIZE)
            .ok_or(ParseError::OutOfBounds)?;
        self.scratch.clear();
        self.scratch.resize(arg_count, 0);
        args.copy_to(bytemuck::cast_slice_mut(&mut self.scratch));

        tracing::trace!(
            opcode = header.opcode,
            arg_count,
            get,
            "Decoding command"
        );
        let result = decode(header.opcode, &self.scratch);

        self.get = (get + header.size) % entry_count;
        result
    }

    /// Run [`RingBuffer::process_one`] until the ring is empty or a command fails.
    pub fn process_all<F>(&mut self, mut decode: F) -> Result<(), ParseError>
    where
        F: FnMut(u32, &[u32]) -> Result<(), ParseError>,
    {
        // A well-formed backlog holds fewer commands than words.
        let mut budget = self.entry_count;
        while !self.is_empty() && budget > 0 {
            self.process_one(&mut decode)?;
            budget -= 1;
        }
        Ok(())
    }
}
