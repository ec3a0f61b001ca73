// src/Stream/engine.rs

use std::collections::VecDeque;
use std::sync::Arc;

use crate::Core::table::SharedMemoryTable;
use crate::Core::SharedMemory::SharedMemoryBackend;
use crate::Decoder::{DecodeContext, ExecutionTarget, OpcodeDecoder};
use crate::Stream::error::EngineError;
use crate::Stream::Buffer::RingBuffer;
use crate::Stream::Structs::{ConnectionStatus, ParseError, PendingSignal, SignalFired};

/// Fired signals kept for the owner before the oldest is dropped.
pub const MAX_QUEUED_SIGNALS: usize = 1024;

/// Consumer side of one connection: the control protocol plus the command driver.
///
/// Single owner, no internal locking. The transport serializes calls before
/// they reach the engine, and the owner interleaves control calls with
/// [`CommandStreamEngine::pump`] so neither starves the other.
pub struct CommandStreamEngine<T> {
    pub(crate) status: ConnectionStatus,
    pub(crate) parse_error: Option<ParseError>,
    pub(crate) token: u32,
    pub(crate) table: SharedMemoryTable,
    pub(crate) ring: Option<RingBuffer>,
    pub(crate) decoder: OpcodeDecoder,
    pub(crate) target: T,
    pub(crate) pending_signal: Option<PendingSignal>,
    pub(crate) fired: VecDeque<SignalFired>,
}

impl<T: ExecutionTarget> CommandStreamEngine<T> {
    pub(crate) fn from_parts(table: SharedMemoryTable, decoder: OpcodeDecoder, target: T) -> Self {
        Self {
            status: ConnectionStatus::NotConnected,
            parse_error: None,
            token: 0,
            table,
            ring: None,
            decoder,
            target,
            pending_signal: None,
            fired: VecDeque::new(),
        }
    }

    /// `NotConnected -> NoBuffer`.
    pub fn init_connection(&mut self) -> Result<(), EngineError> {
        if self.status != ConnectionStatus::NotConnected {
            tracing::warn!(status = ?self.status, "InitConnection on a live connection");
            return Err(EngineError::AlreadyConnected);
        }
        self.status = ConnectionStatus::NoBuffer;
        tracing::debug!("Connection initialized");
        Ok(())
    }

    /// Bind a new ring buffer of `byte_size` bytes at `byte_offset` in region `shm_id`.
    ///
    /// The previous ring, if any, is drained first. On success status becomes
    /// `Parsing`, `get == put == start_get`, and the latched error is cleared.
    /// A rejected call changes nothing.
    pub fn set_command_buffer(
        &mut self,
        shm_id: u32,
        byte_offset: usize,
        byte_size: usize,
        start_get: u32,
    ) -> Result<(), EngineError> {
        if self.status == ConnectionStatus::NotConnected {
            return Err(EngineError::NotConnected);
        }
        let region = self
            .table
            .region(shm_id)
            .cloned()
            .ok_or(crate::Core::table::TableError::UnknownId(shm_id))?;
        let ring = RingBuffer::new(region, shm_id, byte_offset, byte_size, start_get)
            .inspect_err(|e| tracing::warn!(shm_id, error = %e, "SetCommandBuffer rejected"))?;

        self.finish_parsing();

        tracing::debug!(
            shm_id,
            byte_offset,
            entries = ring.entry_count(),
            start_get,
            "Command buffer bound"
        );
        self.ring = Some(ring);
        self.status = ConnectionStatus::Parsing;
        self.parse_error = None;
        Ok(())
    }

    /// Publish the producer's `put`. An offset outside the ring halts the stream
    /// with `OutOfBounds`.
    pub fn put(&mut self, offset: u32) -> Result<(), EngineError> {
        let ring = self.ring.as_mut().ok_or(EngineError::NoBuffer)?;
        if let Err(err) = ring.set_put(offset) {
            tracing::warn!(
                offset,
                entries = ring.entry_count(),
                "Put offset outside the ring"
            );
            self.record_parse_error(err);
        }
        Ok(())
    }

    /// Current `get`, `None` without a bound ring.
    pub fn get(&self) -> Option<u32> {
        self.ring.as_ref().map(RingBuffer::get)
    }

    /// Last value written by an in-stream `SetToken`.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Drive the backlog until `get` moves away from `watched`.
    ///
    /// Only commands already published are processed; this never waits for the
    /// producer. Returns the resulting `get`.
    pub fn wait_get_changes(&mut self, watched: u32) -> Option<u32> {
        let mut budget = self.drain_budget();
        while budget > 0
            && self.status == ConnectionStatus::Parsing
            && self
                .ring
                .as_ref()
                .is_some_and(|r| r.get() == watched && !r.is_empty())
        {
            let _ = self.process_one_command();
            budget -= 1;
        }
        self.get()
    }

    /// Ask to be told when `get` moves away from `watched`.
    ///
    /// Fires at once if the stream is not parsing or `get` already differs.
    /// Otherwise the registration replaces any unfired one and fires after the
    /// next processed command, whether or not that command moved `get` off
    /// `watched`.
    pub fn signal_get_changes(&mut self, watched: u32, callback_id: u32) {
        let get = self.get();
        if self.status != ConnectionStatus::Parsing || get != Some(watched) {
            self.fire(callback_id);
            return;
        }
        if let Some(old) = self.pending_signal.replace(PendingSignal {
            watched,
            callback_id,
        }) {
            tracing::debug!(
                replaced = old.callback_id,
                callback_id,
                "Pending signal replaced before firing"
            );
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Read and clear the latched parse error.
    pub fn take_parse_error(&mut self) -> Option<ParseError> {
        self.parse_error.take()
    }

    /// Drain, drop the ring and return to `NotConnected`.
    ///
    /// A pending signal fires with no `get`, since nothing will process it later.
    pub fn close_connection(&mut self) {
        if self.status == ConnectionStatus::NotConnected {
            return;
        }
        self.finish_parsing();
        self.ring = None;
        self.status = ConnectionStatus::NotConnected;
        if let Some(sig) = self.pending_signal.take() {
            self.fire(sig.callback_id);
        }
        tracing::debug!("Connection closed");
    }

    pub fn register_shared_memory(
        &mut self,
        region: Arc<dyn SharedMemoryBackend>,
    ) -> Result<u32, EngineError> {
        Ok(self.table.register(region)?)
    }

    /// Free the slot for `id`.
    ///
    /// If the bound ring lives in that region it is drained and dropped first,
    /// status falls back to `NoBuffer` and a pending signal fires with no
    /// `get`. No mapping of the region is kept past this call.
    pub fn unregister_shared_memory(&mut self, id: u32) -> Result<(), EngineError> {
        if !self.table.is_registered(id) {
            return Ok(self.table.unregister(id)?);
        }
        if self.ring.as_ref().is_some_and(|r| r.shm_id() == id) {
            self.finish_parsing();
            self.ring = None;
            self.status = ConnectionStatus::NoBuffer;
            if let Some(sig) = self.pending_signal.take() {
                self.fire(sig.callback_id);
            }
            tracing::debug!(shm_id = id, "Command buffer released with its region");
        }
        Ok(self.table.unregister(id)?)
    }

    /// Execute one command if the stream is parsing and has backlog.
    ///
    /// Returns whether a command was attempted. Owners call this between
    /// control calls to make progress without being asked.
    pub fn pump(&mut self) -> bool {
        if !self.has_backlog() {
            return false;
        }
        let _ = self.process_one_command();
        true
    }

    /// True when [`CommandStreamEngine::pump`] would do work.
    pub fn has_backlog(&self) -> bool {
        self.status == ConnectionStatus::Parsing
            && self.ring.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Continuations produced since the last call, oldest first.
    ///
    /// Owners drain this after every control call and pump; at most
    /// [`MAX_QUEUED_SIGNALS`] are kept.
    pub fn take_fired_signals(&mut self) -> impl Iterator<Item = SignalFired> + '_ {
        self.fired.drain(..)
    }

    /// Oldest continuation not yet taken.
    pub fn next_fired_signal(&mut self) -> Option<SignalFired> {
        self.fired.pop_front()
    }

    pub fn pending_signal(&self) -> Option<PendingSignal> {
        self.pending_signal
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn shared_memory(&self) -> &SharedMemoryTable {
        &self.table
    }

    pub fn ring(&self) -> Option<&RingBuffer> {
        self.ring.as_ref()
    }

    /// Drain everything published so far, stopping early on a structural error.
    fn finish_parsing(&mut self) {
        let mut budget = self.drain_budget();
        while budget > 0 && self.pump() {
            budget -= 1;
        }
        if budget == 0 && self.has_backlog() {
            tracing::warn!("Ring did not drain; command sizes never land on put");
        }
    }

    /// Upper bound on commands a well-formed backlog can hold.
    fn drain_budget(&self) -> u32 {
        self.ring.as_ref().map_or(0, RingBuffer::entry_count)
    }

    fn process_one_command(&mut self) -> Result<(), ParseError> {
        let Some(ring) = self.ring.as_mut() else {
            return Ok(());
        };
        let decoder = &self.decoder;
        let mut ctx = DecodeContext {
            shm: &self.table,
            target: &mut self.target,
            token: &mut self.token,
        };
        let result = ring.process_one(|opcode, args| decoder.execute(opcode, args, &mut ctx));

        if let Err(err) = result {
            self.record_parse_error(err);
        }
        if let Some(sig) = self.pending_signal.take() {
            self.fire(sig.callback_id);
        }
        result
    }

    /// Structural errors halt the stream and always win the latch; semantic
    /// errors only fill an empty latch.
    fn record_parse_error(&mut self, err: ParseError) {
        if err.is_structural() {
            tracing::warn!(error = %err, get = ?self.get(), "Command stream halted");
            self.status = ConnectionStatus::ParseError;
            self.parse_error = Some(err);
        } else {
            tracing::debug!(error = %err, get = ?self.get(), "Command rejected");
            if self.parse_error.is_none() {
                self.parse_error = Some(err);
            }
        }
    }

    fn fire(&mut self, callback_id: u32) {
        let fired = SignalFired {
            callback_id,
            get: self.get(),
        };
        tracing::trace!(callback_id, get = ?fired.get, "Signal fired");
        if self.fired.len() >= MAX_QUEUED_SIGNALS {
            if let Some(lost) = self.fired.pop_front() {
                tracing::warn!(
                    lost = lost.callback_id,
                    queued = MAX_QUEUED_SIGNALS,
                    "Fired signals not drained; oldest dropped"
                );
            }
        }
        self.fired.push_back(fired);
    }
}
