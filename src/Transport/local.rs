// src/Transport/local.rs
//
// In-process transport: the producer and the engine live on different threads
// of one process. Calls queue under a mutex and ring a futex doorbell; each
// caller sleeps on its own reply slot until the service thread answers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{dispatch, CallTag, Transport, TransportError};
use crate::Core::futex::{futex_wait, futex_wake_all, Doorbell};
use crate::Core::SharedMemory::RawHandle;
use crate::Decoder::ExecutionTarget;
use crate::Stream::Structs::SignalFired;
use crate::Stream::CommandStreamEngine;

const REPLY_PENDING: u32 = 0;
const REPLY_DONE: u32 = 1;
const REPLY_DROPPED: u32 = 2;

#[derive(Debug, Default)]
struct ReplySlot {
    state: AtomicU32,
    value: AtomicU32,
}

impl ReplySlot {
    fn complete(&self, value: u32) {
        self.value.store(value, Ordering::Relaxed);
        self.state.store(REPLY_DONE, Ordering::Release);
        futex_wake_all(&self.state);
    }

    fn drop_call(&self) {
        self.state.store(REPLY_DROPPED, Ordering::Release);
        futex_wake_all(&self.state);
    }

    fn wait(&self) -> Result<u32, TransportError> {
        loop {
            match self.state.load(Ordering::Acquire) {
                REPLY_DONE => return Ok(self.value.load(Ordering::Relaxed)),
                REPLY_DROPPED => return Err(TransportError::Disconnected),
                _ => futex_wait(&self.state, REPLY_PENDING),
            }
        }
    }
}

struct Call {
    tag: CallTag,
    payload: Vec<u8>,
    handles: Vec<RawHandle>,
    reply: Arc<ReplySlot>,
}

#[derive(Default)]
struct Queue {
    calls: VecDeque<Call>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    doorbell: Doorbell,
    signals: Mutex<VecDeque<SignalFired>>,
    signal_bell: Doorbell,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Refuse new calls and fail the queued ones.
    fn shut_down(&self) {
        let dropped = {
            let mut q = self.queue.lock();
            if q.closed {
                return;
            }
            q.closed = true;
            std::mem::take(&mut q.calls)
        };
        for call in &dropped {
            call.reply.drop_call();
        }
        tracing::debug!(dropped = dropped.len(), "Local transport shut down");
        self.doorbell.ring();
        self.signal_bell.ring();
    }
}

/// Last producer handle gone means disconnect.
struct Link(Arc<Shared>);

impl Drop for Link {
    fn drop(&mut self) {
        self.0.shut_down();
    }
}

/// Producer end of an in-process connection. Clones share the connection.
#[derive(Clone)]
pub struct LocalTransport {
    link: Arc<Link>,
}

impl LocalTransport {
    fn shared(&self) -> &Shared {
        &self.link.0
    }

    /// Block until a `SignalGetChanges` continuation arrives. `None` once disconnected
    /// and drained.
    pub fn next_signal(&self) -> Option<SignalFired> {
        let shared = self.shared();
        loop {
            let seen = shared.signal_bell.seen();
            if let Some(sig) = shared.signals.lock().pop_front() {
                return Some(sig);
            }
            if shared.is_closed() {
                return None;
            }
            shared.signal_bell.wait(seen);
        }
    }

    pub fn try_next_signal(&self) -> Option<SignalFired> {
        self.shared().signals.lock().pop_front()
    }

    /// Stop the service. Calls still queued fail with `Disconnected`.
    pub fn disconnect(&self) {
        self.shared().shut_down();
    }

    pub fn is_connected(&self) -> bool {
        !self.shared().is_closed()
    }
}

impl Transport for LocalTransport {
    fn send(&self, tag: CallTag, payload: &[u8], handles: &[RawHandle]) -> Result<u32, TransportError> {
        let shared = self.shared();
        let reply = Arc::new(ReplySlot::default());
        {
            let mut q = shared.queue.lock();
            if q.closed {
                return Err(TransportError::Disconnected);
            }
            q.calls.push_back(Call {
                tag,
                payload: payload.to_vec(),
                handles: handles.to_vec(),
                reply: Arc::clone(&reply),
            });
        }
        shared.doorbell.ring();
        reply.wait()
    }
}

pub struct ServiceBuilder {
    commands_per_turn: u32,
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self {
            commands_per_turn: 1,
        }
    }
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ring commands executed between two drains of the control queue. At least 1.
    pub fn with_commands_per_turn(mut self, n: u32) -> Self {
        self.commands_per_turn = n.max(1);
        self
    }

    pub fn build<T: ExecutionTarget>(self, engine: CommandStreamEngine<T>) -> (Service<T>, LocalTransport) {
        let shared = Arc::new(Shared::default());
        let service = Service {
            engine,
            shared: Arc::clone(&shared),
            commands_per_turn: self.commands_per_turn,
        };
        let transport = LocalTransport {
            link: Arc::new(Link(shared)),
        };
        (service, transport)
    }
}

/// Engine-side driver loop for a [`LocalTransport`].
pub struct Service<T> {
    engine: CommandStreamEngine<T>,
    shared: Arc<Shared>,
    commands_per_turn: u32,
}

/// Shuts the transport down if the service exits early or unwinds.
struct ShutDownOnExit<'a>(&'a Shared);

impl Drop for ShutDownOnExit<'_> {
    fn drop(&mut self) {
        self.0.shut_down();
    }
}

impl<T: ExecutionTarget> Service<T> {
    /// Serve until the transport disconnects, then close the connection and
    /// hand the engine back.
    ///
    /// Each turn drains every queued control call, then runs up to
    /// `commands_per_turn` ring commands, so neither side starves the other.
    pub fn run(self) -> CommandStreamEngine<T> {
        let Service {
            mut engine,
            shared,
            commands_per_turn,
        } = self;
        let _guard = ShutDownOnExit(&shared);
        tracing::debug!(commands_per_turn, "Service started");

        loop {
            let seen = shared.doorbell.seen();
            let (calls, closed) = {
                let mut q = shared.queue.lock();
                (std::mem::take(&mut q.calls), q.closed)
            };
            let had_calls = !calls.is_empty();
            for call in calls {
                let reply = dispatch(&mut engine, call.tag as u32, &call.payload, &call.handles);
                call.reply.complete(reply);
            }
            if closed {
                break;
            }

            let mut ran = 0;
            while ran < commands_per_turn && engine.pump() {
                ran += 1;
            }
            deliver_signals(&shared, &mut engine);

            if !had_calls && ran == 0 {
                shared.doorbell.wait(seen);
            }
        }

        engine.close_connection();
        deliver_signals(&shared, &mut engine);
        tracing::debug!("Service stopped");
        engine
    }
}

fn deliver_signals<T: ExecutionTarget>(shared: &Shared, engine: &mut CommandStreamEngine<T>) {
    let mut fired = engine.take_fired_signals().peekable();
    if fired.peek().is_none() {
        return;
    }
    shared.signals.lock().extend(fired);
    shared.signal_bell.ring();
}
