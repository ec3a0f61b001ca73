use crate::Core::SharedMemory::RawHandle;
use crate::Decoder::BufferTarget;
use crate::Stream::{CommandStreamEngine, EngineBuilder};
use crate::Transport::{dispatch, RESULT_BAD_REQUEST};
use std::ptr;

// Error codes
const DMXP_SUCCESS: i32 = 0;
const DMXP_ERROR_NULL_POINTER: i32 = -1;
const DMXP_ERROR_EMPTY: i32 = -5;

/// Handle to an engine instance (opaque pointer)
pub struct EngineHandle {
    inner: CommandStreamEngine<BufferTarget>,
}

/// Create an engine with the built-in opcode set and an in-memory target.
///
/// # Arguments
/// * `max_regions` - Cap on registered shared memory regions, 0 for the default.
///
/// # Returns
/// * Pointer to `EngineHandle`. Free with `dmxp_engine_free`.
#[no_mangle]
pub extern "C" fn dmxp_engine_new(max_regions: u32) -> *mut EngineHandle {
    let mut builder = EngineBuilder::new();
    if max_regions > 0 {
        builder = builder.with_max_regions(max_regions as usize);
    }
    let handle = Box::new(EngineHandle {
        inner: builder.build(BufferTarget::default()),
    });
    Box::into_raw(handle)
}

/// Free an engine handle. Closes the connection first.
#[no_mangle]
pub extern "C" fn dmxp_engine_free(handle: *mut EngineHandle) {
    if !handle.is_null() {
        unsafe {
            let mut handle = Box::from_raw(handle);
            handle.inner.close_connection();
        }
    }
}

/// Execute one control call received by a foreign transport.
///
/// # Arguments
/// * `handle` - Pointer to `EngineHandle`.
/// * `tag` - Call tag.
/// * `payload` / `len` - Call payload, may be NULL when `len` is 0.
/// * `fds` / `fd_count` - File descriptors carried with the call. They stay owned by the caller.
///
/// # Returns
/// * The call's result word, `RESULT_BAD_REQUEST` for a NULL handle.
///
/// `SignalGetChanges` continuations queue inside the engine until taken with
/// `dmxp_engine_next_signal`. Hosts must drain them after each dispatch and
/// pump; past `MAX_QUEUED_SIGNALS` the oldest are dropped.
#[no_mangle]
pub extern "C" fn dmxp_engine_dispatch(
    handle: *mut EngineHandle,
    tag: u32,
    payload: *const u8,
    len: usize,
    fds: *const i32,
    fd_count: usize,
) -> u32 {
    if handle.is_null() || (payload.is_null() && len > 0) || (fds.is_null() && fd_count > 0) {
        return RESULT_BAD_REQUEST;
    }

    let engine = unsafe { &mut (*handle).inner };
    let payload = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(payload, len) }
    };
    let handles: Vec<RawHandle> = if fd_count == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(fds, fd_count) }
            .iter()
            .map(|fd| RawHandle::Fd(*fd))
            .collect()
    };

    dispatch(engine, tag, payload, &handles)
}

/// Execute one ring command if there is backlog.
///
/// # Returns
/// * 1 if a command was attempted, 0 if idle, negative on a NULL handle.
#[no_mangle]
pub extern "C" fn dmxp_engine_pump(handle: *mut EngineHandle) -> i32 {
    if handle.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let engine = unsafe { &mut (*handle).inner };
    i32::from(engine.pump())
}

/// Pop the oldest fired `SignalGetChanges` continuation.
///
/// # Arguments
/// * `out_callback_id` - Receives the callback id.
/// * `out_get` - Receives the `get` at firing time, 0xFFFFFFFF when no ring was bound. May be NULL.
///
/// # Returns
/// * 0 on success, DMXP_ERROR_EMPTY if nothing has fired.
#[no_mangle]
pub extern "C" fn dmxp_engine_next_signal(
    handle: *mut EngineHandle,
    out_callback_id: *mut u32,
    out_get: *mut u32,
) -> i32 {
    if handle.is_null() || out_callback_id.is_null() {
        return DMXP_ERROR_NULL_POINTER;
    }
    let engine = unsafe { &mut (*handle).inner };
    let Some(sig) = engine.next_fired_signal() else {
        return DMXP_ERROR_EMPTY;
    };
    unsafe {
        ptr::write(out_callback_id, sig.callback_id);
        if !out_get.is_null() {
            ptr::write(out_get, sig.get.unwrap_or(u32::MAX));
        }
    }
    DMXP_SUCCESS
}
