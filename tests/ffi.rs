// C ABI tests: drive an engine through the exported functions only.
// Run with: cargo test --test ffi -- --nocapture

use dmxp_cmdstream::ffi::{
    dmxp_engine_dispatch, dmxp_engine_free, dmxp_engine_new, dmxp_engine_next_signal,
    dmxp_engine_pump,
};
use dmxp_cmdstream::Transport::wire::{self, SignalArgs};
use dmxp_cmdstream::Transport::{CallTag, NO_OFFSET, RESULT_BAD_REQUEST, RESULT_OK};
use std::ptr;

#[test]
fn null_handles_are_rejected() {
    assert_eq!(
        dmxp_engine_dispatch(ptr::null_mut(), CallTag::Init as u32, ptr::null(), 0, ptr::null(), 0),
        RESULT_BAD_REQUEST
    );
    assert!(dmxp_engine_pump(ptr::null_mut()) < 0);
    let mut cb = 0u32;
    assert!(dmxp_engine_next_signal(ptr::null_mut(), &mut cb, ptr::null_mut()) < 0);
    dmxp_engine_free(ptr::null_mut());
}

#[test]
fn control_calls_and_signals_through_the_c_abi() {
    let handle = dmxp_engine_new(0);
    assert!(!handle.is_null());

    // Non-empty payload with a NULL pointer.
    assert_eq!(
        dmxp_engine_dispatch(handle, CallTag::Put as u32, ptr::null(), 4, ptr::null(), 0),
        RESULT_BAD_REQUEST
    );
    assert_eq!(
        dmxp_engine_dispatch(handle, CallTag::Init as u32, ptr::null(), 0, ptr::null(), 0),
        RESULT_OK
    );
    assert_eq!(
        dmxp_engine_dispatch(handle, CallTag::Get as u32, ptr::null(), 0, ptr::null(), 0),
        NO_OFFSET
    );
    assert_eq!(dmxp_engine_pump(handle), 0);

    // No ring bound, so both signals fire at once and queue in order.
    for callback_id in [11, 12] {
        let args = SignalArgs { watched: 0, callback_id };
        let bytes = wire::encode(&args);
        assert_eq!(
            dmxp_engine_dispatch(
                handle,
                CallTag::SignalGetChanges as u32,
                bytes.as_ptr(),
                bytes.len(),
                ptr::null(),
                0
            ),
            RESULT_OK
        );
    }

    let (mut cb, mut get) = (0u32, 0u32);
    assert_eq!(dmxp_engine_next_signal(handle, &mut cb, &mut get), 0);
    assert_eq!((cb, get), (11, u32::MAX));
    assert_eq!(dmxp_engine_next_signal(handle, &mut cb, ptr::null_mut()), 0);
    assert_eq!(cb, 12);
    assert!(dmxp_engine_next_signal(handle, &mut cb, &mut get) < 0);

    dmxp_engine_free(handle);
}
