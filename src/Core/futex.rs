use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(target_os = "linux")]
fn sys_futex(word: &AtomicU32, op: libc::c_int, val: u32) {
    // SAFETY: `word` is a live, aligned u32 for the duration of the call.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            op | libc::FUTEX_PRIVATE_FLAG,
            val,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Block while `word == expected`. May return spuriously; callers re-check.
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    if word.load(Ordering::Acquire) != expected {
        return;
    }
    #[cfg(target_os = "linux")]
    sys_futex(word, libc::FUTEX_WAIT, expected);
    #[cfg(not(target_os = "linux"))]
    std::thread::yield_now();
}

/// Wake every thread sleeping on `word`.
pub fn futex_wake_all(word: &AtomicU32) {
    #[cfg(target_os = "linux")]
    sys_futex(word, libc::FUTEX_WAKE, i32::MAX as u32);
    #[cfg(not(target_os = "linux"))]
    let _ = word;
}

/// Sequence word one side bumps and the other side sleeps on.
///
/// Waiters read `seen()` before checking their condition and pass it to
/// `wait`, so a ring between the check and the sleep is never lost.
#[derive(Debug, Default)]
pub struct Doorbell {
    seq: CachePadded<AtomicU32>,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn seen(&self) -> u32 {
        self.seq.load(Ordering::Acquire)
    }

    pub fn ring(&self) {
        self.seq.fetch_add(1, Ordering::Release);
        futex_wake_all(&self.seq);
    }

    pub fn wait(&self, seen: u32) {
        futex_wait(&self.seq, seen);
    }
}
