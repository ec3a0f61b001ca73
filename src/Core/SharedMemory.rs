// Shared memory backends and the bounds-checked view the decoder reads through.
// Linux regions are memfd_create + mmap so the handle can be passed to the consumer.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::io;
use std::marker::PhantomData;
use std::ptr;
use std::ptr::NonNull;

/// A mapped region that ring buffers and opcode payloads can live in.
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Base address; stays valid while the backend is alive.
    fn as_ptr(&self) -> *mut u8;

    /// Mapped length in bytes.
    fn size(&self) -> usize;

    /// Handle another process can map, `None` for process-local regions.
    fn raw_handle(&self) -> Option<RawHandle>;
}

impl dyn SharedMemoryBackend {
    /// Bounds-checked view over the whole region.
    pub fn view(&self) -> ShmView<'_> {
        // SAFETY: the backend guarantees `as_ptr()..as_ptr()+size()` stays mapped
        // for as long as the backend itself is alive.
        unsafe { ShmView::from_raw(self.as_ptr(), self.size()) }
    }
}

/// OS handle carried alongside a `Register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// memfd descriptor
    Fd(i32),
}

/// Borrowed window into a mapped region.
///
/// The other side of the mapping may write concurrently, so every access is a
/// copy (volatile for single words). Callers snapshot what they need and
/// validate the snapshot; nothing hands out a `&[u8]` into the region.
#[derive(Clone, Copy)]
pub struct ShmView<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _region: PhantomData<&'a ()>,
}

impl<'a> ShmView<'a> {
    /// # Safety
    /// `ptr..ptr+len` must stay mapped and writable for `'a`.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr: NonNull::new(ptr).unwrap_or(NonNull::dangling()),
            len: if ptr.is_null() { 0 } else { len },
            _region: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Narrow the view to `offset..offset+len`, or `None` if that leaves the view.
    pub fn subview(&self, offset: usize, len: usize) -> Option<ShmView<'a>> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(ShmView {
            // SAFETY: offset <= self.len, so the result stays inside the mapping.
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) },
            len,
            _region: PhantomData,
        })
    }

    /// Read one native-endian word at `byte_offset`.
    #[inline]
    pub fn read_u32(&self, byte_offset: usize) -> Option<u32> {
        if byte_offset.checked_add(4)? > self.len {
            return None;
        }
        // SAFETY: bounds checked above; [u8; 4] has alignment 1.
        let bytes = unsafe {
            ptr::read_volatile(self.ptr.as_ptr().add(byte_offset) as *const [u8; 4])
        };
        Some(u32::from_ne_bytes(bytes))
    }

    /// Write one native-endian word at `byte_offset`. Returns false when out of range.
    #[inline]
    pub fn write_u32(&self, byte_offset: usize, value: u32) -> bool {
        match byte_offset.checked_add(4) {
            Some(end) if end <= self.len => {
                // SAFETY: bounds checked above.
                unsafe {
                    ptr::write_volatile(
                        self.ptr.as_ptr().add(byte_offset) as *mut [u8; 4],
                        value.to_ne_bytes(),
                    );
                }
                true
            }
            _ => false,
        }
    }

    /// Copy the whole view out. The copy is what gets validated and used.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        self.copy_to(&mut out);
        out
    }

    /// Copy `min(dst.len(), self.len())` bytes out of the region.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        // SAFETY: n bytes are in bounds on both sides; dst is local memory.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.as_mut_ptr(), n) };
        n
    }

    /// Copy `src` into the start of the view. Returns false (and writes nothing) if it does not fit.
    pub fn copy_from(&self, src: &[u8]) -> bool {
        if src.len() > self.len {
            return false;
        }
        // SAFETY: bounds checked above; src cannot alias the mapping through a Rust borrow.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), src.len()) };
        true
    }
}

impl Debug for ShmView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmView")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("len", &self.len)
            .finish()
    }
}

/// Allocate a region the producer can hand to the engine with `Register`.
///
/// # Arguments
/// * `size` - Region length in bytes, non-zero
/// * `name` - Optional memfd name (shows up in /proc/<pid>/fd)
#[cfg(target_os = "linux")]
pub fn create_shared_memory(
    size: usize,
    name: Option<&str>,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    LinuxSharedMemory::create(size, name).map(|shm| Box::new(shm) as Box<dyn SharedMemoryBackend>)
}

/// Map a region received as a handle from the other side of the transport.
///
/// The handle is duplicated, so the caller keeps ownership of the one it passed in.
#[cfg(target_os = "linux")]
pub fn attach_handle(handle: RawHandle, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    match handle {
        RawHandle::Fd(fd) => Ok(Box::new(LinuxSharedMemory::attach_fd(fd, size)?)),
    }
}

#[cfg(not(target_os = "linux"))]
fn no_memfd() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "memfd regions need Linux")
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(
    _size: usize,
    _name: Option<&str>,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(no_memfd())
}

#[cfg(not(target_os = "linux"))]
pub fn attach_handle(_handle: RawHandle, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(no_memfd())
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    /// Create an anonymous memfd of `size` bytes and map it read/write.
    pub fn create(size: usize, name: Option<&str>) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared memory size must be non-zero",
            ));
        }
        let c_name = std::ffi::CString::new(name.unwrap_or("dmxp_cmdstream")).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("bad region name: {e}"))
        })?;

        let fd = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // Set size
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let ptr = unsafe { Self::map(fd, size) }.inspect_err(|_| unsafe {
            libc::close(fd);
        })?;

        tracing::debug!(fd, size, "Created shared memory region");
        Ok(Self { ptr, size, fd })
    }

    /// Map an existing memfd. The fd is duplicated; `size` must not exceed the file size.
    pub fn attach_fd(fd: i32, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared memory size must be non-zero",
            ));
        }
        let fd = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let actual_size = unsafe {
            let mut stat: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut stat) != 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            stat.st_size as usize
        };

        if actual_size < size {
            unsafe { libc::close(fd) };
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory too small: expected at least {}, got {}",
                    size, actual_size
                ),
            ));
        }

        let ptr = unsafe { Self::map(fd, size) }.inspect_err(|_| unsafe {
            libc::close(fd);
        })?;

        tracing::debug!(fd, size, "Attached shared memory region");
        Ok(Self { ptr, size, fd })
    }

    unsafe fn map(fd: i32, size: usize) -> io::Result<NonNull<u8>> {
        let ptr = libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> Option<RawHandle> {
        Some(RawHandle::Fd(self.fd))
    }
}

/// Zeroed, 128-byte aligned process-local region.
///
/// Used when producer and consumer are threads of one process and no handle
/// needs to cross a process boundary.
#[derive(Debug)]
pub struct HeapSharedMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapSharedMemory {}
unsafe impl Sync for HeapSharedMemory {}

impl HeapSharedMemory {
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared memory size must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(size, 128)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            io::Error::new(io::ErrorKind::OutOfMemory, "Failed to allocate aligned memory")
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapSharedMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl SharedMemoryBackend for HeapSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> Option<RawHandle> {
        None
    }
}
