// Shared memory backend tests for Linux
// Run with: cargo test --test shared_memory -- --nocapture

use dmxp_cmdstream::Core::{HeapSharedMemory, SharedMemoryBackend};
use std::io;

#[test]
fn test_heap_region_size() {
    let err = HeapSharedMemory::new(0).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

    let shm = HeapSharedMemory::new(24).unwrap();
    assert_eq!(shm.size(), 24);
    assert_eq!(shm.raw_handle(), None);
    assert_eq!((&shm as &dyn SharedMemoryBackend).view().snapshot(), vec![0u8; 24]);
}

#[cfg(target_os = "linux")]
mod linux_tests {
    use dmxp_cmdstream::Core::{attach_handle, create_shared_memory, RawHandle, SharedMemoryBackend};

    #[test]
    fn test_create_shared_memory() {
        let size = 4096;
        let shm = create_shared_memory(size, Some("test_create")).unwrap();

        assert_eq!(shm.size(), size);
        assert!(!shm.as_ptr().is_null());
        assert!(shm.view().write_u32(0, 0x42));
        assert_eq!(shm.view().read_u32(0), Some(0x42));
    }

    #[test]
    fn test_shared_memory_size() {
        let sizes = vec![1024, 4096, 65536, 1024 * 1024];

        for size in sizes {
            let shm = create_shared_memory(size, None).unwrap();
            assert_eq!(shm.size(), size);
            assert_eq!(shm.view().len(), size);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(create_shared_memory(0, None).is_err());
    }

    #[test]
    fn test_raw_handle() {
        let shm = create_shared_memory(4096, Some("test_handle")).unwrap();
        match shm.raw_handle() {
            Some(RawHandle::Fd(fd)) => assert!(fd >= 0, "Invalid file descriptor"),
            None => panic!("memfd region has no handle"),
        }
    }

    #[test]
    fn test_attach_sees_same_memory() {
        let size = 8192;
        let owner = create_shared_memory(size, Some("test_attach")).unwrap();
        let handle = owner.raw_handle().unwrap();
        let peer = attach_handle(handle, size).unwrap();

        assert!(owner.view().copy_from(b"written by owner"));
        assert_eq!(&peer.view().snapshot()[..16], b"written by owner");

        assert!(peer.view().write_u32(4096, 0xDEAD_BEEF));
        assert_eq!(owner.view().read_u32(4096), Some(0xDEAD_BEEF));

        // The peer holds its own descriptor.
        assert_ne!(peer.raw_handle(), Some(handle));
        drop(owner);
        assert_eq!(peer.view().read_u32(4096), Some(0xDEAD_BEEF));
    }

    #[test]
    fn test_attach_larger_than_file_fails() {
        let owner = create_shared_memory(4096, None).unwrap();
        let handle = owner.raw_handle().unwrap();
        assert!(attach_handle(handle, 8192).is_err());
        assert!(attach_handle(RawHandle::Fd(-1), 4096).is_err());
    }

    #[test]
    fn test_view_bounds() {
        let shm = create_shared_memory(64, None).unwrap();
        let view = shm.view();
        assert!(view.read_u32(61).is_none());
        assert!(!view.write_u32(64, 1));
        assert!(view.subview(60, 4).is_some());
        assert!(view.subview(60, 5).is_none());
        assert!(!view.subview(0, 8).unwrap().copy_from(&[0u8; 9]));
    }
}
