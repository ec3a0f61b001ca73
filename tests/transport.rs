// Transport tests: raw dispatch of control calls and the in-process
// LocalTransport driving an engine on a service thread.
// Run with: cargo test --test transport -- --nocapture

use dmxp_cmdstream::Core::{HeapSharedMemory, RawHandle, SharedMemoryBackend};
use dmxp_cmdstream::Decoder::{opcodes, BufferTarget};
use dmxp_cmdstream::Stream::Structs::ConnectionStatus;
use dmxp_cmdstream::Stream::{CommandWriter, EngineBuilder, EngineError};
use dmxp_cmdstream::Transport::wire::{self, OffsetArgs, SetCommandBufferArgs};
use dmxp_cmdstream::Transport::{
    dispatch, CallTag, CommandBufferProxy, ProxyError, ServiceBuilder, Transport, TransportError,
    NO_OFFSET, RESULT_BAD_REQUEST, RESULT_OK,
};
use std::sync::Arc;

#[test]
fn dispatch_rejects_malformed_calls() {
    let mut engine = EngineBuilder::new().build(BufferTarget::default());
    assert_eq!(dispatch(&mut engine, 0, &[], &[]), RESULT_BAD_REQUEST);
    assert_eq!(dispatch(&mut engine, 13, &[], &[]), RESULT_BAD_REQUEST);
    // Put needs four bytes.
    assert_eq!(dispatch(&mut engine, CallTag::Put as u32, &[1, 2], &[]), RESULT_BAD_REQUEST);
    // Register needs exactly one handle.
    let register = wire::RegisterArgs { byte_size: 64 };
    let args = wire::encode(&register);
    assert_eq!(dispatch(&mut engine, CallTag::Register as u32, args, &[]), RESULT_BAD_REQUEST);
    assert_eq!(
        dispatch(&mut engine, CallTag::Register as u32, args, &[RawHandle::Fd(0), RawHandle::Fd(1)]),
        RESULT_BAD_REQUEST
    );
    assert_eq!(engine.status(), ConnectionStatus::NotConnected);
}

#[test]
fn dispatch_encodes_results() {
    let mut engine = EngineBuilder::new().build(BufferTarget::default());
    let region: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(64).unwrap());

    assert_eq!(dispatch(&mut engine, CallTag::Get as u32, &[], &[]), NO_OFFSET);
    assert_eq!(dispatch(&mut engine, CallTag::GetStatus as u32, &[], &[]), 0);
    assert_eq!(dispatch(&mut engine, CallTag::Init as u32, &[], &[]), RESULT_OK);
    assert_eq!(
        dispatch(&mut engine, CallTag::Init as u32, &[], &[]),
        EngineError::AlreadyConnected.code()
    );

    let id = engine.register_shared_memory(region).unwrap();
    let args = SetCommandBufferArgs {
        shm_id: id,
        byte_offset: 0,
        byte_size: 64,
        start_get: 4,
    };
    assert_eq!(
        dispatch(&mut engine, CallTag::SetCommandBuffer as u32, wire::encode(&args), &[]),
        RESULT_OK
    );
    assert_eq!(dispatch(&mut engine, CallTag::Get as u32, &[], &[]), 4);
    assert_eq!(
        dispatch(&mut engine, CallTag::WaitGetChanges as u32, wire::encode(&OffsetArgs { offset: 4 }), &[]),
        4
    );
    assert_eq!(
        dispatch(&mut engine, CallTag::GetStatus as u32, &[], &[]),
        ConnectionStatus::Parsing as u32
    );
    assert_eq!(dispatch(&mut engine, CallTag::GetParseError as u32, &[], &[]), 0);
    assert_eq!(dispatch(&mut engine, CallTag::Close as u32, &[], &[]), RESULT_OK);
    assert_eq!(dispatch(&mut engine, CallTag::Get as u32, &[], &[]), NO_OFFSET);
}

#[test]
fn call_tags_round_trip_through_u32() {
    for raw in 1..=12u32 {
        let tag = CallTag::try_from(raw).unwrap();
        assert_eq!(tag as u32, raw);
    }
    assert_eq!(CallTag::try_from(0), Err(0));
}

#[test]
fn disconnected_transport_fails_calls() {
    let engine = EngineBuilder::new().build(BufferTarget::default());
    let (service, transport) = ServiceBuilder::new().build(engine);
    transport.disconnect();
    assert!(!transport.is_connected());
    assert_eq!(transport.send(CallTag::Init, &[], &[]), Err(TransportError::Disconnected));

    // The service exits at once and still hands the engine back.
    let engine = service.run();
    assert_eq!(engine.status(), ConnectionStatus::NotConnected);
    assert_eq!(transport.next_signal(), None);
}

#[test]
fn proxy_reports_rejections() {
    let engine = EngineBuilder::new().build(BufferTarget::default());
    let (service, transport) = ServiceBuilder::new().build(engine);
    let worker = std::thread::spawn(move || service.run());
    let proxy = CommandBufferProxy::new(transport.clone());

    assert_eq!(proxy.put(0), Err(ProxyError::Rejected(EngineError::NoBuffer.code())));
    assert_eq!(proxy.set_command_buffer(0, 0, 64, 0), Err(ProxyError::Rejected(EngineError::NotConnected.code())));
    proxy.init_connection().unwrap();
    assert_eq!(proxy.init_connection(), Err(ProxyError::Rejected(EngineError::AlreadyConnected.code())));
    assert_eq!(proxy.get(), Ok(None));
    assert_eq!(proxy.status(), Ok(ConnectionStatus::NoBuffer));

    let heap = HeapSharedMemory::new(64).unwrap();
    assert_eq!(proxy.register_shared_memory(&heap), Err(ProxyError::NoHandle));

    transport.disconnect();
    let engine = worker.join().unwrap();
    assert_eq!(engine.status(), ConnectionStatus::NotConnected);
    assert_eq!(proxy.status(), Err(ProxyError::Transport(TransportError::Disconnected)));
}

#[test]
fn proxy_reads_back_every_token_value() {
    // Set the token in-stream before handing the engine to the service.
    let mut engine = EngineBuilder::new().build(BufferTarget::default());
    let region: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(64).unwrap());
    engine.init_connection().unwrap();
    let id = engine.register_shared_memory(Arc::clone(&region)).unwrap();
    engine.set_command_buffer(id, 0, 64, 0).unwrap();
    let mut writer = CommandWriter::new(region, 0, 64, 0).unwrap();
    writer.write(opcodes::SET_TOKEN, &[RESULT_BAD_REQUEST], 0).unwrap();
    engine.put(writer.put()).unwrap();
    while engine.pump() {}
    assert_eq!(engine.token(), 0xFFFF_FFFE);

    let (service, transport) = ServiceBuilder::new().build(engine);
    let worker = std::thread::spawn(move || service.run());
    let proxy = CommandBufferProxy::new(transport.clone());

    assert_eq!(proxy.token(), Ok(0xFFFF_FFFE));

    transport.disconnect();
    worker.join().unwrap();
    assert_eq!(proxy.token(), Err(ProxyError::Transport(TransportError::Disconnected)));
}

/// Claims a size no `u32` can carry; never mapped.
#[cfg(target_pointer_width = "64")]
#[derive(Debug)]
struct OversizedRegion;

#[cfg(target_pointer_width = "64")]
impl SharedMemoryBackend for OversizedRegion {
    fn as_ptr(&self) -> *mut u8 {
        std::ptr::null_mut()
    }

    fn size(&self) -> usize {
        u32::MAX as usize + 1
    }

    fn raw_handle(&self) -> Option<RawHandle> {
        Some(RawHandle::Fd(-1))
    }
}

#[cfg(target_pointer_width = "64")]
#[test]
fn proxy_names_oversized_regions() {
    let engine = EngineBuilder::new().build(BufferTarget::default());
    let (_service, transport) = ServiceBuilder::new().build(engine);
    let proxy = CommandBufferProxy::new(transport);
    assert_eq!(
        proxy.register_shared_memory(&OversizedRegion),
        Err(ProxyError::RegionTooLarge(u32::MAX as usize + 1))
    );
}

#[cfg(target_os = "linux")]
mod linux_tests {
    use super::*;
    use dmxp_cmdstream::Core::create_shared_memory;
    use dmxp_cmdstream::Stream::Structs::{ParseError, SignalFired};

    const RING_BYTES: u32 = 4096;

    #[test]
    fn end_to_end_over_local_transport() {
        let engine = EngineBuilder::new().build(BufferTarget::default());
        let (service, transport) = ServiceBuilder::new().with_commands_per_turn(4).build(engine);
        let worker = std::thread::spawn(move || service.run());
        let proxy = CommandBufferProxy::new(transport.clone());

        let region: Arc<dyn SharedMemoryBackend> =
            Arc::from(create_shared_memory(RING_BYTES as usize + 64, Some("test_e2e")).unwrap());
        proxy.init_connection().unwrap();
        let shm_id = proxy.register_shared_memory(&*region).unwrap();
        proxy.set_command_buffer(shm_id, 0, RING_BYTES, 0).unwrap();
        assert_eq!(proxy.get(), Ok(Some(0)));

        let mut writer = CommandWriter::new(Arc::clone(&region), 0, RING_BYTES as usize, 0).unwrap();
        writer.write(opcodes::CREATE_RESOURCE, &[1, 4], 0).unwrap();
        writer
            .write(opcodes::WRITE_DATA_IMMEDIATE, &[1, 0, 4, u32::from_ne_bytes(*b"pong")], 0)
            .unwrap();
        writer.write(opcodes::READ_DATA, &[1, 0, 4, shm_id, RING_BYTES], 0).unwrap();
        writer.write(opcodes::SET_TOKEN, &[99], 0).unwrap();
        writer.write(500, &[], 0).unwrap();
        proxy.put(writer.put()).unwrap();

        let mut get = 0;
        while get != writer.put() {
            get = proxy.wait_get_changes(get).unwrap().unwrap();
        }
        assert_eq!(proxy.token(), Ok(99));
        assert_eq!(proxy.take_parse_error(), Ok(Some(ParseError::UnknownOpcode)));
        assert_eq!(proxy.take_parse_error(), Ok(None));
        let readback = region.view().subview(RING_BYTES as usize, 4).unwrap().snapshot();
        assert_eq!(&readback, b"pong");

        // Watching a stale get fires right away.
        proxy.signal_get_changes(0, 7).unwrap();
        assert_eq!(
            transport.next_signal(),
            Some(SignalFired { callback_id: 7, get: Some(writer.put()) })
        );

        proxy.unregister_shared_memory(shm_id).unwrap();
        assert_eq!(
            proxy.unregister_shared_memory(shm_id),
            Err(ProxyError::Rejected(4))
        );

        proxy.close_connection().unwrap();
        assert_eq!(proxy.status(), Ok(ConnectionStatus::NotConnected));
        drop(proxy);
        drop(transport);
        let engine = worker.join().unwrap();
        assert_eq!(engine.target().resource(1), Some(&b"pong"[..]));
    }

    #[test]
    fn pending_signal_is_delivered_after_progress() {
        let engine = EngineBuilder::new().build(BufferTarget::default());
        let (service, transport) = ServiceBuilder::new().build(engine);
        let worker = std::thread::spawn(move || service.run());
        let proxy = CommandBufferProxy::new(transport.clone());

        let region: Arc<dyn SharedMemoryBackend> =
            Arc::from(create_shared_memory(RING_BYTES as usize, None).unwrap());
        proxy.init_connection().unwrap();
        let shm_id = proxy.register_shared_memory(&*region).unwrap();
        proxy.set_command_buffer(shm_id, 0, RING_BYTES, 0).unwrap();

        proxy.signal_get_changes(0, 3).unwrap();
        assert_eq!(transport.try_next_signal(), None);

        let mut writer = CommandWriter::new(Arc::clone(&region), 0, RING_BYTES as usize, 0).unwrap();
        writer.write(opcodes::SET_TOKEN, &[1], 0).unwrap();
        proxy.put(writer.put()).unwrap();

        // The service pumps on its own; no wait call needed.
        assert_eq!(transport.next_signal(), Some(SignalFired { callback_id: 3, get: Some(2) }));

        transport.disconnect();
        worker.join().unwrap();
        assert_eq!(transport.next_signal(), None);
    }

    #[test]
    fn many_producer_threads_share_one_transport() {
        let engine = EngineBuilder::new().build(BufferTarget::default());
        let (service, transport) = ServiceBuilder::new().build(engine);
        let worker = std::thread::spawn(move || service.run());
        CommandBufferProxy::new(transport.clone()).init_connection().unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let proxy = CommandBufferProxy::new(transport.clone());
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(proxy.status(), Ok(ConnectionStatus::NoBuffer));
                        assert_eq!(proxy.token(), Ok(0));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        transport.disconnect();
        worker.join().unwrap();
    }
}
