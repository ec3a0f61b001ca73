// Randomized malformed-stream tests. Garbage in the ring or in control-call
// payloads must never panic, and the cursor invariants must hold throughout.
// Run with: cargo test --test fuzz_stream -- --nocapture

use dmxp_cmdstream::Core::{HeapSharedMemory, SharedMemoryBackend};
use dmxp_cmdstream::Decoder::BufferTarget;
use dmxp_cmdstream::Stream::Buffer::Header;
use dmxp_cmdstream::Stream::Structs::ConnectionStatus;
use dmxp_cmdstream::Stream::{CommandStreamEngine, EngineBuilder};
use dmxp_cmdstream::Transport::dispatch;
use std::sync::Arc;

const RING_BYTES: usize = 256;
const ENTRIES: u32 = (RING_BYTES / 4) as u32;

fn random_word(rng: &mut fastrand::Rng, data_id: u32) -> u32 {
    match rng.u8(0..4) {
        // plausible header
        0 => Header { opcode: rng.u32(0..12), size: rng.u32(0..10) }.to_word(),
        // small argument
        1 => rng.u32(0..64),
        // shared memory id
        2 => data_id,
        _ => rng.u32(..),
    }
}

fn check_invariants(engine: &CommandStreamEngine<BufferTarget>) {
    if let Some(ring) = engine.ring() {
        assert!(ring.get() < ring.entry_count());
        assert!(ring.put() < ring.entry_count());
    }
    match engine.status() {
        ConnectionStatus::Parsing | ConnectionStatus::ParseError => assert!(engine.ring().is_some()),
        ConnectionStatus::NotConnected | ConnectionStatus::NoBuffer => assert!(engine.ring().is_none()),
    }
}

#[test]
fn random_ring_contents_never_panic() {
    for seed in 0..200u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut engine = EngineBuilder::new().build(BufferTarget::new(1 << 20));
        let ring: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(RING_BYTES).unwrap());
        let data: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(128).unwrap());

        engine.init_connection().unwrap();
        let ring_id = engine.register_shared_memory(Arc::clone(&ring)).unwrap();
        let data_id = engine.register_shared_memory(data).unwrap();
        engine
            .set_command_buffer(ring_id, 0, RING_BYTES, rng.u32(0..ENTRIES))
            .unwrap();

        for _ in 0..50 {
            let view = ring.view();
            for _ in 0..rng.usize(1..16) {
                let at = rng.usize(0..ENTRIES as usize) * 4;
                view.write_u32(at, random_word(&mut rng, data_id));
            }

            engine.put(rng.u32(0..ENTRIES + 2)).unwrap();
            match rng.u8(0..3) {
                0 => {
                    for _ in 0..2 * ENTRIES {
                        if !engine.pump() {
                            break;
                        }
                    }
                }
                1 => {
                    let watched = engine.get().unwrap();
                    engine.wait_get_changes(watched);
                }
                _ => {
                    let watched = engine.get().unwrap();
                    engine.signal_get_changes(watched, rng.u32(..));
                    engine.pump();
                }
            }
            check_invariants(&engine);
            let _ = engine.take_parse_error();
            engine.take_fired_signals().for_each(drop);

            if engine.status() == ConnectionStatus::ParseError {
                engine
                    .set_command_buffer(ring_id, 0, RING_BYTES, rng.u32(0..ENTRIES))
                    .unwrap();
            }
        }

        engine.close_connection();
        check_invariants(&engine);
    }
}

#[test]
fn random_control_calls_never_panic() {
    for seed in 0..100u64 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut engine = EngineBuilder::new().with_max_regions(4).build(BufferTarget::new(1 << 16));
        let ring: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(RING_BYTES).unwrap());
        engine.register_shared_memory(ring).unwrap();

        for _ in 0..200 {
            let tag = rng.u32(0..14);
            let len = rng.usize(0..20);
            let mut payload: Vec<u8> = (0..len).map(|_| rng.u8(..)).collect();
            // Bias towards in-range values so calls get past validation.
            if rng.bool() {
                for chunk in payload.chunks_mut(4) {
                    let small = rng.u32(0..(ENTRIES + 4)).to_ne_bytes();
                    let n = chunk.len();
                    chunk.copy_from_slice(&small[..n]);
                }
            }
            dispatch(&mut engine, tag, &payload, &[]);
            check_invariants(&engine);
            for _ in 0..rng.u32(0..4) {
                engine.pump();
            }
            check_invariants(&engine);
        }
    }
}
