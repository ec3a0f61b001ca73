// In demos/loopback.rs
//
// Producer and consumer in one thread: the engine is driven directly, without
// a transport. Shows the token, SignalGetChanges and the parse-error latch.
use dmxp_cmdstream::Core::{HeapSharedMemory, SharedMemoryBackend};
use dmxp_cmdstream::Decoder::{opcodes, BufferTarget};
use dmxp_cmdstream::Stream::{CommandWriter, EngineBuilder};
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const RING_BYTES: usize = 4096;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut engine = EngineBuilder::new().build(BufferTarget::default());
    let region: Arc<dyn SharedMemoryBackend> = Arc::new(HeapSharedMemory::new(RING_BYTES)?);

    engine.init_connection()?;
    let shm_id = engine.register_shared_memory(Arc::clone(&region))?;
    engine.set_command_buffer(shm_id, 0, RING_BYTES, 0)?;
    let mut writer = CommandWriter::new(region, 0, RING_BYTES, 0)?;

    let get = engine.get().unwrap_or(0);
    writer.write(opcodes::CREATE_RESOURCE, &[1, 16], get)?;
    writer.write(opcodes::WRITE_DATA_IMMEDIATE, &[1, 0, 4, u32::from_ne_bytes(*b"ping")], get)?;
    writer.write(opcodes::DRAW, &[3, 0, 3], get)?;
    writer.write(opcodes::SET_TOKEN, &[42], get)?;
    engine.put(writer.put())?;

    engine.signal_get_changes(get, 7);
    engine.pump();
    for sig in engine.take_fired_signals() {
        println!("Loopback: signal {} fired at get={:?}", sig.callback_id, sig.get);
    }

    let now = engine.wait_get_changes(get);
    println!("Loopback: get moved to {:?}", now);
    while engine.pump() {}
    println!(
        "Loopback: token={} draws={} resource={:?}",
        engine.token(),
        engine.target().draw_count(),
        engine.target().resource(1).map(|r| String::from_utf8_lossy(&r[..4]).into_owned())
    );

    // An unknown opcode is skipped and latched; parsing continues.
    let get = engine.get().unwrap_or(0);
    writer.write(0x7FF, &[], get)?;
    writer.write(opcodes::SET_TOKEN, &[43], get)?;
    engine.put(writer.put())?;
    while engine.pump() {}
    println!(
        "Loopback: status={:?} error={:?} token={}",
        engine.status(),
        engine.take_parse_error(),
        engine.token()
    );

    // A zero-size header halts the stream.
    let get = engine.get().unwrap_or(0);
    writer.write_words(&[0], get)?;
    engine.put(writer.put())?;
    while engine.pump() {}
    println!(
        "Loopback: status={:?} error={:?}",
        engine.status(),
        engine.take_parse_error()
    );

    engine.close_connection();
    println!("Loopback: {:?}", engine);
    Ok(())
}
