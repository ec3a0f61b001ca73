// In demos/producer.rs
//
// Streams SHA-256 digests through a command ring into an engine running on a
// service thread, reads them back through shared memory and verifies them.
use dmxp_cmdstream::Core::{create_shared_memory, SharedMemoryBackend};
use dmxp_cmdstream::Decoder::{opcodes, BufferTarget};
use dmxp_cmdstream::Stream::{CommandWriter, EngineBuilder, WriterError};
use dmxp_cmdstream::Transport::{CommandBufferProxy, LocalTransport, ServiceBuilder};
use sha2::{Digest, Sha256};
use std::env;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const RING_BYTES: u32 = 64 * 1024;
const DIGEST_BYTES: u32 = 32;
const RESOURCE: u32 = 1;

fn push(
    writer: &mut CommandWriter,
    proxy: &CommandBufferProxy<LocalTransport>,
    opcode: u32,
    args: &[u32],
) -> Result<(), Box<dyn Error>> {
    loop {
        let get = proxy.get()?.unwrap_or(0);
        match writer.write(opcode, args, get) {
            Ok(_) => return Ok(()),
            Err(WriterError::Full { .. }) => {
                // Publish what we have and let the consumer catch up.
                proxy.put(writer.put())?;
                if proxy.wait_get_changes(get)? == Some(get) {
                    return Err(format!("consumer stalled in {:?}", proxy.status()?).into());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let num_messages: u32 = match args.get(1) {
        Some(n) => n.parse().expect("Invalid number of messages"),
        None => 1000,
    };

    println!("Producer: Precomputing {} hashes...", num_messages);
    let start_precompute = std::time::Instant::now();
    let hashes: Vec<[u8; 32]> = (0..num_messages)
        .map(|i| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&Sha256::digest(format!("message_{}", i).as_bytes()));
            out
        })
        .collect();
    println!(
        "Producer: Precomputed {} hashes in {:.2?}",
        num_messages,
        start_precompute.elapsed()
    );

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let engine = EngineBuilder::new().build(BufferTarget::default());
    let (service, transport) = ServiceBuilder::new().with_commands_per_turn(64).build(engine);
    let worker = std::thread::spawn(move || service.run());
    let proxy = CommandBufferProxy::new(transport.clone());

    let readback = num_messages * DIGEST_BYTES;
    let region: Arc<dyn SharedMemoryBackend> = Arc::from(create_shared_memory(
        (RING_BYTES + readback) as usize,
        Some("cmdstream-producer"),
    )?);

    proxy.init_connection()?;
    let shm_id = proxy.register_shared_memory(&*region)?;
    proxy.set_command_buffer(shm_id, 0, RING_BYTES, 0)?;
    let mut writer = CommandWriter::new(Arc::clone(&region), 0, RING_BYTES as usize, 0)?;
    println!("Producer: Bound ring of {} words in region {}", writer.entry_count(), shm_id);

    let start_send = std::time::Instant::now();
    push(&mut writer, &proxy, opcodes::CREATE_RESOURCE, &[RESOURCE, readback])?;

    let mut sent = 0;
    for (i, hash) in hashes.iter().enumerate() {
        if !keep_alive.load(Ordering::SeqCst) {
            println!("Producer: Interrupted");
            break;
        }
        let mut cmd = vec![RESOURCE, i as u32 * DIGEST_BYTES, DIGEST_BYTES];
        cmd.extend(hash.chunks_exact(4).map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]])));
        push(&mut writer, &proxy, opcodes::WRITE_DATA_IMMEDIATE, &cmd)?;
        sent += 1;
        if sent % 64 == 0 {
            proxy.put(writer.put())?;
        }
    }

    let readback_bytes = sent * DIGEST_BYTES;
    push(
        &mut writer,
        &proxy,
        opcodes::READ_DATA,
        &[RESOURCE, 0, readback_bytes, shm_id, RING_BYTES],
    )?;
    push(&mut writer, &proxy, opcodes::SET_TOKEN, &[sent])?;
    proxy.put(writer.put())?;

    // Drive until the consumer has passed everything published.
    while let Some(get) = proxy.get()? {
        if get == writer.put() {
            break;
        }
        if proxy.wait_get_changes(get)? == Some(get) {
            return Err(format!("consumer stalled in {:?}", proxy.status()?).into());
        }
    }

    let send_time = start_send.elapsed();
    println!("Producer: Sent {} commands in {:.2?}", sent, send_time);
    println!(
        "Producer: Throughput: {:.2} messages/sec",
        sent as f64 / send_time.as_secs_f64()
    );

    if let Some(err) = proxy.take_parse_error()? {
        eprintln!("Producer: Consumer reported {}", err);
    }
    println!("Producer: Token is {}", proxy.token()?);

    let copied = region
        .view()
        .subview(RING_BYTES as usize, readback_bytes as usize)
        .map(|v| v.snapshot())
        .unwrap_or_default();
    let expected: Vec<u8> = hashes[..sent as usize].iter().flatten().copied().collect();
    if copied == expected {
        println!("Producer: Verified {} hashes through shared memory", sent);
    } else {
        eprintln!("Producer: Readback mismatch");
    }

    proxy.close_connection()?;
    transport.disconnect();
    let engine = worker.join().map_err(|_| "service thread panicked")?;
    println!(
        "Producer: Engine finished with {} resources, {} bytes",
        engine.target().resource_count(),
        engine.target().allocated_bytes()
    );
    Ok(())
}
