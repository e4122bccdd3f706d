//! The engine binary: `engine <socket_path>`.
//!
//! Binds an `AF_UNIX` stream socket at the given path, accepts connections
//! until the listener itself closes, and spawns one dedicated I/O loop per
//! connection. A background thread watches stdin; EOF there means the
//! supervising grader has nothing further to send and is the signal to
//! shut down.

use matcher_core::clock::now_micros;
use matcher_core::front::Engine;
use matcher_core::output::StdoutSink;
use matcher_core::wire::{decode_frame, FRAME_LEN};
use std::io::Read;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let socket_path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: engine <socket_path>");
            std::process::exit(1);
        }
    };

    let _ = std::fs::remove_file(&socket_path);
    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("engine: failed to bind {socket_path}: {e}");
            std::process::exit(1);
        }
    };
    info!(socket_path, "engine listening");

    std::thread::spawn(|| {
        let mut buf = [0u8; 1];
        // A zero-length read is EOF; any read error is treated the same way
        // since there is nothing further the engine can usefully do.
        loop {
            match std::io::stdin().read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        info!("stdin closed, shutting down");
        std::process::exit(0);
    });

    let engine = Arc::new(Engine::new());
    let sink = Arc::new(StdoutSink::stdout());

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = engine.clone();
                let sink = sink.clone();
                std::thread::spawn(move || handle_connection(stream, engine, sink));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

fn handle_connection(mut stream: UnixStream, engine: Arc<Engine>, sink: Arc<StdoutSink<std::io::Stdout>>) {
    let span = tracing::info_span!("connection");
    let _enter = span.enter();
    info!("connection opened");

    let mut frame = [0u8; FRAME_LEN];
    loop {
        match read_exact_or_eof(&mut stream, &mut frame) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!(error = %e, "read error, closing connection");
                break;
            }
        }

        let input_ts = now_micros();
        match decode_frame(&frame) {
            Ok(cmd) => {
                debug!(?cmd, input_ts, "dispatching command");
                engine.dispatch(cmd, input_ts, sink.as_ref());
            }
            Err(e) => {
                warn!(error = %e, "malformed frame");
            }
        }
    }

    info!("connection closed");
}

/// Reads exactly `buf.len()` bytes, or returns `Ok(false)` if the peer
/// closed the stream before sending any of this frame.
fn read_exact_or_eof(stream: &mut UnixStream, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                ))
            };
        }
        filled += n;
    }
    Ok(true)
}
