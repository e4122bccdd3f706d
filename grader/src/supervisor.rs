//! Child-process lifecycle, socket rendezvous, and per-client drivers.
//! A thin collaborator around the core logic (script validation, the
//! oracle, the latch layer); this module is the plumbing that makes
//! those pieces run against a real engine process.

use crate::error::SupervisorError;
use crate::latch::LatchLayer;
use crate::oracle::Oracle;
use crate::script::{Directive, Script};
use matcher_core::wire::{encode_frame, WireCommand};
use matcher_core::order::Side;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tracing::error;

const CONNECT_RETRIES: u32 = 100;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(5);
const ENGINE_STARTUP_DELAY: Duration = Duration::from_millis(50);

static STDERR_ECHO_LOCK: Mutex<()> = Mutex::new(());

/// Runs one script end to end against `engine_binary`. Returns the
/// process exit code the grader binary should use.
pub fn run(script: Script, engine_binary: &str) -> i32 {
    let dir = match tempfile_dir() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("grader: {e}");
            return 1;
        }
    };
    let socket_path = dir.join("engine.sock");

    let mut child = match Command::new(engine_binary)
        .arg(&socket_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .pre_exec(|| {
            // SAFETY: called only between fork and exec in the child; the
            // only async-signal-unsafe-adjacent thing here is a single
            // syscall with no allocation.
            unsafe {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
            }
            Ok(())
        })
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("grader: failed to spawn engine: {e}");
            let _ = std::fs::remove_dir_all(&dir);
            return 1;
        }
    };

    std::thread::sleep(ENGINE_STARTUP_DELAY);

    let mut stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let stderr_handle = std::thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines().map_while(Result::ok) {
            let _guard = STDERR_ECHO_LOCK.lock();
            eprintln!("Engine stderr: {line}");
        }
    });

    let latch = Arc::new(LatchLayer::new(script.client_count as u32));
    let oracle = Arc::new(Mutex::new(Oracle::new(&script, latch.clone())));

    let barriers = build_barriers(&script);

    let mut driver_handles = Vec::new();
    for thread_id in 0..script.client_count {
        let script = script.clone();
        let socket_path = socket_path.clone();
        let barriers = barriers.clone();
        let oracle = oracle.clone();
        let latch = latch.clone();
        driver_handles.push(std::thread::spawn(move || {
            run_driver(thread_id, &script, &socket_path, &barriers, &oracle, &latch)
        }));
    }

    let mut failure: Option<SupervisorError> = None;
    for (thread_id, handle) in driver_handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(thread_id, error = %e, "client thread failed");
                failure.get_or_insert(e);
            }
            Err(_) => {
                failure.get_or_insert(SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: "panicked".to_string(),
                });
            }
        }
    }

    // All drivers are done sending; closing stdin tells the engine there
    // is nothing further coming, which it treats as its shutdown signal.
    let _ = stdin.flush();
    drop(stdin);

    let reader = BufReader::new(stdout);
    for line in reader.lines().map_while(Result::ok) {
        if let Err(e) = oracle.lock().on_output_line(&line) {
            error!(error = %e.message, "accounting violation");
            failure.get_or_insert(SupervisorError::OutputThread(e.message));
        }
    }

    let _ = child.wait();
    let _ = stderr_handle.join();
    let _ = std::fs::remove_dir_all(&dir);

    let outstanding = oracle.lock().outstanding_orders();
    if failure.is_none() && !outstanding.is_empty() {
        error!(count = outstanding.len(), "engine closed with active orders outstanding");
        failure.get_or_insert(SupervisorError::EngineClosedEarly);
    }

    if let Some(e) = failure {
        eprintln!("grader: {e}");
        return 1;
    }

    let oracle = Arc::try_unwrap(oracle).unwrap_or_else(|_| panic!("oracle still shared")).into_inner();
    match oracle.finish() {
        Ok(()) => 0,
        Err(errors) => {
            let all_spurious = errors.iter().all(|e| e.possibly_spurious);
            for e in &errors {
                eprintln!("grader: variant failed: {}", e.message);
            }
            if all_spurious {
                2
            } else {
                1
            }
        }
    }
}

fn tempfile_dir() -> Result<std::path::PathBuf, SupervisorError> {
    let pid = std::process::id();
    let base = std::env::temp_dir().join(format!("grader-{pid}-{}", now_suffix()));
    std::fs::create_dir_all(&base).map_err(SupervisorError::TempDir)?;
    Ok(base)
}

fn now_suffix() -> u64 {
    // Matcher-core's clock is process-epoch relative, which is exactly what
    // a collision-resistant-enough temp dir suffix needs; wall-clock time
    // is deliberately out of scope here.
    matcher_core::clock::now_micros()
}

fn build_barriers(script: &Script) -> Arc<std::collections::HashMap<usize, Arc<Barrier>>> {
    let mut map = std::collections::HashMap::new();
    for line in &script.lines {
        if matches!(line.directive, Directive::Sync) {
            map.insert(line.line_no, Arc::new(Barrier::new(line.threads.len().max(1))));
        }
    }
    Arc::new(map)
}

fn run_driver(
    thread_id: usize,
    script: &Script,
    socket_path: &std::path::Path,
    barriers: &std::collections::HashMap<usize, Arc<Barrier>>,
    oracle: &Mutex<Oracle>,
    latch: &LatchLayer,
) -> Result<(), SupervisorError> {
    let mut stream: Option<UnixStream> = None;

    for line in script.lines.iter().filter(|l| l.threads.contains(&thread_id)) {
        match &line.directive {
            Directive::Sync => {
                barriers[&line.line_no].wait();
            }
            Directive::Connect => {
                stream = Some(connect_with_retry(socket_path).map_err(|e| SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: e,
                })?);
            }
            Directive::Disconnect => {
                stream = None;
            }
            Directive::Sleep(ms) => {
                std::thread::sleep(Duration::from_millis(*ms));
            }
            Directive::Wait(id) => {
                latch.wait(*id);
            }
            Directive::Cancel(id) => {
                let s = stream.as_mut().ok_or_else(|| SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: "cancel sent while disconnected".to_string(),
                })?;
                write_frame(s, &WireCommand::Cancel { id: *id }).map_err(|e| SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: e.to_string(),
                })?;
            }
            Directive::Order {
                side,
                id,
                instrument,
                price,
                count,
            } => {
                oracle.lock().on_sent_order(*id, *count);
                let s = stream.as_mut().ok_or_else(|| SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: "send attempted while disconnected".to_string(),
                })?;
                let cmd = WireCommand::Order {
                    side: *side,
                    id: *id,
                    instrument: instrument.clone(),
                    price: *price,
                    count: *count,
                };
                write_frame(s, &cmd).map_err(|e| SupervisorError::ClientThread {
                    thread: thread_id,
                    reason: e.to_string(),
                })?;
            }
        }
    }

    Ok(())
}

fn write_frame(stream: &mut UnixStream, cmd: &WireCommand) -> std::io::Result<()> {
    let frame = encode_frame(cmd);
    stream.write_all(&frame)
}

fn connect_with_retry(path: &std::path::Path) -> Result<UnixStream, String> {
    let mut last_err = None;
    for _ in 0..CONNECT_RETRIES {
        match UnixStream::connect(path) {
            Ok(s) => return Ok(s),
            Err(e) => {
                last_err = Some(e);
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
    Err(format!(
        "could not connect to {}: {}",
        path.display(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}
