use parking_lot::Mutex;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

/// Destination for the engine's output lines. A single sink instance is
/// shared across every connection handler thread — lines from concurrent
/// matches interleave only at line granularity, never mid-line, because
/// every `emit` holds the sink's lock for the duration of one `write` +
/// flush.
pub trait OutputSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes each line to a shared buffered writer, flushing after every line
/// so a reader tailing the stream sees output as soon as it is produced.
pub struct StdoutSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: Write + Send> StdoutSink<W> {
    pub fn new(writer: W) -> Self {
        StdoutSink {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }
}

impl StdoutSink<io::Stdout> {
    pub fn stdout() -> Self {
        StdoutSink::new(io::stdout())
    }
}

impl<W: Write + Send> OutputSink for StdoutSink<W> {
    fn emit(&self, line: &str) {
        let mut w = self.writer.lock();
        // A write failure here means the reader went away; there is nothing
        // useful left to do but drop the line.
        let _ = writeln!(w, "{line}");
        let _ = w.flush();
    }
}

/// Collects emitted lines in memory, for tests that want to assert on the
/// exact sequence of output without standing up a real process.
#[derive(Default)]
pub struct VecSink {
    lines: Mutex<Vec<String>>,
}

impl VecSink {
    pub fn new() -> Arc<Self> {
        Arc::new(VecSink::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl OutputSink for VecSink {
    fn emit(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
