use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// A counting semaphore released `client_count` times on completion, so any
/// client may wait on any order regardless of who submitted it.
struct Latch {
    mutex: Mutex<u32>,
    condvar: Condvar,
}

impl Latch {
    fn new() -> Self {
        Latch {
            mutex: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    fn release(&self, times: u32) {
        let mut count = self.mutex.lock();
        *count += times;
        self.condvar.notify_all();
    }

    /// Acquires once, warning at 100 ms and 1 s before blocking
    /// indefinitely.
    fn acquire(&self, order_id: u32) {
        let mut count = self.mutex.lock();
        if *count > 0 {
            *count -= 1;
            return;
        }

        let timed_out = self.condvar.wait_for(&mut count, Duration::from_millis(100));
        if timed_out.timed_out() && *count == 0 {
            warn!(order_id, "wait exceeded 100ms");
            let timed_out = self.condvar.wait_for(&mut count, Duration::from_millis(900));
            if timed_out.timed_out() && *count == 0 {
                warn!(order_id, "wait exceeded 1s, possible deadlock");
                while *count == 0 {
                    self.condvar.wait(&mut count);
                }
            }
        }

        if *count > 0 {
            *count -= 1;
        }
    }
}

/// One latch per order id referenced anywhere in the script, created up
/// front (each a counting semaphore starting at 0) so `wait` directives
/// never race the submission that creates them.
pub struct LatchLayer {
    client_count: u32,
    latches: Mutex<HashMap<u32, std::sync::Arc<Latch>>>,
}

impl LatchLayer {
    pub fn new(client_count: u32) -> Self {
        LatchLayer {
            client_count,
            latches: Mutex::new(HashMap::new()),
        }
    }

    fn latch_for(&self, order_id: u32) -> std::sync::Arc<Latch> {
        self.latches
            .lock()
            .entry(order_id)
            .or_insert_with(|| std::sync::Arc::new(Latch::new()))
            .clone()
    }

    /// Called by the oracle when an order becomes fully consumed.
    pub fn complete(&self, order_id: u32) {
        self.latch_for(order_id).release(self.client_count);
    }

    /// Called by a client driver servicing a `w <id>` directive.
    pub fn wait(&self, order_id: u32) {
        self.latch_for(order_id).acquire(order_id);
    }
}
