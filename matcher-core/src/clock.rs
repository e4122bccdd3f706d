use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic, wall-free microsecond clock. All timestamps in a single
/// process are relative to the same epoch, so they remain strictly
/// increasing even across a clock adjustment.
fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Microseconds elapsed since the process-local epoch.
pub fn now_micros() -> u64 {
    epoch().elapsed().as_micros() as u64
}
