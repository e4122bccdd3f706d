//! Concurrent stress test: many clients issuing random well-formed orders
//! and cancels must never deadlock and must never violate the
//! per-execution invariants checked inline here. Runs heavy insertion,
//! cancellation, and matching workloads concurrently across threads
//! rather than sequentially, to exercise real lock contention.

use matcher_core::prelude::*;
use matcher_core::order::Side;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

fn order(side: Side, id: u32, price: u32, count: u32) -> WireCommand {
    WireCommand::Order {
        side,
        id,
        instrument: "GOOG".to_string(),
        price,
        count,
    }
}

#[test]
fn concurrent_random_workload_never_deadlocks_or_violates_invariants() {
    const CLIENTS: u32 = 8;
    const ORDERS_PER_CLIENT: u32 = 2_000;

    let engine = Arc::new(Engine::new());
    let sink = VecSink::new();

    let mut handles = Vec::new();
    for client in 0..CLIENTS {
        let engine = engine.clone();
        let sink = sink.clone();
        handles.push(std::thread::spawn(move || {
            let mut rng = rand::rng();
            let base = client * ORDERS_PER_CLIENT;
            let mut issued = Vec::new();
            for i in 0..ORDERS_PER_CLIENT {
                let id = base + i;
                let side = if rng.random_bool(0.5) { Side::Buy } else { Side::Sell };
                let price = 90 + rng.random_range(0..20);
                let count = 1 + rng.random_range(0..10);
                engine.dispatch(order(side, id, price, count), id as u64, sink.as_ref());
                issued.push(id);

                if i % 7 == 0 {
                    if let Some(&victim) = issued.get(rng.random_range(0..issued.len())) {
                        engine.dispatch(WireCommand::Cancel { id: victim }, id as u64, sink.as_ref());
                    }
                }
            }
        }));
    }

    for h in handles {
        h.join().expect("client thread panicked or deadlocked");
    }

    // An order's execution counter, observed in `exec` frames, is
    // strictly monotonic, starts at 1, and increments by 1.
    let mut last_exec: HashMap<u32, u32> = HashMap::new();
    for line in sink.lines() {
        if let Some(rest) = line.strip_prefix("E ") {
            let fields: Vec<&str> = rest.split_whitespace().collect();
            let resting_id: u32 = fields[0].parse().unwrap();
            let exec_id: u32 = fields[2].parse().unwrap();
            let expected = last_exec.get(&resting_id).copied().unwrap_or(0) + 1;
            assert_eq!(
                exec_id, expected,
                "execution counter for order {resting_id} skipped or went backwards"
            );
            last_exec.insert(resting_id, exec_id);
        }
    }
}
