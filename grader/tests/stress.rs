//! Randomized replay coverage for the oracle: a generated resting book
//! swept in correct price-time order must validate under at least one
//! priority variant, regardless of how the random quantities and prices
//! shake out.

use grader::latch::LatchLayer;
use grader::oracle::Oracle;
use grader::script;
use rand::Rng;
use std::fmt::Write as _;
use std::sync::Arc;

#[test]
fn randomized_correct_sweep_always_validates() {
    let mut rng = rand::rng();

    for _trial in 0..20 {
        let level_count = rng.random_range(3..12);
        // Distinct, increasing prices so "best price first" has one
        // unambiguous order to sweep them in.
        let mut prices: Vec<u32> = (0..level_count).map(|i| 100 + i * 2).collect();
        prices.sort_unstable();

        let mut script_text = String::from("1\n0 o\n");
        let mut output_lines = Vec::new();
        let mut ts = 1u64;

        for (id, &price) in prices.iter().enumerate() {
            let id = id as u32 + 1;
            let qty = rng.random_range(1..20);
            writeln!(script_text, "0 B {id} GOOG {price} {qty}").unwrap();
            output_lines.push((format!("B {id} GOOG {price} {qty} {ts} {}", ts + 1), qty));
            ts += 2;
        }

        let total_qty: u32 = output_lines.iter().map(|(_, q)| q).sum();
        let incoming_id = level_count as u32 + 1;
        writeln!(script_text, "0 S {incoming_id} GOOG {} {total_qty}", prices[0]).unwrap();
        writeln!(script_text, "0 w {incoming_id}").unwrap();
        script_text.push_str("0 x\n");

        let mut lines: Vec<String> = output_lines.iter().map(|(l, _)| l.clone()).collect();
        // Sweep best price (highest, since these are resting buys) first.
        let mut sweep_order: Vec<(u32, u32)> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| (i as u32 + 1, p))
            .collect();
        sweep_order.sort_by(|a, b| b.1.cmp(&a.1));

        for (resting_id, price) in sweep_order {
            let qty = output_lines[(resting_id - 1) as usize].1;
            lines.push(format!("E {resting_id} {incoming_id} 1 {price} {qty} {ts} {}", ts + 1));
            ts += 2;
        }

        let parsed = script::parse(&script_text).expect("generated script parses");
        script::validate(&parsed).expect("generated script validates");

        let latch = Arc::new(LatchLayer::new(parsed.client_count as u32));
        let mut oracle = Oracle::new(&parsed, latch);
        for line in &parsed.lines {
            if let script::Directive::Order { id, count, .. } = &line.directive {
                oracle.on_sent_order(*id, *count);
            }
        }
        for line in &lines {
            oracle.on_output_line(line).expect("line accounts cleanly");
        }

        if let Err(errors) = oracle.finish() {
            panic!("randomized correct sweep rejected: {errors:?}");
        }
    }
}
