use crate::error::OracleError;
use crate::latch::LatchLayer;
use crate::script::{Directive, Script};
use matcher_core::order::Side;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One decoded line of engine output.
#[derive(Debug, Clone)]
pub enum Frame {
    Booking {
        side: Side,
        id: u32,
        instrument: String,
        price: u32,
        count: u32,
        in_ts: u64,
        out_ts: u64,
    },
    Exec {
        resting_id: u32,
        new_id: u32,
        exec_id: u32,
        price: u32,
        count: u32,
        in_ts: u64,
        out_ts: u64,
    },
    Cancel {
        id: u32,
        accepted: bool,
        in_ts: u64,
        out_ts: u64,
    },
}

impl Frame {
    pub fn out_ts(&self) -> u64 {
        match self {
            Frame::Booking { out_ts, .. } => *out_ts,
            Frame::Exec { out_ts, .. } => *out_ts,
            Frame::Cancel { out_ts, .. } => *out_ts,
        }
    }
}

/// Parses one line of engine output. Returns `None` for lines the oracle
/// ignores outright: lines starting with `#` or `Got `, or blank.
pub fn parse_line(line: &str) -> Option<Result<Frame, String>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with('#') || line.starts_with("Got ") {
        return None;
    }
    Some(parse_frame(line))
}

fn parse_frame(line: &str) -> Result<Frame, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first() {
        Some(&"B") | Some(&"S") => {
            if tokens.len() != 7 {
                return Err(format!("malformed booking line: {line:?}"));
            }
            let side = if tokens[0] == "B" { Side::Buy } else { Side::Sell };
            Ok(Frame::Booking {
                side,
                id: parse_u32(tokens[1])?,
                instrument: tokens[2].to_string(),
                price: parse_u32(tokens[3])?,
                count: parse_u32(tokens[4])?,
                in_ts: parse_ts(tokens[5])?,
                out_ts: parse_ts(tokens[6])?,
            })
        }
        Some(&"E") => {
            if tokens.len() != 8 {
                return Err(format!("malformed exec line: {line:?}"));
            }
            Ok(Frame::Exec {
                resting_id: parse_u32(tokens[1])?,
                new_id: parse_u32(tokens[2])?,
                exec_id: parse_u32(tokens[3])?,
                price: parse_u32(tokens[4])?,
                count: parse_u32(tokens[5])?,
                in_ts: parse_ts(tokens[6])?,
                out_ts: parse_ts(tokens[7])?,
            })
        }
        Some(&"X") => {
            if tokens.len() != 5 {
                return Err(format!("malformed cancel line: {line:?}"));
            }
            let accepted = match tokens[2] {
                "A" => true,
                "R" => false,
                other => return Err(format!("unknown cancel outcome {other:?}")),
            };
            Ok(Frame::Cancel {
                id: parse_u32(tokens[1])?,
                accepted,
                in_ts: parse_ts(tokens[3])?,
                out_ts: parse_ts(tokens[4])?,
            })
        }
        _ => Err(format!("unrecognized output line: {line:?}")),
    }
}

fn parse_u32(tok: &str) -> Result<u32, String> {
    tok.parse().map_err(|_| format!("expected integer, got {tok:?}"))
}

/// Timestamps are nonnegative integers with an optional `ns`/`us`/`ms`
/// suffix; no suffix means microseconds. Everything is normalized to
/// microseconds so the oracle compares like with like.
fn parse_ts(tok: &str) -> Result<u64, String> {
    let (digits, unit) = if let Some(d) = tok.strip_suffix("ns") {
        (d, 1_000)
    } else if let Some(d) = tok.strip_suffix("us") {
        (d, 1)
    } else if let Some(d) = tok.strip_suffix("ms") {
        (d, 1_000_000)
    } else {
        (tok, 1)
    };
    let value: u64 = digits.parse().map_err(|_| format!("bad timestamp {tok:?}"))?;
    Ok(match unit {
        1_000 => value / 1_000,
        1_000_000 => value * 1_000,
        _ => value,
    })
}

#[derive(Debug, Clone)]
struct ExpectedOrder {
    side: Side,
    instrument: String,
    price: u32,
}

/// Live, streaming half of the oracle: tracks which submitted orders have
/// not yet had their full effect observed, and drives the latch layer the
/// instant an order becomes terminal. This runs once, as frames arrive,
/// independent of which priority-semantics variant eventually validates
/// the buffered trace.
pub struct LiveAccounting {
    remaining: HashMap<u32, u32>,
    latched: HashSet<u32>,
    latch: Arc<LatchLayer>,
}

impl LiveAccounting {
    fn new(latch: Arc<LatchLayer>) -> Self {
        LiveAccounting {
            remaining: HashMap::new(),
            latched: HashSet::new(),
            latch,
        }
    }

    /// Called when a client driver actually writes a buy/sell command to
    /// the wire, seeding the expected-remaining table.
    pub fn on_sent_order(&mut self, id: u32, qty: u32) {
        self.remaining.insert(id, qty);
    }

    /// Ids still awaiting a terminal fill or cancel-accept. Non-empty once
    /// the engine has gone away means the engine closed with work left in
    /// flight.
    fn outstanding(&self) -> Vec<u32> {
        self.remaining.keys().copied().collect()
    }

    fn release_once(&mut self, id: u32) {
        if self.latched.insert(id) {
            self.latch.complete(id);
        }
    }

    /// Accounts for one output frame. Errors here are always firm
    /// protocol violations, independent of timestamp ambiguity.
    pub fn account(&mut self, frame: &Frame) -> Result<(), OracleError> {
        match frame {
            Frame::Booking { id, count, .. } => {
                self.remaining.insert(*id, *count);
                self.release_once(*id);
                Ok(())
            }
            Frame::Exec {
                resting_id,
                new_id,
                count,
                ..
            } => {
                for id in [*resting_id, *new_id] {
                    let left = self
                        .remaining
                        .get_mut(&id)
                        .ok_or_else(|| OracleError::new(format!("exec references unknown or terminal order {id}"), false))?;
                    if *count > *left {
                        return Err(OracleError::new(
                            format!("exec overfills order {id} (had {left}, matched {count})"),
                            false,
                        ));
                    }
                    *left -= *count;
                    if *left == 0 {
                        self.remaining.remove(&id);
                        self.release_once(id);
                    }
                }
                Ok(())
            }
            Frame::Cancel { id, accepted, .. } => {
                if *accepted {
                    if self.remaining.remove(id).is_none() {
                        return Err(OracleError::new(format!("cancel accept for unknown or already-terminal order {id}"), false));
                    }
                    self.release_once(*id);
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    PriceTime,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    Book,
    Input,
}

/// The four fixed-preference-order variants: price-time priority ordered
/// by book-entry timestamp, price-time by input timestamp, pure time by
/// book-entry timestamp, pure time by input timestamp.
const VARIANTS: [(Priority, TimestampKind); 4] = [
    (Priority::PriceTime, TimestampKind::Book),
    (Priority::PriceTime, TimestampKind::Input),
    (Priority::Time, TimestampKind::Book),
    (Priority::Time, TimestampKind::Input),
];

#[derive(Clone)]
struct Resting {
    side: Side,
    instrument: String,
    price: u32,
    remaining: u32,
    ts: u64,
    next_exec_id: u32,
}

/// Reconstructs book state from a buffered trace under one priority
/// variant and one trace ordering, checking every invariant the engine's
/// output is expected to uphold. Returns the first violation found, if
/// any.
fn replay_variant(
    frames: &[Frame],
    orders: &HashMap<u32, ExpectedOrder>,
    priority: Priority,
    ts_kind: TimestampKind,
    group_size: &HashMap<u64, usize>,
) -> Result<(), OracleError> {
    let mut resting: HashMap<u32, Resting> = HashMap::new();
    let mut filled_or_cancelled: HashSet<u32> = HashSet::new();

    for frame in frames {
        let spurious = *group_size.get(&frame.out_ts()).unwrap_or(&1) > 1;
        let err = |msg: String| OracleError::new(msg, spurious);

        match frame {
            Frame::Booking {
                side,
                id,
                instrument,
                price,
                count,
                in_ts,
                out_ts,
            } => {
                let expected = orders
                    .get(id)
                    .ok_or_else(|| err(format!("booking for order {id} not present in script")))?;
                if expected.side != *side || expected.instrument != *instrument || expected.price != *price {
                    return Err(err(format!(
                        "booking for order {id} does not match its submission (side/instrument/price)"
                    )));
                }
                if resting.contains_key(id) || filled_or_cancelled.contains(id) {
                    return Err(err(format!("duplicate booking for order {id}")));
                }
                let ts = match ts_kind {
                    TimestampKind::Book => *out_ts,
                    TimestampKind::Input => *in_ts,
                };
                resting.insert(
                    *id,
                    Resting {
                        side: *side,
                        instrument: instrument.clone(),
                        price: *price,
                        remaining: *count,
                        ts,
                        next_exec_id: 1,
                    },
                );
            }
            Frame::Exec {
                resting_id,
                new_id,
                exec_id,
                price,
                count,
                ..
            } => {
                let new_order = orders
                    .get(new_id)
                    .ok_or_else(|| err(format!("exec references unknown incoming order {new_id}")))?;
                let instrument = new_order.instrument.clone();
                let new_price = new_order.price;
                let new_side = new_order.side;

                let r = resting
                    .get(resting_id)
                    .ok_or_else(|| err(format!("exec references order {resting_id} that is not currently booked")))?;
                if r.price != *price {
                    return Err(err(format!("exec price {price} does not match resting order {resting_id}'s price {}", r.price)));
                }
                if r.instrument != instrument {
                    return Err(err(format!("exec instrument mismatch for order {resting_id}")));
                }
                if r.side == new_side {
                    return Err(err(format!("exec {resting_id}/{new_id} matched same-side orders")));
                }
                if r.next_exec_id != *exec_id {
                    return Err(err(format!(
                        "exec id {exec_id} for order {resting_id} does not match expected {}",
                        r.next_exec_id
                    )));
                }

                let crosses = match r.side {
                    Side::Buy => r.price >= new_price,
                    Side::Sell => r.price <= new_price,
                };
                if !crosses {
                    return Err(err(format!("exec matched non-crossing order {resting_id}")));
                }

                let eligible: Vec<&Resting> = resting
                    .values()
                    .filter(|o| {
                        o.side == r.side
                            && o.instrument == instrument
                            && match o.side {
                                Side::Buy => o.price >= new_price,
                                Side::Sell => o.price <= new_price,
                            }
                    })
                    .collect();

                match priority {
                    Priority::PriceTime => {
                        let best = match r.side {
                            Side::Buy => eligible.iter().map(|o| o.price).max(),
                            Side::Sell => eligible.iter().map(|o| o.price).min(),
                        };
                        if best != Some(r.price) {
                            return Err(err(format!(
                                "order {resting_id} matched out of price priority (not at best price)"
                            )));
                        }
                        // Among orders tied for best price, FIFO on the
                        // chosen timestamp.
                        if eligible.iter().any(|o| o.price == r.price && o.ts < r.ts) {
                            return Err(err(format!(
                                "order {resting_id} matched out of time priority among orders tied for best price"
                            )));
                        }
                    }
                    Priority::Time => {
                        if eligible.iter().any(|o| o.ts < r.ts) {
                            return Err(err(format!(
                                "order {resting_id} matched out of time priority (an older eligible order exists)"
                            )));
                        }
                    }
                }

                let r = resting.get_mut(resting_id).unwrap();
                if *count > r.remaining {
                    return Err(err(format!("exec overfills resting order {resting_id}")));
                }
                r.remaining -= count;
                r.next_exec_id += 1;
                if r.remaining == 0 {
                    resting.remove(resting_id);
                    filled_or_cancelled.insert(*resting_id);
                }
            }
            Frame::Cancel { id, accepted, .. } => {
                if *accepted {
                    if resting.remove(id).is_none() {
                        return Err(err(format!("cancel-accept for order {id} that is not currently booked")));
                    }
                    filled_or_cancelled.insert(*id);
                } else if resting.contains_key(id) {
                    return Err(err(format!("cancel-reject for order {id} that is currently booked")));
                }
            }
        }
    }

    Ok(())
}

/// Owns the full oracle: live accounting plus the buffered replay that
/// runs once the trace is complete.
pub struct Oracle {
    orders: HashMap<u32, ExpectedOrder>,
    live: LiveAccounting,
    frames: Vec<Frame>,
}

impl Oracle {
    pub fn new(script: &Script, latch: Arc<LatchLayer>) -> Self {
        let mut orders = HashMap::new();
        for line in &script.lines {
            if let Directive::Order {
                side,
                id,
                instrument,
                price,
                ..
            } = &line.directive
            {
                orders.insert(
                    *id,
                    ExpectedOrder {
                        side: *side,
                        instrument: instrument.clone(),
                        price: *price,
                    },
                );
            }
        }
        Oracle {
            orders,
            live: LiveAccounting::new(latch),
            frames: Vec::new(),
        }
    }

    pub fn on_sent_order(&mut self, id: u32, qty: u32) {
        self.live.on_sent_order(id, qty);
    }

    /// Ids with no terminal fill or cancel-accept observed yet.
    pub fn outstanding_orders(&self) -> Vec<u32> {
        self.live.outstanding()
    }

    /// Feeds one line of engine stdout through accounting and buffers the
    /// parsed frame for the eventual batch replay.
    pub fn on_output_line(&mut self, line: &str) -> Result<(), OracleError> {
        let Some(parsed) = parse_line(line) else {
            return Ok(());
        };
        let frame = parsed.map_err(|e| OracleError::new(e, false))?;
        self.live.account(&frame)?;
        self.frames.push(frame);
        Ok(())
    }

    /// Runs the 4-variant × 2-ordering replay over the buffered trace,
    /// returning on the first combination that validates cleanly. If every
    /// combination fails, returns every failure message.
    pub fn finish(self) -> Result<(), Vec<OracleError>> {
        let mut stable_sorted = self.frames.clone();
        stable_sorted.sort_by_key(|f| f.out_ts());

        let mut group_size: HashMap<u64, usize> = HashMap::new();
        for f in &self.frames {
            *group_size.entry(f.out_ts()).or_insert(0) += 1;
        }

        let orderings: [(&str, &[Frame]); 2] = [("as-emitted", &self.frames), ("stable-sorted", &stable_sorted)];

        let mut failures = Vec::new();
        for (priority, ts_kind) in VARIANTS {
            for (_name, frames) in &orderings {
                match replay_variant(frames, &self.orders, priority, ts_kind, &group_size) {
                    Ok(()) => return Ok(()),
                    Err(e) => failures.push(e),
                }
            }
        }
        Err(failures)
    }
}
