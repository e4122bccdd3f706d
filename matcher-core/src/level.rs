use crate::clock::now_micros;
use crate::error::CancelRejectReason;
use crate::map::StripedMap;
use crate::order::{Order, OrderLocator, Side};
use crate::output::OutputSink;
use crate::wire;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// One node in a side's singly-linked list: either the sentinel head (no
/// price, no orders) or a real price level.
///
/// The whole node — price, aggregate volume, FIFO, and the `next` link —
/// lives behind one lock, matching the hand-over-hand discipline:
/// `next` is only ever read while the predecessor's lock is held.
///
/// Nodes are `Arc<Mutex<_>>` rather than a bespoke wrapper so that the
/// admission walk (`lock_for_admission`) can hold an arbitrary, growing run
/// of locks across an API boundary with `lock_arc`/`ArcMutexGuard` — each
/// guard owns the `Arc` that keeps its node alive, so there is nothing to
/// erase lifetimes on.
pub(crate) type NodeRef = Arc<Mutex<NodeState>>;

pub(crate) struct NodeState {
    /// `None` only for the sentinel head.
    price: Option<u32>,
    volume: u64,
    orders: VecDeque<Order>,
    next: Option<NodeRef>,
}

fn sentinel() -> NodeRef {
    Arc::new(Mutex::new(NodeState {
        price: None,
        volume: 0,
        orders: VecDeque::new(),
        next: None,
    }))
}

fn level_node(price: u32) -> NodeRef {
    Arc::new(Mutex::new(NodeState {
        price: Some(price),
        volume: 0,
        orders: VecDeque::new(),
        next: None,
    }))
}

/// One side (buy or sell) of an instrument's book: a locked sentinel head
/// followed by price levels sorted best-first.
pub struct BookSide {
    side: Side,
    head: NodeRef,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        BookSide {
            side,
            head: sentinel(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// True if `price` should sit strictly ahead of `other` on this side:
    /// higher-first for buys, lower-first for sells.
    fn better(&self, price: u32, other: u32) -> bool {
        match self.side {
            Side::Buy => price > other,
            Side::Sell => price < other,
        }
    }

    /// True if a resting level at `level_price` is marketable against an
    /// incoming order priced at `incoming_price` on this side: buy side
    /// crosses when `level.price >= order.price`, sell side when
    /// `level.price <= order.price`.
    fn crosses(&self, level_price: u32, incoming_price: u32) -> bool {
        match self.side {
            Side::Buy => level_price >= incoming_price,
            Side::Sell => level_price <= incoming_price,
        }
    }

    /// Lock this side's sentinel, handing ownership of the guard to the
    /// caller. Used by the book's admission protocol to lock the resting
    /// side's sentinel while the opposite side's admission locks are still
    /// held.
    pub fn lock_sentinel_arc(&self) -> ArcMutexGuard<RawMutex, NodeState> {
        self.head.lock_arc()
    }

    /// Rest `order` on this side, splicing in a new price level if needed.
    /// The caller already holds this side's sentinel lock (from
    /// `lock_sentinel_arc`, taken under the book's admission protocol);
    /// this method walks forward from it and releases every lock it
    /// touches, including the sentinel, before returning.
    pub fn insert_with_head_locked(
        &self,
        head_guard: ArcMutexGuard<RawMutex, NodeState>,
        mut order: Order,
        order_index: &StripedMap<u32, OrderLocator>,
        sink: &dyn OutputSink,
    ) {
        let mut curr_guard = head_guard;

        loop {
            let next = curr_guard.next.clone();
            let Some(next_node) = next else { break };
            let next_guard = next_node.lock_arc();
            let next_price = next_guard.price.expect("non-sentinel node has a price");

            if self.better(order.price, next_price) {
                // Insert before `next`: stays positioned on `curr`.
                drop(next_guard);
                break;
            }
            if order.price == next_price {
                // Merge into the existing level at `next`.
                drop(curr_guard);
                curr_guard = next_guard;
                break;
            }

            drop(curr_guard);
            curr_guard = next_guard;
        }

        if curr_guard.price != Some(order.price) {
            let new_node = level_node(order.price);
            {
                let mut new_guard = new_node.lock_arc();
                new_guard.next = curr_guard.next.take();
                curr_guard.next = Some(new_node.clone());
                drop(curr_guard);
                drop(new_guard);
            }
            curr_guard = new_node.lock_arc();
        }

        let now = now_micros();
        order.book_entry_ts = Some(now);

        // Strict `<`, not `<=`: an existing order with the same book-entry
        // timestamp (the clock can tie under sub-microsecond scheduling)
        // keeps its earlier slot, so FIFO order matches arrival order even
        // on a tie.
        let pos = curr_guard
            .orders
            .iter()
            .position(|o| order.book_entry_ts.unwrap() < o.book_entry_ts.unwrap_or(o.input_ts))
            .unwrap_or(curr_guard.orders.len());
        curr_guard.volume += order.remaining as u64;

        order_index.put(
            order.id,
            OrderLocator {
                instrument: order.instrument.clone(),
                side: self.side,
                price: order.price,
            },
        );

        sink.emit(&wire::format_added(
            self.side,
            order.id,
            &order.instrument,
            order.price,
            order.remaining,
            order.input_ts,
            now,
        ));

        curr_guard.orders.insert(pos, order);
    }

    /// Consume from this side against an incoming order, emitting one
    /// `executed` line per fill. Consumes the locks accumulated by
    /// `lock_for_admission`, releasing each in turn as it walks off the
    /// end of the prefix it needs — never re-locking, so the volumes it
    /// sums against are exactly the ones the admission walk already
    /// observed.
    ///
    /// Returns the incoming order's remaining quantity after matching.
    pub fn match_against_held(
        &self,
        held: AdmissionLock,
        incoming_id: u32,
        incoming_price: u32,
        mut incoming_remaining: u32,
        incoming_input_ts: u64,
        order_index: &StripedMap<u32, OrderLocator>,
        sink: &dyn OutputSink,
    ) -> u32 {
        let mut guards = held.guards.into_iter();
        let _head_guard = guards.next();

        for mut guard in guards {
            if incoming_remaining == 0 {
                break;
            }
            let level_price = guard.price.expect("non-sentinel node has a price");
            if !self.crosses(level_price, incoming_price) {
                break;
            }

            while incoming_remaining > 0 {
                let Some(resting) = guard.orders.front_mut() else {
                    break;
                };
                let matched = resting.remaining.min(incoming_remaining);
                let resting_id = resting.id;
                let resting_price = resting.price;
                let exec_id = resting.execution_counter;

                resting.remaining -= matched;
                incoming_remaining -= matched;
                guard.volume -= matched as u64;

                let now = now_micros();
                sink.emit(&wire::format_executed(
                    resting_id,
                    incoming_id,
                    exec_id,
                    resting_price,
                    matched,
                    incoming_input_ts,
                    now,
                ));

                resting.execution_counter += 1;

                if resting.is_filled() {
                    order_index.remove(&resting_id);
                    guard.orders.pop_front();
                }
            }
        }

        incoming_remaining
    }

    /// Convenience wrapper for tests that exercise a `BookSide` in
    /// isolation, without a `Book` driving the admission protocol: locks
    /// this side's own sentinel, then inserts.
    #[cfg(test)]
    pub fn insert(&self, order: Order, order_index: &StripedMap<u32, OrderLocator>, sink: &dyn OutputSink) {
        let head_guard = self.lock_sentinel_arc();
        self.insert_with_head_locked(head_guard, order, order_index, sink);
    }

    /// Convenience wrapper for tests that exercise a `BookSide` in
    /// isolation, without a `Book` driving the admission protocol: locks
    /// for admission against this side's own current state, then matches.
    #[cfg(test)]
    pub fn match_against(
        &self,
        incoming_id: u32,
        incoming_price: u32,
        incoming_remaining: u32,
        incoming_input_ts: u64,
        order_index: &StripedMap<u32, OrderLocator>,
        sink: &dyn OutputSink,
    ) -> u32 {
        let held = self.lock_for_admission(incoming_price, incoming_remaining as u64);
        self.match_against_held(
            held,
            incoming_id,
            incoming_price,
            incoming_remaining,
            incoming_input_ts,
            order_index,
            sink,
        )
    }

    /// Walk hand-over-hand to the level at `price` and drop `order_id`
    /// from its FIFO, also dropping it from `order_index` on acceptance.
    pub fn cancel(
        &self,
        order_id: u32,
        price: u32,
        order_index: &StripedMap<u32, OrderLocator>,
    ) -> Result<(), CancelRejectReason> {
        let mut curr_guard = self.head.lock();

        loop {
            let Some(next_node) = curr_guard.next.clone() else {
                return Err(CancelRejectReason::UnknownOrDead);
            };
            let next_guard = next_node.lock();
            let next_price = next_guard.price.expect("non-sentinel node has a price");

            if next_price == price {
                drop(curr_guard);
                curr_guard = next_guard;
                break;
            }
            if self.better(price, next_price) {
                // We have already passed where `price` would be; it's not resting.
                return Err(CancelRejectReason::UnknownOrDead);
            }

            drop(curr_guard);
            curr_guard = next_guard;
        }

        let qty = curr_guard.orders.iter().find(|o| o.id == order_id).map(|o| o.remaining);
        match qty {
            Some(remaining) => {
                curr_guard.orders.retain(|o| o.id != order_id);
                curr_guard.volume -= remaining as u64;
                order_index.remove(&order_id);
                Ok(())
            }
            None => Err(CancelRejectReason::UnknownOrDead),
        }
    }

    /// Sum resting volume at prices that would immediately cross
    /// `incoming_price`, without releasing any lock along the way. Stops
    /// as soon as either the running total reaches `target` or the next
    /// level is no longer marketable.
    ///
    /// The returned `AdmissionLock` keeps every visited node — including
    /// the sentinel — locked via owning `ArcMutexGuard`s, so the book can
    /// release its own admission mutex and hand the guards straight to
    /// `match_against_held` with no window for another thread to change
    /// what was just summed.
    pub fn lock_for_admission(&self, incoming_price: u32, target: u64) -> AdmissionLock {
        let mut guards: Vec<ArcMutexGuard<RawMutex, NodeState>> = vec![self.head.lock_arc()];

        let mut running = 0u64;
        loop {
            let next = guards.last().unwrap().next.clone();
            let Some(next_node) = next else { break };
            let next_guard = next_node.lock_arc();
            let level_price = next_guard.price.expect("non-sentinel node has a price");
            if !self.crosses(level_price, incoming_price) {
                break;
            }
            running += next_guard.volume;
            guards.push(next_guard);
            if running >= target {
                break;
            }
        }

        AdmissionLock {
            guards,
            will_fully_match: running >= target,
        }
    }
}

/// The locks taken by [`BookSide::lock_for_admission`]: the sentinel
/// followed by every price level visited, in order, still held. Dropping
/// it without matching (e.g. on an early-return error path) releases them
/// innermost-last, which is harmless since nothing downstream observed the
/// partial state.
pub struct AdmissionLock {
    guards: Vec<ArcMutexGuard<RawMutex, NodeState>>,
    pub will_fully_match: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::VecSink;

    fn order(id: u32, side: Side, price: u32, qty: u32, ts: u64) -> Order {
        Order::new(id, side, "GOOG".to_string(), price, qty, ts)
    }

    #[test]
    fn insert_orders_best_price_first() {
        let side = BookSide::new(Side::Buy);
        let index = StripedMap::new();
        let sink = VecSink::new();

        side.insert(order(1, Side::Buy, 100, 5, 1), &index, sink.as_ref());
        side.insert(order(2, Side::Buy, 101, 3, 2), &index, sink.as_ref());

        let head = side.head.lock();
        let first = head.next.clone().unwrap();
        let first_guard = first.lock();
        assert_eq!(first_guard.price, Some(101));
    }

    #[test]
    fn insert_merges_same_price_fifo() {
        let side = BookSide::new(Side::Buy);
        let index = StripedMap::new();
        let sink = VecSink::new();

        side.insert(order(1, Side::Buy, 100, 5, 1), &index, sink.as_ref());
        side.insert(order(2, Side::Buy, 100, 3, 2), &index, sink.as_ref());

        let head = side.head.lock();
        let level = head.next.clone().unwrap();
        let guard = level.lock();
        assert_eq!(guard.orders.len(), 2);
        assert_eq!(guard.orders[0].id, 1);
        assert_eq!(guard.orders[1].id, 2);
        assert_eq!(guard.volume, 8);
    }

    #[test]
    fn match_against_depletes_best_level_first() {
        let sell = BookSide::new(Side::Sell);
        let index = StripedMap::new();
        let sink = VecSink::new();

        sell.insert(order(1, Side::Sell, 101, 3, 1), &index, sink.as_ref());
        sell.insert(order(2, Side::Sell, 100, 5, 2), &index, sink.as_ref());

        let remaining = sell.match_against(3, 101, 6, 3, &index, sink.as_ref());

        assert_eq!(remaining, 0);
        let lines = sink.lines();
        let exec_lines: Vec<&String> = lines.iter().filter(|l| l.starts_with('E')).collect();
        assert_eq!(exec_lines.len(), 2);
        assert!(exec_lines[0].starts_with("E 2 3 1 100 5"));
        assert!(exec_lines[1].starts_with("E 1 3 1 101 1"));
        // order 2 (qty 5) was fully consumed; order 1 (qty 3) only gave up 1.
        assert!(!index.contains(&2));
        assert!(index.contains(&1));
    }

    #[test]
    fn match_against_partial_leaves_remainder() {
        let sell = BookSide::new(Side::Sell);
        let index = StripedMap::new();
        let sink = VecSink::new();

        sell.insert(order(1, Side::Sell, 100, 3, 1), &index, sink.as_ref());

        let remaining = sell.match_against(2, 100, 5, 2, &index, sink.as_ref());
        assert_eq!(remaining, 2);
    }

    #[test]
    fn cancel_removes_from_level_and_reports_found() {
        let side = BookSide::new(Side::Buy);
        let index = StripedMap::new();
        let sink = VecSink::new();

        side.insert(order(1, Side::Buy, 100, 5, 1), &index, sink.as_ref());
        assert!(side.cancel(1, 100, &index).is_ok());
        assert!(index.get(&1).is_none());
        assert!(side.cancel(1, 100, &index).is_err());
        assert!(side.cancel(999, 100, &index).is_err());
    }
}
