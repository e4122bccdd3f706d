use crate::error::CancelRejectReason;
use crate::level::BookSide;
use crate::map::StripedMap;
use crate::order::{Order, OrderLocator, Side};
use crate::output::OutputSink;
use crate::wire;
use parking_lot::Mutex;

/// Per-instrument pair of sides plus the book-level admission mutex.
pub struct Book {
    instrument: String,
    buy: BookSide,
    sell: BookSide,
    /// Held only for the brief "can I match vs must I rest" decision; never
    /// held across the actual match or insert.
    admission: Mutex<()>,
}

impl Book {
    pub fn new(instrument: String) -> Self {
        Book {
            instrument,
            buy: BookSide::new(Side::Buy),
            sell: BookSide::new(Side::Sell),
            admission: Mutex::new(()),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Admit `order` into this book. `order.side` picks which side matches
    /// and which side rests.
    pub fn process(
        &self,
        order: Order,
        order_index: &StripedMap<u32, OrderLocator>,
        sink: &dyn OutputSink,
    ) {
        let (opposite, own) = match order.side {
            Side::Buy => (&self.sell, &self.buy),
            Side::Sell => (&self.buy, &self.sell),
        };

        let book_guard = self.admission.lock();
        let target = order.remaining as u64;
        let admission = opposite.lock_for_admission(order.price, target);
        let own_head = if admission.will_fully_match {
            None
        } else {
            Some(own.lock_sentinel_arc())
        };
        drop(book_guard);

        let remaining = opposite.match_against_held(
            admission,
            order.id,
            order.price,
            order.remaining,
            order.input_ts,
            order_index,
            sink,
        );

        match own_head {
            Some(head_guard) if remaining > 0 => {
                let mut resting = order;
                resting.remaining = remaining;
                own.insert_with_head_locked(head_guard, resting, order_index, sink);
            }
            _ => {}
        }
    }

    /// Cancel: look up which side/price the order rests at, then
    /// hand-over-hand to that level and drop it from both the level and
    /// the order-id index.
    pub fn cancel(
        &self,
        side: Side,
        price: u32,
        order_id: u32,
        in_ts: u64,
        order_index: &StripedMap<u32, OrderLocator>,
        sink: &dyn OutputSink,
    ) -> Result<(), CancelRejectReason> {
        let book_side = match side {
            Side::Buy => &self.buy,
            Side::Sell => &self.sell,
        };
        let result = book_side.cancel(order_id, price, order_index);
        let now = crate::clock::now_micros();
        sink.emit(&wire::format_cancel(order_id, result.is_ok(), in_ts, now));
        result
    }
}
