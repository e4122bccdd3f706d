use crate::book::Book;
use crate::clock::now_micros;
use crate::map::StripedMap;
use crate::order::{Order, OrderLocator};
use crate::output::OutputSink;
use crate::wire::{self, WireCommand};
use std::sync::Arc;
use tracing::debug;

/// Owns the per-instrument book map and the global order-id index. One
/// instance is shared across every connection's I/O loop; the maps are
/// the only mutable state the loops share.
pub struct Engine {
    books: StripedMap<String, Arc<Book>>,
    order_index: StripedMap<u32, OrderLocator>,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            books: StripedMap::new(),
            order_index: StripedMap::new(),
        }
    }

    /// Lazily create the book for `instrument` on first use.
    fn book_for(&self, instrument: &str) -> Arc<Book> {
        if let Some(book) = self.books.get(&instrument.to_string()) {
            return book;
        }
        let fresh = Arc::new(Book::new(instrument.to_string()));
        self.books.put(instrument.to_string(), fresh);
        // Another thread may have won the race to insert; re-read so every
        // caller for this instrument converges on the same book.
        self.books.get(&instrument.to_string()).expect("just inserted")
    }

    /// Dispatch one decoded wire command, assigning `input_ts` as the
    /// command's input timestamp at ingress.
    pub fn dispatch(&self, cmd: WireCommand, input_ts: u64, sink: &dyn OutputSink) {
        match cmd {
            WireCommand::Order {
                side,
                id,
                instrument,
                price,
                count,
            } => {
                debug!(order_id = id, ?side, %instrument, price, count, "order received");
                let book = self.book_for(&instrument);
                let order = Order::new(id, side, instrument, price, count, input_ts);
                book.process(order, &self.order_index, sink);
            }
            WireCommand::Cancel { id } => {
                debug!(order_id = id, "cancel received");
                match self.order_index.get(&id) {
                    Some(locator) => {
                        let book = self.book_for(&locator.instrument);
                        let _ = book.cancel(locator.side, locator.price, id, input_ts, &self.order_index, sink);
                    }
                    None => {
                        let now = now_micros();
                        sink.emit(&wire::format_cancel(id, false, input_ts, now));
                    }
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}
