/// Maximum instrument symbol length.
pub const MAX_INSTRUMENT_LEN: usize = 8;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A resting (or about-to-rest) order, as modelled by the book.
///
/// `remaining` and `execution_counter` are the only fields mutated after
/// construction, and every mutation happens while the enclosing price
/// level's lock is held (book insertion, matching, and cancel all run
/// under that lock) — see `level::Node`.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: u32,
    pub side: Side,
    pub instrument: String,
    pub price: u32,
    pub original_qty: u32,
    pub remaining: u32,
    /// Starts at 1; incremented after each partial fill is emitted.
    pub execution_counter: u32,
    pub input_ts: u64,
    /// Set only when the order first rests on a side; always ≥ `input_ts`.
    pub book_entry_ts: Option<u64>,
}

impl Order {
    pub fn new(id: u32, side: Side, instrument: String, price: u32, qty: u32, input_ts: u64) -> Self {
        Order {
            id,
            side,
            instrument,
            price,
            original_qty: qty,
            remaining: qty,
            execution_counter: 1,
            input_ts,
            book_entry_ts: None,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.remaining == 0
    }
}

/// The locator the global order-id index keeps for a resting order: just
/// enough to find it again without scanning every instrument.
#[derive(Debug, Clone)]
pub struct OrderLocator {
    pub instrument: String,
    pub side: Side,
    pub price: u32,
}
