//! Core matching logic shared by the `engine` and `grader` binaries:
//! the striped concurrent map, order-book sides, per-instrument books, the
//! engine front, and the wire codec.

pub mod book;
pub mod clock;
pub mod error;
pub mod front;
pub mod level;
pub mod map;
pub mod order;
pub mod output;
pub mod wire;

pub mod prelude {
    pub use crate::book::Book;
    pub use crate::error::{CancelRejectReason, WireError};
    pub use crate::front::Engine;
    pub use crate::map::StripedMap;
    pub use crate::order::{Order, OrderLocator, Side, MAX_INSTRUMENT_LEN};
    pub use crate::output::{OutputSink, StdoutSink, VecSink};
    pub use crate::wire::{decode_frame, WireCommand, FRAME_LEN};
}
