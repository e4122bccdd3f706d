use crate::error::WireError;
use crate::order::{Side, MAX_INSTRUMENT_LEN};

/// Size of one request frame.
pub const FRAME_LEN: usize = 28;

const INSTRUMENT_FIELD_LEN: usize = 9;

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireCommand {
    Order {
        side: Side,
        id: u32,
        instrument: String,
        price: u32,
        count: u32,
    },
    Cancel {
        id: u32,
    },
}

/// Decode one fixed 28-byte frame:
/// `kind(1) pad(3) id(4,LE) price(4,LE) count(4,LE) instrument(9, NUL-terminated) pad(3)`.
pub fn decode_frame(bytes: &[u8; FRAME_LEN]) -> Result<WireCommand, WireError> {
    let kind = bytes[0];
    let id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());

    match kind {
        b'C' => Ok(WireCommand::Cancel { id }),
        b'B' | b'S' => {
            let price = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
            let count = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
            let instrument = decode_instrument(&bytes[16..16 + INSTRUMENT_FIELD_LEN])?;
            let side = if kind == b'B' { Side::Buy } else { Side::Sell };
            Ok(WireCommand::Order {
                side,
                id,
                instrument,
                price,
                count,
            })
        }
        other => Err(WireError::UnknownCommand(other)),
    }
}

fn decode_instrument(field: &[u8]) -> Result<String, WireError> {
    let nul = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let text = std::str::from_utf8(&field[..nul]).map_err(|_| WireError::BadInstrument)?;
    if text.is_empty() || text.len() > MAX_INSTRUMENT_LEN {
        return Err(WireError::BadInstrument);
    }
    Ok(text.to_string())
}

/// Encode a request frame, mirroring `decode_frame`. Used by test clients
/// and the grader's client drivers to build wire-format writes.
pub fn encode_frame(cmd: &WireCommand) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    match cmd {
        WireCommand::Cancel { id } => {
            buf[0] = b'C';
            buf[4..8].copy_from_slice(&id.to_le_bytes());
        }
        WireCommand::Order {
            side,
            id,
            instrument,
            price,
            count,
        } => {
            buf[0] = match side {
                Side::Buy => b'B',
                Side::Sell => b'S',
            };
            buf[4..8].copy_from_slice(&id.to_le_bytes());
            buf[8..12].copy_from_slice(&price.to_le_bytes());
            buf[12..16].copy_from_slice(&count.to_le_bytes());
            let bytes = instrument.as_bytes();
            let n = bytes.len().min(MAX_INSTRUMENT_LEN);
            buf[16..16 + n].copy_from_slice(&bytes[..n]);
        }
    }
    buf
}

fn side_letter(side: Side) -> char {
    match side {
        Side::Buy => 'B',
        Side::Sell => 'S',
    }
}

/// `B`/`S <id> <instrument> <price> <count> <in_ts> <out_ts>`.
pub fn format_added(
    side: Side,
    id: u32,
    instrument: &str,
    price: u32,
    count: u32,
    in_ts: u64,
    out_ts: u64,
) -> String {
    format!(
        "{} {} {} {} {} {} {}",
        side_letter(side),
        id,
        instrument,
        price,
        count,
        in_ts,
        out_ts
    )
}

/// `E <resting_id> <new_id> <exec_id> <price> <count> <in_ts> <out_ts>`.
/// `price` is always the resting order's price, never the incoming order's.
pub fn format_executed(
    resting_id: u32,
    new_id: u32,
    exec_id: u32,
    price: u32,
    count: u32,
    in_ts: u64,
    out_ts: u64,
) -> String {
    format!(
        "E {} {} {} {} {} {} {}",
        resting_id, new_id, exec_id, price, count, in_ts, out_ts
    )
}

/// `X <id> A|R <in_ts> <out_ts>`.
pub fn format_cancel(id: u32, accepted: bool, in_ts: u64, out_ts: u64) -> String {
    format!("X {} {} {} {}", id, if accepted { 'A' } else { 'R' }, in_ts, out_ts)
}
