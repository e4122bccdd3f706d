use crate::error::ScriptError;
use matcher_core::order::Side;
use std::collections::HashMap;

/// One parsed script directive, stripped of its thread-targeting prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Every named thread must reach this point before any proceeds.
    Sync,
    Connect,
    Disconnect,
    Sleep(u64),
    Wait(u32),
    Cancel(u32),
    Order {
        side: Side,
        id: u32,
        instrument: String,
        price: u32,
        count: u32,
    },
}

impl Directive {
    fn name(&self) -> &'static str {
        match self {
            Directive::Sync => "sync",
            Directive::Connect => "connect",
            Directive::Disconnect => "disconnect",
            Directive::Sleep(_) => "sleep",
            Directive::Wait(_) => "wait",
            Directive::Cancel(_) => "cancel",
            Directive::Order { .. } => "send",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptLine {
    pub line_no: usize,
    pub threads: Vec<usize>,
    pub directive: Directive,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub client_count: usize,
    pub lines: Vec<ScriptLine>,
}

/// Parse `text` into a [`Script`]. Does not run static validation; call
/// [`validate`] on the result before using it — validation failures are
/// fatal and must be reported before the engine is launched.
pub fn parse(text: &str) -> Result<Script, ScriptError> {
    let mut nonblank = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    let (first_no, first_line) = nonblank
        .next()
        .ok_or_else(|| ScriptError::BadClientCount {
            line: 1,
            text: String::new(),
        })?;
    let client_count: usize = first_line
        .parse()
        .map_err(|_| ScriptError::BadClientCount {
            line: first_no,
            text: first_line.to_string(),
        })?;

    let mut lines = Vec::new();
    for (line_no, line) in nonblank {
        lines.push(parse_line(line_no, line, client_count)?);
    }

    Ok(Script { client_count, lines })
}

fn parse_line(line_no: usize, line: &str, client_count: usize) -> Result<ScriptLine, ScriptError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ScriptError::UnknownToken {
            line: line_no,
            token: String::new(),
        });
    }

    // `.` names its participants *after* the token, since the point of a
    // sync is exactly to name who must arrive; every other directive is
    // prefixed by the thread(s) it belongs to.
    if tokens[0] == "." {
        let threads = parse_thread_range(
            line_no,
            tokens.get(1).copied().unwrap_or(""),
            client_count,
        )?;
        return Ok(ScriptLine {
            line_no,
            threads,
            directive: Directive::Sync,
        });
    }

    let (threads, rest) = if looks_like_thread_range(tokens[0]) {
        (
            parse_thread_range(line_no, tokens[0], client_count)?,
            &tokens[1..],
        )
    } else {
        return Err(ScriptError::UnknownToken {
            line: line_no,
            token: tokens[0].to_string(),
        });
    };

    if rest.is_empty() {
        return Err(ScriptError::UnknownToken {
            line: line_no,
            token: String::new(),
        });
    }

    let directive = match rest[0] {
        "o" => Directive::Connect,
        "x" => Directive::Disconnect,
        "s" => Directive::Sleep(parse_u64(line_no, "s", rest.get(1))?),
        "w" => Directive::Wait(parse_u32(line_no, "w", rest.get(1))?),
        "C" => Directive::Cancel(parse_u32(line_no, "C", rest.get(1))?),
        "B" | "S" => parse_order(line_no, rest)?,
        other => {
            return Err(ScriptError::UnknownToken {
                line: line_no,
                token: other.to_string(),
            })
        }
    };

    require_one_thread_if_needed(line_no, &directive, &threads)?;

    Ok(ScriptLine {
        line_no,
        threads,
        directive,
    })
}

fn require_one_thread_if_needed(line_no: usize, directive: &Directive, threads: &[usize]) -> Result<(), ScriptError> {
    let needs_one = !matches!(directive, Directive::Sync);
    if needs_one && threads.len() != 1 {
        return Err(ScriptError::MustNameOneThread {
            line: line_no,
            directive: directive.name(),
            got: threads.len(),
        });
    }
    Ok(())
}

fn parse_order(line_no: usize, rest: &[&str]) -> Result<Directive, ScriptError> {
    let side = if rest[0] == "B" { Side::Buy } else { Side::Sell };
    if rest.len() != 5 {
        return Err(ScriptError::MalformedDirective {
            line: line_no,
            directive: rest.join(" "),
            reason: "expected <id> <instrument> <price> <count>".to_string(),
        });
    }
    let id = parse_u32(line_no, rest[0], Some(&rest[1]))?;
    let instrument = rest[2].to_string();
    let price = parse_u32(line_no, rest[0], Some(&rest[3]))?;
    let count = parse_u32(line_no, rest[0], Some(&rest[4]))?;
    Ok(Directive::Order {
        side,
        id,
        instrument,
        price,
        count,
    })
}

fn parse_u32(line_no: usize, directive: &str, token: Option<&&str>) -> Result<u32, ScriptError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ScriptError::MalformedDirective {
            line: line_no,
            directive: directive.to_string(),
            reason: "expected an integer argument".to_string(),
        })
}

fn parse_u64(line_no: usize, directive: &str, token: Option<&&str>) -> Result<u64, ScriptError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| ScriptError::MalformedDirective {
            line: line_no,
            directive: directive.to_string(),
            reason: "expected an integer argument".to_string(),
        })
}

fn looks_like_thread_range(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '-')
}

/// Parses a comma-separated list of thread indices or ranges (`a-b`, or
/// `a-` open to `client_count - 1`).
fn parse_thread_range(line_no: usize, text: &str, client_count: usize) -> Result<Vec<usize>, ScriptError> {
    if text.is_empty() {
        return Err(ScriptError::BadThreadRange {
            line: line_no,
            text: text.to_string(),
        });
    }
    let mut out = Vec::new();
    for part in text.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.parse().map_err(|_| ScriptError::BadThreadRange {
                line: line_no,
                text: text.to_string(),
            })?;
            let hi: usize = if hi.is_empty() {
                client_count.saturating_sub(1)
            } else {
                hi.parse().map_err(|_| ScriptError::BadThreadRange {
                    line: line_no,
                    text: text.to_string(),
                })?
            };
            if lo > hi {
                return Err(ScriptError::BadThreadRange {
                    line: line_no,
                    text: text.to_string(),
                });
            }
            out.extend(lo..=hi);
        } else {
            let n: usize = part.parse().map_err(|_| ScriptError::BadThreadRange {
                line: line_no,
                text: text.to_string(),
            })?;
            out.push(n);
        }
    }
    for &t in &out {
        if t >= client_count {
            return Err(ScriptError::ThreadOutOfRange {
                line: line_no,
                thread: t,
                count: client_count,
            });
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Static validation: connection-state consistency, single-owner
/// sends, and cancel-origin tracking. `origin` records, per order id, the
/// thread that submitted it and that thread's connection generation at the
/// time — a cancel must name the same id from the same thread while still
/// on that same connection (incremented on every disconnect).
pub fn validate(script: &Script) -> Result<(), ScriptError> {
    let mut connected = vec![false; script.client_count];
    let mut generation = vec![0u32; script.client_count];
    let mut origin: HashMap<u32, (usize, u32)> = HashMap::new();

    for line in &script.lines {
        match &line.directive {
            Directive::Sync => {}
            Directive::Connect => {
                let t = line.threads[0];
                if connected[t] {
                    return Err(ScriptError::ConnectWhileConnected { line: line.line_no, thread: t });
                }
                connected[t] = true;
            }
            Directive::Disconnect => {
                let t = line.threads[0];
                if !connected[t] {
                    return Err(ScriptError::DisconnectWhileNotConnected { line: line.line_no, thread: t });
                }
                connected[t] = false;
                generation[t] += 1;
            }
            Directive::Sleep(_) | Directive::Wait(_) => {}
            Directive::Cancel(id) => {
                let t = line.threads[0];
                if !connected[t] {
                    return Err(ScriptError::SendWhileDisconnected { line: line.line_no, thread: t });
                }
                // An id never submitted anywhere in the script is not a
                // static error: it is a legitimate "cancel an unknown
                // order" probe, left for the engine to reject at runtime.
                // Only an id submitted by *someone* gets the
                // origin-thread/connection-generation check.
                match origin.get(id) {
                    None => {}
                    Some(&(origin_thread, origin_gen)) if origin_thread == t && origin_gen == generation[t] => {}
                    _ => return Err(ScriptError::CancelBeforeOrigin { line: line.line_no, id: *id }),
                }
            }
            Directive::Order { id, .. } => {
                let t = line.threads[0];
                if !connected[t] {
                    return Err(ScriptError::SendWhileDisconnected { line: line.line_no, thread: t });
                }
                if origin.contains_key(id) {
                    return Err(ScriptError::DuplicateOrderId { line: line.line_no, id: *id });
                }
                origin.insert(*id, (t, generation[t]));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_script() {
        let text = "1\n0 o\n0 B 1 GOOG 100 5\n0 w 1\n0 x\n";
        let script = parse(text).unwrap();
        assert_eq!(script.client_count, 1);
        assert_eq!(script.lines.len(), 4);
        validate(&script).unwrap();
    }

    #[test]
    fn rejects_send_while_disconnected() {
        let text = "1\n0 B 1 GOOG 100 5\n";
        let script = parse(text).unwrap();
        assert!(matches!(validate(&script), Err(ScriptError::SendWhileDisconnected { .. })));
    }

    #[test]
    fn allows_cancel_of_never_submitted_id() {
        let text = "1\n0 o\n0 C 999\n0 x\n";
        let script = parse(text).unwrap();
        validate(&script).unwrap();
    }

    #[test]
    fn rejects_cancel_by_non_origin_thread() {
        let text = "2\n0 o\n1 o\n0 B 1 GOOG 100 5\n1 C 1\n0 x\n1 x\n";
        let script = parse(text).unwrap();
        assert!(matches!(validate(&script), Err(ScriptError::CancelBeforeOrigin { .. })));
    }

    #[test]
    fn rejects_duplicate_order_id() {
        let text = "1\n0 o\n0 B 1 GOOG 100 5\n0 B 1 GOOG 101 2\n0 x\n";
        let script = parse(text).unwrap();
        assert!(matches!(validate(&script), Err(ScriptError::DuplicateOrderId { .. })));
    }

    #[test]
    fn parses_sync_with_thread_list_after_token() {
        let text = "2\n0 o\n1 o\n. 0,1\n0 x\n1 x\n";
        let script = parse(text).unwrap();
        let sync = script.lines.iter().find(|l| l.directive == Directive::Sync).unwrap();
        assert_eq!(sync.threads, vec![0, 1]);
    }

    #[test]
    fn parses_open_thread_range() {
        assert_eq!(parse_thread_range(1, "1-", 4).unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_thread_range(1, "0-1,3", 4).unwrap(), vec![0, 1, 3]);
    }
}
