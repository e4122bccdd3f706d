//! The grader binary: `grader <engine_binary>`, reading the script from
//! stdin. The input-file parser and CLI entry point are thin
//! collaborators around the core script/oracle/supervisor logic.

use grader::{script, supervisor};
use std::io::Read;

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let engine_binary = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: grader <engine_binary>");
            std::process::exit(1);
        }
    };

    let mut text = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut text) {
        eprintln!("grader: failed to read script from stdin: {e}");
        std::process::exit(1);
    }

    let parsed = script::parse(&text).and_then(|s| {
        script::validate(&s)?;
        Ok(s)
    });

    let script = match parsed {
        Ok(s) => s,
        Err(e) => {
            eprintln!("grader: {e}");
            std::process::exit(1);
        }
    };

    let code = supervisor::run(script, &engine_binary);
    std::process::exit(code);
}
