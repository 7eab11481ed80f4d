//! Classify captured TN3270 byte streams
//!
//! Reads one or more trace capture files and reports whether each looks
//! like a TN3270E session, using the same heuristic the library applies:
//! the stream carries IAC WILL EOR and never refuses the TN3270E option.

use std::fs;

use anyhow::{Context, Result};

use tn3270r::infer_tn3270e_from_trace;

fn main() -> Result<()> {
    env_logger::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: tn3270_trace_probe <trace-file>...");
        std::process::exit(2);
    }

    for path in paths {
        let bytes = fs::read(&path).with_context(|| format!("cannot read {path}"))?;
        let mode = if infer_tn3270e_from_trace(&bytes) {
            "TN3270E"
        } else {
            "TN3270 (or non-3270)"
        };
        println!("{path}: {} bytes, {mode}", bytes.len());
    }
    Ok(())
}
