//! Command-line surface
//!
//! Unknown flags are dropped with a warning instead of failing: `--v` is
//! not a recognized flag, so it is ignored and the server starts, while
//! `-v` prints the version and exits. The sanitizer lives here so both
//! behaviors are unit-testable.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "durandal-mcp", disable_version_flag = true)]
#[command(about = "Durandal memory server for AI coding assistants (MCP over stdio)")]
pub struct Args {
    /// Print name, version, runtime, and platform
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Run the built-in self-test against a scratch store
    #[arg(long)]
    pub test: bool,

    /// Start with debug-level logging
    #[arg(long)]
    pub debug: bool,

    /// Verbose console output
    #[arg(long)]
    pub verbose: bool,

    /// Write JSON-lines logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log level
    #[arg(long, value_parser = ["debug", "info", "warn", "error"])]
    pub log_level: Option<String>,
}

/// Long flags that take a value
const VALUE_FLAGS: &[&str] = &["--log-file", "--log-level"];

/// All recognized flags
const KNOWN_FLAGS: &[&str] = &[
    "--help",
    "-h",
    "--version",
    "-v",
    "--test",
    "--debug",
    "--verbose",
    "--log-file",
    "--log-level",
];

/// Split argv into recognized arguments and dropped unknown tokens
///
/// The first element (program name) is always kept. A value flag keeps its
/// following value; anything unrecognized is dropped, not an error.
pub fn sanitize_args(argv: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::with_capacity(argv.len());
    let mut dropped = Vec::new();
    let mut iter = argv.into_iter();

    if let Some(program) = iter.next() {
        kept.push(program);
    }

    while let Some(arg) = iter.next() {
        let flag_part = arg.split_once('=').map(|(f, _)| f).unwrap_or(&arg);
        if KNOWN_FLAGS.contains(&flag_part) {
            let takes_value = VALUE_FLAGS.contains(&flag_part) && !arg.contains('=');
            kept.push(arg);
            if takes_value {
                if let Some(value) = iter.next() {
                    kept.push(value);
                }
            }
        } else {
            dropped.push(arg);
        }
    }

    (kept, dropped)
}

/// Version line: name, version, runtime, platform
pub fn version_string() -> String {
    format!(
        "{} {} (rust) {}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}
