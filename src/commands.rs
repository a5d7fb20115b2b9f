//! CLI command handlers
//!
//! One module per command group, in the same shape: a clap `Subcommand` enum
//! (where the group has subcommands) plus a `handle_*` function that owns
//! printing and exit codes.

pub mod show;
pub mod stats;
pub mod submit;

use serde::Serialize;

/// Exit code for local specification/configuration errors. Nothing was
/// submitted when a command exits with this code.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Exit code for failures reported by the external tool.
pub const EXIT_EXTERNAL_ERROR: i32 = 1;

pub fn print_error(action: &str, err: &dyn std::fmt::Display) {
    eprintln!("Error {}: {}", action, err);
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            print_error("serializing output to JSON", &e);
            std::process::exit(EXIT_EXTERNAL_ERROR);
        }
    }
}
