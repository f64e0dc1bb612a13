//! CLI layer: a thin demo binary over the library.
//!
//! Provides the command-line interface using clap, with commands to
//! validate a chunk file, seed a demo admission-score database, and run a
//! question through the Supervisor.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
