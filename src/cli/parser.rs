//! Command-line argument parsing.
//!
//! A thin demo harness over [`crate::service::ServiceRegistry`] and
//! [`crate::supervisor::Supervisor`]: `ingest` validates a chunk file,
//! `seed-db` creates a demo admission-score database, and `ask` runs one
//! question through the Supervisor end to end.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tsbot-core: retrieval-and-orchestration core for a Vietnamese
/// legal/admissions question-answering system.
#[derive(Parser, Debug)]
#[command(name = "tsbot-core")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate a chunk-ingestion file (§4.2, §6).
    ///
    /// Parses the JSON chunk array, builds the hierarchy index, and reports
    /// how many chunks and top-level sections were found.
    Ingest {
        /// Path to the chunk-ingestion JSON file.
        chunks: PathBuf,
    },

    /// Create and seed a demo admission-score SQLite database (C13).
    SeedDb {
        /// Path to the database file to create.
        db: PathBuf,
    },

    /// Run one question through the Supervisor end to end (C14).
    Ask {
        /// The question text.
        question: String,

        /// Path to a chunk-ingestion JSON file to load as the legal corpus.
        #[arg(long)]
        chunks: Option<PathBuf>,

        /// Path to a SQLite database to use as the relational store.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Session id to group this turn under (defaults to a fresh session).
        #[arg(long)]
        session: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_all_options() {
        let cli = Cli::parse_from([
            "tsbot-core",
            "ask",
            "Diem chuan khoi A nam nay la bao nhieu?",
            "--chunks",
            "chunks.json",
            "--db",
            "scores.db",
            "--session",
            "s1",
        ]);
        match cli.command {
            Commands::Ask { question, chunks, db, session } => {
                assert_eq!(question, "Diem chuan khoi A nam nay la bao nhieu?");
                assert_eq!(chunks, Some(PathBuf::from("chunks.json")));
                assert_eq!(db, Some(PathBuf::from("scores.db")));
                assert_eq!(session, Some("s1".to_string()));
            }
            _ => unreachable!("expected Ask"),
        }
    }

    #[test]
    fn parses_ask_with_only_question() {
        let cli = Cli::parse_from(["tsbot-core", "ask", "Xin chao"]);
        match cli.command {
            Commands::Ask { question, chunks, db, session } => {
                assert_eq!(question, "Xin chao");
                assert_eq!(chunks, None);
                assert_eq!(db, None);
                assert_eq!(session, None);
            }
            _ => unreachable!("expected Ask"),
        }
    }

    #[test]
    fn parses_ingest() {
        let cli = Cli::parse_from(["tsbot-core", "ingest", "chunks.json"]);
        match cli.command {
            Commands::Ingest { chunks } => assert_eq!(chunks, PathBuf::from("chunks.json")),
            _ => unreachable!("expected Ingest"),
        }
    }

    #[test]
    fn parses_seed_db() {
        let cli = Cli::parse_from(["tsbot-core", "seed-db", "scores.db"]);
        match cli.command {
            Commands::SeedDb { db } => assert_eq!(db, PathBuf::from("scores.db")),
            _ => unreachable!("expected SeedDb"),
        }
    }

    #[test]
    fn default_format_is_text() {
        let cli = Cli::parse_from(["tsbot-core", "seed-db", "scores.db"]);
        assert_eq!(cli.format, "text");
        assert!(!cli.verbose);
    }
}
