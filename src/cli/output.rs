//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats, following the same
//! format-dispatch-plus-`get_error_details` shape the rest of the error
//! taxonomy uses for structured reporting.

use crate::error::{CommandError, Error, IoError, RetrievalError, RouterError, SqlError, StorageError, SupervisorError};
use crate::supervisor::{AgentType, SupervisorResponse};
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses a format from a CLI string, defaulting to [`Self::Text`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Report produced by the `ingest` command.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    /// Path to the ingested file.
    pub path: String,
    /// Total number of chunks loaded.
    pub chunk_count: usize,
    /// Number of chunks with no parent (top-level sections).
    pub top_level_count: usize,
}

/// Report produced by the `seed-db` command.
#[derive(Debug, Serialize)]
pub struct SeedDbReport {
    /// Path to the database file.
    pub path: String,
    /// Number of schools seeded.
    pub school_count: usize,
}

/// Report produced by the `ask` command, a flattened view of
/// [`SupervisorResponse`] suitable for serialization.
#[derive(Debug, Serialize)]
pub struct AskReport {
    /// The agent that produced the answer.
    pub agent: String,
    /// Answer text.
    pub answer: String,
    /// Cited sources, if the RAG pipeline ran.
    pub sources: Vec<crate::answer::Source>,
}

impl AskReport {
    /// Builds a report from a [`SupervisorResponse`].
    #[must_use]
    pub fn from_response(response: SupervisorResponse) -> Self {
        let agent = match response.agent {
            AgentType::Sql => "sql",
            AgentType::Rag => "rag",
            AgentType::SchoolInfo => "school_info",
            AgentType::General => "general",
            AgentType::Clarify => "clarify",
        };
        Self { agent: agent.to_string(), answer: response.text, sources: response.sources }
    }
}

/// Formats an [`IngestReport`].
#[must_use]
pub fn format_ingest(report: &IngestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "Ingested {}", report.path);
            let _ = writeln!(out, "  chunks:     {}", report.chunk_count);
            let _ = writeln!(out, "  top-level:  {}", report.top_level_count);
            out
        }
        OutputFormat::Json => format_json(report),
    }
}

/// Formats a [`SeedDbReport`].
#[must_use]
pub fn format_seed_db(report: &SeedDbReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("Seeded {} with {} schools\n", report.path, report.school_count),
        OutputFormat::Json => format_json(report),
    }
}

/// Formats an [`AskReport`].
#[must_use]
pub fn format_ask(report: &AskReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "[{}] {}", report.agent, report.answer);
            if !report.sources.is_empty() {
                out.push_str("\nNguon:\n");
                for source in &report.sources {
                    let _ = writeln!(out, "  - {} (score {:.3})", source.legal_path, source.score);
                }
            }
            out
        }
        OutputFormat::Json => format_json(report),
    }
}

fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

/// Formats an [`Error`] for CLI output, including a machine-readable type
/// tag in JSON mode.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    let (kind, suggestion) = get_error_details(error);
    match format {
        OutputFormat::Text => match suggestion {
            Some(hint) => format!("Error ({kind}): {error}\nHint: {hint}\n"),
            None => format!("Error ({kind}): {error}\n"),
        },
        OutputFormat::Json => {
            let value = json!({
                "success": false,
                "error": {
                    "type": kind,
                    "message": error.to_string(),
                    "suggestion": suggestion,
                }
            });
            serde_json::to_string_pretty(&value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
        }
    }
}

fn get_error_details(error: &Error) -> (&'static str, Option<&'static str>) {
    match error {
        Error::Storage(inner) => match inner {
            StorageError::Database(_) => ("storage.database", None),
            StorageError::NotInitialized => {
                ("storage.not_initialized", Some("run `seed-db` first to create the schema"))
            }
            StorageError::SchoolNotFound { .. } => ("storage.school_not_found", None),
            StorageError::Migration(_) => ("storage.migration", None),
            StorageError::Serialization(_) => ("storage.serialization", None),
        },
        Error::Io(inner) => match inner {
            IoError::FileNotFound { .. } => ("io.file_not_found", Some("check the path passed to --chunks/--db")),
            IoError::ReadFailed { .. } => ("io.read_failed", None),
            IoError::WriteFailed { .. } => ("io.write_failed", None),
            IoError::Generic(_) => ("io.generic", None),
        },
        Error::Command(inner) => match inner {
            CommandError::InvalidArgument(_) => ("command.invalid_argument", None),
            CommandError::MissingArgument(_) => ("command.missing_argument", None),
            CommandError::ExecutionFailed(_) => ("command.execution_failed", None),
            CommandError::OutputFormat(_) => ("command.output_format", None),
        },
        Error::Config { .. } => ("config", None),
        Error::Retrieval(inner) => match inner {
            RetrievalError::DanglingParent { .. } => ("retrieval.dangling_parent", Some("check parent_id references in the ingestion file")),
            RetrievalError::Cycle { .. } => ("retrieval.cycle", Some("check parent_id references in the ingestion file")),
            RetrievalError::Transient(_) => ("retrieval.transient", Some("retrying may succeed")),
            RetrievalError::Fatal(_) => ("retrieval.fatal", None),
            RetrievalError::UnresolvedHit { .. } => ("retrieval.unresolved_hit", None),
        },
        Error::Router(inner) => match inner {
            RouterError::NoRoutes => ("router.no_routes", None),
            RouterError::EmptyRoute { .. } => ("router.empty_route", None),
            RouterError::EmbeddingFailed(_) => ("router.embedding_failed", None),
        },
        Error::Sql(inner) => match inner {
            SqlError::NoStatementFound => ("sql.no_statement_found", None),
            SqlError::UnsafeStatement { .. } => ("sql.unsafe_statement", None),
            SqlError::ExecutionFailed(_) => ("sql.execution_failed", None),
            SqlError::RetriesExhausted { .. } => ("sql.retries_exhausted", None),
        },
        Error::Supervisor(inner) => match inner {
            SupervisorError::TranscriptWrite { .. } => ("supervisor.transcript_write", None),
            SupervisorError::UnknownNode(_) => ("supervisor.unknown_node", None),
        },
        Error::Llm(_) => ("llm", None),
    }
}
