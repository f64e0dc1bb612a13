//! Error types for the retrieval-and-orchestration core.
//!
//! A layered `thiserror` hierarchy: a top-level [`Error`] enum wraps one
//! error type per domain (retrieval, router, SQL engine, supervisor, LLM,
//! storage), matching the 7-kind taxonomy of §7. Adapter layers retry
//! transient I/O themselves; what reaches this hierarchy is either a fatal
//! condition or a validation/structural failure meant to be reported, not
//! retried.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type returned by every public API in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Relational-store errors (§6 `view_tra_cuu_diem`/`truong`/`nganh`).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors (ingestion file reads, CLI file handling).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors (kind 1, §7) — fatal at construction.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Retrieval pipeline errors (hierarchy, BM25, vector store, fusion).
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Semantic router errors.
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// NL-to-SQL engine errors.
    #[error("sql engine error: {0}")]
    Sql(#[from] SqlError),

    /// Supervisor workflow errors.
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// LLM client errors (generation, JSON-mode parsing).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors raised by an [`crate::llm::LlmClient`] implementation.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The underlying provider call failed (network, quota, timeout).
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// `generate_json` received text that does not parse as JSON.
    #[error("malformed json response: {0}")]
    MalformedJson(String),

    /// The call exceeded its per-stage deadline (§5 Concurrency & Resource Model).
    #[error("llm call exceeded deadline of {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised while building or querying the chunk/hierarchy index, the
/// BM25 index, or a vector-store adapter (C2–C4, C8–C9).
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// A chunk's `parent_id` does not resolve to any chunk in the store.
    #[error("dangling parent_id {parent_id:?} on chunk {chunk_id}")]
    DanglingParent {
        /// The chunk whose parent reference is dangling.
        chunk_id: String,
        /// The unresolved parent id.
        parent_id: String,
    },

    /// A cycle was detected while walking `parent_id` edges.
    #[error("cycle detected in chunk hierarchy at chunk {chunk_id}")]
    Cycle {
        /// The chunk at which the cycle was detected.
        chunk_id: String,
    },

    /// A vector-store call failed in a way that may succeed on retry.
    #[error("transient vector store error: {0}")]
    Transient(String),

    /// A vector-store call failed in a way retries cannot fix (schema/quota).
    #[error("fatal vector store error: {0}")]
    Fatal(String),

    /// A dense search hit referenced a chunk id absent from the chunk map.
    #[error("unresolved dense hit for point {point_id}")]
    UnresolvedHit {
        /// The vector-store point id that could not be mapped to a chunk.
        point_id: String,
    },
}

/// Errors raised by the semantic router (C5).
#[derive(Error, Debug)]
pub enum RouterError {
    /// No routes were configured.
    #[error("no routes configured")]
    NoRoutes,

    /// A route has no examples to embed.
    #[error("route {name} has no examples")]
    EmptyRoute {
        /// Name of the route missing examples.
        name: String,
    },

    /// The query or example embedding failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
}

/// Errors raised by the NL-to-SQL engine (C13).
#[derive(Error, Debug)]
pub enum SqlError {
    /// The generated text contained no extractable `SELECT` statement.
    #[error("no SELECT statement found in generated text")]
    NoStatementFound,

    /// The statement failed the safety validator.
    #[error("unsafe SQL rejected: {reason}")]
    UnsafeStatement {
        /// Why the statement was rejected.
        reason: String,
    },

    /// Execution against the relational store failed.
    #[error("sql execution failed: {0}")]
    ExecutionFailed(String),

    /// All retries were exhausted without producing a safe, executable query.
    #[error("exhausted {attempts} retries without a valid query: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error encountered before giving up.
        last_error: String,
    },
}

/// Errors raised by the Supervisor workflow (C14).
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Appending to a session's transcript failed.
    #[error("failed to append to transcript for session {session_id}: {reason}")]
    TranscriptWrite {
        /// The session whose transcript append failed.
        session_id: String,
        /// Underlying failure reason.
        reason: String,
    },

    /// An unknown or unreachable workflow node was requested.
    #[error("unknown workflow node: {0}")]
    UnknownNode(String),
}

/// Errors raised by the relational store (§6: `view_tra_cuu_diem`, `truong`,
/// `nganh`).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// The store has not been initialised (schema not yet created).
    #[error("relational store not initialized")]
    NotInitialized,

    /// A school lookup (`school_info` node, §4.15) found no matching row.
    #[error("school not found: {query}")]
    SchoolNotFound {
        /// The search term that matched no row.
        query: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// I/O-specific errors for file operations (chunk ingestion file, CLI I/O).
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::Config { message: "bad config".to_string() };
        assert_eq!(err.to_string(), "configuration error: bad config");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotInitialized;
        assert_eq!(err.to_string(), "relational store not initialized");

        let err = StorageError::SchoolNotFound { query: "hvktqs".to_string() };
        assert!(err.to_string().contains("hvktqs"));
    }

    #[test]
    fn test_io_error_display() {
        let err = IoError::FileNotFound { path: "/tmp/test.txt".to_string() };
        assert_eq!(err.to_string(), "file not found: /tmp/test.txt");
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::MissingArgument("--file".to_string());
        assert_eq!(err.to_string(), "missing required argument: --file");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::NotInitialized;
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_retrieval_error_display() {
        let err = RetrievalError::DanglingParent {
            chunk_id: "c1".to_string(),
            parent_id: "missing".to_string(),
        };
        assert!(err.to_string().contains("dangling parent_id"));

        let err = RetrievalError::Cycle { chunk_id: "c2".to_string() };
        assert!(err.to_string().contains("cycle detected"));

        let err = RetrievalError::UnresolvedHit { point_id: "p1".to_string() };
        assert!(err.to_string().contains("unresolved dense hit"));
    }

    #[test]
    fn test_retrieval_error_into_error() {
        let err: Error = RetrievalError::Transient("timeout".to_string()).into();
        assert!(matches!(err, Error::Retrieval(RetrievalError::Transient(_))));
    }

    #[test]
    fn test_router_error_display() {
        assert_eq!(RouterError::NoRoutes.to_string(), "no routes configured");
        let err = RouterError::EmptyRoute { name: "faq".to_string() };
        assert!(err.to_string().contains("faq"));
    }

    #[test]
    fn test_sql_error_display() {
        let err = SqlError::UnsafeStatement { reason: "contains DROP".to_string() };
        assert!(err.to_string().contains("contains DROP"));

        let err = SqlError::RetriesExhausted { attempts: 3, last_error: "bad sql".to_string() };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains("bad sql"));
    }

    #[test]
    fn test_supervisor_error_display() {
        let err = SupervisorError::TranscriptWrite {
            session_id: "s1".to_string(),
            reason: "locked".to_string(),
        };
        assert!(err.to_string().contains('s'));
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn test_from_rusqlite_error_to_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_from_serde_json_error_to_storage_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
