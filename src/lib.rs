//! # tsbot-core
//!
//! Retrieval-and-orchestration core for a Vietnamese legal/admissions
//! question-answering system.
//!
//! The crate answers a natural-language question by routing it through a
//! [`supervisor::Supervisor`] to one of two retrieval engines: a hybrid
//! legal RAG pipeline over hierarchically structured legal text (Chuong >
//! Muc > Dieu > Khoan > Diem), or an NL-to-SQL engine over a fixed
//! admission-score view. The HTTP/WebSocket surface, document ingestion,
//! and the embedding/LLM/reranker/vector-store/relational-store providers
//! themselves are external collaborators, reached only through the trait
//! objects defined in [`embedding`], [`llm`], [`search::vector`], and
//! [`storage`].
//!
//! ## Pipeline modules
//!
//! - [`text`] — diacritic folding, abbreviation expansion, entity
//!   extraction, BM25 tokenisation (C1).
//! - [`hierarchy`] — the chunk store and parent/children index (C2).
//! - [`search::bm25`] — Okapi BM25 lexical scoring (C3).
//! - [`search::vector`] — the vector-store contract and an in-memory
//!   reference implementation (C4).
//! - [`router`] — the semantic intent router (C5).
//! - [`query`] — query-intent analysis, context budgets, query expansion
//!   (C6).
//! - [`cache`] — the bounded semantic answer cache (C7).
//! - [`search::hybrid`] and [`search::rrf`] — the hybrid retriever and
//!   reciprocal rank fusion (C8).
//! - [`enrich`] — sibling/descendant hierarchy enrichment (C9).
//! - [`rerank`] — the cross-encoder/retrieval/metadata ensemble reranker
//!   (C10).
//! - [`context`] — overlap-pruned chunk merging and context assembly (C11).
//! - [`answer`] — the answer composer and citation formatting (C12).
//! - [`sql`] — the constrained NL-to-SQL engine (C13).
//! - [`supervisor`] — the routing state machine (C14).
//!
//! ## Ambient modules
//!
//! [`config`] holds the tunable surface; [`error`] is the layered error
//! taxonomy; [`embedding`] and [`llm`] are the provider traits; [`storage`]
//! is the relational-store contract plus a `SQLite` reference
//! implementation; [`service`] is the explicit service registry that
//! replaces the original design's global singletons. Under the optional
//! `agent` feature, [`agent`] adds `async`/cancellable counterparts of the
//! external-call traits for callers running under `tokio`.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

#[cfg(feature = "agent")]
pub mod agent;
pub mod answer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod hierarchy;
pub mod llm;
pub mod query;
pub mod rerank;
pub mod router;
pub mod search;
pub mod service;
pub mod sql;
pub mod storage;
pub mod supervisor;
pub mod text;

// Re-export the top-level error type at crate root.
pub use error::{Error, Result};

// Re-export the most commonly needed domain types.
pub use config::Config;
pub use hierarchy::{Chunk, ChunkMetadata, ChunkStore, SectionType};
pub use service::ServiceRegistry;
pub use supervisor::{AgentType, Supervisor, SupervisorResponse};

// Re-export CLI types.
pub use cli::{Cli, Commands, execute};
