//! Service registry (§9 Design Notes: "Global singletons").
//!
//! The original system wires `embedding_service`, `llm`, `chunk_store`, and
//! `semantic_cache` as process-wide globals. This crate instead builds one
//! explicit [`ServiceRegistry`] value per process (or per test) that owns
//! every external-call adapter and the process-wide read-only indexes, and
//! hands out borrowed references to whoever needs them — the Supervisor,
//! the CLI demo, or a test. Nothing here is a `static`; constructing a
//! second registry with different adapters (e.g. a mock LLM) is just
//! calling [`ServiceRegistry::new`] again.

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::hierarchy::ChunkStore;
use crate::llm::LlmClient;
use crate::router::{SemanticRouter, default_routes};
use crate::search::bm25::Bm25Index;
use crate::search::vector::{Point, VectorStore};
use crate::storage::RelationalStore;
use crate::supervisor::Supervisor;
use std::collections::HashMap;

/// Name of the legal-chunk collection in the vector store (§6).
pub const LEGAL_COLLECTION: &str = "legal_documents";

/// Owns every process-wide dependency the pipeline needs: the embedder, the
/// LLM client, the relational store, the vector store, the chunk/hierarchy
/// index, the optional BM25 index, the semantic router, and the tunable
/// [`Config`]. Built once at startup; read-only afterwards except for the
/// vector store and relational store, which accept writes through their own
/// interior mutability or `&mut` methods as appropriate.
pub struct ServiceRegistry {
    /// Embedding service (§6).
    pub embedder: Box<dyn Embedder>,
    /// Generative LLM client (§6).
    pub llm: Box<dyn LlmClient>,
    /// Relational store backing `view_tra_cuu_diem`/`truong`/`nganh` (§6).
    pub relational: Box<dyn RelationalStore>,
    /// Vector-store adapter (§4.4).
    pub vector_store: Box<dyn VectorStore>,
    /// Chunk store + hierarchy index (§4.2), built once at startup.
    pub chunk_store: ChunkStore,
    /// BM25 index (§4.3), `None` if the corpus is empty.
    pub bm25: Option<Bm25Index>,
    /// Semantic router (§4.5), with every exemplar pre-embedded.
    pub router: SemanticRouter,
    /// Tunable configuration surface (§6).
    pub config: Config,
}

impl ServiceRegistry {
    /// Builds a registry over already-constructed adapters and a loaded
    /// [`ChunkStore`]: derives the BM25 index and the semantic router, and
    /// upserts every chunk's embedding into `vector_store` under
    /// [`LEGAL_COLLECTION`] in fixed-size batches (§4.2 step 4).
    ///
    /// # Errors
    ///
    /// Returns an error if embedding any chunk fails, if the router cannot
    /// be built (no routes, or an empty route), or if the vector store
    /// rejects the collection/upsert.
    pub fn new(
        embedder: Box<dyn Embedder>,
        llm: Box<dyn LlmClient>,
        relational: Box<dyn RelationalStore>,
        mut vector_store: Box<dyn VectorStore>,
        chunk_store: ChunkStore,
        config: Config,
    ) -> Result<Self> {
        const UPSERT_BATCH_SIZE: usize = 100;
        const PARENT_CONTENT_PREFIX_CHARS: usize = 300;

        let bm25 = if chunk_store.is_empty() {
            None
        } else {
            Some(Bm25Index::build(
                chunk_store.iter().map(|c| (c.id.as_str(), c.content.as_str())),
                config.bm25_k1,
                config.bm25_b,
            ))
        };

        vector_store.create_collection(LEGAL_COLLECTION, config.embedding_dimension)?;
        let mut batch = Vec::with_capacity(UPSERT_BATCH_SIZE);
        for chunk in chunk_store.iter() {
            let title_path = chunk.metadata.legal_path();
            let parent_prefix: String = chunk_store
                .parents(chunk, 1)
                .first()
                .map(|p| p.content.chars().take(PARENT_CONTENT_PREFIX_CHARS).collect())
                .unwrap_or_default();
            let enriched = format!("{title_path} | {parent_prefix} | {}", chunk.content);
            let vector = embedder.embed(&enriched)?;

            let mut payload = HashMap::new();
            payload.insert("chunk_id".to_string(), serde_json::Value::String(chunk.id.clone()));
            payload.insert("content".to_string(), serde_json::Value::String(chunk.content.clone()));

            batch.push(Point { id: chunk.id.clone(), vector, payload });
            if batch.len() >= UPSERT_BATCH_SIZE {
                vector_store.upsert(LEGAL_COLLECTION, &batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            vector_store.upsert(LEGAL_COLLECTION, &batch)?;
        }

        let router = SemanticRouter::build(default_routes(), embedder.as_ref(), &config)?;

        Ok(Self { embedder, llm, relational, vector_store, chunk_store, bm25, router, config })
    }

    /// Builds a [`Supervisor`] borrowing every service in this registry.
    #[must_use]
    pub fn supervisor(&self) -> Supervisor<'_> {
        Supervisor::new(
            &self.router,
            self.embedder.as_ref(),
            self.llm.as_ref(),
            self.relational.as_ref(),
            &self.chunk_store,
            self.vector_store.as_ref(),
            self.bm25.as_ref(),
            &self.config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::hierarchy::{Chunk, ChunkMetadata};
    use crate::llm::MockLlm;
    use crate::search::vector::InMemoryVectorStore;
    use crate::storage::SqliteRelationalStore;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk { id: id.to_string(), content: content.to_string(), metadata: ChunkMetadata::default(), parent_id: None, children_ids: Vec::new() }
    }

    #[test]
    fn new_builds_bm25_and_upserts_vectors_for_nonempty_store() {
        let store = ChunkStore::build(vec![chunk("a", "noi dung dieu a"), chunk("b", "noi dung dieu b")]).expect("build");
        let embedder: Box<dyn Embedder> = Box::new(FallbackEmbedder::new(16));
        let llm: Box<dyn LlmClient> = Box::new(MockLlm::new());
        let relational: Box<dyn RelationalStore> = Box::new(SqliteRelationalStore::open_in_memory().expect("open"));
        let vector_store: Box<dyn VectorStore> = Box::new(InMemoryVectorStore::new());
        let config = Config { embedding_dimension: 16, ..Config::default() };

        let registry = ServiceRegistry::new(embedder, llm, relational, vector_store, store, config).expect("registry");
        assert!(registry.bm25.is_some());
        assert_eq!(registry.vector_store.count(LEGAL_COLLECTION).expect("count"), 2);
    }

    #[test]
    fn new_skips_bm25_for_empty_store() {
        let store = ChunkStore::build(Vec::new()).expect("build");
        let embedder: Box<dyn Embedder> = Box::new(FallbackEmbedder::new(16));
        let llm: Box<dyn LlmClient> = Box::new(MockLlm::new());
        let relational: Box<dyn RelationalStore> = Box::new(SqliteRelationalStore::open_in_memory().expect("open"));
        let vector_store: Box<dyn VectorStore> = Box::new(InMemoryVectorStore::new());
        let config = Config { embedding_dimension: 16, ..Config::default() };

        let registry = ServiceRegistry::new(embedder, llm, relational, vector_store, store, config).expect("registry");
        assert!(registry.bm25.is_none());
    }

    #[test]
    fn supervisor_handles_a_turn_end_to_end() {
        let store = ChunkStore::build(vec![chunk("a", "tieu chuan suc khoe de thi vao quan doi")]).expect("build");
        let embedder: Box<dyn Embedder> = Box::new(FallbackEmbedder::new(16));
        let llm: Box<dyn LlmClient> = Box::new(MockLlm::new().with_text("Cau tra loi mau."));
        let relational: Box<dyn RelationalStore> = Box::new(SqliteRelationalStore::open_in_memory().expect("open"));
        let vector_store: Box<dyn VectorStore> = Box::new(InMemoryVectorStore::new());
        let config = Config { embedding_dimension: 16, ..Config::default() };

        let registry = ServiceRegistry::new(embedder, llm, relational, vector_store, store, config).expect("registry");
        let supervisor = registry.supervisor();
        let mut cache = crate::cache::SemanticCache::new(&registry.config);
        let response = supervisor.handle("s1", "Xin chào", &mut cache).expect("handle");
        assert!(!response.text.is_empty());
    }
}
