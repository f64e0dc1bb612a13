//! Async external-call traits (`agent` feature, §5 Concurrency & Resource Model).
//!
//! The base crate treats every external call (embedding, LLM, vector store,
//! relational store) as potentially blocking I/O with a per-stage deadline,
//! but runs synchronously: callers check elapsed wall-clock time against the
//! deadline themselves. Under the optional `agent` feature — for callers
//! already running under a `tokio` runtime — this module exposes `async`
//! counterparts of the same four traits, implemented generically for any
//! synchronous implementation by running the blocking call on
//! `tokio::task::spawn_blocking` and racing it against `tokio::time::timeout`,
//! so a deadline elapsing actually cancels the caller's `.await` rather than
//! relying on the blocking side noticing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::embedding::Embedder;
use crate::error::{Error, LlmError, Result};
use crate::llm::LlmClient;
use crate::search::vector::{Filter, Hit, VectorStore};
use crate::storage::traits::{Nganh, RelationalStore, Row, Truong};

async fn run_blocking<T, F>(deadline: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let joined = tokio::time::timeout(deadline, tokio::task::spawn_blocking(f)).await;
    match joined {
        Ok(Ok(inner)) => inner,
        Ok(Err(_join_err)) => Err(Error::Llm(LlmError::GenerationFailed("blocking task panicked".to_string()))),
        Err(_elapsed) => Err(Error::Llm(LlmError::Timeout(deadline))),
    }
}

/// Async counterpart of [`LlmClient`], for callers under a `tokio` runtime.
#[async_trait]
pub trait AsyncLlmClient: Send + Sync {
    /// Async, cancellable version of [`LlmClient::generate`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses before the
    /// blocking call completes, or whatever error the underlying call raises.
    async fn generate(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<String>;

    /// Async, cancellable version of [`LlmClient::generate_json`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`], plus [`LlmError::MalformedJson`].
    async fn generate_json(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<Value>;
}

#[async_trait]
impl<T: LlmClient + 'static> AsyncLlmClient for Arc<T> {
    async fn generate(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<String> {
        let client = Arc::clone(self);
        let prompt = prompt.to_string();
        let system = system.map(ToString::to_string);
        run_blocking(deadline, move || client.generate(&prompt, system.as_deref(), deadline)).await
    }

    async fn generate_json(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<Value> {
        let client = Arc::clone(self);
        let prompt = prompt.to_string();
        let system = system.map(ToString::to_string);
        run_blocking(deadline, move || client.generate_json(&prompt, system.as_deref(), deadline)).await
    }
}

/// Async counterpart of [`Embedder`], for callers under a `tokio` runtime.
#[async_trait]
pub trait AsyncEmbedder: Send + Sync {
    /// Async, cancellable version of [`Embedder::embed`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn embed(&self, text: &str, deadline: Duration) -> Result<Vec<f32>>;

    /// Async, cancellable version of [`Embedder::embed_batch`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn embed_batch(&self, texts: &[String], deadline: Duration) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
impl<T: Embedder + 'static> AsyncEmbedder for Arc<T> {
    async fn embed(&self, text: &str, deadline: Duration) -> Result<Vec<f32>> {
        let embedder = Arc::clone(self);
        let text = text.to_string();
        run_blocking(deadline, move || embedder.embed(&text)).await
    }

    async fn embed_batch(&self, texts: &[String], deadline: Duration) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(self);
        let texts = texts.to_vec();
        run_blocking(deadline, move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs)
        })
        .await
    }
}

/// Async counterpart of [`VectorStore::search`], for callers under a `tokio`
/// runtime. Only the read path is exposed here: per §5, vector-store upserts
/// belong to the ingestion path, not the per-request query path, and the
/// trait's write operations take `&mut self`, which doesn't compose with the
/// shared `Arc` a request handler holds.
#[async_trait]
pub trait AsyncVectorStore: Send + Sync {
    /// Async, cancellable version of [`VectorStore::search`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
        min_score: Option<f32>,
        filter: Option<Filter>,
        deadline: Duration,
    ) -> Result<Vec<Hit>>;
}

#[async_trait]
impl<T: VectorStore + 'static> AsyncVectorStore for Arc<T> {
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
        min_score: Option<f32>,
        filter: Option<Filter>,
        deadline: Duration,
    ) -> Result<Vec<Hit>> {
        let store = Arc::clone(self);
        let collection = collection.to_string();
        run_blocking(deadline, move || {
            store.search(&collection, &vector, k, min_score, filter.as_ref())
        })
        .await
    }
}

/// Async counterpart of [`RelationalStore`], for callers under a `tokio` runtime.
#[async_trait]
pub trait AsyncRelationalStore: Send + Sync {
    /// Async, cancellable version of [`RelationalStore::execute_select`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn execute_select(&self, sql: &str, deadline: Duration) -> Result<Vec<Row>>;

    /// Async, cancellable version of [`RelationalStore::find_school`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn find_school(&self, unaccented_query: &str, deadline: Duration) -> Result<Option<Truong>>;

    /// Async, cancellable version of [`RelationalStore::majors_for_school`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Timeout`] if `deadline` elapses first.
    async fn majors_for_school(&self, truong_id: i64, deadline: Duration) -> Result<Vec<Nganh>>;
}

#[async_trait]
impl<T: RelationalStore + 'static> AsyncRelationalStore for Arc<T> {
    async fn execute_select(&self, sql: &str, deadline: Duration) -> Result<Vec<Row>> {
        let store = Arc::clone(self);
        let sql = sql.to_string();
        run_blocking(deadline, move || store.execute_select(&sql)).await
    }

    async fn find_school(&self, unaccented_query: &str, deadline: Duration) -> Result<Option<Truong>> {
        let store = Arc::clone(self);
        let query = unaccented_query.to_string();
        run_blocking(deadline, move || store.find_school(&query)).await
    }

    async fn majors_for_school(&self, truong_id: i64, deadline: Duration) -> Result<Vec<Nganh>> {
        let store = Arc::clone(self);
        run_blocking(deadline, move || store.majors_for_school(truong_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn async_llm_client_wraps_sync_generate() {
        let llm = Arc::new(MockLlm::new().with_text("hello"));
        let text = AsyncLlmClient::generate(&llm, "prompt", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn async_llm_client_generate_json_wraps_sync() {
        let llm = Arc::new(MockLlm::new().with_text(r#"{"ok": true}"#));
        let value = AsyncLlmClient::generate_json(&llm, "prompt", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn async_embedder_wraps_sync_embed() {
        let embedder = Arc::new(FallbackEmbedder::new(16));
        let vector = AsyncEmbedder::embed(&embedder, "xin chao", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(vector.len(), 16);
    }

    #[tokio::test]
    async fn async_embedder_wraps_sync_embed_batch() {
        let embedder = Arc::new(FallbackEmbedder::new(8));
        let texts = vec!["a".to_string(), "b".to_string()];
        let vectors = AsyncEmbedder::embed_batch(&embedder, &texts, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
    }
}
