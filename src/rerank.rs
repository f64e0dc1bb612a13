//! Reranker (C10).
//!
//! Combines three signals into one final score per candidate: a
//! cross-encoder-style relevance score (here, built from the embedder's
//! cosine similarity against a richly-constructed passage, since the base
//! crate has no mandatory cross-encoder runtime), the candidate's original
//! retrieval score, and a metadata score (section-type weight plus title
//! overlap plus a length bonus). An optional LLM-grader pass can further
//! adjust the top candidates, flagged non-deterministic (§4.11).

use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::hierarchy::{Chunk, ChunkStore};
use crate::llm::LlmClient;
use crate::search::hybrid::FusedHit;
use std::time::Duration;

/// A reranked candidate with its component scores retained for diagnostics.
#[derive(Debug, Clone)]
pub struct RankedHit {
    /// Chunk id.
    pub chunk_id: String,
    /// Final blended score.
    pub final_score: f32,
    /// Cross-encoder-style relevance score.
    pub cross_encoder_score: f32,
    /// Original retrieval score (carried through from [`FusedHit`]).
    pub retrieval_score: f32,
    /// Section-type/title/length metadata score.
    pub metadata_score: f32,
}

/// Builds the rich passage a cross-encoder would score: legal path prefix
/// plus content, so structural context participates in the similarity
/// (§4.11 step 1).
fn rich_passage(chunk: &Chunk) -> String {
    let path = chunk.metadata.legal_path();
    if path.is_empty() {
        chunk.content.clone()
    } else {
        format!("{path} {}", chunk.content)
    }
}

/// Maps an embedding-space cosine similarity, which already lies in
/// `[-1, 1]`, onto `[0, 1]` the way a genuine cross-encoder logit (typically
/// roughly bounded in `[-10, 10]`) would be squashed (§4.11 step 1).
fn cross_encoder_score(query: &str, chunk: &Chunk, embedder: &dyn Embedder) -> Result<f32> {
    let query_vector = embedder.encode_query(query)?;
    let passage_vector = embedder.embed(&rich_passage(chunk))?;
    let cos = cosine_similarity(&query_vector, &passage_vector);
    Ok((cos + 1.0) / 2.0)
}

fn title_overlap(query: &str, chunk: &Chunk) -> f32 {
    let title = chunk
        .metadata
        .article_title
        .as_deref()
        .or(chunk.metadata.section_title.as_deref())
        .or(chunk.metadata.chapter_title.as_deref())
        .unwrap_or("");
    if title.is_empty() {
        return 0.0;
    }
    let query_tokens: std::collections::HashSet<String> = crate::text::tokenise_bm25(query).into_iter().collect();
    let title_tokens: std::collections::HashSet<String> = crate::text::tokenise_bm25(title).into_iter().collect();
    if query_tokens.is_empty() || title_tokens.is_empty() {
        return 0.0;
    }
    let hits = query_tokens.intersection(&title_tokens).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = hits as f32 / query_tokens.len() as f32;
    ratio.min(1.0)
}

/// Stepwise length bonus: `0.1` once content passes 200 characters, `0.05`
/// past 100, otherwise `0` (§4.11 step 2).
fn length_bonus(chunk: &Chunk) -> f32 {
    let len = chunk.content.chars().count();
    if len > 200 {
        0.1
    } else if len > 100 {
        0.05
    } else {
        0.0
    }
}

/// Metadata score: section-type structural weight (0.5), title overlap with
/// the query (0.4), length bonus (0.1) (§4.11 step 2).
fn metadata_score(query: &str, chunk: &Chunk) -> f32 {
    let structure = chunk.section_type().reranker_weight();
    let title = title_overlap(query, chunk);
    let length = length_bonus(chunk);
    0.5 * structure + 0.4 * title + 0.1 * length
}

/// Reranks `hits` against `query`, returning up to `top_k` candidates sorted
/// by descending final score (§4.11).
///
/// When `cross_encoder` scoring succeeds for a hit, the final score blends
/// `0.55` cross-encoder, `0.35` retrieval, `0.10` metadata; otherwise it
/// falls back to `0.7` retrieval, `0.3` metadata (§4.11 step 3).
///
/// # Errors
///
/// Returns an error only if resolving the chunk store or embedding fails in
/// a way that is not itself recoverable by falling back (unresolved hits are
/// skipped, matching the retriever's dangling-hit policy).
pub fn rerank(query: &str, hits: &[FusedHit], store: &ChunkStore, embedder: &dyn Embedder, top_k: usize) -> Result<Vec<RankedHit>> {
    let mut ranked = Vec::with_capacity(hits.len());

    for hit in hits {
        let Some(chunk) = store.get(&hit.chunk_id) else {
            continue;
        };
        #[allow(clippy::cast_possible_truncation)]
        let retrieval_score = hit.score as f32;
        let metadata = metadata_score(query, chunk);

        let (final_score, ce_score) = match cross_encoder_score(query, chunk, embedder) {
            Ok(ce) => (0.55 * ce + 0.35 * retrieval_score + 0.10 * metadata, ce),
            Err(_) => (0.7 * retrieval_score + 0.3 * metadata, 0.0),
        };

        ranked.push(RankedHit {
            chunk_id: hit.chunk_id.clone(),
            final_score,
            cross_encoder_score: ce_score,
            retrieval_score,
            metadata_score: metadata,
        });
    }

    ranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(top_k);
    Ok(ranked)
}

/// Asks an LLM grader to output a `[0, 1]` relevance opinion for the top
/// candidate, as a non-deterministic refinement pass some deployments enable
/// (§4.11 step 4). Never fails the overall rerank: a grader error or
/// malformed response just leaves `final_score` untouched.
pub fn apply_llm_grader(query: &str, ranked: &mut [RankedHit], store: &ChunkStore, grader: &dyn LlmClient, deadline: Duration) {
    for hit in ranked {
        let Some(chunk) = store.get(&hit.chunk_id) else {
            continue;
        };
        let prompt = format!(
            "Trên thang điểm từ 0 đến 1, đoạn văn sau liên quan đến câu hỏi \"{query}\" ở mức nào? \
             Chỉ trả lời bằng một số thập phân.\n\nĐoạn văn: {}",
            chunk.content
        );
        let Ok(text) = grader.generate(&prompt, None, deadline) else {
            continue;
        };
        if let Ok(grade) = text.trim().parse::<f32>() {
            let clamped = grade.clamp(0.0, 1.0);
            hit.final_score = 0.5 * hit.final_score + 0.5 * clamped;
        }
    }
}
