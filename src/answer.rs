//! Answer composer (C12).
//!
//! Assembles the final grounded-answer prompt from the rendered context
//! blocks (C11) and the query's intent rider, calls the LLM, and packages
//! the answer together with a `sources[]` list for citation display (§4.13).

use crate::context::ContextBlock;
use crate::error::Result;
use crate::hierarchy::{Chunk, ChunkStore};
use crate::llm::LlmClient;
use crate::query::QueryIntent;
use crate::rerank::RankedHit;
use std::time::Duration;

const MAX_PREVIEW_CHARS: usize = 200;

/// Fixed prompt header: role, grounding rule, citation style, forbidden
/// vocabulary (§4.13 step 1). Kept as one constant so the prompt's wording
/// doesn't drift between call sites.
const SYSTEM_PROMPT: &str = "Bạn là trợ lý tư vấn tuyển sinh các trường quân đội. \
Chỉ trả lời dựa trên thông tin được cung cấp trong phần ngữ cảnh bên dưới; \
nếu ngữ cảnh không đủ để trả lời, hãy nói rõ là chưa có đủ thông tin. \
Khi trích dẫn, hãy nêu rõ vị trí pháp lý (chương, điều, khoản) nếu có. \
Không suy đoán, không bịa đặt số liệu, không dùng các từ như \"có lẽ\" hoặc \"có thể\" \
khi nói về số liệu cụ thể.";

fn intent_rider(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Specific => "Trả lời ngắn gọn, trực tiếp vào điều khoản được hỏi.",
        QueryIntent::Comparison => "Trình bày so sánh rõ ràng, có thể dùng gạch đầu dòng cho từng tiêu chí.",
        QueryIntent::List => "Liệt kê đầy đủ các mục liên quan dưới dạng danh sách.",
        QueryIntent::Explanation => "Giải thích rõ lý do hoặc cơ chế, dựa trên ngữ cảnh đã cho.",
        QueryIntent::General => "Trả lời một cách tự nhiên và hữu ích.",
    }
}

/// One cited source, derived from an accepted chunk (§4.13 step 3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Source {
    /// Bracketed legal path, e.g. `[Chuong 2 > Dieu 5]`.
    pub legal_path: String,
    /// Chapter label, if present.
    pub chapter: Option<String>,
    /// Article label, if present.
    pub article: Option<String>,
    /// Source document identifier, if present.
    pub document: Option<String>,
    /// The chunk's final reranked score.
    pub score: f32,
    /// Content preview, truncated to [`MAX_PREVIEW_CHARS`].
    pub content_preview: String,
    /// Full chunk content.
    pub content: String,
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= MAX_PREVIEW_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_PREVIEW_CHARS).collect();
    format!("{truncated}...")
}

fn to_source(chunk: &Chunk, score: f32) -> Source {
    Source {
        legal_path: chunk.metadata.legal_path(),
        chapter: chunk.metadata.chapter.clone(),
        article: chunk.metadata.article.clone(),
        document: chunk.metadata.source.clone(),
        score,
        content_preview: truncate_preview(&chunk.content),
        content: chunk.content.clone(),
    }
}

/// The composed answer plus its supporting sources (§4.13).
#[derive(Debug, Clone)]
pub struct Answer {
    /// LLM-generated answer text.
    pub text: String,
    /// Sources cited, in the order the context was assembled.
    pub sources: Vec<Source>,
}

/// Assembles the prompt from `blocks`, calls `llm`, and packages the result
/// with sources built from `ranked`/`store` (§4.13).
///
/// # Errors
///
/// Returns [`crate::error::LlmError::GenerationFailed`] or
/// [`crate::error::LlmError::Timeout`] if the LLM call fails.
pub fn compose(
    query: &str,
    intent: QueryIntent,
    blocks: &[ContextBlock],
    ranked: &[RankedHit],
    store: &ChunkStore,
    llm: &dyn LlmClient,
    deadline: Duration,
) -> Result<Answer> {
    let context_text = blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n");
    let prompt = format!(
        "Ngữ cảnh:\n{context_text}\n\nCâu hỏi: {query}\n\n{}",
        intent_rider(intent)
    );

    let text = llm.generate(&prompt, Some(SYSTEM_PROMPT), deadline)?;

    let score_by_id: std::collections::HashMap<&str, f32> =
        ranked.iter().map(|r| (r.chunk_id.as_str(), r.final_score)).collect();

    let sources = blocks
        .iter()
        .filter_map(|b| store.get(&b.chunk_id).map(|c| to_source(c, score_by_id.get(b.chunk_id.as_str()).copied().unwrap_or(0.0))))
        .collect();

    Ok(Answer { text, sources })
}
