//! Supervisor workflow (C14).
//!
//! A small state machine orchestrating every other component: `route` picks
//! an agent via the semantic router (C5), falling back to an LLM JSON
//! planner when the router's confidence is too low; the chosen agent runs
//! (`sql`, `rag`, `school_info`, or `general`); a post-SQL gate may fall
//! through to RAG when a SQL query legitimately finds no data but the
//! question could also be answered from regulation text; `combine` merges
//! both answers when both ran; and every turn is appended to a per-session
//! transcript (§4.15).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::answer::{self, Answer};
use crate::cache::SemanticCache;
use crate::config::Config;
use crate::context;
use crate::embedding::Embedder;
use crate::enrich;
use crate::error::{Result, SupervisorError};
use crate::hierarchy::ChunkStore;
use crate::llm::LlmClient;
use crate::query::{self, QueryIntent};
use crate::rerank;
use crate::router::SemanticRouter;
use crate::search::bm25::Bm25Index;
use crate::search::hybrid::{self, dedup_jaccard};
use crate::search::vector::{Filter, VectorStore};
use crate::sql::{self, FewShotExample};
use crate::storage::RelationalStore;
use crate::text;

/// Which agent handles a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentType {
    /// NL-to-SQL engine (C13) against the admission-score view.
    Sql,
    /// Hybrid legal RAG pipeline (C6–C12).
    Rag,
    /// School/major lookup and narration.
    SchoolInfo,
    /// Small talk, greetings, and anything that needs no retrieval.
    General,
    /// The question is too ambiguous to route; ask the user to clarify.
    Clarify,
}

impl AgentType {
    fn from_route(route_name: &str) -> Option<Self> {
        match route_name {
            "score_lookup" | "comparison" => Some(Self::Sql),
            "regulation" | "faq" => Some(Self::Rag),
            "school_info" => Some(Self::SchoolInfo),
            "greeting" => Some(Self::General),
            _ => None,
        }
    }

    fn from_planner_label(label: &str) -> Self {
        match label {
            "sql" => Self::Sql,
            "rag" => Self::Rag,
            "school_info" => Self::SchoolInfo,
            "clarify" => Self::Clarify,
            _ => Self::General,
        }
    }
}

/// One turn appended to a session's transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Turn content.
    pub content: String,
}

/// Final response returned to the caller for one turn.
#[derive(Debug, Clone)]
pub struct SupervisorResponse {
    /// Answer text.
    pub text: String,
    /// Which agent ultimately produced the response.
    pub agent: AgentType,
    /// Sources cited, if the RAG pipeline ran.
    pub sources: Vec<answer::Source>,
}

/// Orchestrates every component to answer one turn, holding per-session
/// transcripts for the lifetime of the process (§4.15).
pub struct Supervisor<'a> {
    router: &'a SemanticRouter,
    embedder: &'a dyn Embedder,
    llm: &'a dyn LlmClient,
    relational: &'a dyn RelationalStore,
    chunk_store: &'a ChunkStore,
    vector_store: &'a dyn VectorStore,
    bm25: Option<&'a Bm25Index>,
    config: &'a Config,
    transcripts: Mutex<HashMap<String, Vec<TranscriptEntry>>>,
}

const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

impl<'a> Supervisor<'a> {
    /// Builds a supervisor over the already-constructed services.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: &'a SemanticRouter,
        embedder: &'a dyn Embedder,
        llm: &'a dyn LlmClient,
        relational: &'a dyn RelationalStore,
        chunk_store: &'a ChunkStore,
        vector_store: &'a dyn VectorStore,
        bm25: Option<&'a Bm25Index>,
        config: &'a Config,
    ) -> Self {
        Self {
            router,
            embedder,
            llm,
            relational,
            chunk_store,
            vector_store,
            bm25,
            config,
            transcripts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy of a session's transcript, empty if the session is new.
    #[must_use]
    pub fn transcript(&self, session_id: &str) -> Vec<TranscriptEntry> {
        self.transcripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn append_transcript(&self, session_id: &str, role: &str, content: &str) {
        self.transcripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(session_id.to_string())
            .or_default()
            .push(TranscriptEntry { role: role.to_string(), content: content.to_string() });
    }

    /// Classifies `question` into an [`AgentType`], using the semantic
    /// router first and falling back to an LLM JSON planner when the router
    /// did not clear its confidence threshold (§4.15 step 1).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RouterError::EmbeddingFailed`] if the query
    /// cannot be embedded.
    pub fn decide_agent(&self, question: &str) -> Result<AgentType> {
        let route = self.router.route(question, self.embedder)?;
        if route.matched {
            if let Some(agent) = AgentType::from_route(&route.intent) {
                return Ok(agent);
            }
        }

        let planner_prompt = format!(
            "Phân loại câu hỏi sau vào một trong các nhãn: sql, rag, school_info, general, clarify. \
             Chỉ trả về JSON dạng {{\"agent\": \"...\"}}.\n\nCâu hỏi: {question}"
        );
        let parsed = self.llm.generate_json(&planner_prompt, None, DEFAULT_DEADLINE);
        let label = parsed
            .ok()
            .and_then(|v| v.get("agent").and_then(|a| a.as_str()).map(ToString::to_string))
            .unwrap_or_else(|| "general".to_string());
        Ok(AgentType::from_planner_label(&label))
    }

    fn run_rag(&self, question: &str, deadline: Duration) -> Result<Answer> {
        let analysis = query::analyse(question);
        let budget = query::context_budget(analysis.intent);
        let variants = query::expand(question, analysis.intent);

        let hits = hybrid::retrieve(
            &variants,
            "legal_documents",
            self.chunk_store,
            self.vector_store,
            self.bm25,
            self.embedder,
            None::<&Filter>,
            self.config,
        )?;
        let deduped = dedup_jaccard(hits, self.chunk_store, self.config.dedup_threshold);

        let ranked = rerank::rerank(question, &deduped, self.chunk_store, self.embedder, self.config.reranker_top_k * 2)?;

        let query_vector = self.embedder.encode_query(question)?;
        let blocks = context::build_context(&ranked, question, &query_vector, self.chunk_store, self.embedder, &budget, self.config)?;

        answer::compose(question, analysis.intent, &blocks, &ranked, self.chunk_store, self.llm, deadline)
    }

    fn run_school_info(&self, question: &str, deadline: Duration) -> Result<String> {
        let unaccented = text::remove_diacritics(&question.to_lowercase());
        let Some(school) = self.relational.find_school(&unaccented)? else {
            return self.run_rag(question, deadline).map(|a| a.text);
        };
        let majors = self.relational.majors_for_school(school.id)?;
        let major_names: Vec<&str> = majors.iter().map(|m| m.ten_nganh.as_str()).collect();
        let prompt = format!(
            "Giới thiệu ngắn gọn về trường \"{}\" (loại hình: {}). Mô tả: {}. Các ngành đào tạo: {}.",
            school.ten_truong,
            school.loai_truong.as_deref().unwrap_or("không rõ"),
            school.mo_ta.as_deref().unwrap_or("không có mô tả"),
            if major_names.is_empty() { "chưa có dữ liệu".to_string() } else { major_names.join(", ") },
        );
        self.llm.generate(&prompt, None, deadline).map_err(Into::into)
    }

    fn run_general(&self, question: &str, deadline: Duration) -> Result<String> {
        let prompt = format!(
            "Trả lời ngắn gọn, thân thiện câu nói sau của người dùng đang tìm hiểu tuyển sinh quân đội: {question}"
        );
        self.llm.generate(&prompt, None, deadline).map_err(Into::into)
    }

    /// Handles one turn end to end: cache lookup, routing, agent dispatch,
    /// the post-SQL RAG fallback gate, combining, caching the result, and
    /// appending the transcript (§4.15).
    ///
    /// # Errors
    ///
    /// Propagates errors from routing, retrieval, or the LLM that are not
    /// themselves recoverable by a documented fallback.
    pub fn handle(&self, session_id: &str, question: &str, cache: &mut SemanticCache) -> Result<SupervisorResponse> {
        self.append_transcript(session_id, "user", question);

        let query_vector = self.embedder.encode_query(question)?;
        if let Some(cached) = cache.lookup(&query_vector) {
            self.append_transcript(session_id, "assistant", &cached);
            return Ok(SupervisorResponse { text: cached, agent: AgentType::General, sources: Vec::new() });
        }

        let agent = self.decide_agent(question)?;
        let response = self.dispatch(session_id, question, agent, DEFAULT_DEADLINE)?;

        cache.insert(query_vector, response.text.clone());
        self.append_transcript(session_id, "assistant", &response.text);
        Ok(response)
    }

    fn dispatch(&self, session_id: &str, question: &str, agent: AgentType, deadline: Duration) -> Result<SupervisorResponse> {
        match agent {
            AgentType::Clarify => Ok(SupervisorResponse {
                text: "Bạn có thể nói rõ hơn câu hỏi của mình không?".to_string(),
                agent,
                sources: Vec::new(),
            }),
            AgentType::General => {
                let text = self.run_general(question, deadline)?;
                Ok(SupervisorResponse { text, agent, sources: Vec::new() })
            }
            AgentType::SchoolInfo => {
                let text = self.run_school_info(question, deadline)?;
                Ok(SupervisorResponse { text, agent, sources: Vec::new() })
            }
            AgentType::Rag => {
                let ans = self.run_rag(question, deadline)?;
                Ok(SupervisorResponse { text: ans.text, agent, sources: ans.sources })
            }
            AgentType::Sql => self.run_sql_then_gate(session_id, question, deadline),
        }
    }

    /// Runs the SQL engine, then applies the post-SQL gate (§4.15 step 4):
    /// if rows were found, the SQL answer stands. If none were found, a
    /// fallback to RAG is only attempted when the question's C6 query
    /// intent plausibly covers prose regulations as well as numeric lookups
    /// ([`should_fallback_to_rag`]) — the spec's "original intent ∈ {rag,
    /// both}" gate. Otherwise a pure SQL miss returns the SQL engine's own
    /// "no data" message rather than dragging in irrelevant RAG text.
    fn run_sql_then_gate(&self, _session_id: &str, question: &str, deadline: Duration) -> Result<SupervisorResponse> {
        let config = self.config;
        let sql_result = sql::answer(question, Vec::<FewShotExample>::new(), self.relational, self.llm, config, deadline);

        match sql_result {
            Ok(sql_answer) if !sql_answer.rows.is_empty() => {
                Ok(SupervisorResponse { text: sql_answer.text, agent: AgentType::Sql, sources: Vec::new() })
            }
            Ok(sql_answer) if !should_fallback_to_rag(query::analyse(question).intent) => {
                Ok(SupervisorResponse { text: sql_answer.text, agent: AgentType::Sql, sources: Vec::new() })
            }
            Ok(sql_answer) => {
                let rag_answer = self.run_rag(question, deadline)?;
                let combined = self.combine(question, Some(&sql_answer.text), Some(&rag_answer.text), deadline)?;
                Ok(SupervisorResponse { text: combined, agent: AgentType::Sql, sources: rag_answer.sources })
            }
            Err(_) if !should_fallback_to_rag(query::analyse(question).intent) => {
                Ok(SupervisorResponse { text: sql::SQL_FAILURE_MESSAGE.to_string(), agent: AgentType::Sql, sources: Vec::new() })
            }
            Err(_) => {
                let rag_answer = self.run_rag(question, deadline)?;
                let combined = self.combine(question, None, Some(&rag_answer.text), deadline)?;
                Ok(SupervisorResponse { text: combined, agent: AgentType::Sql, sources: rag_answer.sources })
            }
        }
    }

    /// Merges a SQL narration and a RAG narration into one coherent answer
    /// via the LLM, used when both agents produced a partial answer to the
    /// same turn (§4.15 combine node). Either side may be absent.
    fn combine(&self, question: &str, sql_text: Option<&str>, rag_text: Option<&str>, deadline: Duration) -> Result<String> {
        match (sql_text, rag_text) {
            (None, None) => Err(SupervisorError::UnknownNode("combine called with no inputs".to_string()).into()),
            (Some(s), None) => Ok(s.to_string()),
            (None, Some(r)) => Ok(r.to_string()),
            (Some(s), Some(r)) => {
                let prompt = format!(
                    "Kết hợp hai phần trả lời sau cho câu hỏi \"{question}\" thành một câu trả lời mạch lạc, \
                     không lặp lại thông tin trùng:\n\nPhần số liệu: {s}\n\nPhần quy định: {r}"
                );
                self.llm.generate(&prompt, None, deadline).map_err(Into::into)
            }
        }
    }
}

/// Maps a query intent produced by the RAG-side analyser onto whether a
/// no-result SQL answer should still attempt RAG, matching §4.15's rule
/// "fall through to rag only if the original intent plausibly covers prose
/// regulations as well as numeric lookups".
#[must_use]
pub fn should_fallback_to_rag(original_intent: QueryIntent) -> bool {
    matches!(original_intent, QueryIntent::Explanation | QueryIntent::List | QueryIntent::General)
}
