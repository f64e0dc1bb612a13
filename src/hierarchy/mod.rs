//! Chunk store + hierarchy index (C2).
//!
//! Holds the immutable-after-build map of legal chunks and the
//! parent/children graph over them, following the legal hierarchy
//! Chuong (Chapter) > Muc (Section) > Dieu (Article) > Khoan (Clause) >
//! Diem (Point). Per §9 Design Notes, the graph is read-only after build and
//! represented with id-keyed lookups rather than owning references, so there
//! is no cyclic-ownership concern.

use crate::error::{Result, RetrievalError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Legal section type, derived from which metadata field is the most
/// specific one present on a chunk. Drives both the reranker's metadata
/// score (C10) and the merger's depth map (C11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    /// Diem (Point) - most specific, depth 5.
    Diem,
    /// Khoan (Clause) - depth 4.
    Khoan,
    /// Dieu (Article) - depth 3.
    Dieu,
    /// Muc (Section) - depth 2.
    Muc,
    /// Chuong (Chapter) - depth 1.
    Chuong,
    /// No identifiable section metadata.
    Unknown,
}

impl SectionType {
    /// Depth in the legal hierarchy, used by the merger's overlap-resolution
    /// rule (deeper chunk wins) and by the reranker's structure weight.
    #[must_use]
    pub const fn depth(self) -> u8 {
        match self {
            Self::Chuong => 1,
            Self::Muc => 2,
            Self::Dieu => 3,
            Self::Khoan => 4,
            Self::Diem => 5,
            Self::Unknown => 0,
        }
    }

    /// Structural weight used by the reranker's metadata score (§4.11).
    #[must_use]
    pub const fn reranker_weight(self) -> f32 {
        match self {
            Self::Diem => 0.9,
            Self::Dieu => 0.8,
            Self::Khoan => 0.7,
            Self::Muc => 0.6,
            Self::Chuong => 0.3,
            Self::Unknown => 0.4,
        }
    }
}

/// Structured metadata attached to a chunk, mirroring the ingestion file's
/// `metadata` object verbatim (unknown keys are preserved in `extra`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document identifier.
    pub source: Option<String>,
    /// Chapter number/label.
    pub chapter: Option<String>,
    /// Chapter title.
    pub chapter_title: Option<String>,
    /// Section number/label.
    pub section: Option<String>,
    /// Section title.
    pub section_title: Option<String>,
    /// Article number/label.
    pub article: Option<String>,
    /// Article title.
    pub article_title: Option<String>,
    /// Clause number/label.
    pub clause: Option<String>,
    /// Point label (often a single letter, e.g. `"a"`).
    pub point: Option<String>,
    /// Unknown/extensible metadata keys preserved from ingestion.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Derives the chunk's [`SectionType`] from the most specific populated
    /// field, with a point-letter heuristic (`^[a-zđ]\)`) mirroring the
    /// original classifier for cases where `point` itself is unset but the
    /// content is prefixed with a lettered point marker.
    #[must_use]
    pub fn section_type(&self, content: &str) -> SectionType {
        if self.point.is_some() || starts_with_point_letter(content) {
            SectionType::Diem
        } else if self.clause.is_some() {
            SectionType::Khoan
        } else if self.article.is_some() {
            SectionType::Dieu
        } else if self.section.is_some() {
            SectionType::Muc
        } else if self.chapter.is_some() {
            SectionType::Chuong
        } else {
            SectionType::Unknown
        }
    }

    /// Builds the bracketed legal path, e.g. `[Chuong 2 > Dieu 5 > Khoan 1]`,
    /// omitting levels that are absent (C11 §4.12 step 1).
    #[must_use]
    pub fn legal_path(&self) -> String {
        let mut parts = Vec::new();
        if let Some(c) = &self.chapter {
            parts.push(format!("Chuong {c}"));
        }
        if let Some(s) = &self.section {
            parts.push(format!("Muc {s}"));
        }
        if let Some(a) = &self.article {
            parts.push(format!("Dieu {a}"));
        }
        if let Some(k) = &self.clause {
            parts.push(format!("Khoan {k}"));
        }
        if let Some(p) = &self.point {
            parts.push(format!("Diem {p}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("[{}]", parts.join(" > "))
        }
    }
}

fn starts_with_point_letter(content: &str) -> bool {
    let trimmed = content.trim_start();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), Some(')')) => c.is_ascii_lowercase() || c == 'đ',
        _ => false,
    }
}

/// A leaf unit of legal text, as defined in §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque globally-unique chunk id.
    pub id: String,
    /// UTF-8 content.
    pub content: String,
    /// Structured metadata.
    pub metadata: ChunkMetadata,
    /// Parent chunk id, if any.
    pub parent_id: Option<String>,
    /// Ordered ids of direct children, reflecting document order.
    pub children_ids: Vec<String>,
}

impl Chunk {
    /// Derives this chunk's section type.
    #[must_use]
    pub fn section_type(&self) -> SectionType {
        self.metadata.section_type(&self.content)
    }
}

/// The ingestion file's top-level shape: either a bare array of chunks or an
/// object wrapping them under `"chunks"` (§6 External Interfaces).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestFile {
    Bare(Vec<Chunk>),
    Wrapped { chunks: Vec<Chunk> },
}

/// Read-only in-memory index over the chunk graph, built once at startup.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<String, Chunk>,
    /// Insertion order, used as the tie-break for "earlier document order".
    order: Vec<String>,
}

impl ChunkStore {
    /// Parses an ingestion payload (bare array or `{"chunks": [...]}`) and
    /// builds the store, validating the invariants from §4.2:
    /// no dangling `parent_id`, no cycles, `children_ids` consistent with
    /// `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::DanglingParent`] or [`RetrievalError::Cycle`]
    /// if the invariants are violated.
    pub fn from_json(data: &str) -> Result<Self> {
        let parsed: IngestFile = serde_json::from_str(data)
            .map_err(|e| RetrievalError::Fatal(format!("invalid ingestion JSON: {e}")))?;
        let chunks = match parsed {
            IngestFile::Bare(c) | IngestFile::Wrapped { chunks: c } => c,
        };
        Self::build(chunks)
    }

    /// Builds a store from already-parsed chunks, enforcing the same
    /// invariants as [`Self::from_json`].
    pub fn build(mut chunks: Vec<Chunk>) -> Result<Self> {
        let order: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let mut map: HashMap<String, Chunk> =
            chunks.drain(..).map(|c| (c.id.clone(), c)).collect();

        // step 2: derive children_ids from parent_id, deduplicating.
        let parent_links: Vec<(String, String)> = map
            .values()
            .filter_map(|c| c.parent_id.clone().map(|p| (p, c.id.clone())))
            .collect();
        for (parent_id, child_id) in &parent_links {
            if !map.contains_key(parent_id) {
                return Err(RetrievalError::DanglingParent {
                    chunk_id: child_id.clone(),
                    parent_id: parent_id.clone(),
                }
                .into());
            }
        }
        for (parent_id, child_id) in parent_links {
            if let Some(parent) = map.get_mut(&parent_id) {
                if !parent.children_ids.contains(&child_id) {
                    parent.children_ids.push(child_id);
                }
            }
        }

        let store = Self { chunks: map, order };
        store.check_acyclic()?;
        Ok(store)
    }

    fn check_acyclic(&self) -> Result<()> {
        for id in self.chunks.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(id.as_str());
            while let Some(cur) = current {
                if !seen.insert(cur) {
                    return Err(RetrievalError::Cycle {
                        chunk_id: id.clone(),
                    }
                    .into());
                }
                current = self
                    .chunks
                    .get(cur)
                    .and_then(|c| c.parent_id.as_deref());
            }
        }
        Ok(())
    }

    /// Number of chunks in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True if the store holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Looks up a chunk by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Iterates all chunks in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.order.iter().filter_map(|id| self.chunks.get(id))
    }

    /// Walks `parent_id` up to `k` levels, nearest first.
    #[must_use]
    pub fn parents(&self, chunk: &Chunk, k: usize) -> Vec<&Chunk> {
        let mut result = Vec::new();
        let mut current = chunk.parent_id.as_deref();
        while let Some(id) = current {
            if result.len() >= k {
                break;
            }
            let Some(parent) = self.chunks.get(id) else {
                break;
            };
            result.push(parent);
            current = parent.parent_id.as_deref();
        }
        result
    }

    /// Returns the direct children of a chunk, in document order.
    #[must_use]
    pub fn children(&self, chunk: &Chunk) -> Vec<&Chunk> {
        chunk
            .children_ids
            .iter()
            .filter_map(|id| self.chunks.get(id))
            .collect()
    }

    /// Returns up to `k` siblings of a chunk (other children of its parent),
    /// excluding the chunk itself.
    #[must_use]
    pub fn siblings(&self, chunk: &Chunk, k: usize) -> Vec<&Chunk> {
        let Some(parent_id) = chunk.parent_id.as_deref() else {
            return Vec::new();
        };
        let Some(parent) = self.chunks.get(parent_id) else {
            return Vec::new();
        };
        parent
            .children_ids
            .iter()
            .filter(|id| id.as_str() != chunk.id)
            .filter_map(|id| self.chunks.get(id))
            .take(k)
            .collect()
    }

    /// Breadth-first traversal over all descendants of a chunk.
    #[must_use]
    pub fn descendants(&self, chunk: &Chunk) -> Vec<&Chunk> {
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = chunk.children_ids.iter().map(String::as_str).collect();
        let mut visited = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(c) = self.chunks.get(id) else {
                continue;
            };
            result.push(c);
            queue.extend(c.children_ids.iter().map(String::as_str));
        }
        result
    }

    /// Returns true if `ancestor` is a (possibly indirect) ancestor of
    /// `descendant`, walking at most `max_depth` levels (C11 §4.12).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &Chunk, descendant: &Chunk, max_depth: u32) -> bool {
        let mut current = descendant.parent_id.as_deref();
        let mut depth = 0;
        while let Some(id) = current {
            if depth >= max_depth {
                return false;
            }
            if id == ancestor.id {
                return true;
            }
            current = self.chunks.get(id).and_then(|c| c.parent_id.as_deref());
            depth += 1;
        }
        false
    }

    /// Returns true if `a` and `b` overlap in the hierarchy: one is an
    /// ancestor of the other (checked in both directions, bounded by
    /// `max_depth`).
    #[must_use]
    pub fn overlaps(&self, a: &Chunk, b: &Chunk, max_depth: u32) -> bool {
        if a.id == b.id {
            return true;
        }
        self.is_ancestor(a, b, max_depth) || self.is_ancestor(b, a, max_depth)
    }
}
