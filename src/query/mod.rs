//! Query analyser/expander (C6).
//!
//! Regex-based intent classification over four shapes plus `general`, used
//! to pick an adaptive context budget (§4.6), and a closed-dictionary query
//! expander that generates up to three variant phrasings for the hybrid
//! retriever (C8) to search.

use std::sync::LazyLock;

use regex::Regex;

/// Query intent, distinct from the Supervisor's routing intent (C5): this
/// one only shapes the RAG pipeline's context budget and prompt rider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// Asks about one specific fact ("Điều 5 quy định gì").
    Specific,
    /// Compares two or more things.
    Comparison,
    /// Asks for an enumeration ("các điều kiện là gì").
    List,
    /// Asks for a reason or mechanism ("tại sao", "giải thích").
    Explanation,
    /// None of the above matched.
    General,
}

impl QueryIntent {
    /// String form used in logs and prompts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::Comparison => "comparison",
            Self::List => "list",
            Self::Explanation => "explanation",
            Self::General => "general",
        }
    }
}

/// Adaptive context budget per §4.6's table: caps on accepted chunks and on
/// related (sibling/descendant) chunks pulled in by the hierarchy enricher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Maximum accepted chunks after merging (C11).
    pub max_chunks: usize,
    /// Whether to include parent context blocks (always true per the table).
    pub include_parents: bool,
    /// Maximum descendants to pull in per accepted chunk (C9).
    pub max_descendants: usize,
    /// Maximum siblings to pull in per accepted chunk (C9).
    pub max_siblings: usize,
}

/// Returns the adaptive budget for `intent`, matching §4.6's table exactly.
#[must_use]
pub const fn context_budget(intent: QueryIntent) -> ContextBudget {
    match intent {
        QueryIntent::Specific => {
            ContextBudget { max_chunks: 3, include_parents: true, max_descendants: 2, max_siblings: 2 }
        }
        QueryIntent::Comparison => {
            ContextBudget { max_chunks: 4, include_parents: true, max_descendants: 1, max_siblings: 2 }
        }
        QueryIntent::List => {
            ContextBudget { max_chunks: 5, include_parents: true, max_descendants: 3, max_siblings: 3 }
        }
        QueryIntent::Explanation => {
            ContextBudget { max_chunks: 4, include_parents: true, max_descendants: 2, max_siblings: 2 }
        }
        QueryIntent::General => {
            ContextBudget { max_chunks: 3, include_parents: true, max_descendants: 1, max_siblings: 1 }
        }
    }
}

struct PatternSet {
    patterns: Vec<Regex>,
    expected: usize,
}

impl PatternSet {
    fn matched(&self, lowered: &str) -> usize {
        self.patterns.iter().filter(|re| re.is_match(lowered)).count()
    }

    fn confidence(&self, lowered: &str) -> f32 {
        if self.expected == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.matched(lowered) as f32 / self.expected as f32;
        ratio.min(1.0)
    }
}

fn build(patterns: &[&str]) -> PatternSet {
    PatternSet {
        patterns: patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect(),
        expected: patterns.len(),
    }
}

// Patterns are matched against `text::normalise`'s output, which always
// diacritic-folds (§4.1) — so every pattern here is written in folded
// (unaccented) Vietnamese, not the accented spelling a reader would type.
static COMPARISON: LazyLock<PatternSet> =
    LazyLock::new(|| build(&[r"so sanh", r"khac (nhau|biet)", r"\bhay\b.*\bhoac\b", r"nen chon"]));
static LIST: LazyLock<PatternSet> =
    LazyLock::new(|| build(&[r"danh sach", r"cac (dieu|quy dinh|truong|nganh)", r"nhung (gi|dieu)", r"liet ke"]));
static EXPLANATION: LazyLock<PatternSet> =
    LazyLock::new(|| build(&[r"tai sao", r"vi sao", r"giai thich", r"nhu the nao", r"ly do"]));
static SPECIFIC: LazyLock<PatternSet> =
    LazyLock::new(|| build(&[r"dieu \d+", r"khoan \d+", r"diem [a-z]\)", r"quy dinh (cu the|tai)"]));

/// Query analysis result: intent plus a confidence in `[0, 1]` (matched
/// patterns / expected patterns for that intent's set, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct Analysis {
    /// Classified intent.
    pub intent: QueryIntent,
    /// Confidence for the winning intent.
    pub confidence: f32,
}

/// Classifies `query` into one of the four shapes or `general`, by counting
/// regex matches per category and taking the best-scoring non-empty one.
#[must_use]
pub fn analyse(query: &str) -> Analysis {
    let lowered = crate::text::normalise(query, true);
    let candidates = [
        (QueryIntent::Comparison, COMPARISON.confidence(&lowered)),
        (QueryIntent::List, LIST.confidence(&lowered)),
        (QueryIntent::Explanation, EXPLANATION.confidence(&lowered)),
        (QueryIntent::Specific, SPECIFIC.confidence(&lowered)),
    ];
    let best = candidates
        .into_iter()
        .filter(|(_, score)| *score > 0.0)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    match best {
        Some((intent, confidence)) => Analysis { intent, confidence },
        None => Analysis { intent: QueryIntent::General, confidence: 0.0 },
    }
}

/// Closed synonym dictionary (`original_source`'s `query_processor.py`
/// `SYNONYMS` table), used to generate a synonym-substituted variant.
const SYNONYMS: &[(&str, &str)] = &[
    ("điểm chuẩn", "điểm trúng tuyển"),
    ("tuyển sinh", "xét tuyển"),
    ("quy định", "quy chế"),
    ("điều kiện", "tiêu chuẩn"),
    ("thủ tục", "quy trình"),
    ("sức khỏe", "thể lực"),
    ("học viện", "trường"),
];

fn synonym_variant(normalised: &str) -> Option<String> {
    for (from, to) in SYNONYMS {
        if normalised.contains(from) {
            return Some(normalised.replacen(from, to, 1));
        }
    }
    None
}

fn template_variant(query: &str, intent: QueryIntent) -> Option<String> {
    match intent {
        QueryIntent::Explanation => Some(format!("giải thích {query}")),
        QueryIntent::Comparison => Some(format!("so sánh {query}")),
        QueryIntent::List => Some(format!("danh sách {query}")),
        QueryIntent::Specific | QueryIntent::General => None,
    }
}

/// Expands `query` into up to three variants: the original, a
/// synonym-substituted form, and an intent-templated form, with duplicates
/// removed while preserving first-seen order (§4.6).
#[must_use]
pub fn expand(query: &str, intent: QueryIntent) -> Vec<String> {
    // Synonym keys keep their diacritics (they're spliced straight into the
    // variant), so matching runs over a plain lowercase copy of `query`, not
    // `text::normalise`'s diacritic-folded form used by `analyse` above.
    let lowered = query.to_lowercase();
    let mut variants = vec![query.to_string()];

    if let Some(syn) = synonym_variant(&lowered) {
        variants.push(syn);
    }
    if let Some(templated) = template_variant(query, intent) {
        variants.push(templated);
    }

    let mut seen = std::collections::HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_comparison_intent() {
        let a = analyse("So sánh Học viện KTQS và Học viện Quân y");
        assert_eq!(a.intent, QueryIntent::Comparison);
    }

    #[test]
    fn classifies_list_intent() {
        let a = analyse("Danh sách các điều kiện xét tuyển");
        assert_eq!(a.intent, QueryIntent::List);
    }

    #[test]
    fn classifies_explanation_intent() {
        let a = analyse("Tại sao cần khám sức khỏe");
        assert_eq!(a.intent, QueryIntent::Explanation);
    }

    #[test]
    fn classifies_specific_intent() {
        let a = analyse("Điều 5 quy định cụ thể những gì");
        assert_eq!(a.intent, QueryIntent::Specific);
    }

    #[test]
    fn falls_back_to_general_when_nothing_matches() {
        let a = analyse("Xin chào");
        assert_eq!(a.intent, QueryIntent::General);
        assert!((a.confidence - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn context_budget_matches_table_for_list() {
        let budget = context_budget(QueryIntent::List);
        assert_eq!(budget.max_chunks, 5);
        assert_eq!(budget.max_descendants, 3);
        assert_eq!(budget.max_siblings, 3);
        assert!(budget.include_parents);
    }

    #[test]
    fn context_budget_matches_table_for_specific() {
        let budget = context_budget(QueryIntent::Specific);
        assert_eq!(budget.max_chunks, 3);
        assert_eq!(budget.max_descendants, 2);
    }

    #[test]
    fn expand_includes_original_query_first() {
        let variants = expand("điều kiện tuyển sinh", QueryIntent::General);
        assert_eq!(variants[0], "điều kiện tuyển sinh");
    }

    #[test]
    fn expand_adds_synonym_variant() {
        let variants = expand("điều kiện tuyển sinh là gì", QueryIntent::General);
        assert!(variants.iter().any(|v| v.contains("tiêu chuẩn") || v.contains("xét tuyển")));
    }

    #[test]
    fn expand_adds_intent_template_for_explanation() {
        let variants = expand("sao phải khám sức khỏe", QueryIntent::Explanation);
        assert!(variants.iter().any(|v| v.starts_with("giải thích")));
    }

    #[test]
    fn expand_deduplicates_identical_variants() {
        let variants = expand("xin chào", QueryIntent::General);
        let unique: std::collections::HashSet<_> = variants.iter().collect();
        assert_eq!(unique.len(), variants.len());
    }

    #[test]
    fn expand_never_exceeds_three_variants() {
        let variants = expand("so sánh điều kiện tuyển sinh", QueryIntent::Comparison);
        assert!(variants.len() <= 3);
    }
}
