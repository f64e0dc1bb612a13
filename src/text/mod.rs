//! Text normaliser (C1).
//!
//! Vietnamese-aware normalisation, abbreviation expansion, entity extraction,
//! and the BM25 tokeniser shared by [`crate::search::bm25`].

use regex::Regex;
use std::sync::LazyLock;

/// Folds a single Vietnamese diacritic letter down to its base Latin letter.
/// Characters with no mapping are returned unchanged.
#[must_use]
pub fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
        | 'ẩ' | 'ẫ' | 'ậ' => 'a',
        'À' | 'Á' | 'Ả' | 'Ã' | 'Ạ' | 'Ă' | 'Ằ' | 'Ắ' | 'Ẳ' | 'Ẵ' | 'Ặ' | 'Â' | 'Ầ' | 'Ấ'
        | 'Ẩ' | 'Ẫ' | 'Ậ' => 'A',
        'đ' => 'd',
        'Đ' => 'D',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'È' | 'É' | 'Ẻ' | 'Ẽ' | 'Ẹ' | 'Ê' | 'Ề' | 'Ế' | 'Ể' | 'Ễ' | 'Ệ' => 'E',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'Ì' | 'Í' | 'Ỉ' | 'Ĩ' | 'Ị' => 'I',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
        | 'ở' | 'ỡ' | 'ợ' => 'o',
        'Ò' | 'Ó' | 'Ỏ' | 'Õ' | 'Ọ' | 'Ô' | 'Ồ' | 'Ố' | 'Ổ' | 'Ỗ' | 'Ộ' | 'Ơ' | 'Ờ' | 'Ớ'
        | 'Ở' | 'Ỡ' | 'Ợ' => 'O',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'Ù' | 'Ú' | 'Ủ' | 'Ũ' | 'Ụ' | 'Ư' | 'Ừ' | 'Ứ' | 'Ử' | 'Ữ' | 'Ự' => 'U',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        'Ỳ' | 'Ý' | 'Ỷ' | 'Ỹ' | 'Ỵ' => 'Y',
        other => other,
    }
}

/// Removes Vietnamese diacritics from a string, letter by letter.
#[must_use]
pub fn remove_diacritics(text: &str) -> String {
    text.chars().map(fold_diacritic).collect()
}

/// Closed set of common admissions abbreviations, expanded at word boundaries
/// before normalisation. Keys are matched case-insensitively.
const SCHOOL_ALIASES: &[(&str, &str)] = &[
    ("hvktqs", "học viện kỹ thuật quân sự"),
    ("hvqs", "học viện quân sự"),
    ("hvqy", "học viện quân y"),
    ("hvbc", "học viện biên chống"),
    ("hvpkkq", "học viện phòng không không quân"),
    ("ktqs", "kỹ thuật quân sự"),
    ("truong sq", "trường sĩ quan"),
    ("sq", "sĩ quan"),
    ("cb", "công binh"),
    ("tt", "thông tin"),
    ("pkkq", "phòng không không quân"),
    ("hq", "hải quân"),
    ("bca", "bộ công an"),
    ("ca", "công an"),
    ("qđ", "quân đội"),
    ("qs", "quân sự"),
];

fn alias_patterns() -> Vec<(Regex, &'static str)> {
    SCHOOL_ALIASES
        .iter()
        .filter_map(|(abbrev, full)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(abbrev));
            Regex::new(&pattern).ok().map(|re| (re, *full))
        })
        .collect()
}

static ALIAS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(alias_patterns);

/// Expands closed-set abbreviations (school/military jargon) at word
/// boundaries. Input is lowercased first, matching the original processor.
#[must_use]
pub fn expand_abbreviations(text: &str) -> String {
    let mut lowered = text.to_lowercase();
    for (re, full) in ALIAS_PATTERNS.iter() {
        lowered = re.replace_all(&lowered, *full).into_owned();
    }
    lowered
}

/// Normalises Vietnamese text for search and comparison: NFC, diacritic
/// folding, optional lowercasing, whitespace collapse.
#[must_use]
pub fn normalise(text: &str, lowercase: bool) -> String {
    use unicode_normalization::UnicodeNormalization;
    let nfc: String = text.nfc().collect();
    let folded = remove_diacritics(&nfc);
    let folded = if lowercase { folded.to_lowercase() } else { folded };
    collapse_whitespace(&folded)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

static YEAR_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20[0-9]{2})\b").expect("valid regex"));
static YEAR_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:n[aă]m)\s*(\d{2})\b").expect("valid regex"));

/// Extracts an admissions year: full `20XX` form first, falling back to the
/// short `năm NN` form (`<50` maps to `20NN`, otherwise `19NN`).
#[must_use]
pub fn extract_year(text: &str) -> Option<i32> {
    if let Some(caps) = YEAR_FULL.captures(text) {
        return caps.get(1)?.as_str().parse().ok();
    }
    let folded = remove_diacritics(&text.to_lowercase());
    let caps = YEAR_SHORT.captures(&folded)?;
    let short: i32 = caps.get(1)?.as_str().parse().ok()?;
    Some(if short < 50 { 2000 + short } else { 1900 + short })
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("valid regex"));

/// Extracts every number in the text, accepting `.` or `,` as the decimal
/// separator.
#[must_use]
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', ".").parse().ok())
        .collect()
}

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(\d{1,2}(?:[.,]\d+)?)\s*điểm").expect("valid regex"),
        Regex::new(r"điểm\s*(?:là|:)?\s*(\d{1,2}(?:[.,]\d+)?)").expect("valid regex"),
        Regex::new(r"(\d{1,2}(?:[.,]\d+)?)\s*(?:khối|block)").expect("valid regex"),
    ]
});

/// Extracts an admission score in `[0, 30]` near the word "điểm", falling
/// back to a bare number in the plausible range `[15, 30]`.
#[must_use]
pub fn extract_score(text: &str) -> Option<f64> {
    let lowered = text.to_lowercase();
    for pattern in SCORE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lowered) {
            if let Some(m) = caps.get(1) {
                if let Ok(score) = m.as_str().replace(',', ".").parse::<f64>() {
                    if (0.0..=30.0).contains(&score) {
                        return Some(score);
                    }
                }
            }
        }
    }
    extract_numbers(text).into_iter().find(|n| (15.0..=30.0).contains(n))
}

static KHOI_THI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([ABCD]\d{2})\b").expect("valid regex"));

const KHOI_MAPPING: &[(&str, &str)] = &[
    ("khoi a", "A00"),
    ("a", "A00"),
    ("khoi b", "B00"),
    ("b", "B00"),
    ("khoi c", "C00"),
    ("c", "C00"),
    ("khoi d", "D01"),
    ("d", "D01"),
];

/// Extracts an exam subject group code (`A00`, `B00`, ...), accepting an
/// explicit code or a normalised textual description.
#[must_use]
pub fn extract_khoi_thi(text: &str) -> Option<String> {
    if let Some(caps) = KHOI_THI_RE.captures(&text.to_uppercase()) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    let normalised = normalise(text, true);
    for (key, value) in KHOI_MAPPING {
        if normalised.contains(key) {
            return Some((*value).to_string());
        }
    }
    None
}

/// Extracts a gender entity: `"nu"` or `"nam"`, matching the lowercase token
/// values the admission-score view stores.
#[must_use]
pub fn extract_gender(text: &str) -> Option<&'static str> {
    let normalised = normalise(text, true);
    if normalised.contains("nu") {
        Some("nu")
    } else if normalised.contains("nam sinh") || normalised.contains("nam gioi") {
        Some("nam")
    } else {
        None
    }
}

/// Extracts a region entity: `"mien_bac"` or `"mien_nam"`.
#[must_use]
pub fn extract_region(text: &str) -> Option<&'static str> {
    let normalised = normalise(text, true);
    if normalised.contains("mien bac") {
        Some("mien_bac")
    } else if normalised.contains("mien nam") {
        Some("mien_nam")
    } else {
        None
    }
}

const QUESTION_WORDS: &[&str] = &[
    "bao nhiêu",
    "bao nhieu",
    "như thế nào",
    "nhu the nao",
    "thế nào",
    "the nao",
    "làm sao",
    "lam sao",
    "tại sao",
    "tai sao",
    "vì sao",
    "vi sao",
    "ở đâu",
    "o dau",
    "khi nào",
    "khi nao",
    "ai",
    "gì",
    "gi",
    "nào",
    "nao",
    "có thể",
    "co the",
    "có phải",
    "co phai",
    "có không",
    "co khong",
    "được không",
    "duoc khong",
    "cho hỏi",
    "cho hoi",
    "xin hỏi",
];

/// Returns true if the text looks like a question: contains `?` or one of the
/// closed set of Vietnamese question phrases.
#[must_use]
pub fn is_question(text: &str) -> bool {
    if text.contains('?') {
        return true;
    }
    let lowered = text.to_lowercase();
    QUESTION_WORDS.iter().any(|w| lowered.contains(w))
}

/// Vietnamese stop-words excluded from BM25 tokenisation (C3). Fixed per the
/// design's open question (b); not runtime-tunable. Matched against
/// [`tokenise_bm25`]'s tokens, which have already gone through [`normalise`]'s
/// diacritic folding — so every entry here is the folded (unaccented) form,
/// not the accented spelling a reader would type.
pub const STOPWORDS: &[&str] = &[
    "la", "va", "cua", "co", "cho", "duoc", "trong", "voi", "cac", "nhung", "nay", "do", "mot",
    "de", "khi", "ve", "tu", "nhu", "khong", "se", "da", "toi", "ban", "chung", "ta", "ho", "no",
    "minh", "anh", "chi", "em", "ong", "ba", "thi", "neu", "nen", "vi", "boi",
    "ma", "hay", "hoac", "roi", "cung", "van", "dang", "day", "kia", "ay", "nao", "gi",
    "ai", "sao", "bao", "nhieu", "may", "lai", "nua", "vua", "moi", "rat", "qua", "lam",
    "the", "vay", "o", "a", "u", "nha", "nhe", "oi", "thoi", "tren", "duoi", "giua", "ngoai",
];

/// Tokenises text for BM25 indexing: lowercase, drop non-word/non-Vietnamese
/// characters, split on whitespace, drop stop-words and single-character
/// tokens. Idempotent when applied to already-tokenised output composed with
/// [`normalise`] (§8 "tokenisation" property).
#[must_use]
pub fn tokenise_bm25(text: &str) -> Vec<String> {
    let normalised = normalise(text, true);
    normalised
        .split_whitespace()
        .filter(|tok| tok.chars().count() > 1)
        .filter(|tok| !STOPWORDS.contains(tok))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_lowercase_and_uppercase_diacritics() {
        assert_eq!(remove_diacritics("Điểm chuẩn Đại học"), "Diem chuan Dai hoc");
        assert_eq!(remove_diacritics("hỏi"), "hoi");
    }

    #[test]
    fn normalise_collapses_whitespace_and_lowercases() {
        assert_eq!(normalise("  Điểm   Chuẩn  ", true), "diem chuan");
    }

    #[test]
    fn expands_known_abbreviation_at_word_boundary() {
        let expanded = expand_abbreviations("hvktqs tuyển sinh");
        assert!(expanded.starts_with("học viện kỹ thuật quân sự"));
    }

    #[test]
    fn does_not_expand_inside_a_longer_word() {
        let expanded = expand_abbreviations("cabin");
        assert_eq!(expanded, "cabin");
    }

    #[test]
    fn extracts_full_year() {
        assert_eq!(extract_year("điểm chuẩn năm 2024"), Some(2024));
    }

    #[test]
    fn extracts_short_year_before_fifty_as_2000s() {
        assert_eq!(extract_year("năm 24"), Some(2024));
    }

    #[test]
    fn extracts_short_year_at_or_above_fifty_as_1900s() {
        assert_eq!(extract_year("năm 99"), Some(1999));
    }

    #[test]
    fn extract_year_returns_none_when_absent() {
        assert_eq!(extract_year("không có năm nào ở đây"), None);
    }

    #[test]
    fn extracts_numbers_with_comma_decimal() {
        assert_eq!(extract_numbers("26,5 điểm"), vec![26.5]);
    }

    #[test]
    fn extracts_score_near_diem_keyword() {
        assert_eq!(extract_score("tôi được 26.5 điểm"), Some(26.5));
    }

    #[test]
    fn extract_score_rejects_out_of_range() {
        assert_eq!(extract_score("100 điểm"), None);
    }

    #[test]
    fn extract_score_falls_back_to_plausible_bare_number() {
        assert_eq!(extract_score("tôi có 27 rồi"), Some(27.0));
    }

    #[test]
    fn extracts_explicit_khoi_thi_code() {
        assert_eq!(extract_khoi_thi("khối a01"), Some("A01".to_string()));
    }

    #[test]
    fn extracts_khoi_thi_from_text_description() {
        assert_eq!(extract_khoi_thi("khối d"), Some("D01".to_string()));
    }

    #[test]
    fn extracts_gender_entity() {
        assert_eq!(extract_gender("điểm chuẩn nữ"), Some("nu"));
        assert_eq!(extract_gender("điểm chuẩn nam giới"), Some("nam"));
        assert_eq!(extract_gender("điểm chuẩn"), None);
    }

    #[test]
    fn extracts_region_entity() {
        assert_eq!(extract_region("thí sinh miền bắc"), Some("mien_bac"));
        assert_eq!(extract_region("thí sinh miền nam"), Some("mien_nam"));
    }

    #[test]
    fn detects_question_mark() {
        assert!(is_question("Trường nào tốt?"));
    }

    #[test]
    fn detects_question_word_without_mark() {
        assert!(is_question("cho hỏi điểm chuẩn năm nay"));
    }

    #[test]
    fn non_question_text_is_not_flagged() {
        assert!(!is_question("điểm chuẩn năm 2024 là 26.5"));
    }

    #[test]
    fn tokeniser_drops_stopwords_and_single_chars() {
        let tokens = tokenise_bm25("Điểm chuẩn của Học viện là a");
        assert!(!tokens.iter().any(|t| STOPWORDS.contains(&t.as_str())));
        assert!(tokens.iter().all(|t| t.chars().count() > 1));
    }

    #[test]
    fn tokeniser_is_idempotent_under_normalise() {
        let once = tokenise_bm25("Điểm CHUẨN học viện");
        let twice = tokenise_bm25(&once.join(" "));
        assert_eq!(once, twice);
    }
}
