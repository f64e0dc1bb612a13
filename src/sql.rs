//! Natural-language-to-SQL engine (C13).
//!
//! The 9-step pipeline of §4.14: entity extraction, few-shot example
//! retrieval, prompt construction, SQL extraction from the model's raw
//! completion, deterministic value-fixing, safety validation, execution
//! against [`RelationalStore`], deterministic markdown-table rendering, and
//! a bounded retry loop that feeds the prior attempt's error back to the
//! model.

use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::{Result, SqlError};
use crate::llm::LlmClient;
use crate::storage::{RelationalStore, Row};
use crate::text;

/// Canned message returned by the Supervisor (§4.15) when the SQL engine
/// exhausts its retries and the routed intent does not license a RAG
/// fallback (§8 scenario 6: "the standard SQL failure message").
pub const SQL_FAILURE_MESSAGE: &str =
    "Xin lỗi, tôi chưa thể truy vấn được dữ liệu điểm chuẩn phù hợp với câu hỏi này. Bạn vui lòng thử diễn đạt lại câu hỏi.";

/// Entities pulled out of the natural-language question before prompting,
/// used both to enrich the prompt and, post-hoc, to sanity-check the
/// generated SQL's literals (§4.14 step 1).
#[derive(Debug, Clone, Default)]
pub struct ExtractedEntities {
    /// Admissions year, if mentioned.
    pub year: Option<i32>,
    /// Admission score, if mentioned.
    pub score: Option<f64>,
    /// Exam subject group code, if mentioned.
    pub khoi_thi: Option<String>,
    /// Gender (`"nam"`/`"nu"`), if mentioned.
    pub gioi_tinh: Option<String>,
    /// Region (`"mien_bac"`/`"mien_nam"`), if mentioned.
    pub khu_vuc: Option<String>,
}

/// Extracts entities from `question` using the C1 text extractors (§4.14
/// step 1).
#[must_use]
pub fn extract_entities(question: &str) -> ExtractedEntities {
    ExtractedEntities {
        year: text::extract_year(question),
        score: text::extract_score(question),
        khoi_thi: text::extract_khoi_thi(question),
        gioi_tinh: text::extract_gender(question).map(ToString::to_string),
        khu_vuc: text::extract_region(question).map(ToString::to_string),
    }
}

/// One few-shot (question, SQL) example for prompting.
#[derive(Debug, Clone)]
pub struct FewShotExample {
    /// Example natural-language question.
    pub question: String,
    /// Matching `SELECT` statement against `view_tra_cuu_diem`.
    pub sql: String,
}

/// Hardcoded fallback examples, used when no vector-backed example store is
/// wired in, or it returns nothing (§4.14 step 2).
#[must_use]
pub fn fallback_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            question: "Điểm chuẩn Học viện Kỹ thuật Quân sự năm 2024 là bao nhiêu".to_string(),
            sql: "SELECT * FROM view_tra_cuu_diem WHERE nam = 2024 AND ten_khong_dau LIKE '%hoc vien ky thuat quan su%'".to_string(),
        },
        FewShotExample {
            question: "Với 26 điểm khối A00 có vào được Học viện Hải quân không".to_string(),
            sql: "SELECT * FROM view_tra_cuu_diem WHERE ma_khoi = 'A00' AND ten_khong_dau LIKE '%hoc vien hai quan%' AND diem_chuan <= 26".to_string(),
        },
        FewShotExample {
            question: "So sánh điểm chuẩn 2023 và 2024 của Học viện Quân y".to_string(),
            sql: "SELECT * FROM view_tra_cuu_diem WHERE nam IN (2023, 2024) AND ten_khong_dau LIKE '%hoc vien quan y%' ORDER BY nam".to_string(),
        },
        FewShotExample {
            question: "Điểm chuẩn dành cho nữ các trường quân đội".to_string(),
            sql: "SELECT * FROM view_tra_cuu_diem WHERE gioi_tinh = 'nu'".to_string(),
        },
        FewShotExample {
            question: "Chỉ tiêu tuyển sinh ngành công nghệ thông tin năm nay".to_string(),
            sql: "SELECT * FROM view_tra_cuu_diem WHERE ten_nganh_khong_dau LIKE '%cong nghe thong tin%' ORDER BY nam DESC".to_string(),
        },
    ]
}

/// Picks up to `limit` few-shot examples. Plugging in a vector-backed
/// `sql_examples` collection is left to the caller (via `retrieved`); when
/// empty, the closed fallback set above is used (§4.14 step 2).
#[must_use]
pub fn pick_examples(retrieved: Vec<FewShotExample>, limit: usize) -> Vec<FewShotExample> {
    let mut examples = retrieved;
    if examples.is_empty() {
        examples = fallback_examples();
    }
    examples.truncate(limit);
    examples
}

/// The 14 fixed rules embedded in the system prompt (§4.14 step 3,
/// supplemented from the distillation's SQL generator).
const SYSTEM_RULES: &str = "Bạn là bộ sinh câu lệnh SQL cho hệ thống tra cứu điểm chuẩn tuyển sinh quân đội. \
Tuân thủ nghiêm ngặt các quy tắc sau:
1. Chỉ được sinh câu lệnh SELECT, không bao giờ sinh INSERT/UPDATE/DELETE/DROP/ALTER.
2. Chỉ được truy vấn trên view duy nhất: view_tra_cuu_diem.
3. Không bao giờ dùng nhiều câu lệnh (không dùng dấu chấm phẩy nối câu).
4. Luôn dùng LIKE '%...%' COLLATE NOCASE khi so khớp tên trường/ngành đã bỏ dấu (cột ten_khong_dau, ten_nganh_khong_dau).
5. Cột gioi_tinh chỉ nhận giá trị 'nam' hoặc 'nu' (chữ thường, không dấu).
6. Cột khu_vuc chỉ nhận giá trị 'mien_bac' hoặc 'mien_nam' (chữ thường, không dấu, có gạch dưới).
7. Cột nam là năm tuyển sinh dạng số nguyên (ví dụ 2024).
8. Cột ma_khoi là mã khối thi dạng chữ in hoa cộng số (ví dụ A00, D01).
9. Không tự bịa tên cột không có trong view.
10. Khi câu hỏi so sánh nhiều năm, dùng nam IN (...).
11. Khi câu hỏi hỏi về điểm cụ thể đạt được, so sánh diem_chuan <= điểm của thí sinh.
12. Luôn trả về toàn bộ các cột cần thiết để trả lời câu hỏi, ưu tiên SELECT *.
13. Không thêm LIMIT trừ khi người dùng yêu cầu rõ ràng một số lượng kết quả.
14. Chỉ trả về câu lệnh SQL, không giải thích, không dùng markdown code fence.";

/// Builds the full prompt for one generation attempt, including any prior
/// error fed back for a retry (§4.14 step 3).
#[must_use]
pub fn build_prompt(question: &str, entities: &ExtractedEntities, examples: &[FewShotExample], prior_error: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("Ví dụ:\n");
    for example in examples {
        prompt.push_str(&format!("Câu hỏi: {}\nSQL: {}\n\n", example.question, example.sql));
    }
    prompt.push_str(&format!("Thực thể đã trích xuất: {entities:?}\n\n"));
    if let Some(err) = prior_error {
        prompt.push_str(&format!("Câu truy vấn trước đó bị lỗi: {err}\nHãy sửa lại.\n\n"));
    }
    prompt.push_str(&format!("Câu hỏi: {question}\nSQL:"));
    prompt
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```(?:sql)?\s*([\s\S]*?)```").expect("valid regex"));
static THINK_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Extracts the SQL statement from a raw LLM completion: strips
/// `<think>...</think>` blocks, unwraps a markdown code fence if present,
/// and trims whitespace and a trailing semicolon (§4.14 step 4).
#[must_use]
pub fn extract_sql(raw: &str) -> String {
    let without_thinking = THINK_TAGS.replace_all(raw, "");
    let unfenced = if let Some(caps) = CODE_FENCE.captures(&without_thinking) {
        caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| without_thinking.to_string())
    } else {
        without_thinking.to_string()
    };
    unfenced.trim().trim_end_matches(';').trim().to_string()
}

static GIOI_TINH_FIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)gioi_tinh\s*=\s*'(nữ|nu|nam)'").expect("valid regex"));
static KHU_VUC_FIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)khu_vuc\s*=\s*'([^']*)'").expect("valid regex"));

fn fix_gioi_tinh_value(v: &str) -> &'static str {
    let normalised = text::normalise(v, true);
    if normalised.contains("nu") { "nu" } else { "nam" }
}

fn fix_khu_vuc_value(v: &str) -> Option<&'static str> {
    let normalised = text::normalise(v, true);
    if normalised.contains("bac") {
        Some("mien_bac")
    } else if normalised.contains("nam") {
        Some("mien_nam")
    } else {
        None
    }
}

/// Deterministically rewrites `gioi_tinh`/`khu_vuc` literal values to the
/// canonical lowercase, unaccented, underscored forms the schema stores.
/// When `entities` carries an extracted gender/region, that value overrides
/// whatever literal the model wrote; otherwise the model's own literal is
/// just canonicalised (§4.14 step 5).
#[must_use]
pub fn fix_values(sql: &str, entities: &ExtractedEntities) -> String {
    let fixed = GIOI_TINH_FIX.replace_all(sql, |caps: &regex::Captures<'_>| {
        let value = entities.gioi_tinh.as_deref().unwrap_or_else(|| fix_gioi_tinh_value(&caps[1]));
        format!("gioi_tinh = '{value}'")
    });
    KHU_VUC_FIX
        .replace_all(&fixed, |caps: &regex::Captures<'_>| {
            if let Some(value) = entities.khu_vuc.as_deref() {
                return format!("khu_vuc = '{value}'");
            }
            match fix_khu_vuc_value(&caps[1]) {
                Some(canon) => format!("khu_vuc = '{canon}'"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "attach", "pragma",
    "exec", "replace", "grant", "revoke", "--", "/*",
];

/// Validates a SQL statement is a single, read-only `SELECT` against the
/// `view_tra_cuu_diem` contract: must start with `SELECT`, contain no
/// forbidden keyword, and contain no statement separator (§4.14 step 6).
///
/// # Errors
///
/// Returns [`SqlError::UnsafeStatement`] if any rule is violated.
pub fn validate(sql: &str) -> Result<()> {
    let lowered = sql.to_lowercase();
    if !lowered.trim_start().starts_with("select") {
        return Err(SqlError::UnsafeStatement { reason: "statement must start with SELECT".to_string() }.into());
    }
    if sql.trim_end_matches(';').contains(';') {
        return Err(SqlError::UnsafeStatement { reason: "multiple statements are not allowed".to_string() }.into());
    }
    for keyword in FORBIDDEN_KEYWORDS {
        if lowered.contains(keyword) {
            return Err(SqlError::UnsafeStatement { reason: format!("forbidden keyword: {keyword}") }.into());
        }
    }
    if !lowered.contains("view_tra_cuu_diem") {
        return Err(SqlError::UnsafeStatement { reason: "statement must query view_tra_cuu_diem".to_string() }.into());
    }
    Ok(())
}

static LIMIT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("valid regex"));

/// Appends `LIMIT 50` when `sql` carries no `LIMIT` clause of its own, so
/// every executed query is bounded regardless of what the model wrote
/// (§4.14 step 7).
#[must_use]
fn enforce_limit(sql: &str) -> String {
    if LIMIT_KEYWORD.is_match(sql) {
        sql.to_string()
    } else {
        format!("{} LIMIT 50", sql.trim_end_matches(';').trim())
    }
}

const ROW_LIMIT: usize = 50;

fn value_display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A group of rows sharing every column except `ma_khoi`, with the distinct
/// `ma_khoi` values merged into one comma-joined cell (§4.14 step 8).
#[derive(Debug, Clone)]
struct GroupedRow {
    key: Vec<(String, String)>,
    ma_khoi_values: Vec<String>,
}

/// Renders `rows` (already capped to [`ROW_LIMIT`]) as a deterministic
/// markdown table, grouping rows that share every column except `ma_khoi`
/// and merging their `ma_khoi` values with `", "` (§4.14 step 8).
#[must_use]
pub fn render_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(không có kết quả)".to_string();
    }

    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns.sort();
    let group_columns: Vec<&String> = columns.iter().filter(|c| c.as_str() != "ma_khoi").collect();

    let mut groups: Vec<GroupedRow> = Vec::new();
    for row in rows.iter().take(ROW_LIMIT) {
        let key: Vec<(String, String)> = group_columns
            .iter()
            .map(|c| ((*c).clone(), row.get(c.as_str()).map(value_display).unwrap_or_default()))
            .collect();
        let khoi = row.get("ma_khoi").map(value_display).unwrap_or_default();

        if let Some(existing) = groups.iter_mut().find(|g| g.key == key) {
            if !khoi.is_empty() && !existing.ma_khoi_values.contains(&khoi) {
                existing.ma_khoi_values.push(khoi);
            }
        } else {
            groups.push(GroupedRow { key, ma_khoi_values: if khoi.is_empty() { Vec::new() } else { vec![khoi] } });
        }
    }

    let mut header: Vec<String> = group_columns.iter().map(|c| (*c).clone()).collect();
    if columns.iter().any(|c| c == "ma_khoi") {
        header.push("ma_khoi".to_string());
    }

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}|\n", header.iter().map(|_| "---").collect::<Vec<_>>().join("|")));
    for group in &groups {
        let mut cells: Vec<String> = group.key.iter().map(|(_, v)| v.clone()).collect();
        if header.last().is_some_and(|h| h == "ma_khoi") {
            cells.push(group.ma_khoi_values.join(", "));
        }
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

/// Final result of the SQL engine: the narrated markdown answer plus the raw
/// rows it was built from.
#[derive(Debug, Clone)]
pub struct SqlAnswer {
    /// LLM-narrated one-to-three-sentence introduction plus the rendered
    /// markdown table.
    pub text: String,
    /// Raw rows returned by the final accepted query.
    pub rows: Vec<Row>,
    /// The accepted SQL statement.
    pub sql: String,
}

/// Runs the full NL-to-SQL pipeline: builds the prompt, asks `llm`,
/// extracts/fixes/validates the SQL, executes it, and narrates the result,
/// retrying up to `config.sql_max_retries` times on a validation or
/// execution failure, feeding the error back into the next prompt (§4.14).
///
/// # Errors
///
/// Returns [`SqlError::RetriesExhausted`] if every attempt fails.
pub fn answer(question: &str, examples: Vec<FewShotExample>, store: &dyn RelationalStore, llm: &dyn LlmClient, config: &Config, deadline: Duration) -> Result<SqlAnswer> {
    let entities = extract_entities(question);
    let examples = pick_examples(examples, config.sql_few_shot_examples);

    let mut prior_error: Option<String> = None;
    let mut last_err = String::new();

    for _attempt in 0..config.sql_max_retries.max(1) {
        let prompt = build_prompt(question, &entities, &examples, prior_error.as_deref());
        let raw = match llm.generate(&prompt, Some(SYSTEM_RULES), deadline) {
            Ok(text) => text,
            Err(e) => {
                last_err = e.to_string();
                prior_error = Some(last_err.clone());
                continue;
            }
        };

        let extracted = extract_sql(&raw);
        let fixed = fix_values(&extracted, &entities);

        if let Err(e) = validate(&fixed) {
            last_err = e.to_string();
            prior_error = Some(last_err.clone());
            continue;
        }

        let limited = enforce_limit(&fixed);

        match store.execute_select(&limited) {
            Ok(rows) => {
                let table = render_table(&rows);
                let intro_prompt = format!(
                    "Viết 1 đến 3 câu giới thiệu ngắn gọn, tự nhiên cho kết quả tra cứu điểm chuẩn sau, \
                     không lặp lại bảng dữ liệu:\n\n{table}"
                );
                let intro = llm.generate(&intro_prompt, None, deadline).unwrap_or_default();
                let text = if intro.trim().is_empty() { table.clone() } else { format!("{}\n\n{table}", intro.trim()) };
                return Ok(SqlAnswer { text, rows, sql: limited });
            }
            Err(e) => {
                last_err = e.to_string();
                prior_error = Some(last_err.clone());
            }
        }
    }

    Err(SqlError::RetriesExhausted { attempts: config.sql_max_retries, last_error: last_err }.into())
}
