//! Relational-store contract (§6 External Interfaces).
//!
//! The only relation queried at serve time by C13-generated SQL is the view
//! `view_tra_cuu_diem`; the `school_info` node (§4.15) additionally looks up
//! `truong`/`nganh` rows directly. Both are exposed through [`RelationalStore`]
//! so the Supervisor and SQL engine depend on a trait object, not a concrete
//! database, per the service-registry design note (§9).

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;

/// One row of a `SELECT` result, column name to JSON-ish value. Using a
/// loosely-typed row (rather than a fixed struct) mirrors the reality that
/// C13-generated SQL may project any subset/alias of `view_tra_cuu_diem`'s
/// columns.
pub type Row = HashMap<String, Value>;

/// A single `truong` (school) row (§6).
#[derive(Debug, Clone)]
pub struct Truong {
    /// Internal numeric id.
    pub id: i64,
    /// School code.
    pub ma_truong: String,
    /// School name, accented.
    pub ten_truong: String,
    /// School name, diacritic-folded, for unaccented matching.
    pub ten_khong_dau: String,
    /// School type (e.g. "quan doi", "cong an").
    pub loai_truong: Option<String>,
    /// Address.
    pub dia_chi: Option<String>,
    /// Website.
    pub website: Option<String>,
    /// Free-text description, narrated by the `school_info` node.
    pub mo_ta: Option<String>,
}

/// A single `nganh` (major) row belonging to a [`Truong`] (§6).
#[derive(Debug, Clone)]
pub struct Nganh {
    /// Internal numeric id.
    pub id: i64,
    /// Owning school's id.
    pub truong_id: i64,
    /// Major code.
    pub ma_nganh: String,
    /// Major name, accented.
    pub ten_nganh: String,
    /// Major name, diacritic-folded.
    pub ten_nganh_khong_dau: String,
    /// Free-text description.
    pub mo_ta: Option<String>,
}

/// Read-only access to the admission-score view and the school/major tables.
///
/// Implementations must reject any statement that is not a `SELECT` against
/// `view_tra_cuu_diem` — that enforcement lives in [`crate::sql`]'s validator,
/// not here, but [`Self::execute_select`] is still the sole write-capable-looking
/// surface and must never be handed anything else.
pub trait RelationalStore: Send + Sync {
    /// Runs a validated, read-only `SELECT` statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::Database`] on a query failure.
    fn execute_select(&self, sql: &str) -> Result<Vec<Row>>;

    /// Finds a school by case-insensitive infix match against
    /// `ten_khong_dau` (unaccented), as used by the `school_info` node.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::Database`] on a query failure.
    fn find_school(&self, unaccented_query: &str) -> Result<Option<Truong>>;

    /// Lists the active majors offered by a school.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StorageError::Database`] on a query failure.
    fn majors_for_school(&self, truong_id: i64) -> Result<Vec<Nganh>>;
}
