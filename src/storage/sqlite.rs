//! `SQLite`-backed [`RelationalStore`] implementation.
//!
//! Serves as both the default in-process backend and the reference used by
//! tests: a real `view_tra_cuu_diem` view over `truong`/`nganh`/`diem_chuan`
//! tables, queried read-only at serve time. Seeding helpers below let tests
//! and the CLI demo populate the base tables without hand-writing SQL.

// SQLite stores all integers as i64; these casts are intentional and safe
// because row counts and school ids never approach i64::MAX.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::error::{Result, StorageError};
use crate::storage::schema::{CHECK_SCHEMA_SQL, SCHEMA_SQL};
use crate::storage::traits::{Nganh, RelationalStore, Row, Truong};
use rusqlite::{Connection, OptionalExtension, params, types::ValueRef};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// A school record to seed, paired with its majors and score rows.
#[derive(Debug, Clone)]
pub struct SeedSchool {
    /// School attributes.
    pub truong: SeedTruong,
    /// Majors offered by the school.
    pub majors: Vec<SeedNganh>,
}

/// Seed data for a `truong` row (id is assigned by the store).
#[derive(Debug, Clone)]
pub struct SeedTruong {
    /// School code.
    pub ma_truong: String,
    /// Accented name.
    pub ten_truong: String,
    /// Diacritic-folded name.
    pub ten_khong_dau: String,
    /// School type.
    pub loai_truong: Option<String>,
    /// Free-text description.
    pub mo_ta: Option<String>,
}

/// Seed data for a `nganh` row.
#[derive(Debug, Clone)]
pub struct SeedNganh {
    /// Major code.
    pub ma_nganh: String,
    /// Accented name.
    pub ten_nganh: String,
    /// Diacritic-folded name.
    pub ten_nganh_khong_dau: String,
    /// Score rows for this major.
    pub scores: Vec<SeedScore>,
}

/// Seed data for one `diem_chuan` row.
#[derive(Debug, Clone)]
pub struct SeedScore {
    /// Admission year.
    pub nam: i32,
    /// Exam subject-group code.
    pub ma_khoi: String,
    /// Cut-off score.
    pub diem_chuan: f64,
    /// Admission quota, if published.
    pub chi_tieu: Option<i64>,
    /// Gender restriction, `"nam"`/`"nu"`/none.
    pub gioi_tinh: Option<String>,
    /// Region restriction, `"mien_bac"`/`"mien_nam"`/none.
    pub khu_vuc: Option<String>,
    /// Admission category (priority group etc).
    pub doi_tuong: Option<String>,
    /// Free-text note.
    pub ghi_chu: Option<String>,
}

/// `SQLite`-backed relational store. Internally serialised behind a
/// [`Mutex`] since `rusqlite::Connection` is `!Sync`; queries at serve time
/// are short-lived `SELECT`s so contention is not expected to be a
/// bottleneck (§5 Concurrency & Resource Model treats the store as
/// externally-synchronised shared state, same as the semantic cache).
pub struct SqliteRelationalStore {
    conn: Mutex<Connection>,
}

impl SqliteRelationalStore {
    /// Opens (creating if absent) a database file and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the connection or schema
    /// application fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(StorageError::from)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database, useful for tests and the CLI demo.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if schema application fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// True if the schema has been applied (`truong` table exists).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the check query fails.
    pub fn is_initialized(&self) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let name: Option<String> = conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(name.is_some())
    }

    /// Seeds schools, majors, and score rows in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if any insert fails.
    pub fn seed(&self, schools: &[SeedSchool]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = conn.transaction().map_err(StorageError::from)?;
        for school in schools {
            tx.execute(
                "INSERT INTO truong (ma_truong, ten_truong, ten_khong_dau, loai_truong, mo_ta, active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    school.truong.ma_truong,
                    school.truong.ten_truong,
                    school.truong.ten_khong_dau,
                    school.truong.loai_truong,
                    school.truong.mo_ta,
                ],
            )
            .map_err(StorageError::from)?;
            let truong_id = tx.last_insert_rowid();

            for nganh in &school.majors {
                tx.execute(
                    "INSERT INTO nganh (truong_id, ma_nganh, ten_nganh, ten_nganh_khong_dau, active) \
                     VALUES (?1, ?2, ?3, ?4, 1)",
                    params![truong_id, nganh.ma_nganh, nganh.ten_nganh, nganh.ten_nganh_khong_dau],
                )
                .map_err(StorageError::from)?;
                let nganh_id = tx.last_insert_rowid();

                for score in &nganh.scores {
                    tx.execute(
                        "INSERT INTO diem_chuan \
                         (nam, truong_id, nganh_id, ma_khoi, diem_chuan, chi_tieu, gioi_tinh, khu_vuc, doi_tuong, ghi_chu) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            score.nam,
                            truong_id,
                            nganh_id,
                            score.ma_khoi,
                            score.diem_chuan,
                            score.chi_tieu,
                            score.gioi_tinh,
                            score.khu_vuc,
                            score.doi_tuong,
                            score.ghi_chu,
                        ],
                    )
                    .map_err(StorageError::from)?;
                }
            }
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

fn value_ref_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

impl RelationalStore for SqliteRelationalStore {
    fn execute_select(&self, sql: &str) -> Result<Vec<Row>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare(sql).map_err(StorageError::from)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| (*s).to_string()).collect();
        let rows = stmt
            .query_map([], |row| {
                let mut out: Row = Row::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value = row.get_ref(i)?;
                    out.insert(name.clone(), value_ref_to_json(value));
                }
                Ok(out)
            })
            .map_err(StorageError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StorageError::from)?);
        }
        Ok(out)
    }

    fn find_school(&self, unaccented_query: &str) -> Result<Option<Truong>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let pattern = format!("%{}%", unaccented_query.to_lowercase());
        conn.query_row(
            "SELECT id, ma_truong, ten_truong, ten_khong_dau, loai_truong, dia_chi, website, mo_ta \
             FROM truong WHERE active = 1 AND ten_khong_dau LIKE ?1 COLLATE NOCASE LIMIT 1",
            params![pattern],
            |row| {
                Ok(Truong {
                    id: row.get(0)?,
                    ma_truong: row.get(1)?,
                    ten_truong: row.get(2)?,
                    ten_khong_dau: row.get(3)?,
                    loai_truong: row.get(4)?,
                    dia_chi: row.get(5)?,
                    website: row.get(6)?,
                    mo_ta: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()).into())
    }

    fn majors_for_school(&self, truong_id: i64) -> Result<Vec<Nganh>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn
            .prepare(
                "SELECT id, truong_id, ma_nganh, ten_nganh, ten_nganh_khong_dau, mo_ta \
                 FROM nganh WHERE truong_id = ?1 AND active = 1",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![truong_id], |row| {
                Ok(Nganh {
                    id: row.get(0)?,
                    truong_id: row.get(1)?,
                    ma_nganh: row.get(2)?,
                    ten_nganh: row.get(3)?,
                    ten_nganh_khong_dau: row.get(4)?,
                    mo_ta: row.get(5)?,
                })
            })
            .map_err(StorageError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StorageError::from)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> SqliteRelationalStore {
        let store = SqliteRelationalStore::open_in_memory().expect("open");
        store
            .seed(&[SeedSchool {
                truong: SeedTruong {
                    ma_truong: "HVKTQS".to_string(),
                    ten_truong: "Học viện Kỹ thuật Quân sự".to_string(),
                    ten_khong_dau: "hoc vien ky thuat quan su".to_string(),
                    loai_truong: Some("quan doi".to_string()),
                    mo_ta: Some("Đào tạo kỹ sư quân sự".to_string()),
                },
                majors: vec![SeedNganh {
                    ma_nganh: "CNTT".to_string(),
                    ten_nganh: "Công nghệ thông tin".to_string(),
                    ten_nganh_khong_dau: "cong nghe thong tin".to_string(),
                    scores: vec![
                        SeedScore {
                            nam: 2024,
                            ma_khoi: "A00".to_string(),
                            diem_chuan: 26.5,
                            chi_tieu: Some(120),
                            gioi_tinh: Some("nam".to_string()),
                            khu_vuc: None,
                            doi_tuong: None,
                            ghi_chu: None,
                        },
                        SeedScore {
                            nam: 2025,
                            ma_khoi: "A01".to_string(),
                            diem_chuan: 27.0,
                            chi_tieu: Some(100),
                            gioi_tinh: Some("nam".to_string()),
                            khu_vuc: None,
                            doi_tuong: None,
                            ghi_chu: None,
                        },
                    ],
                }],
            }])
            .expect("seed");
        store
    }

    #[test]
    fn is_initialized_true_after_open() {
        let store = SqliteRelationalStore::open_in_memory().expect("open");
        assert!(store.is_initialized().expect("check"));
    }

    #[test]
    fn execute_select_returns_seeded_rows_from_view() {
        let store = seeded_store();
        let rows = store
            .execute_select("SELECT nam, ten_truong, diem_chuan FROM view_tra_cuu_diem WHERE nam = 2024")
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ten_truong"], Value::String("Học viện Kỹ thuật Quân sự".to_string()));
    }

    #[test]
    fn find_school_matches_unaccented_infix() {
        let store = seeded_store();
        let found = store.find_school("ky thuat quan su").expect("query").expect("found");
        assert_eq!(found.ma_truong, "HVKTQS");
    }

    #[test]
    fn find_school_returns_none_when_absent() {
        let store = seeded_store();
        assert!(store.find_school("khong ton tai").expect("query").is_none());
    }

    #[test]
    fn majors_for_school_lists_active_majors() {
        let store = seeded_store();
        let school = store.find_school("hoc vien").expect("query").expect("found");
        let majors = store.majors_for_school(school.id).expect("majors");
        assert_eq!(majors.len(), 1);
        assert_eq!(majors[0].ma_nganh, "CNTT");
    }
}
