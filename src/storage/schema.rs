//! Relational schema for the admission-score view and its backing tables
//! (§3, §6).
//!
//! `view_tra_cuu_diem` is modelled as a genuine `SQL VIEW` over a base
//! `diem_chuan` fact table joined against `truong`/`nganh`, rather than as a
//! bare table, so the contract seen by C13 (read-only, a single named view)
//! matches a real deployment: the base tables can be migrated independently
//! of the view's column names.

/// Current schema version, bumped whenever `SCHEMA_SQL` changes shape.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Schema for the relational store: `truong`, `nganh`, `diem_chuan`, and the
/// `view_tra_cuu_diem` view joining them (§6 External Interfaces).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS truong (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ma_truong TEXT NOT NULL UNIQUE,
    ten_truong TEXT NOT NULL,
    ten_khong_dau TEXT NOT NULL,
    loai_truong TEXT,
    dia_chi TEXT,
    website TEXT,
    mo_ta TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_truong_ten_khong_dau ON truong(ten_khong_dau);

CREATE TABLE IF NOT EXISTS nganh (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    truong_id INTEGER NOT NULL REFERENCES truong(id),
    ma_nganh TEXT NOT NULL,
    ten_nganh TEXT NOT NULL,
    ten_nganh_khong_dau TEXT NOT NULL,
    mo_ta TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_nganh_truong ON nganh(truong_id);

CREATE TABLE IF NOT EXISTS diem_chuan (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nam INTEGER NOT NULL,
    truong_id INTEGER NOT NULL REFERENCES truong(id),
    nganh_id INTEGER NOT NULL REFERENCES nganh(id),
    ma_khoi TEXT NOT NULL,
    diem_chuan REAL NOT NULL,
    chi_tieu INTEGER,
    gioi_tinh TEXT CHECK (gioi_tinh IN ('nam', 'nu') OR gioi_tinh IS NULL),
    khu_vuc TEXT CHECK (khu_vuc IN ('mien_bac', 'mien_nam') OR khu_vuc IS NULL),
    doi_tuong TEXT,
    ghi_chu TEXT
);

CREATE INDEX IF NOT EXISTS idx_diem_chuan_nam ON diem_chuan(nam);
CREATE INDEX IF NOT EXISTS idx_diem_chuan_truong ON diem_chuan(truong_id);

CREATE VIEW IF NOT EXISTS view_tra_cuu_diem AS
SELECT
    d.nam AS nam,
    t.ten_truong AS ten_truong,
    t.ten_khong_dau AS ten_khong_dau,
    t.ma_truong AS ma_truong,
    t.loai_truong AS loai_truong,
    n.ma_nganh AS ma_nganh,
    n.ten_nganh AS ten_nganh,
    n.ten_nganh_khong_dau AS ten_nganh_khong_dau,
    d.ma_khoi AS ma_khoi,
    d.diem_chuan AS diem_chuan,
    d.chi_tieu AS chi_tieu,
    d.gioi_tinh AS gioi_tinh,
    d.khu_vuc AS khu_vuc,
    d.doi_tuong AS doi_tuong,
    d.ghi_chu AS ghi_chu
FROM diem_chuan d
JOIN truong t ON t.id = d.truong_id
JOIN nganh n ON n.id = d.nganh_id
WHERE t.active = 1 AND n.active = 1;
";

/// Reads the stored schema version, `0` if unset.
pub const GET_VERSION_SQL: &str = "SELECT value FROM schema_info WHERE key = 'schema_version'";

/// Upserts the stored schema version.
pub const SET_VERSION_SQL: &str =
    "INSERT INTO schema_info (key, value) VALUES ('schema_version', ?1) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// Checks the `truong` table exists (used as the initialisation probe).
pub const CHECK_SCHEMA_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'truong'";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_sql_creates_view_tra_cuu_diem() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(SCHEMA_SQL).expect("schema applies");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'view' AND name = 'view_tra_cuu_diem'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(count, 1);
    }
}
