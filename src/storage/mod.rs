//! Relational storage layer (§6 External Interfaces).
//!
//! Exposes the read-only `view_tra_cuu_diem`/`truong`/`nganh` contract
//! through [`RelationalStore`], plus a `SQLite`-backed reference
//! implementation used both as the default backend and in tests.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::{SeedNganh, SeedSchool, SeedScore, SeedTruong, SqliteRelationalStore};
pub use traits::{Nganh, RelationalStore, Row, Truong};

/// Default database file name for the CLI demo.
pub const DEFAULT_DB_NAME: &str = "tsbot-core.db";
