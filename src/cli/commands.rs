//! CLI command implementations.
//!
//! A thin demo harness: `ingest` validates a chunk file against the
//! hierarchy invariants, `seed-db` creates a demo admission-score database,
//! and `ask` wires up a [`ServiceRegistry`] over an in-memory vector store
//! and runs one turn through the [`Supervisor`].

use crate::cache::SemanticCache;
use crate::cli::output::{AskReport, IngestReport, OutputFormat, SeedDbReport, format_ask, format_error, format_ingest, format_seed_db};
use crate::cli::parser::{Cli, Commands};
use crate::embedding::{Embedder, FallbackEmbedder};
use crate::error::{CommandError, IoError, Result};
use crate::hierarchy::ChunkStore;
use crate::llm::{LlmClient, MockLlm};
use crate::search::vector::{InMemoryVectorStore, VectorStore};
use crate::service::ServiceRegistry;
use crate::storage::{RelationalStore, SeedNganh, SeedSchool, SeedScore, SeedTruong, SqliteRelationalStore};
use crate::Config;

/// Executes the parsed CLI command and returns the text to print.
///
/// # Errors
///
/// Returns whatever error the underlying command handler produces.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let result = match &cli.command {
        Commands::Ingest { chunks } => ingest(chunks).map(|r| format_ingest(&r, format)),
        Commands::SeedDb { db } => seed_db(db).map(|r| format_seed_db(&r, format)),
        Commands::Ask { question, chunks, db, session } => {
            ask(question, chunks.as_deref(), db.as_deref(), session.as_deref()).map(|r| format_ask(&r, format))
        }
    };
    result.map_err(|e| {
        let _ = format_error(&e, format);
        e
    })
}

fn ingest(path: &std::path::Path) -> Result<IngestReport> {
    let data = std::fs::read_to_string(path).map_err(|e| IoError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let store = ChunkStore::from_json(&data)?;
    let top_level_count = store.iter().filter(|c| c.parent_id.is_none()).count();
    Ok(IngestReport { path: path.display().to_string(), chunk_count: store.len(), top_level_count })
}

fn seed_db(path: &std::path::Path) -> Result<SeedDbReport> {
    let store = SqliteRelationalStore::open(path)?;
    let schools = demo_schools();
    store.seed(&schools)?;
    Ok(SeedDbReport { path: path.display().to_string(), school_count: schools.len() })
}

fn demo_schools() -> Vec<SeedSchool> {
    vec![SeedSchool {
        truong: SeedTruong {
            ma_truong: "HVKTQS".to_string(),
            ten_truong: "Học viện Kỹ thuật Quân sự".to_string(),
            ten_khong_dau: "hoc vien ky thuat quan su".to_string(),
            loai_truong: Some("quan doi".to_string()),
            mo_ta: Some("Dao tao ky su quan su.".to_string()),
        },
        majors: vec![SeedNganh {
            ma_nganh: "CNTT".to_string(),
            ten_nganh: "Công nghệ thông tin".to_string(),
            ten_nganh_khong_dau: "cong nghe thong tin".to_string(),
            scores: vec![SeedScore {
                nam: 2025,
                ma_khoi: "A00".to_string(),
                diem_chuan: 26.5,
                chi_tieu: Some(120),
                gioi_tinh: Some("nam".to_string()),
                khu_vuc: None,
                doi_tuong: None,
                ghi_chu: None,
            }],
        }],
    }]
}

fn ask(
    question: &str,
    chunks_path: Option<&std::path::Path>,
    db_path: Option<&std::path::Path>,
    session: Option<&str>,
) -> Result<AskReport> {
    let config = Config::default();

    let chunk_store = match chunks_path {
        Some(path) => {
            let data = std::fs::read_to_string(path).map_err(|e| IoError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            ChunkStore::from_json(&data)?
        }
        None => ChunkStore::build(Vec::new())?,
    };

    let relational: Box<dyn RelationalStore> = match db_path {
        Some(path) => Box::new(SqliteRelationalStore::open(path)?),
        None => Box::new(SqliteRelationalStore::open_in_memory()?),
    };

    let embedder: Box<dyn Embedder> = Box::new(FallbackEmbedder::new(config.embedding_dimension));
    let llm: Box<dyn LlmClient> = Box::new(MockLlm::new());
    let vector_store: Box<dyn VectorStore> = Box::new(InMemoryVectorStore::new());

    let registry = ServiceRegistry::new(embedder, llm, relational, vector_store, chunk_store, config)?;
    let supervisor = registry.supervisor();
    let mut cache = SemanticCache::new(&registry.config);

    let session_id = session.unwrap_or("cli-demo");
    let response = supervisor.handle(session_id, question, &mut cache)?;
    Ok(AskReport::from_response(response))
}
