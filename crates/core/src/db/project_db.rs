use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::{AnalysisRunRecord, FunctionSummary, RomRecord, RunStatus, StoredRun};
use crate::model::{Address, Label, LabelOrigin, Region, RegionKind};
use crate::project::ProjectModel;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Error type for project database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    #[error("Corrupt stored value in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed project database.
///
/// Owns the connection, applies migrations on open and offers small helpers
/// for the ROM registry and for persisted analysis runs.
#[derive(Debug)]
pub struct ProjectDb {
    conn: Connection,
}

impl ProjectDb {
    /// Open (or create) a project database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database with the current schema.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> DbResult<i32> {
        current_schema_version(&self.conn)
    }

    /// Insert a ROM record and return its row id.
    pub fn insert_rom(&self, record: &RomRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO roms (name, path, sha256, size, mapping, title)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.name,
                record.path,
                record.sha256,
                record.size.map(|s| s as i64),
                record.mapping,
                record.title
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List all ROMs (ordered by id).
    pub fn list_roms(&self) -> DbResult<Vec<RomRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, path, sha256, size, mapping, title
            FROM roms
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], map_rom)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn rom_by_name(&self, name: &str) -> DbResult<Option<RomRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, path, sha256, size, mapping, title
            FROM roms
            WHERE name = ?1
            "#,
        )?;
        let mut rows = stmt.query_map(params![name], map_rom)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Insert an analysis run record and return its row id.
    pub fn insert_analysis_run(&self, record: &AnalysisRunRecord) -> DbResult<i64> {
        insert_run_row(&self.conn, record)
    }

    /// Insert a finished run together with its model. Either both land or neither does.
    pub fn insert_run_with_model(&self, record: &AnalysisRunRecord, model: &ProjectModel) -> DbResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let run_id = insert_run_row(&tx, record)?;
        insert_model_rows(&tx, run_id, model)?;
        tx.commit()?;
        Ok(run_id)
    }

    /// List analysis runs, optionally filtered by ROM name.
    pub fn list_runs(&self, rom: Option<&str>) -> DbResult<Vec<StoredRun>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRun> {
            let status: String = row.get(5)?;
            let status = status.parse::<RunStatus>().map_err(|reason| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, reason.into())
            })?;
            Ok(StoredRun {
                id: row.get(0)?,
                record: AnalysisRunRecord {
                    rom: row.get(1)?,
                    profile_hash: row.get(2)?,
                    mapping: row.get(3)?,
                    mapping_confidence: row.get(4)?,
                    status,
                    region_count: row.get::<_, i64>(6)? as usize,
                    function_count: row.get::<_, i64>(7)? as usize,
                    started_at: row.get(8)?,
                    finished_at: row.get(9)?,
                },
            })
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, rom, profile_hash, mapping, mapping_confidence, status,
                   region_count, function_count, started_at, finished_at
            FROM analysis_runs
            WHERE ?1 IS NULL OR rom = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![rom], map_run)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent successful run for a ROM.
    pub fn latest_run_id(&self, rom: &str) -> DbResult<Option<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id FROM analysis_runs
            WHERE rom = ?1 AND status = 'succeeded'
            ORDER BY id DESC
            LIMIT 1
            "#,
        )?;
        let mut rows = stmt.query(params![rom])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Persist regions, function summaries, labels and xrefs of a model under `run_id`.
    pub fn insert_run_model(&self, run_id: i64, model: &ProjectModel) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_model_rows(&tx, run_id, model)?;
        tx.commit()?;
        Ok(())
    }

    /// Regions of a stored run, in offset order.
    pub fn load_run_regions(&self, run_id: i64) -> DbResult<Vec<Region>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT start_offset, end_offset, kind, confidence, entropy, evidence FROM run_regions
            WHERE run_id = ?1
            ORDER BY start_offset
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (start, end, kind, confidence, entropy, evidence) = row?;
            let kind: RegionKind = from_json("run_regions", &kind)?;
            let evidence: Vec<String> = from_json("run_regions", &evidence)?;
            out.push(Region { start, end, kind, confidence, entropy, evidence });
        }
        Ok(out)
    }

    pub fn load_run_functions(&self, run_id: i64) -> DbResult<Vec<FunctionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT entry, address, end_offset, instruction_count, stack_delta, partial, partial_reason
            FROM run_functions
            WHERE run_id = ?1
            ORDER BY entry
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(FunctionSummary {
                entry: row.get::<_, i64>(0)? as usize,
                address: Address::from_u24(row.get(1)?).to_string(),
                end: row.get::<_, i64>(2)? as usize,
                instruction_count: row.get::<_, i64>(3)? as usize,
                stack_delta: row.get(4)?,
                partial: row.get::<_, i64>(5)? != 0,
                partial_reason: row.get(6)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn load_run_labels(&self, run_id: i64) -> DbResult<Vec<Label>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT label_offset, address, name, origin FROM run_labels
            WHERE run_id = ?1
            ORDER BY label_offset
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (offset, address, name, origin) = row?;
            out.push(Label { offset, address: Address::from_u24(address), name, origin: parse_origin(&origin)? });
        }
        Ok(out)
    }

    pub fn count_run_xrefs(&self, run_id: i64) -> DbResult<usize> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM run_xrefs WHERE run_id = ?1", params![run_id], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn map_rom(row: &rusqlite::Row<'_>) -> rusqlite::Result<RomRecord> {
    Ok(RomRecord {
        name: row.get(0)?,
        path: row.get(1)?,
        sha256: row.get(2)?,
        size: row.get::<_, Option<i64>>(3)?.map(|s| s as u64),
        mapping: row.get(4)?,
        title: row.get(5)?,
    })
}

fn insert_run_row(conn: &Connection, record: &AnalysisRunRecord) -> DbResult<i64> {
    conn.execute(
        r#"
        INSERT INTO analysis_runs (rom, profile_hash, mapping, mapping_confidence, status,
                                   region_count, function_count, started_at, finished_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            record.rom,
            record.profile_hash,
            record.mapping,
            record.mapping_confidence,
            record.status.as_str(),
            record.region_count as i64,
            record.function_count as i64,
            record.started_at,
            record.finished_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_model_rows(conn: &Connection, run_id: i64, model: &ProjectModel) -> DbResult<()> {
    {
        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO run_regions (run_id, start_offset, end_offset, kind, confidence, entropy, evidence)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        for region in model.regions() {
            stmt.execute(params![
                run_id,
                region.start as i64,
                region.end as i64,
                to_json("run_regions", &region.kind)?,
                region.confidence,
                region.entropy,
                to_json("run_regions", &region.evidence)?
            ])?;
        }
    }

    {
        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO run_functions (run_id, entry, address, end_offset, instruction_count,
                                                  stack_delta, partial, partial_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for f in model.functions() {
            stmt.execute(params![
                run_id,
                f.entry as i64,
                f.entry_address.to_u24(),
                f.end as i64,
                f.instructions.len() as i64,
                f.stack_delta_estimate,
                if f.partial { 1 } else { 0 },
                f.partial_reason
            ])?;
        }
    }

    {
        let mut stmt = conn.prepare(
            r#"
            INSERT OR REPLACE INTO run_labels (run_id, label_offset, address, name, origin)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for label in model.labels() {
            stmt.execute(params![
                run_id,
                label.offset as i64,
                label.address.to_u24(),
                label.name,
                label.origin.as_str()
            ])?;
        }
    }

    {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO run_xrefs (run_id, from_offset, to_address, to_offset, kind)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for x in model.xrefs() {
            stmt.execute(params![
                run_id,
                x.from as i64,
                x.to.map(|a| a.to_u24()),
                x.to_offset.map(|o| o as i64),
                x.kind.as_str()
            ])?;
        }
    }

    Ok(())
}

/// Apply schema migrations to bring the database to the latest version.
///
/// `PRAGMA user_version` holds the schema version.
///
/// Version map:
/// - 0: no schema
/// - 1: roms
/// - 2: analysis_runs
/// - 3: per-run regions, functions, labels and xrefs
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS roms (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE,
                path    TEXT NOT NULL,
                sha256  TEXT,
                size    INTEGER,
                mapping TEXT,
                title   TEXT
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS analysis_runs (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                rom                TEXT NOT NULL,
                profile_hash       TEXT NOT NULL,
                mapping            TEXT,
                mapping_confidence REAL,
                status             TEXT NOT NULL,
                region_count       INTEGER NOT NULL DEFAULT 0,
                function_count     INTEGER NOT NULL DEFAULT 0,
                started_at         TEXT NOT NULL,
                finished_at        TEXT NOT NULL
            );

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
        current_version = 2;
    }

    if current_version < 3 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS run_regions (
                run_id     INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset   INTEGER NOT NULL,
                kind       TEXT NOT NULL,
                confidence REAL NOT NULL,
                entropy    REAL NOT NULL,
                evidence   TEXT NOT NULL,
                PRIMARY KEY(run_id, start_offset)
            );
            CREATE TABLE IF NOT EXISTS run_functions (
                run_id            INTEGER NOT NULL,
                entry             INTEGER NOT NULL,
                address           INTEGER NOT NULL,
                end_offset        INTEGER NOT NULL,
                instruction_count INTEGER NOT NULL,
                stack_delta       INTEGER NOT NULL,
                partial           INTEGER NOT NULL DEFAULT 0,
                partial_reason    TEXT,
                PRIMARY KEY(run_id, entry)
            );
            CREATE TABLE IF NOT EXISTS run_labels (
                run_id  INTEGER NOT NULL,
                label_offset INTEGER NOT NULL,
                address INTEGER NOT NULL,
                name    TEXT NOT NULL,
                origin  TEXT NOT NULL,
                PRIMARY KEY(run_id, label_offset)
            );
            CREATE TABLE IF NOT EXISTS run_xrefs (
                run_id      INTEGER NOT NULL,
                from_offset INTEGER NOT NULL,
                to_address  INTEGER,
                to_offset   INTEGER,
                kind        TEXT NOT NULL
            );
            PRAGMA user_version = 3;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}

fn to_json<T: serde::Serialize>(table: &'static str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::Corrupt { table, reason: e.to_string() })
}

fn from_json<T: serde::de::DeserializeOwned>(table: &'static str, text: &str) -> DbResult<T> {
    serde_json::from_str(text).map_err(|e| DbError::Corrupt { table, reason: e.to_string() })
}

fn parse_origin(origin: &str) -> DbResult<LabelOrigin> {
    match origin {
        "heuristic" => Ok(LabelOrigin::Heuristic),
        "call_target" => Ok(LabelOrigin::CallTarget),
        "vector" => Ok(LabelOrigin::Vector),
        "manual" => Ok(LabelOrigin::Manual),
        other => Err(DbError::Corrupt { table: "run_labels", reason: format!("unknown label origin '{other}'") }),
    }
}
