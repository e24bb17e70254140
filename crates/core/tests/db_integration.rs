mod common;

use romscope_core::db::{
    write_project_config, AnalysisRunRecord, DbError, ProjectConfig, ProjectContext, ProjectDb, ProjectLayout,
    RomRecord, RunStatus, CURRENT_SCHEMA_VERSION,
};
use romscope_core::image::{LoadOptions, RomImage};
use romscope_core::model::{LabelOrigin, RegionKind};
use romscope_core::services::{AnalysisPipeline, AnalysisProfile, AnalysisRunner};
use tempfile::tempdir;

use common::lorom_with_code;

fn run_record(rom: &str, status: RunStatus) -> AnalysisRunRecord {
    AnalysisRunRecord {
        rom: rom.to_string(),
        profile_hash: "abc123".to_string(),
        mapping: Some("lorom".to_string()),
        mapping_confidence: Some(0.5),
        status,
        region_count: 0,
        function_count: 0,
        started_at: "2024-01-01T00:00:00Z".to_string(),
        finished_at: "2024-01-01T00:00:01Z".to_string(),
    }
}

fn init_project(root: &std::path::Path) -> ProjectLayout {
    let layout = ProjectLayout::new(root);
    std::fs::create_dir_all(&layout.meta_dir).expect("meta dir");
    let config = ProjectConfig::new("demo", layout.db_path_relative_string());
    write_project_config(&layout, &config).expect("write config");
    layout
}

#[test]
fn fresh_database_is_at_current_schema() {
    let db = ProjectDb::open_in_memory().expect("open");
    assert_eq!(db.schema_version().expect("version"), CURRENT_SCHEMA_VERSION);
    assert!(db.list_roms().expect("list").is_empty());
    assert!(db.list_runs(None).expect("runs").is_empty());
}

#[test]
fn rom_records_round_trip() {
    let db = ProjectDb::open_in_memory().expect("open");
    let mut record = RomRecord::new("game", "roms/game.sfc");
    record.sha256 = Some("deadbeef".into());
    record.size = Some(0x8000);
    record.mapping = Some("lorom".into());
    record.title = Some("TEST ROM".into());
    db.insert_rom(&record).expect("insert");
    db.insert_rom(&RomRecord::new("other", "other.sfc")).expect("insert other");

    let roms = db.list_roms().expect("list");
    assert_eq!(roms.len(), 2);
    assert_eq!(db.rom_by_name("game").expect("query"), Some(record));
    assert_eq!(db.rom_by_name("missing").expect("query"), None);

    // Names are unique.
    assert!(matches!(db.insert_rom(&RomRecord::new("game", "dup.sfc")), Err(DbError::Sql(_))));
}

#[test]
fn runs_are_filtered_by_rom_and_latest_success_wins() {
    let db = ProjectDb::open_in_memory().expect("open");
    let first = db.insert_analysis_run(&run_record("a", RunStatus::Succeeded)).expect("run");
    let second = db.insert_analysis_run(&run_record("a", RunStatus::Succeeded)).expect("run");
    db.insert_analysis_run(&run_record("a", RunStatus::Failed)).expect("run");
    db.insert_analysis_run(&run_record("b", RunStatus::Cancelled)).expect("run");

    assert_eq!(db.list_runs(None).expect("all").len(), 4);
    let runs_a = db.list_runs(Some("a")).expect("a");
    assert_eq!(runs_a.len(), 3);
    assert_eq!(runs_a[0].id, first);
    assert_eq!(runs_a[0].record, run_record("a", RunStatus::Succeeded));
    assert_eq!(runs_a[2].record.status, RunStatus::Failed);

    assert_eq!(db.latest_run_id("a").expect("latest"), Some(second));
    assert_eq!(db.latest_run_id("b").expect("latest"), None);
}

#[test]
fn stored_model_loads_back() {
    let rom = RomImage::from_bytes(lorom_with_code(&[0x18, 0x78, 0x20, 0x34, 0x12, 0x60]), &LoadOptions::default())
        .expect("load");
    let model = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline").run(&rom).expect("run");

    let db = ProjectDb::open_in_memory().expect("open");
    let run_id = db.insert_analysis_run(&run_record("game", RunStatus::Succeeded)).expect("run");
    db.insert_run_model(run_id, &model).expect("store model");

    let regions = db.load_run_regions(run_id).expect("regions");
    assert_eq!(regions, model.regions());
    assert_eq!(regions[0].kind, RegionKind::Code);

    let functions = db.load_run_functions(run_id).expect("functions");
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].entry, 0);
    assert_eq!(functions[0].address, "$00:8000");
    assert_eq!(functions[0].instruction_count, 4);
    assert!(!functions[0].partial);

    let labels = db.load_run_labels(run_id).expect("labels");
    let stored: Vec<_> = model.labels().cloned().collect();
    assert_eq!(labels, stored);
    assert_eq!(labels[0].origin, LabelOrigin::Vector);

    assert_eq!(db.count_run_xrefs(run_id).expect("xrefs"), model.xrefs().len());
    assert!(db.load_run_regions(run_id + 1).expect("other run").is_empty());
}

#[test]
fn newer_schema_versions_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("project.db");
    {
        let conn = rusqlite::Connection::open(&path).expect("raw open");
        conn.execute_batch(&format!("PRAGMA user_version = {};", CURRENT_SCHEMA_VERSION + 1)).expect("pragma");
    }

    match ProjectDb::open(&path) {
        Err(DbError::UnsupportedSchemaVersion { found, max_supported, .. }) => {
            assert_eq!(found, CURRENT_SCHEMA_VERSION + 1);
            assert_eq!(max_supported, CURRENT_SCHEMA_VERSION);
        }
        other => panic!("expected schema error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn context_opens_an_initialised_project() {
    let dir = tempdir().expect("tempdir");
    let layout = init_project(dir.path());

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    assert_eq!(ctx.config.name, "demo");
    assert_eq!(ctx.db_path, layout.db_path);
    ctx.db.insert_rom(&RomRecord::new("game", "game.sfc")).expect("insert");

    let snapshot = ctx.snapshot().expect("snapshot");
    assert_eq!(snapshot.roms.len(), 1);
    assert_eq!(snapshot.run_count, 0);
}

#[test]
fn context_requires_a_project_config() {
    let dir = tempdir().expect("tempdir");
    let err = ProjectContext::from_root(dir.path()).expect_err("no project");
    assert!(format!("{err:#}").contains("Failed to read project config"));
}

#[test]
fn runner_records_successful_and_failed_runs() {
    let dir = tempdir().expect("tempdir");
    init_project(dir.path());
    let rom_path = dir.path().join("game.sfc");
    std::fs::write(&rom_path, lorom_with_code(&[0x18, 0x60])).expect("write rom");

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    let pipeline = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline");
    let runner = AnalysisRunner { ctx: &ctx, pipeline: &pipeline };

    let (run_id, model) = runner.run("game", &rom_path, "hash").expect("analysis");
    let runs = ctx.db.list_runs(Some("game")).expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, run_id);
    assert_eq!(runs[0].record.status, RunStatus::Succeeded);
    assert_eq!(runs[0].record.mapping.as_deref(), Some("lorom"));
    assert_eq!(runs[0].record.function_count, model.functions().len());
    assert_eq!(runs[0].record.region_count, model.regions().len());
    assert_eq!(ctx.db.load_run_regions(run_id).expect("regions").len(), model.regions().len());

    assert!(runner.run("game", &dir.path().join("missing.sfc"), "hash").is_err());
    let runs = ctx.db.list_runs(Some("game")).expect("runs");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].record.status, RunStatus::Failed);
    assert_eq!(runs[1].record.mapping, None);
    assert_eq!(ctx.db.latest_run_id("game").expect("latest"), Some(run_id));
}

#[test]
fn run_and_model_are_stored_together_or_not_at_all() {
    let rom = RomImage::from_bytes(lorom_with_code(&[0x18, 0x78, 0x20, 0x34, 0x12, 0x60]), &LoadOptions::default())
        .expect("load");
    let model = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline").run(&rom).expect("run");

    let db = ProjectDb::open_in_memory().expect("open");
    let run_id = db.insert_run_with_model(&run_record("game", RunStatus::Succeeded), &model).expect("store");
    assert_eq!(db.list_runs(Some("game")).expect("runs")[0].id, run_id);
    assert_eq!(db.load_run_regions(run_id).expect("regions"), model.regions());

    db.connection().execute_batch("DROP TABLE run_xrefs;").expect("drop xrefs");
    assert!(db.insert_run_with_model(&run_record("broken", RunStatus::Succeeded), &model).is_err());
    assert!(db.list_runs(Some("broken")).expect("runs").is_empty());
    assert_eq!(db.latest_run_id("broken").expect("latest"), None);
}
