mod common;

use romscope_core::error::AnalysisError;
use romscope_core::image::{LoadOptions, RomImage};
use romscope_core::model::{Address, LabelOrigin, RegionKind, Severity, XrefKind};
use romscope_core::project::ProjectModel;
use romscope_core::services::{AnalysisPipeline, AnalysisProfile, LabelLocation, ManualLabel};

use common::{lorom_with_code, noise, record_table, set_vector};

// CLC; SEI; JSR $1234; RTS
const SMALL_PROGRAM: [u8; 6] = [0x18, 0x78, 0x20, 0x34, 0x12, 0x60];

fn analyze(image: Vec<u8>, profile: AnalysisProfile) -> ProjectModel {
    let rom = RomImage::from_bytes(image, &LoadOptions::default()).expect("load");
    let pipeline = AnalysisPipeline::new(profile).expect("pipeline");
    pipeline.run(&rom).expect("run")
}

fn assert_partition(model: &ProjectModel) {
    let regions = model.regions();
    assert!(!regions.is_empty());
    assert_eq!(regions[0].start, 0);
    assert_eq!(regions.last().unwrap().end, model.image().size);
    for pair in regions.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap or overlap at {:#X}", pair[0].end);
    }
    for region in regions {
        assert!(region.start < region.end);
        assert!((0.0..=1.0).contains(&region.confidence), "confidence {}", region.confidence);
    }
    assert!(!model.diagnostics().iter().any(|d| d.source == "partition"));
}

#[test]
fn small_program_becomes_one_function_and_one_code_region() {
    let model = analyze(lorom_with_code(&SMALL_PROGRAM), AnalysisProfile::default());
    assert_partition(&model);

    assert_eq!(model.functions().len(), 1);
    let f = &model.functions()[0];
    assert_eq!(f.entry, 0);
    assert_eq!(f.end, 6);
    assert_eq!(f.instructions.len(), 4);
    assert!(!f.partial);

    let code = &model.regions()[0];
    assert_eq!(code.kind, RegionKind::Code);
    assert_eq!((code.start, code.end), (0, 6));
    assert!(code.evidence.iter().any(|e| e == "control_flow"));
    assert_eq!(model.region_at(6).unwrap().kind, RegionKind::Padding);

    let call = model.xrefs().iter().find(|x| x.kind == XrefKind::Call).expect("call xref");
    assert_eq!(call.from, 2);
    assert_eq!(call.to, Some(Address::new(0x00, 0x1234)));
    assert_eq!(call.to_offset, None);

    assert_eq!(model.label_at(0).unwrap().name, "vec_reset");
    assert_eq!(model.image().copier_header, None);
}

#[test]
fn code_regions_reencode_to_the_original_bytes() {
    let image = lorom_with_code(&SMALL_PROGRAM);
    let model = analyze(image.clone(), AnalysisProfile::default());

    let mut checked = 0;
    for region in model.regions().iter().filter(|r| r.kind == RegionKind::Code) {
        let bytes = model.reencode_region(region).expect("code region tiles with instructions");
        assert_eq!(bytes, image[region.range()]);
        checked += 1;
    }
    assert_eq!(checked, 1);
    assert_eq!(model.reencode_region(model.region_at(0x100).unwrap()), None);
}

#[test]
fn record_table_is_classified_with_its_stride() {
    let mut image = vec![0u8; 0x8000];
    image[0x1000..0x1200].copy_from_slice(&record_table());
    let model = analyze(image, AnalysisProfile::default());
    assert_partition(&model);

    let table = model.region_at(0x1000).unwrap();
    assert_eq!(table.kind, RegionKind::DataTable { entry_size: 16, entry_count: 32 });
    assert_eq!((table.start, table.end), (0x1000, 0x1200));
    assert!(table.evidence.iter().any(|e| e == "stride_table"));
    assert!(model.functions().is_empty());
}

#[test]
fn disabled_detectors_leave_mid_entropy_bytes_unknown() {
    let mut image = vec![0u8; 0x8000];
    image[0x1000..0x1200].copy_from_slice(&record_table());
    let profile = AnalysisProfile { detectors: Vec::new(), ..AnalysisProfile::default() };
    let model = analyze(image, profile);

    assert_eq!(model.region_at(0x1000).unwrap().kind, RegionKind::Unknown);
}

#[test]
fn text_runs_are_found_inside_unknown_windows() {
    let text = b"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG WHILE 0123456789 RUN";
    let mut image = vec![0u8; 0x8000];
    image[0x2000..0x2000 + text.len()].copy_from_slice(text);
    let model = analyze(image, AnalysisProfile::default());
    assert_partition(&model);

    let region = model.region_at(0x2000).unwrap();
    assert_eq!(region.kind, RegionKind::Text);
    assert_eq!(region.start, 0x2000);
    // The terminating zero belongs to the string.
    assert_eq!(region.end, 0x2000 + text.len() + 1);
    assert_eq!(model.asset_regions().count(), 1);
}

#[test]
fn noise_image_still_forms_a_partition() {
    let mut image = noise(0x8000, 7);
    set_vector(&mut image, 0xFFFC, 0x8000);
    let model = analyze(image, AnalysisProfile::default());
    assert_partition(&model);

    let coverage = model.coverage();
    assert_eq!(coverage.total, 0x8000);
    assert_eq!(coverage.by_kind.values().sum::<usize>(), 0x8000);
}

#[test]
fn repeated_runs_produce_equal_models() {
    let mut image = noise(0x8000, 99);
    image[0..SMALL_PROGRAM.len()].copy_from_slice(&SMALL_PROGRAM);
    set_vector(&mut image, 0xFFFC, 0x8000);
    let rom = RomImage::from_bytes(image, &LoadOptions::default()).expect("load");
    let pipeline = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline");

    let first = pipeline.run(&rom).expect("first run");
    let second = pipeline.run(&rom).expect("second run");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
}

#[test]
fn manual_labels_outrank_vector_names() {
    let profile = AnalysisProfile {
        labels: vec![
            ManualLabel { location: LabelLocation::Address("$00:8000".into()), name: "main".into() },
            ManualLabel { location: LabelLocation::Offset(0x100), name: "table".into() },
            ManualLabel { location: LabelLocation::Address("$7E:0000".into()), name: "ram".into() },
        ],
        ..AnalysisProfile::default()
    };
    let model = analyze(lorom_with_code(&SMALL_PROGRAM), profile);

    let main = model.label_at(0).unwrap();
    assert_eq!(main.name, "main");
    assert_eq!(main.origin, LabelOrigin::Manual);
    assert_eq!(model.label_at(0x100).unwrap().address, Address::new(0x00, 0x8100));

    let warning = model.diagnostics().iter().find(|d| d.source == "labels").expect("unmapped label warning");
    assert_eq!(warning.severity, Severity::Warning);
    assert!(warning.message.contains("'ram'"));

    let listing = model.disassemble(&model.functions()[0]);
    assert_eq!(listing[0], "main:");
}

#[test]
fn unknown_detector_names_are_rejected() {
    let profile = AnalysisProfile { detectors: vec!["bogus".into()], ..AnalysisProfile::default() };
    let err = AnalysisPipeline::new(profile).err().expect("unknown detector");
    assert!(err.to_string().contains("Unknown detector 'bogus'"));
    assert!(err.to_string().contains("stride_table"));
}

#[test]
fn cancelled_pipeline_stops_before_the_first_stage() {
    let rom = RomImage::from_bytes(lorom_with_code(&SMALL_PROGRAM), &LoadOptions::default()).expect("load");
    let pipeline = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline");
    pipeline.cancellation().cancel();

    match pipeline.run(&rom) {
        Err(AnalysisError::Cancelled { stage }) => assert_eq!(stage, "entropy"),
        other => panic!("expected cancellation, got {:?}", other.map(|m| m.regions().len())),
    }
}

#[test]
fn analyze_path_reports_missing_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = AnalysisPipeline::new(AnalysisProfile::default()).expect("pipeline");
    let err = pipeline.analyze_path(&dir.path().join("missing.sfc")).err().expect("missing file");
    assert!(matches!(err, AnalysisError::Image(_)));
}

#[test]
fn call_graph_queries_see_recursion() {
    // $8000: JSR $8004; RTS   $8004: JSR $8004; RTS
    let code = [0x20, 0x04, 0x80, 0x60, 0x20, 0x04, 0x80, 0x60];
    let model = analyze(lorom_with_code(&code), AnalysisProfile::default());

    assert_eq!(model.functions().len(), 2);
    let (main, sub) = (&model.functions()[0], &model.functions()[1]);
    assert_eq!(main.extent(), 0..4);
    assert_eq!(sub.extent(), 4..8);
    assert!(main.calls_made.contains(&Address::new(0x00, 0x8004)));

    assert_eq!(model.callees(main).into_iter().collect::<Vec<_>>(), vec![4]);
    assert_eq!(model.callers(sub).into_iter().collect::<Vec<_>>(), vec![0, 4]);
    assert_eq!(model.recursive_functions().into_iter().collect::<Vec<_>>(), vec![4]);

    assert_eq!(model.xrefs_to(4).filter(|x| x.kind == XrefKind::Call).count(), 2);
    assert!(model.xrefs_from(0..4).all(|x| x.is_resolved()));
    assert_eq!(model.function_at(5).map(|f| f.entry), Some(4));
    let code_bytes: usize = model.regions_of(&["code"]).map(|r| r.len()).sum();
    assert_eq!(code_bytes, 8);
}

/// Same-bank jump table at $9000 pointing at eight `LDA #i; RTS` stubs at
/// $9100 + $20*i. Table and stubs share one mid-entropy block.
fn jump_table_image() -> Vec<u8> {
    let mut image = lorom_with_code(&[0x18, 0x60]);
    for i in 0..0x400 {
        image[0x1000 + i] = 1 + (i * 7 % 31) as u8;
    }
    for i in 0..8usize {
        let target = 0x9100 + 0x20 * i as u16;
        image[0x1000 + 2 * i..0x1002 + 2 * i].copy_from_slice(&target.to_le_bytes());
        let stub = 0x1100 + 0x20 * i;
        image[stub..stub + 3].copy_from_slice(&[0xA9, i as u8, 0x60]);
    }
    image
}

#[test]
fn jump_table_targets_in_the_same_block_become_functions() {
    let model = analyze(jump_table_image(), AnalysisProfile::default());
    assert_partition(&model);

    let table = model.region_at(0x1000).unwrap();
    assert_eq!(table.kind, RegionKind::PointerTable { entry_width: 2, entry_count: 8 });
    assert_eq!((table.start, table.end), (0x1000, 0x1010));
    assert!(table.evidence.iter().any(|e| e == "pointer_table"));

    let edges: Vec<_> = model.xrefs().iter().filter(|x| x.kind == XrefKind::PointerTable).collect();
    assert_eq!(edges.len(), 8);
    assert_eq!(edges[0].from, 0x1000);
    assert_eq!(edges[0].to, Some(Address::new(0x00, 0x9100)));
    assert_eq!(edges[7].to_offset, Some(0x11E0));

    assert_eq!(model.functions().len(), 9);
    let last = model.function_by_entry(0x11E0).expect("stub function");
    assert_eq!(last.instructions[0].to_string(), "LDA #$07");
    assert_eq!(last.extent(), 0x11E0..0x11E3);
    assert_eq!(model.label_at(0x1100).unwrap().name, "sub_009100");
    assert_eq!(model.label_at(0x1100).unwrap().origin, LabelOrigin::Heuristic);
    assert_eq!(model.region_at(0x1100).unwrap().kind, RegionKind::Code);
}

#[test]
fn pointer_targets_are_only_walked_when_enabled() {
    let mut profile = AnalysisProfile::default();
    profile.walker.seed_pointer_targets = false;
    let model = analyze(jump_table_image(), profile);

    assert_eq!(model.functions().len(), 1);
    assert_eq!(model.xrefs().iter().filter(|x| x.kind == XrefKind::PointerTable).count(), 8);
    assert_eq!(model.region_at(0x1100).unwrap().kind, RegionKind::Unknown);
}

#[test]
fn zero_filled_records_are_found_inside_padding() {
    let mut image = vec![0u8; 0x8000];
    for record in 0..32 {
        image[0x1000 + record * 16] = record as u8 + 1;
    }
    let model = analyze(image, AnalysisProfile::default());
    assert_partition(&model);

    let table = model.region_at(0x1000).unwrap();
    assert_eq!(table.kind, RegionKind::DataTable { entry_size: 16, entry_count: 32 });
    assert_eq!((table.start, table.end), (0x1000, 0x1200));
    assert_eq!(model.region_at(0x1200).unwrap().kind, RegionKind::Padding);
    assert_eq!(model.region_at(0).unwrap().kind, RegionKind::Padding);
}

#[test]
fn repeated_fill_characters_are_not_text() {
    let model = analyze(vec![b' '; 0x8000], AnalysisProfile::default());
    assert_partition(&model);
    assert_eq!(model.asset_regions().count(), 0);
    assert!(model.regions().iter().all(|r| r.kind == RegionKind::Padding));
}
