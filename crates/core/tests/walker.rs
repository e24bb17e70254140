mod common;

use romscope_core::analysis::{CancellationFlag, ControlFlowWalker, VisitState, WalkOutput, WalkerConfig};
use romscope_core::image::{LoadOptions, RomImage};
use romscope_core::model::{Address, LabelOrigin, Severity, XrefKind};

use common::{lorom_with_code, set_vector};

fn walk(image: Vec<u8>, config: &WalkerConfig) -> WalkOutput {
    let rom = RomImage::from_bytes(image, &LoadOptions::default()).expect("load");
    let mut walker = ControlFlowWalker::new(&rom, config);
    walker.seed_vectors(&rom.vectors());
    walker.run(&CancellationFlag::new()).expect("walk")
}

#[test]
fn instruction_limit_marks_function_partial() {
    let mut code = vec![0x18];
    code.extend([0xEA; 50]);
    code.push(0x60);
    let config = WalkerConfig { max_instructions: 10, ..WalkerConfig::default() };
    let out = walk(lorom_with_code(&code), &config);

    assert_eq!(out.functions.len(), 1);
    let f = &out.functions[0];
    assert!(f.partial);
    assert_eq!(f.instructions.len(), 10);
    assert!(f.partial_reason.as_deref().unwrap_or("").contains("instruction count"));
    assert!(out.diagnostics.iter().any(|d| d.severity == Severity::Warning && d.offset == Some(0)));
}

#[test]
fn falling_into_another_function_records_a_tail_jump() {
    // NMI handler at $800C runs NOPs straight into the reset handler at $8010.
    let mut image = vec![0u8; 0x8000];
    image[0x0C..0x12].copy_from_slice(&[0xEA, 0xEA, 0xEA, 0xEA, 0x18, 0x60]);
    set_vector(&mut image, 0xFFFC, 0x8010);
    set_vector(&mut image, 0xFFEA, 0x800C);
    let out = walk(image, &WalkerConfig::default());

    assert_eq!(out.functions.len(), 2);
    let nmi = &out.functions[0];
    assert_eq!(nmi.entry, 0x0C);
    assert_eq!(nmi.end, 0x10);
    assert_eq!(nmi.instructions.len(), 4);
    assert!(!nmi.partial);
    assert!(out
        .xrefs
        .iter()
        .any(|x| x.from == 0x0F && x.to_offset == Some(0x10) && x.kind == XrefKind::Jump));

    assert_eq!(out.labels.get(0x10).unwrap().name, "vec_reset");
    assert_eq!(out.labels.get(0x0C).unwrap().name, "vec_nmi");
    assert_eq!(out.labels.get(0x0C).unwrap().origin, LabelOrigin::Vector);
}

#[test]
fn entry_inside_an_instruction_is_unreachable() {
    // LDA #$12; RTS, with the NMI vector pointing at the immediate byte.
    let mut image = lorom_with_code(&[0xA9, 0x12, 0x60]);
    set_vector(&mut image, 0xFFEA, 0x8001);
    let out = walk(image, &WalkerConfig::default());

    assert_eq!(out.functions.len(), 1);
    assert_eq!(out.states[1], VisitState::Unreachable);
    assert_eq!(out.states[0], VisitState::FunctionEntry);
    assert!(out.diagnostics.iter().any(|d| d.severity == Severity::Info && d.offset == Some(1)));
}

#[test]
fn brk_stops_the_walk_and_marks_partial() {
    let out = walk(lorom_with_code(&[0x18, 0x00, 0x00, 0x60]), &WalkerConfig::default());
    let f = &out.functions[0];
    assert!(f.partial);
    assert!(f.partial_reason.as_deref().unwrap_or("").contains("BRK"));
    assert_eq!(f.end, 3);
}

#[test]
fn branches_split_blocks_and_get_local_labels() {
    // SEI; BEQ +1; NOP; RTS
    let out = walk(lorom_with_code(&[0x78, 0xF0, 0x01, 0xEA, 0x60]), &WalkerConfig::default());
    let f = &out.functions[0];
    assert_eq!(f.instructions.len(), 4);
    assert!(f.is_contiguous());
    assert_eq!(out.labels.get(4).unwrap().name, "loc_008004");
    assert!(out.xrefs.iter().any(|x| x.from == 1 && x.to == Some(Address::new(0x00, 0x8004))));
}

#[test]
fn call_targets_become_functions_and_keep_the_caller_context() {
    // REP #$20 (16-bit A); JSR $8008; RTS; ... $8008: LDA #$1234; RTS
    let mut code = vec![0x18, 0xFB, 0xC2, 0x20, 0x20, 0x08, 0x80, 0x60];
    code.extend([0xA9, 0x34, 0x12, 0x60]);
    let out = walk(lorom_with_code(&code), &WalkerConfig::default());

    assert_eq!(out.functions.len(), 2);
    let callee = &out.functions[1];
    assert_eq!(callee.entry, 8);
    assert_eq!(callee.instructions[0].to_string(), "LDA #$1234");
    assert!(callee.called_from.contains(&Address::new(0x00, 0x8004)));
    assert_eq!(out.labels.get(8).unwrap().name, "sub_008008");
    assert!(out.functions[0].calls_made.contains(&Address::new(0x00, 0x8008)));
}

#[test]
fn backward_branch_before_the_entry_widens_the_extent() {
    // $8000: NOP; RTS   $8002 (reset): BRA $8000
    let mut image = lorom_with_code(&[0xEA, 0x60, 0x80, 0xFC]);
    set_vector(&mut image, 0xFFFC, 0x8002);
    let out = walk(image.clone(), &WalkerConfig::default());

    assert_eq!(out.functions.len(), 1);
    let f = &out.functions[0];
    assert_eq!(f.entry, 2);
    assert_eq!(f.start(), 0);
    assert_eq!(f.extent(), 0..4);
    assert!(f.is_contiguous());
    assert_eq!(f.encode(), image[f.extent()].to_vec());
    assert_eq!(out.labels.get(0).unwrap().name, "loc_008000");
}
