//! Recursive-descent code discovery.
//!
//! The walker keeps one [`VisitState`] and one owning function per byte of
//! the image. Seeds are walked in FIFO order; each seed becomes a function
//! whose basic blocks are followed until every path returns, jumps away
//! indirectly, or runs into bytes another function already owns. Bytes are
//! never decoded twice: the function that reached them first keeps them.

use std::collections::{BTreeSet, VecDeque};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::CancellationFlag;
use crate::cpu::{decode, opcode_info, Flow, Instruction, Mnemonic, ProcessorContext, RawReason};
use crate::error::{AnalysisError, DecodeError, TraversalLimit, TraversalLimitExceeded};
use crate::image::{RomImage, Vector};
use crate::model::{Address, CrossReference, Diagnostic, Function, LabelOrigin, XrefKind};
use crate::project::{auto_name, LabelTable};

const NO_OWNER: u32 = u32::MAX;
const SOURCE: &str = "walker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub max_function_bytes: usize,
    pub max_instructions: usize,
    pub max_blocks: usize,
    /// Walk code-looking targets of detected pointer tables.
    pub seed_pointer_targets: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self { max_function_bytes: 0x4000, max_instructions: 8192, max_blocks: 1024, seed_pointer_targets: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitState {
    Unvisited,
    Queued,
    Decoded,
    FunctionEntry,
    Unreachable,
}

#[derive(Debug, Clone)]
struct Seed {
    offset: usize,
    context: ProcessorContext,
    label: Option<(String, LabelOrigin)>,
}

/// Everything the walk produced.
#[derive(Debug, Clone, Default)]
pub struct WalkOutput {
    /// Ordered by entry offset.
    pub functions: Vec<Function>,
    pub labels: LabelTable,
    pub xrefs: Vec<CrossReference>,
    pub diagnostics: Vec<Diagnostic>,
    pub states: Vec<VisitState>,
}

pub struct ControlFlowWalker<'a> {
    rom: &'a RomImage,
    config: &'a WalkerConfig,
    states: Vec<VisitState>,
    owner: Vec<u32>,
    /// Set on the first byte of every decoded instruction.
    starts: Vec<bool>,
    queue: VecDeque<Seed>,
    functions: Vec<Function>,
    /// Functions created so far; doubles as the next owner id.
    created: usize,
    labels: LabelTable,
    xrefs: Vec<CrossReference>,
    diagnostics: Vec<Diagnostic>,
}

/// Per-function walk state.
struct Walk {
    index: u32,
    entry: usize,
    blocks: VecDeque<(usize, ProcessorContext)>,
    block_count: usize,
    bytes: usize,
    instructions: Vec<Instruction>,
    calls_made: BTreeSet<Address>,
    partial: Option<String>,
}

impl<'a> ControlFlowWalker<'a> {
    pub fn new(rom: &'a RomImage, config: &'a WalkerConfig) -> Self {
        let size = rom.len();
        Self {
            rom,
            config,
            states: vec![VisitState::Unvisited; size],
            owner: vec![NO_OWNER; size],
            starts: vec![false; size],
            queue: VecDeque::new(),
            functions: Vec::new(),
            created: 0,
            labels: LabelTable::new(),
            xrefs: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Pre-existing labels (manual ones from a profile) that discovered
    /// names must not override.
    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    /// Queue the hardware vectors. Emulation vectors start in emulation
    /// mode, native ones in native mode with 8-bit registers.
    pub fn seed_vectors(&mut self, vectors: &[Vector]) {
        for vector in vectors {
            let context = if vector.emulation {
                ProcessorContext::reset()
            } else {
                ProcessorContext::native(true, true)
            };
            self.enqueue(vector.offset, context, Some((vector.label(), LabelOrigin::Vector)));
        }
    }

    /// Queue likely entry points found by the pattern pass.
    pub fn seed_entries(&mut self, entries: &[usize]) {
        let mut sorted = entries.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for offset in sorted {
            let name = self.rom.address_of(offset).map(|a| auto_name("sub", a));
            self.enqueue(offset, ProcessorContext::native(true, true), name.map(|n| (n, LabelOrigin::Heuristic)));
        }
    }

    fn enqueue(&mut self, offset: usize, context: ProcessorContext, label: Option<(String, LabelOrigin)>) {
        let Some(state) = self.states.get_mut(offset) else {
            return;
        };
        if *state == VisitState::Unvisited {
            *state = VisitState::Queued;
        }
        self.queue.push_back(Seed { offset, context, label });
    }

    fn add_label(&mut self, offset: usize, name: &str, origin: LabelOrigin) {
        if let Some(address) = self.rom.address_of(offset) {
            self.labels.insert(offset, address, name, origin);
        }
    }

    /// Drain the queue.
    pub fn run(mut self, cancel: &CancellationFlag) -> Result<WalkOutput, AnalysisError> {
        while let Some(seed) = self.queue.pop_front() {
            cancel.check("walker")?;
            self.visit(seed);
        }

        // Call edges into known functions populate `called_from`.
        let calls: Vec<(usize, Address)> = self
            .xrefs
            .iter()
            .filter(|x| x.kind == XrefKind::Call)
            .filter_map(|x| x.to_offset.map(|to| (to, x.from_address)))
            .collect();
        for (to, from) in calls {
            if let Ok(i) = self.functions.binary_search_by_key(&to, |f| f.entry) {
                self.functions[i].called_from.insert(from);
            }
        }

        self.xrefs.sort();
        self.xrefs.dedup();
        let partial = self.functions.iter().filter(|f| f.partial).count();
        info!(
            "walker: {} functions ({} partial), {} labels, {} xrefs",
            self.functions.len(),
            partial,
            self.labels.len(),
            self.xrefs.len()
        );
        Ok(WalkOutput {
            functions: self.functions,
            labels: self.labels,
            xrefs: self.xrefs,
            diagnostics: self.diagnostics,
            states: self.states,
        })
    }

    fn visit(&mut self, seed: Seed) {
        let offset = seed.offset;
        match self.states[offset] {
            VisitState::FunctionEntry => {
                if let Some((name, origin)) = &seed.label {
                    self.add_label(offset, name, *origin);
                }
            }
            VisitState::Decoded | VisitState::Unreachable if !self.starts[offset] => {
                self.states[offset] = VisitState::Unreachable;
                self.diagnostics.push(Diagnostic::info(
                    SOURCE,
                    Some(offset),
                    "entry point lands inside an already decoded instruction",
                ));
            }
            VisitState::Decoded => {
                // Secondary entry into an existing function.
                if let Some((name, origin)) = &seed.label {
                    self.add_label(offset, name, *origin);
                }
            }
            _ => {
                if let Some((name, origin)) = &seed.label {
                    self.add_label(offset, name, *origin);
                }
                self.walk_function(offset, seed.context);
            }
        }
    }

    fn walk_function(&mut self, entry: usize, context: ProcessorContext) {
        let Some(entry_address) = self.rom.address_of(entry) else {
            return;
        };
        let index = self.created as u32;
        self.created += 1;
        let mut walk = Walk {
            index,
            entry,
            blocks: VecDeque::from([(entry, context)]),
            block_count: 0,
            bytes: 0,
            instructions: Vec::new(),
            calls_made: BTreeSet::new(),
            partial: None,
        };
        self.states[entry] = VisitState::FunctionEntry;

        while let Some((start, ctx)) = walk.blocks.pop_front() {
            walk.block_count += 1;
            let blocks = walk.block_count;
            if blocks > self.config.max_blocks {
                self.exceed(&mut walk, TraversalLimit::Blocks, blocks);
                break;
            }
            if let Err(limit) = self.walk_block(&mut walk, start, ctx) {
                self.exceed(&mut walk, limit.limit, limit.value);
                break;
            }
        }

        walk.instructions.sort_by_key(|i| i.offset);
        let end = walk.instructions.iter().map(Instruction::end).max().unwrap_or(entry);
        let stack_delta_estimate = walk.instructions.iter().map(Instruction::stack_effect).sum();
        if let Some(reason) = &walk.partial {
            warn!("function at {entry_address} is partial: {reason}");
        }
        debug!(
            "function {entry_address}: {} instructions, {:#X}..{:#X}",
            walk.instructions.len(),
            entry,
            end
        );

        let function = Function {
            entry,
            entry_address,
            end,
            instructions: walk.instructions,
            calls_made: walk.calls_made,
            called_from: BTreeSet::new(),
            stack_delta_estimate,
            partial: walk.partial.is_some(),
            partial_reason: walk.partial,
        };
        let at = self.functions.partition_point(|f| f.entry < entry);
        self.functions.insert(at, function);
    }

    fn exceed(&mut self, walk: &mut Walk, limit: TraversalLimit, value: usize) {
        let err = TraversalLimitExceeded { entry: walk.entry, limit, value };
        self.diagnostics.push(Diagnostic::warning(SOURCE, Some(walk.entry), err.to_string()));
        walk.blocks.clear();
        walk.partial.get_or_insert(err.to_string());
    }

    fn mark_partial(&mut self, walk: &mut Walk, offset: usize, reason: String) {
        self.diagnostics.push(Diagnostic::warning(SOURCE, Some(offset), reason.clone()));
        walk.partial.get_or_insert(reason);
    }

    /// Decode one basic block and everything it falls through to.
    fn walk_block(
        &mut self,
        walk: &mut Walk,
        start: usize,
        context: ProcessorContext,
    ) -> Result<(), TraversalLimitExceeded> {
        let mut offset = start;
        let mut ctx = context;
        let mut previous: Option<(usize, Address)> = None;

        loop {
            if offset >= self.rom.len() {
                let reason = DecodeError::OutOfBounds { offset, size: self.rom.len() }.to_string();
                self.mark_partial(walk, offset, reason);
                return Ok(());
            }
            match self.owner[offset] {
                NO_OWNER => {}
                owner if owner == walk.index => {
                    if !self.starts[offset] {
                        self.mark_partial(walk, offset, format!("overlapping decode at {offset:#X}"));
                    }
                    return Ok(());
                }
                _ => {
                    // Fell into an earlier function: record the tail transfer and stop.
                    if let Some((from, from_address)) = previous {
                        self.xrefs.push(CrossReference {
                            from,
                            from_address,
                            to: self.rom.address_of(offset),
                            to_offset: Some(offset),
                            kind: XrefKind::Jump,
                        });
                    }
                    return Ok(());
                }
            }

            let (insn, next) = match decode(self.rom, offset, ctx) {
                Ok(decoded) => decoded,
                Err(err) => {
                    self.mark_partial(walk, offset, err.to_string());
                    return Ok(());
                }
            };
            if let Some(clash) = (insn.offset + 1..insn.end()).find(|&b| self.owner[b] != NO_OWNER) {
                self.mark_partial(walk, offset, format!("instruction at {offset:#X} runs into decoded bytes at {clash:#X}"));
                return Ok(());
            }

            let count = walk.instructions.len() + 1;
            if count > self.config.max_instructions {
                return Err(TraversalLimitExceeded {
                    entry: walk.entry,
                    limit: TraversalLimit::Instructions,
                    value: count,
                });
            }
            if walk.bytes + insn.len() > self.config.max_function_bytes {
                return Err(TraversalLimitExceeded {
                    entry: walk.entry,
                    limit: TraversalLimit::FunctionBytes,
                    value: walk.bytes + insn.len(),
                });
            }

            walk.bytes += insn.len();
            for b in insn.offset..insn.end() {
                self.owner[b] = walk.index;
                if self.states[b] != VisitState::FunctionEntry {
                    self.states[b] = VisitState::Decoded;
                }
            }
            self.starts[insn.offset] = true;

            if let Some((target, kind)) = insn.data_reference() {
                self.push_xref(&insn, Some(target), kind);
            }

            previous = Some((insn.offset, insn.address));
            walk.instructions.push(insn.clone());

            match insn.flow() {
                Flow::Sequential => {}
                Flow::Branch(target) => {
                    self.follow(walk, &insn, target, next);
                }
                Flow::Jump(target) => {
                    self.follow(walk, &insn, target, next);
                    return Ok(());
                }
                Flow::Call(target) => {
                    walk.calls_made.insert(target);
                    let to_offset = self.push_xref(&insn, Some(target), XrefKind::Call);
                    match to_offset {
                        Some(callee) => {
                            let name = auto_name("sub", self.rom.address_of(callee).unwrap_or(target));
                            self.enqueue(callee, next, Some((name, LabelOrigin::CallTarget)));
                        }
                        None => debug!("call at {} targets unmapped {target}", insn.address),
                    }
                }
                Flow::IndirectJump => {
                    self.push_xref(&insn, None, XrefKind::Jump);
                    return Ok(());
                }
                Flow::IndirectCall => {
                    self.push_xref(&insn, None, XrefKind::Call);
                }
                Flow::Return => return Ok(()),
                Flow::Halt => {
                    let reason = match insn.raw {
                        Some(RawReason::Reserved) => {
                            Some(DecodeError::Reserved { offset: insn.offset, opcode: insn.opcode }.to_string())
                        }
                        Some(RawReason::Truncated) => Some(
                            DecodeError::Truncated {
                                offset: insn.offset,
                                needed: opcode_info(insn.opcode).mode.operand_size(&insn.context) + 1,
                                available: insn.len(),
                            }
                            .to_string(),
                        ),
                        None if insn.mnemonic == Mnemonic::BRK => Some(format!("BRK at {}", insn.address)),
                        None => None,
                    };
                    if let Some(reason) = reason {
                        self.mark_partial(walk, insn.offset, reason);
                    }
                    return Ok(());
                }
            }

            offset = insn.end();
            ctx = next;
        }
    }

    /// Record a branch or jump edge and queue the target block when it is ours to walk.
    fn follow(&mut self, walk: &mut Walk, insn: &Instruction, target: Address, context: ProcessorContext) {
        let Some(to) = self.push_xref(insn, Some(target), XrefKind::Jump) else {
            let reason = DecodeError::TargetOutOfRange { offset: insn.offset, target }.to_string();
            self.mark_partial(walk, insn.offset, reason);
            return;
        };
        match self.owner[to] {
            NO_OWNER => {
                if !walk.blocks.iter().any(|(o, _)| *o == to) {
                    walk.blocks.push_back((to, context));
                }
                if to != walk.entry {
                    let name = auto_name("loc", self.rom.address_of(to).unwrap_or(target));
                    self.add_label(to, &name, LabelOrigin::Heuristic);
                }
            }
            owner if owner == walk.index => {
                if !self.starts[to] {
                    self.mark_partial(walk, insn.offset, format!("branch into the middle of an instruction at {to:#X}"));
                } else if to != walk.entry {
                    let name = auto_name("loc", self.rom.address_of(to).unwrap_or(target));
                    self.add_label(to, &name, LabelOrigin::Heuristic);
                }
            }
            // Tail transfer into an earlier function; the edge is all we keep.
            _ => {}
        }
    }

    /// Push an edge; returns the resolved target offset.
    fn push_xref(&mut self, insn: &Instruction, to: Option<Address>, kind: XrefKind) -> Option<usize> {
        let to_offset = to.and_then(|a| self.rom.offset_of(a));
        self.xrefs.push(CrossReference { from: insn.offset, from_address: insn.address, to, to_offset, kind });
        to_offset
    }
}
