//! Core data model: regions, labels, cross-references, functions and diagnostics.
//!
//! All of these are produced by the analysis stages and owned by the
//! [`ProjectModel`](crate::project::ProjectModel). Offsets are linear offsets
//! into the stripped ROM image; addresses are console (bank:offset) addresses.

mod address;

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

pub use address::{Address, AddressParseError};

use crate::cpu::Instruction;

/// Content classification of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionKind {
    Code,
    Data,
    DataTable { entry_size: usize, entry_count: usize },
    PointerTable { entry_width: usize, entry_count: usize },
    Text,
    Graphics,
    Audio,
    Compressed,
    Padding,
    Unknown,
}

impl RegionKind {
    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Code => "code",
            RegionKind::Data => "data",
            RegionKind::DataTable { .. } => "data_table",
            RegionKind::PointerTable { .. } => "pointer_table",
            RegionKind::Text => "text",
            RegionKind::Graphics => "graphics",
            RegionKind::Audio => "audio",
            RegionKind::Compressed => "compressed",
            RegionKind::Padding => "padding",
            RegionKind::Unknown => "unknown",
        }
    }

    /// Kinds handed to asset extractors.
    pub fn is_asset(&self) -> bool {
        matches!(self, RegionKind::Graphics | RegionKind::Audio | RegionKind::Text)
    }

    /// Provisional kinds the pattern detectors are allowed to refine.
    /// Padding is included: sparse record tables are mostly fill bytes.
    pub fn is_refinable(&self) -> bool {
        matches!(self, RegionKind::Unknown | RegionKind::Data | RegionKind::Padding)
    }

    /// Re-derive record counts after the region was narrowed to `len` bytes.
    pub fn resized(self, len: usize) -> Self {
        match self {
            RegionKind::DataTable { entry_size, .. } => {
                RegionKind::DataTable { entry_size, entry_count: len / entry_size.max(1) }
            }
            RegionKind::PointerTable { entry_width, .. } => {
                RegionKind::PointerTable { entry_width, entry_count: len / entry_width.max(1) }
            }
            other => other,
        }
    }
}

/// A contiguous, typed slice `[start, end)` of the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    #[serde(flatten)]
    pub kind: RegionKind,
    /// Confidence in `kind`, in `[0, 1]`.
    pub confidence: f64,
    /// Mean Shannon entropy of the covered bytes, bits per byte.
    pub entropy: f64,
    /// Names of the detectors that contributed, oldest first.
    pub evidence: Vec<String>,
}

impl Region {
    pub fn new(start: usize, end: usize, kind: RegionKind, confidence: f64) -> Self {
        Self { start, end, kind, confidence: confidence.clamp(0.0, 1.0), entropy: 0.0, evidence: Vec::new() }
    }

    pub fn with_evidence(mut self, name: impl Into<String>) -> Self {
        self.push_evidence(name);
        self
    }

    pub fn with_entropy(mut self, entropy: f64) -> Self {
        self.entropy = entropy;
        self
    }

    /// Append a detector name unless it is already the most recent entry.
    pub fn push_evidence(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.evidence.last() != Some(&name) {
            self.evidence.push(name);
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Where a label came from. Variants are ordered by authority: a label may
/// only be replaced by one whose origin ranks at least as high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOrigin {
    Heuristic,
    CallTarget,
    Vector,
    Manual,
}

impl LabelOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelOrigin::Heuristic => "heuristic",
            LabelOrigin::CallTarget => "call_target",
            LabelOrigin::Vector => "vector",
            LabelOrigin::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub offset: usize,
    pub address: Address,
    pub name: String,
    pub origin: LabelOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XrefKind {
    Call,
    Jump,
    DataRead,
    DataWrite,
    PointerTable,
}

impl XrefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            XrefKind::Call => "call",
            XrefKind::Jump => "jump",
            XrefKind::DataRead => "data_read",
            XrefKind::DataWrite => "data_write",
            XrefKind::PointerTable => "pointer_table",
        }
    }
}

/// Directed edge from an instruction or table entry to its target.
///
/// `to` is `None` for indirect transfers whose target is never guessed.
/// `to_offset` is `None` when the target address is not mapped into the image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossReference {
    pub from: usize,
    pub from_address: Address,
    pub to: Option<Address>,
    pub to_offset: Option<usize>,
    pub kind: XrefKind,
}

impl CrossReference {
    pub fn is_resolved(&self) -> bool {
        self.to_offset.is_some()
    }

    pub fn is_indirect(&self) -> bool {
        self.to.is_none()
    }
}

/// A discovered subroutine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub entry: usize,
    pub entry_address: Address,
    /// One past the last byte of the highest instruction.
    pub end: usize,
    /// Decoded instructions ordered by offset.
    pub instructions: Vec<Instruction>,
    pub calls_made: BTreeSet<Address>,
    pub called_from: BTreeSet<Address>,
    pub stack_delta_estimate: i32,
    /// Set when the walk was truncated by a decode failure or a traversal limit.
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_reason: Option<String>,
}

impl Function {
    /// Lowest decoded byte. A backward branch can claim bytes before `entry`.
    pub fn start(&self) -> usize {
        self.instructions.first().map_or(self.entry, |i| i.offset.min(self.entry))
    }

    pub fn extent(&self) -> Range<usize> {
        self.start()..self.end
    }

    pub fn byte_len(&self) -> usize {
        self.instructions.iter().map(|i| i.len()).sum()
    }

    /// True when the instructions tile [`Function::extent`] without gaps.
    pub fn is_contiguous(&self) -> bool {
        let mut cursor = self.start();
        for insn in &self.instructions {
            if insn.offset != cursor {
                return false;
            }
            cursor += insn.len();
        }
        cursor == self.end
    }

    /// Raw bytes of every instruction, in offset order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for insn in &self.instructions {
            insn.encode_into(&mut out);
        }
        out
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.instructions
            .binary_search_by(|i| {
                if i.offset + i.len() <= offset {
                    std::cmp::Ordering::Less
                } else if i.offset > offset {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A recoverable problem recorded during analysis instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stage that raised it (`mapping`, `decoder`, `walker`, ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(source: &str, offset: Option<usize>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, source: source.to_string(), offset, message: message.into() }
    }

    pub fn info(source: &str, offset: Option<usize>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Info, source: source.to_string(), offset, message: message.into() }
    }
}
