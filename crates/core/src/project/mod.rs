//! The merged, read-only result of an analysis run.
//!
//! Renderers and asset extractors consume a [`ProjectModel`]; none of them
//! can mutate it. Everything is kept in address order so that two runs over
//! the same image compare equal.

mod labels;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::mapping::MappingMode;
use crate::model::{Address, CrossReference, Diagnostic, Function, Label, Region, RegionKind, XrefKind};

pub use labels::{auto_name, LabelTable};

/// Facts about the analysed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub size: usize,
    pub mode: MappingMode,
    pub mapping_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copier_header: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Bytes per region kind plus the share of the image that was decoded as code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub code_ratio: f64,
    pub unknown_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    image: ImageInfo,
    regions: Vec<Region>,
    functions: Vec<Function>,
    labels: LabelTable,
    xrefs: Vec<CrossReference>,
    diagnostics: Vec<Diagnostic>,
}

impl ProjectModel {
    /// Assemble a model. Regions must already form a partition; functions and
    /// xrefs are put in address order here.
    pub fn new(
        image: ImageInfo,
        regions: Vec<Region>,
        mut functions: Vec<Function>,
        labels: LabelTable,
        mut xrefs: Vec<CrossReference>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        functions.sort_by_key(|f| f.entry);
        xrefs.sort();
        xrefs.dedup();
        Self { image, regions, functions, labels, xrefs, diagnostics }
    }

    pub fn image(&self) -> &ImageInfo {
        &self.image
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn label_table(&self) -> &LabelTable {
        &self.labels
    }

    pub fn xrefs(&self) -> &[CrossReference] {
        &self.xrefs
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn region_at(&self, offset: usize) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.end <= offset);
        self.regions.get(idx).filter(|r| r.contains(offset))
    }

    /// Regions of the given kinds, for asset extractors.
    pub fn regions_of<'a>(&'a self, names: &'a [&str]) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions.iter().filter(move |r| names.contains(&r.kind.name()))
    }

    pub fn asset_regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.kind.is_asset())
    }

    /// Function with an instruction covering `offset`.
    pub fn function_at(&self, offset: usize) -> Option<&Function> {
        self.functions.iter().find(|f| f.extent().contains(&offset) && f.contains(offset))
    }

    pub fn function_by_entry(&self, entry: usize) -> Option<&Function> {
        self.functions.binary_search_by_key(&entry, |f| f.entry).ok().map(|i| &self.functions[i])
    }

    pub fn label_at(&self, offset: usize) -> Option<&Label> {
        self.labels.get(offset)
    }

    pub fn xrefs_from(&self, range: Range<usize>) -> impl Iterator<Item = &CrossReference> {
        self.xrefs.iter().filter(move |x| range.contains(&x.from))
    }

    pub fn xrefs_to(&self, offset: usize) -> impl Iterator<Item = &CrossReference> {
        self.xrefs.iter().filter(move |x| x.to_offset == Some(offset))
    }

    /// Entries of functions called from `function`.
    pub fn callees(&self, function: &Function) -> BTreeSet<usize> {
        self.call_edges().into_iter().filter(|(from, _)| *from == function.entry).map(|(_, to)| to).collect()
    }

    /// Entries of functions that call `function`.
    pub fn callers(&self, function: &Function) -> BTreeSet<usize> {
        self.call_edges().into_iter().filter(|(_, to)| *to == function.entry).map(|(from, _)| from).collect()
    }

    /// Resolved call edges between known functions, as `(caller entry, callee entry)`.
    pub fn call_edges(&self) -> BTreeSet<(usize, usize)> {
        self.xrefs
            .iter()
            .filter(|x| x.kind == XrefKind::Call)
            .filter_map(|x| {
                let to = x.to_offset?;
                let caller = self.function_at(x.from)?;
                let callee = self.function_by_entry(to)?;
                Some((caller.entry, callee.entry))
            })
            .collect()
    }

    /// Entries of functions that can reach themselves through calls.
    pub fn recursive_functions(&self) -> BTreeSet<usize> {
        let edges = self.call_edges();
        let mut graph: BTreeMap<usize, Vec<usize>> = self.functions.iter().map(|f| (f.entry, Vec::new())).collect();
        for (from, to) in &edges {
            graph.entry(*from).or_default().push(*to);
        }
        let mut recursive = BTreeSet::new();
        for component in strongly_connected(&graph) {
            let self_loop = component.len() == 1 && edges.contains(&(component[0], component[0]));
            if component.len() > 1 || self_loop {
                recursive.extend(component);
            }
        }
        recursive
    }

    pub fn coverage(&self) -> CoverageStats {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for region in &self.regions {
            *by_kind.entry(region.kind.name().to_string()).or_default() += region.len();
        }
        let total = self.image.size;
        let share = |name: &str| {
            if total == 0 {
                0.0
            } else {
                by_kind.get(name).copied().unwrap_or(0) as f64 / total as f64
            }
        };
        CoverageStats { total, code_ratio: share("code"), unknown_ratio: share("unknown"), by_kind }
    }

    /// Rebuild the bytes of a code region from decoded instructions alone.
    /// `None` unless the region is code and its instructions tile it exactly.
    pub fn reencode_region(&self, region: &Region) -> Option<Vec<u8>> {
        if region.kind != RegionKind::Code {
            return None;
        }
        let mut instructions: Vec<_> = self
            .functions
            .iter()
            .filter(|f| f.end > region.start)
            .flat_map(|f| f.instructions.iter())
            .filter(|i| i.offset >= region.start && i.end() <= region.end)
            .collect();
        instructions.sort_by_key(|i| i.offset);

        let mut out = Vec::with_capacity(region.len());
        let mut cursor = region.start;
        for insn in instructions {
            if insn.offset != cursor {
                return None;
            }
            insn.encode_into(&mut out);
            cursor = insn.end();
        }
        (cursor == region.end).then_some(out)
    }

    /// Assembly listing of one function, labels substituted.
    pub fn disassemble(&self, function: &Function) -> Vec<String> {
        let lookup = |address: Address| self.labels.by_address(address).map(|l| l.name.clone());
        let mut lines = Vec::with_capacity(function.instructions.len() * 2);
        for insn in &function.instructions {
            if let Some(label) = self.labels.get(insn.offset) {
                lines.push(format!("{}:", label.name));
            }
            let bytes: Vec<String> = insn.encode().iter().map(|b| format!("{b:02X}")).collect();
            lines.push(format!("  {}  {:<12} {}", insn.address, bytes.join(" "), insn.render(&lookup)));
        }
        lines
    }
}

/// Tarjan's algorithm, iteration order fixed by the `BTreeMap`.
fn strongly_connected(graph: &BTreeMap<usize, Vec<usize>>) -> Vec<Vec<usize>> {
    struct State<'g> {
        graph: &'g BTreeMap<usize, Vec<usize>>,
        index: BTreeMap<usize, usize>,
        low: BTreeMap<usize, usize>,
        stack: Vec<usize>,
        on_stack: BTreeSet<usize>,
        next: usize,
        out: Vec<Vec<usize>>,
    }

    fn connect(state: &mut State<'_>, node: usize) {
        state.index.insert(node, state.next);
        state.low.insert(node, state.next);
        state.next += 1;
        state.stack.push(node);
        state.on_stack.insert(node);

        let successors = state.graph.get(&node).cloned().unwrap_or_default();
        for succ in successors {
            if !state.index.contains_key(&succ) {
                connect(state, succ);
                let low = state.low[&node].min(state.low[&succ]);
                state.low.insert(node, low);
            } else if state.on_stack.contains(&succ) {
                let low = state.low[&node].min(state.index[&succ]);
                state.low.insert(node, low);
            }
        }

        if state.low[&node] == state.index[&node] {
            let mut component = Vec::new();
            while let Some(top) = state.stack.pop() {
                state.on_stack.remove(&top);
                component.push(top);
                if top == node {
                    break;
                }
            }
            component.sort_unstable();
            state.out.push(component);
        }
    }

    let mut state = State {
        graph,
        index: BTreeMap::new(),
        low: BTreeMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        next: 0,
        out: Vec::new(),
    };
    for &node in graph.keys() {
        if !state.index.contains_key(&node) {
            connect(&mut state, node);
        }
    }
    state.out
}
