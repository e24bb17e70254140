//! A partition of `[0, size)` into regions that stays a partition under edits.

use std::ops::Range;

use crate::model::{Region, RegionKind};

/// Ordered, gap-free, non-overlapping regions covering `[0, size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMap {
    size: usize,
    regions: Vec<Region>,
}

impl RegionMap {
    /// A single `Unknown` region covering everything.
    pub fn new(size: usize) -> Self {
        let regions = if size == 0 {
            Vec::new()
        } else {
            vec![Region::new(0, size, RegionKind::Unknown, 0.0)]
        };
        Self { size, regions }
    }

    /// Build from arbitrary regions: they are clamped, applied in order
    /// (later ones win on overlap) and the leftovers stay `Unknown`.
    pub fn from_regions(size: usize, regions: impl IntoIterator<Item = Region>) -> Self {
        let mut map = Self::new(size);
        for region in regions {
            map.overlay(region);
        }
        map
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn into_regions(self) -> Vec<Region> {
        self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn index_at(&self, offset: usize) -> Option<usize> {
        if offset >= self.size {
            return None;
        }
        let idx = self.regions.partition_point(|r| r.end <= offset);
        (idx < self.regions.len()).then_some(idx)
    }

    pub fn region_at(&self, offset: usize) -> Option<&Region> {
        self.index_at(offset).map(|i| &self.regions[i])
    }

    /// Regions intersecting `range`, in order.
    pub fn overlapping(&self, range: Range<usize>) -> &[Region] {
        let first = self.regions.partition_point(|r| r.end <= range.start);
        let last = self.regions.partition_point(|r| r.start < range.end);
        &self.regions[first..last.max(first)]
    }

    /// Replace `[region.start, region.end)` with `region`, trimming the
    /// neighbours it cuts into. Out-of-range parts are clamped away.
    pub fn overlay(&mut self, mut region: Region) {
        region.end = region.end.min(self.size);
        if region.start >= region.end {
            return;
        }
        region.kind = region.kind.resized(region.len());

        let first = self.regions.partition_point(|r| r.end <= region.start);
        let last = self.regions.partition_point(|r| r.start < region.end);

        let mut replacement = Vec::with_capacity(3);
        if let Some(head) = self.regions.get(first) {
            if head.start < region.start {
                replacement.push(trimmed(head, head.start, region.start));
            }
        }
        let tail = last.checked_sub(1).and_then(|i| self.regions.get(i));
        let tail = tail.filter(|t| t.end > region.end).map(|t| trimmed(t, region.end, t.end));
        replacement.push(region);
        replacement.extend(tail);

        self.regions.splice(first..last, replacement);
    }

    /// Merge neighbours of the same plain kind. Tables are never merged:
    /// two adjacent tables are two tables.
    pub fn merge_adjacent(&mut self) {
        let mut merged: Vec<Region> = Vec::with_capacity(self.regions.len());
        for region in self.regions.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.kind == region.kind && mergeable(&region.kind) => {
                    absorb(prev, region);
                }
                _ => merged.push(region),
            }
        }
        self.regions = merged;
    }

    /// Check the partition invariant.
    pub fn validate(&self) -> Result<(), String> {
        let mut cursor = 0;
        for region in &self.regions {
            if region.start != cursor {
                return Err(format!("gap or overlap at {:#X} (region starts at {:#X})", cursor, region.start));
            }
            if region.is_empty() {
                return Err(format!("empty region at {:#X}", region.start));
            }
            cursor = region.end;
        }
        if cursor != self.size {
            return Err(format!("coverage ends at {cursor:#X}, image is {:#X} bytes", self.size));
        }
        Ok(())
    }
}

fn mergeable(kind: &RegionKind) -> bool {
    !matches!(kind, RegionKind::DataTable { .. } | RegionKind::PointerTable { .. })
}

fn trimmed(region: &Region, start: usize, end: usize) -> Region {
    let mut part = region.clone();
    part.start = start;
    part.end = end;
    part.kind = part.kind.resized(end - start);
    part
}

/// Fold `next` into `prev`, weighting confidence and entropy by length.
pub(crate) fn absorb(prev: &mut Region, next: Region) {
    let (a, b) = (prev.len() as f64, next.len() as f64);
    let total = a + b;
    if total > 0.0 {
        prev.confidence = (prev.confidence * a + next.confidence * b) / total;
        prev.entropy = (prev.entropy * a + next.entropy * b) / total;
    }
    prev.end = next.end;
    for name in next.evidence {
        if !prev.evidence.contains(&name) {
            prev.evidence.push(name);
        }
    }
}
