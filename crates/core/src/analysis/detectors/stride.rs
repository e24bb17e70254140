use serde::{Deserialize, Serialize};

use super::{ratio, DetectionInput, Finding, RegionDetector};
use crate::analysis::entropy::shannon_entropy;
use crate::model::{Region, RegionKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrideConfig {
    pub strides: Vec<usize>,
    pub min_records: usize,
    /// Share of equal bytes between consecutive records.
    pub min_similarity: f64,
}

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            strides: vec![2, 3, 4, 5, 6, 8, 10, 12, 16, 20, 24, 32],
            min_records: 8,
            min_similarity: 0.5,
        }
    }
}

/// Fixed-length record tables.
#[derive(Debug, Clone, Default)]
pub struct StrideTableDetector {
    config: StrideConfig,
}

struct Table {
    stride: usize,
    records: usize,
    similarity: f64,
    /// Columns whose value changes somewhere in the table.
    varying: usize,
}

impl Table {
    fn cover(&self) -> usize {
        self.records * self.stride
    }

    /// Fewer varying columns per record byte means the stride lines the
    /// records up. Equal shares prefer the wider cover, then the shorter stride.
    fn aligns_better_than(&self, other: &Table) -> bool {
        let (ours, theirs) = (self.varying * other.stride, other.varying * self.stride);
        ours < theirs
            || (ours == theirs && self.cover() > other.cover())
            || (ours == theirs && self.cover() == other.cover() && self.stride < other.stride)
    }
}

/// Every byte equal: fill, not a record.
fn is_fill(record: &[u8]) -> bool {
    record.windows(2).all(|w| w[0] == w[1])
}

fn equal_bytes(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x == y).count()
}

impl StrideTableDetector {
    pub fn new(config: StrideConfig) -> Self {
        Self { config }
    }

    /// Longest run of similar records of length `stride` starting at `start`.
    fn run_at(&self, bytes: &[u8], start: usize, end: usize, stride: usize) -> Option<Table> {
        let record = |k: usize| &bytes[start + k * stride..start + (k + 1) * stride];
        let max_records = (end - start) / stride;
        if max_records < self.config.min_records || is_fill(record(0)) {
            return None;
        }

        let mut records = 1;
        while records < max_records
            && ratio(equal_bytes(record(records - 1), record(records)), stride) >= self.config.min_similarity
        {
            records += 1;
        }
        // Trailing fill belongs to the padding around the table.
        while records > 1 && is_fill(record(records - 1)) {
            records -= 1;
        }
        let filled = (0..records).filter(|&k| is_fill(record(k))).count();
        if records - filled < self.config.min_records {
            return None;
        }

        let varying = (0..stride)
            .filter(|&col| {
                let first = bytes[start + col];
                (1..records).any(|k| bytes[start + k * stride + col] != first)
            })
            .count();
        // Identical records are fill, not a table.
        if varying == 0 {
            return None;
        }

        let equal_total: usize = (1..records).map(|k| equal_bytes(record(k - 1), record(k))).sum();
        Some(Table { stride, records, similarity: ratio(equal_total, (records - 1) * stride), varying })
    }

    /// Best table at `start`. Strides covering at least three quarters of
    /// the widest run compete on how well their columns line up.
    fn best_at(&self, bytes: &[u8], start: usize, end: usize) -> Option<Table> {
        let tables: Vec<Table> = self
            .config
            .strides
            .iter()
            .filter(|&&stride| stride >= 2)
            .filter_map(|&stride| self.run_at(bytes, start, end, stride))
            .collect();
        let widest = tables.iter().map(Table::cover).max()?;
        tables
            .into_iter()
            .filter(|t| t.cover() * 4 >= widest * 3)
            .reduce(|best, t| if t.aligns_better_than(&best) { t } else { best })
    }
}

impl RegionDetector for StrideTableDetector {
    fn name(&self) -> &'static str {
        "stride_table"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Finding> {
        let bytes = input.rom.bytes();
        let (start, end) = (input.region.start, input.region.end.min(bytes.len()));
        let mut findings = Vec::new();
        let mut cursor = start;
        while cursor < end {
            // Tables start where a run of one repeated byte ends.
            if cursor > start && bytes[cursor] == bytes[cursor - 1] {
                let fill = bytes[cursor];
                cursor += bytes[cursor..end].iter().take_while(|&&b| b == fill).count();
                continue;
            }
            match self.best_at(bytes, cursor, end) {
                Some(table) => {
                    let table_end = cursor + table.cover();
                    let confidence =
                        0.5 + 0.5 * (table.records as f64 / 32.0).min(1.0) * table.similarity;
                    let kind = RegionKind::DataTable { entry_size: table.stride, entry_count: table.records };
                    let region = Region::new(cursor, table_end, kind, confidence)
                        .with_entropy(shannon_entropy(&bytes[cursor..table_end]));
                    findings.push(Finding::new(self, region));
                    cursor = table_end;
                }
                None => cursor += 1,
            }
        }
        findings
    }
}
