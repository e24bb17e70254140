use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{Address, Label, LabelOrigin};

/// At most one label per offset; names unique across the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Label>", into = "Vec<Label>")]
pub struct LabelTable {
    by_offset: BTreeMap<usize, Label>,
    names: HashMap<String, usize>,
    addresses: HashMap<Address, usize>,
}

impl From<Vec<Label>> for LabelTable {
    fn from(labels: Vec<Label>) -> Self {
        let by_offset: BTreeMap<usize, Label> = labels.into_iter().map(|l| (l.offset, l)).collect();
        let names = by_offset.values().map(|l| (l.name.clone(), l.offset)).collect();
        let addresses = by_offset.values().map(|l| (l.address, l.offset)).collect();
        Self { by_offset, names, addresses }
    }
}

impl From<LabelTable> for Vec<Label> {
    fn from(table: LabelTable) -> Self {
        table.by_offset.into_values().collect()
    }
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless an existing label at the same offset has a higher origin.
    /// Equal origins keep the first label. A name already used elsewhere gets
    /// a numeric suffix. Returns whether the table changed.
    pub fn insert(&mut self, offset: usize, address: Address, name: &str, origin: LabelOrigin) -> bool {
        if let Some(existing) = self.by_offset.get(&offset) {
            if existing.origin >= origin {
                return false;
            }
            let old = existing.name.clone();
            self.names.remove(&old);
        }
        let name = self.unique_name(name);
        self.names.insert(name.clone(), offset);
        self.addresses.insert(address, offset);
        self.by_offset.insert(offset, Label { offset, address, name, origin });
        true
    }

    fn unique_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn get(&self, offset: usize) -> Option<&Label> {
        self.by_offset.get(&offset)
    }

    pub fn by_address(&self, address: Address) -> Option<&Label> {
        self.addresses.get(&address).and_then(|offset| self.by_offset.get(offset))
    }

    pub fn by_name(&self, name: &str) -> Option<&Label> {
        self.names.get(name).and_then(|offset| self.by_offset.get(offset))
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Labels in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.by_offset.values()
    }
}

/// `sub_BBHHHH`-style name for an address.
pub fn auto_name(prefix: &str, address: Address) -> String {
    format!("{prefix}_{:02X}{:04X}", address.bank, address.offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address::new(0x00, 0x8000);

    #[test]
    fn higher_origin_replaces_lower() {
        let mut labels = LabelTable::new();
        assert!(labels.insert(0, A, "loc_008000", LabelOrigin::Heuristic));
        assert!(labels.insert(0, A, "vec_reset", LabelOrigin::Vector));
        assert!(!labels.insert(0, A, "sub_008000", LabelOrigin::CallTarget));
        assert!(labels.insert(0, A, "main", LabelOrigin::Manual));
        assert_eq!(labels.get(0).unwrap().name, "main");
        assert!(labels.by_name("vec_reset").is_none());
        assert_eq!(labels.by_address(A).unwrap().name, "main");
        assert!(labels.by_address(A.wrapping_add(1)).is_none());
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut labels = LabelTable::new();
        labels.insert(0, A, "vec_nmi", LabelOrigin::Vector);
        labels.insert(4, A.wrapping_add(4), "vec_nmi", LabelOrigin::Vector);
        labels.insert(8, A.wrapping_add(8), "vec_nmi", LabelOrigin::Vector);
        let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["vec_nmi", "vec_nmi_2", "vec_nmi_3"]);
        assert_eq!(auto_name("sub", Address::new(0xC0, 0x1234)), "sub_C01234");
    }
}
