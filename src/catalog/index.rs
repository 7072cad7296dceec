use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::parser::{parse_catalog, CatalogItem};

/// What to do when two manifest blocks share an id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIdPolicy {
    /// Keep the first occurrence, drop later ones with a warning.
    #[default]
    Reject,
    /// Last write wins, with a warning.
    Replace,
}

/// Read-only `id -> item` mapping, built once per manifest.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    items: HashMap<u32, CatalogItem>,
    duplicates: usize,
}

impl CatalogIndex {
    pub fn build<I>(items: I, policy: DuplicateIdPolicy) -> Self
    where
        I: IntoIterator<Item = CatalogItem>,
    {
        let mut index: HashMap<u32, CatalogItem> = HashMap::new();
        let mut duplicates = 0;
        for item in items {
            if let Some(existing) = index.get(&item.id) {
                duplicates += 1;
                match policy {
                    DuplicateIdPolicy::Reject => {
                        log::warn!(
                            "catalog: duplicate id {} ('{}') rejected, keeping '{}'",
                            item.id,
                            item.display_name,
                            existing.display_name
                        );
                        continue;
                    }
                    DuplicateIdPolicy::Replace => {
                        log::warn!(
                            "catalog: duplicate id {} replaces '{}' with '{}'",
                            item.id,
                            existing.display_name,
                            item.display_name
                        );
                    }
                }
            }
            index.insert(item.id, item);
        }
        Self {
            items: index,
            duplicates,
        }
    }

    /// Parse manifest text and index it.
    pub fn from_manifest(text: &str, policy: DuplicateIdPolicy) -> Self {
        Self::build(parse_catalog(text), policy)
    }

    /// Read a manifest file from disk and index it.
    pub fn load<P: AsRef<Path>>(path: P, policy: DuplicateIdPolicy) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label manifest {}", path.display()))?;
        let index = Self::from_manifest(&text, policy);
        log::info!(
            "catalog: loaded {} labels from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn lookup(&self, id: u32) -> Option<&CatalogItem> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of duplicate blocks seen while building.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u32, display_name: &str) -> CatalogItem {
        CatalogItem {
            id,
            name: format!("/m/{}", id),
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn every_item_is_reachable_by_id() {
        let items: Vec<CatalogItem> = (0..20).map(|i| item(i, &format!("label{}", i))).collect();
        let index = CatalogIndex::build(items.clone(), DuplicateIdPolicy::Reject);
        assert_eq!(index.len(), 20);
        for expected in &items {
            assert_eq!(index.lookup(expected.id), Some(expected));
        }
        assert!(index.lookup(20).is_none());
    }

    #[test]
    fn reject_keeps_first_duplicate() {
        let index = CatalogIndex::build(
            vec![item(3, "cat"), item(3, "dog")],
            DuplicateIdPolicy::Reject,
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.duplicates(), 1);
        assert_eq!(index.lookup(3).unwrap().display_name, "cat");
    }

    #[test]
    fn replace_keeps_last_duplicate() {
        let index = CatalogIndex::build(
            vec![item(3, "cat"), item(3, "dog")],
            DuplicateIdPolicy::Replace,
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(3).unwrap().display_name, "dog");
    }

    #[test]
    fn ids_are_sorted() {
        let index = CatalogIndex::build(
            vec![item(9, "a"), item(1, "b"), item(4, "c")],
            DuplicateIdPolicy::Reject,
        );
        assert_eq!(index.ids(), vec![1, 4, 9]);
    }
}
