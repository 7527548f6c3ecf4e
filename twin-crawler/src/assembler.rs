//! Merging of per-item containers into one deduplicated aggregate.
//!
//! Every element is keyed by its natural identity. Containers are applied in
//! arrival order and a later element replaces an earlier one with the same
//! key, so the set of keys never depends on the order while the values of
//! conflicting keys follow the last writer. Output vectors are sorted by key.

use std::collections::BTreeMap;

use crate::domain::{ItemContainer, ProcessStep, Relationship, ShellDescriptor, Submodel, Tombstone};

type RelationshipKey = (String, String, String);
type SubmodelKey = (String, String, String);
type TombstoneKey = (String, Option<String>, ProcessStep);

/// Incremental assembler; feed containers with [`add`](Self::add).
#[derive(Debug, Default)]
pub struct Assembler {
    shells: BTreeMap<String, ShellDescriptor>,
    relationships: BTreeMap<RelationshipKey, Relationship>,
    submodels: BTreeMap<SubmodelKey, Submodel>,
    tombstones: BTreeMap<TombstoneKey, Tombstone>,
    containers: usize,
}

fn shell_key(shell: &ShellDescriptor) -> String {
    shell.global_asset_id.clone().unwrap_or_else(|| shell.id.clone())
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, container: &ItemContainer) {
        for shell in &container.shells {
            self.shells.insert(shell_key(shell), shell.clone());
        }
        for rel in &container.relationships {
            self.relationships.insert(rel.key(), rel.clone());
        }
        for submodel in &container.submodels {
            self.submodels.insert(submodel.key(), submodel.clone());
        }
        for tombstone in &container.tombstones {
            self.tombstones.insert(tombstone.key(), tombstone.clone());
        }
        self.containers += 1;
    }

    /// Number of containers merged so far.
    pub fn containers(&self) -> usize {
        self.containers
    }

    pub fn finish(self) -> ItemContainer {
        ItemContainer {
            shells: self.shells.into_values().collect(),
            relationships: self.relationships.into_values().collect(),
            submodels: self.submodels.into_values().collect(),
            tombstones: self.tombstones.into_values().collect(),
        }
    }
}

/// Merge `containers` (in arrival order) into one aggregate.
pub fn assemble<'a, I>(containers: I) -> ItemContainer
where
    I: IntoIterator<Item = &'a ItemContainer>,
{
    let mut assembler = Assembler::new();
    for container in containers {
        assembler.add(container);
    }
    assembler.finish()
}
