//! The authoritative particle collection with staged mutation.
//!
//! Within one step's notification passes the live collection is never
//! structurally changed. Insertions and destructions go through a
//! [`MutationLog`], an explicit command log the kernel applies at a single
//! commit point per step. Everything that observes the collection between
//! two commits therefore sees one stable set of molecules.

use std::collections::BTreeMap;

use log::debug;

use crate::particles::molecule::{Molecule, MoleculeId};

/// Staged insertions and destructions, applied between steps.
///
/// Destructions are recorded by id and deduplicated at commit; staging the
/// same molecule twice (e.g. via two destructing sensors) is fine.
#[derive(Debug, Default)]
pub struct MutationLog {
    insertions: Vec<Molecule>,
    destructions: Vec<MoleculeId>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a molecule for insertion at the next commit.
    pub fn stage_insert(&mut self, molecule: Molecule) {
        self.insertions.push(molecule);
    }

    /// Stage a molecule for destruction at the next commit.
    pub fn stage_destroy(&mut self, id: MoleculeId) {
        self.destructions.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.destructions.is_empty()
    }

    pub fn staged_insertions(&self) -> usize {
        self.insertions.len()
    }

    pub fn staged_destructions(&self) -> usize {
        self.destructions.len()
    }
}

/// Owns all live molecules, keyed by stable id in ascending order.
#[derive(Debug, Default)]
pub struct MoleculeManager {
    molecules: BTreeMap<MoleculeId, Molecule>,
    total_spawned: u64,
}

impl MoleculeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    /// Total number of molecules ever committed, i.e. the next id to be
    /// assigned.
    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    /// Ids of all live molecules in ascending order. Taken as a snapshot by
    /// the kernel before iterating a step, so staged changes cannot shift
    /// the iteration.
    pub fn ids(&self) -> Vec<MoleculeId> {
        self.molecules.keys().copied().collect()
    }

    pub fn get(&self, id: MoleculeId) -> Option<&Molecule> {
        self.molecules.get(&id)
    }

    /// Replace a live molecule with an updated one carrying the same id.
    pub fn replace(&mut self, molecule: Molecule) {
        debug_assert_ne!(molecule.id, Molecule::UNASSIGNED_ID);
        self.molecules.insert(molecule.id, molecule);
    }

    /// Stable ordered view of the live collection.
    pub fn get_all(&self) -> impl Iterator<Item = &Molecule> {
        self.molecules.values()
    }

    /// Deep copies of all live molecules, for consumers that outlive the
    /// current step (logging, plotting).
    pub fn get_all_copies(&self) -> Vec<Molecule> {
        self.molecules.values().cloned().collect()
    }

    /// Commit all staged changes. Destructions apply first, then
    /// insertions receive their ids, in staging order.
    pub fn apply_changes(&mut self, log: &mut MutationLog) {
        if !log.is_empty() {
            debug!(
                "committing {} destructions, {} insertions",
                log.destructions.len(),
                log.insertions.len()
            );
        }
        for id in log.destructions.drain(..) {
            self.molecules.remove(&id);
        }
        for mut molecule in log.insertions.drain(..) {
            molecule.id = self.total_spawned;
            self.total_spawned += 1;
            self.molecules.insert(molecule.id, molecule);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn molecule_at(z: f64) -> Molecule {
        Molecule::new(Vector3::new(0.0, 0.0, z), Vector3::zeros(), None)
    }

    #[test]
    fn staged_insertions_are_invisible_until_commit() {
        let mut manager = MoleculeManager::new();
        let mut log = MutationLog::new();
        log.stage_insert(molecule_at(0.0));
        log.stage_insert(molecule_at(1.0));
        assert_eq!(manager.len(), 0);

        manager.apply_changes(&mut log);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.ids(), vec![0, 1]);
        assert!(log.is_empty());
    }

    #[test]
    fn staged_destructions_keep_the_collection_stable_mid_step() {
        let mut manager = MoleculeManager::new();
        let mut log = MutationLog::new();
        log.stage_insert(molecule_at(0.0));
        log.stage_insert(molecule_at(1.0));
        manager.apply_changes(&mut log);

        log.stage_destroy(0);
        // Mid-step: still visible.
        assert_eq!(manager.len(), 2);
        assert!(manager.get(0).is_some());

        manager.apply_changes(&mut log);
        assert!(manager.get(0).is_none());
        assert_eq!(manager.ids(), vec![1]);
    }

    #[test]
    fn destroying_twice_is_harmless() {
        let mut manager = MoleculeManager::new();
        let mut log = MutationLog::new();
        log.stage_insert(molecule_at(0.0));
        manager.apply_changes(&mut log);

        log.stage_destroy(0);
        log.stage_destroy(0);
        manager.apply_changes(&mut log);
        assert!(manager.is_empty());
    }

    #[test]
    fn ids_keep_increasing_across_destructions() {
        let mut manager = MoleculeManager::new();
        let mut log = MutationLog::new();
        log.stage_insert(molecule_at(0.0));
        manager.apply_changes(&mut log);
        log.stage_destroy(0);
        log.stage_insert(molecule_at(1.0));
        manager.apply_changes(&mut log);
        // The new molecule does not reuse id 0.
        assert_eq!(manager.ids(), vec![1]);
        assert_eq!(manager.total_spawned(), 2);
    }

    #[test]
    fn copies_are_independent_of_the_live_collection() {
        let mut manager = MoleculeManager::new();
        let mut log = MutationLog::new();
        log.stage_insert(molecule_at(0.0));
        manager.apply_changes(&mut log);

        let copies = manager.get_all_copies();
        log.stage_destroy(0);
        manager.apply_changes(&mut log);
        assert_eq!(copies.len(), 1);
        assert!(manager.is_empty());
    }
}
