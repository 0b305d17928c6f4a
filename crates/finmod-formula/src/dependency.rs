//! Dependency tracking for recalculation
//!
//! An edge `B -> A` means "A's formula reads B". Edges into a cell are
//! replaced wholesale every time its formula is accepted, so the graph
//! always describes the latest formula text.

use std::collections::{BTreeSet, VecDeque};

use ahash::{AHashMap, AHashSet};
use finmod_core::CellId;

/// Dependency graph for formula cells
///
/// Sets are ordered so every traversal is deterministic.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Cell -> cells that read it (dependents)
    dependents: AHashMap<CellId, BTreeSet<CellId>>,
    /// Cell -> cells it reads (precedents)
    precedents: AHashMap<CellId, BTreeSet<CellId>>,
}

/// Edges added and removed by [`DependencyGraph::set_precedents`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EdgeDiff {
    pub added: Vec<CellId>,
    pub removed: Vec<CellId>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: `dependent` reads `precedent`
    pub fn add_dependency(&mut self, precedent: CellId, dependent: CellId) {
        self.dependents.entry(precedent).or_default().insert(dependent);
        self.precedents.entry(dependent).or_default().insert(precedent);
    }

    fn remove_dependency(&mut self, precedent: CellId, dependent: CellId) {
        if let Some(deps) = self.dependents.get_mut(&precedent) {
            deps.remove(&dependent);
            if deps.is_empty() {
                self.dependents.remove(&precedent);
            }
        }
        if let Some(precs) = self.precedents.get_mut(&dependent) {
            precs.remove(&precedent);
            if precs.is_empty() {
                self.precedents.remove(&dependent);
            }
        }
    }

    /// Replace every incoming edge of `cell` with edges from `reads`
    pub fn set_precedents<I>(&mut self, cell: CellId, reads: I) -> EdgeDiff
    where
        I: IntoIterator<Item = CellId>,
    {
        let new: BTreeSet<CellId> = reads.into_iter().collect();
        let old = self.precedents.get(&cell).cloned().unwrap_or_default();

        let diff = EdgeDiff {
            added: new.difference(&old).copied().collect(),
            removed: old.difference(&new).copied().collect(),
        };
        for &precedent in &diff.removed {
            self.remove_dependency(precedent, cell);
        }
        for &precedent in &diff.added {
            self.add_dependency(precedent, cell);
        }
        tracing::trace!(%cell, added = diff.added.len(), removed = diff.removed.len(), "edges updated");
        diff
    }

    /// Remove the incoming edges of a cell, keeping cells that read it
    pub fn clear_dependencies(&mut self, cell: CellId) {
        self.set_precedents(cell, std::iter::empty());
    }

    /// Remove a cell and every edge touching it
    pub fn remove_cell(&mut self, cell: CellId) {
        if let Some(precedents) = self.precedents.remove(&cell) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(&cell);
                    if deps.is_empty() {
                        self.dependents.remove(&precedent);
                    }
                }
            }
        }
        if let Some(dependents) = self.dependents.remove(&cell) {
            for dependent in dependents {
                if let Some(precs) = self.precedents.get_mut(&dependent) {
                    precs.remove(&cell);
                    if precs.is_empty() {
                        self.precedents.remove(&dependent);
                    }
                }
            }
        }
    }

    /// Cells that read the given cell
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.dependents.get(&cell).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Cells the given cell reads
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.precedents.get(&cell).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Check whether `dependent` reads `precedent` directly
    pub fn has_edge(&self, precedent: CellId, dependent: CellId) -> bool {
        self.dependents
            .get(&precedent)
            .is_some_and(|deps| deps.contains(&dependent))
    }

    /// Every cell with at least one edge
    pub fn cells(&self) -> BTreeSet<CellId> {
        self.dependents.keys().chain(self.precedents.keys()).copied().collect()
    }

    fn reach(&self, start: CellId, forward: bool) -> AHashSet<CellId> {
        let edges = if forward { &self.dependents } else { &self.precedents };
        let mut seen = AHashSet::new();
        let mut queue: VecDeque<CellId> = edges.get(&start).into_iter().flatten().copied().collect();
        while let Some(cell) = queue.pop_front() {
            if seen.insert(cell) {
                queue.extend(edges.get(&cell).into_iter().flatten().copied());
            }
        }
        seen
    }

    /// Cells that read `cell` directly or through other cells
    pub fn transitive_dependents(&self, cell: CellId) -> BTreeSet<CellId> {
        self.reach(cell, true).into_iter().collect()
    }

    /// The cycle through `cell`, if any, in ascending order
    ///
    /// Only the neighbourhood of `cell` is searched: a cell is on the cycle
    /// when it is both reachable from `cell` and able to reach it.
    pub fn find_cycle(&self, cell: CellId) -> Option<Vec<CellId>> {
        let downstream = self.reach(cell, true);
        if !downstream.contains(&cell) {
            return None;
        }
        let upstream = self.reach(cell, false);
        let mut cycle: Vec<CellId> = downstream.intersection(&upstream).copied().collect();
        cycle.sort();
        Some(cycle)
    }

    /// Check if a cell is part of a cycle
    pub fn has_circular_reference(&self, cell: CellId) -> bool {
        self.reach(cell, true).contains(&cell)
    }

    /// `changed` plus everything downstream of it, in recalculation order
    ///
    /// Cells on a cycle, and cells downstream of one, never become ready and
    /// are left out.
    pub fn recalc_order(&self, changed: &[CellId]) -> Vec<CellId> {
        let mut affected: BTreeSet<CellId> = changed.iter().copied().collect();
        for &cell in changed {
            affected.extend(self.reach(cell, true));
        }
        self.topological_order(&affected).0
    }

    /// Kahn's algorithm over the subgraph induced by `cells`
    ///
    /// Ties go to the lowest `CellId`. Returns the ordered cells and the
    /// cells that could not be ordered because a cycle feeds them.
    pub fn topological_order(&self, cells: &BTreeSet<CellId>) -> (Vec<CellId>, Vec<CellId>) {
        let mut in_degree: AHashMap<CellId, usize> = cells
            .iter()
            .map(|&cell| {
                let degree = self.precedents(cell).filter(|p| cells.contains(p)).count();
                (cell, degree)
            })
            .collect();
        let mut ready: BTreeSet<CellId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&cell, _)| cell)
            .collect();

        let mut order = Vec::with_capacity(cells.len());
        while let Some(cell) = ready.pop_first() {
            order.push(cell);
            for dependent in self.dependents(cell) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        let stuck = if order.len() == cells.len() {
            Vec::new()
        } else {
            let placed: AHashSet<CellId> = order.iter().copied().collect();
            cells.iter().filter(|c| !placed.contains(c)).copied().collect()
        };
        (order, stuck)
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
    }
}
