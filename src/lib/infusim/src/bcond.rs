//! Boundary conditions: pressure inlets and the per-step Dirichlet sets.

use log::warn;
use serde::{Deserialize, Serialize};

/// Pressure inlet bound to a physical boundary tag of the mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inlet {
    pub physical_tag: String,
    /// Prescribed inlet pressure [Pa]
    pub p_value: f64,
}

impl Inlet {
    pub fn new(physical_tag: impl Into<String>, p_value: f64) -> Self {
        Self {
            physical_tag: physical_tag.into(),
            p_value,
        }
    }
}

/// All boundary conditions of one simulation. Built by the caller and handed
/// to the solver constructor.
#[derive(Clone, Debug, Default)]
pub struct BcManager {
    inlets: Vec<Inlet>,
}

impl BcManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inlet; duplicates are ignored.
    pub fn add_inlet(&mut self, inlet: Inlet) {
        if !self.inlets.contains(&inlet) {
            self.inlets.push(inlet);
        }
    }

    /// Remove an inlet previously added; logs a warning when it was never
    /// assigned.
    pub fn remove_inlet(&mut self, inlet: &Inlet) {
        match self.inlets.iter().position(|i| i == inlet) {
            Some(pos) => {
                self.inlets.remove(pos);
            }
            None => warn!(
                "inlet '{}' not assigned in the BC manager",
                inlet.physical_tag
            ),
        }
    }

    pub fn inlets(&self) -> &[Inlet] {
        &self.inlets
    }
}

/// Dirichlet data for one pressure solve: inlet node indices with their
/// prescribed values, plus the indices of currently empty nodes forced to
/// p = 0. Refreshed every time step.
#[derive(Clone, Debug, Default)]
pub(crate) struct SolverBcs {
    pub dirichlet_idx: Vec<usize>,
    pub dirichlet_vals: Vec<f64>,
    pub p0_idx: Vec<usize>,
}

impl SolverBcs {
    /// Combined Dirichlet assignments, inlets first. The empty-node list is
    /// kept disjoint from the inlet set upstream, so no index repeats.
    pub(crate) fn combined(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.dirichlet_idx
            .iter()
            .copied()
            .zip(self.dirichlet_vals.iter().copied())
            .chain(self.p0_idx.iter().map(|&i| (i, 0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_inlets_are_ignored() {
        let mut bc = BcManager::new();
        bc.add_inlet(Inlet::new("left_edge", 1e5));
        bc.add_inlet(Inlet::new("left_edge", 1e5));
        bc.add_inlet(Inlet::new("left_edge", 2e5));
        assert_eq!(bc.inlets().len(), 2);
    }

    #[test]
    fn remove_missing_inlet_is_harmless() {
        let mut bc = BcManager::new();
        bc.add_inlet(Inlet::new("left_edge", 1e5));
        bc.remove_inlet(&Inlet::new("right_edge", 1e5));
        assert_eq!(bc.inlets().len(), 1);
        bc.remove_inlet(&Inlet::new("left_edge", 1e5));
        assert!(bc.inlets().is_empty());
    }

    #[test]
    fn combined_lists_inlets_first_then_empty_nodes_at_zero() {
        let bcs = SolverBcs {
            dirichlet_idx: vec![4, 7],
            dirichlet_vals: vec![1e5, 2e5],
            p0_idx: vec![1, 2],
        };
        let combined: Vec<_> = bcs.combined().collect();
        assert_eq!(
            combined,
            vec![(4, 1e5), (7, 2e5), (1, 0.0), (2, 0.0)]
        );
    }
}
