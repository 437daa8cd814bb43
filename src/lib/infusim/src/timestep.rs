//! Append-only time-step log and solution packing.

use crate::bcond::SolverBcs;
use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// State snapshot of one computed step.
#[derive(Clone, Debug)]
pub struct TimeStep {
    pub index: usize,
    /// Simulation time at the end of the step [s]
    pub time: f64,
    /// Step length [s]
    pub dt: f64,
    /// Nodal pressures [Pa]
    pub p: DVector<f64>,
    /// Per-element velocities [m/s]
    pub v: Vec<Vector3<f64>>,
    /// Per-CV fill factors, clamped to [0, 1]
    pub fill_factor: Vec<f64>,
    /// Per-CV flow-front flags (0/1)
    pub free_surface: Vec<u8>,
    /// Selected for the packed solution
    pub write_out: bool,
}

/// The packed result of a simulation: write-out steps only, plus the forced
/// final step. This record is the interface to downstream writers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    pub time_steps: usize,
    /// Time of each write-out step [s]
    pub time: Vec<f64>,
    /// Nodal pressures per step [Pa], shape T×N
    pub p: Vec<Vec<f64>>,
    /// Element velocities per step [m/s], shape T×M×3
    pub v: Vec<Vec<[f64; 3]>>,
    /// CV fill factors per step, shape T×N
    pub fill_factor: Vec<Vec<f64>>,
    /// CV flow-front flags per step, shape T×N
    pub free_surface: Vec<Vec<u8>>,
}

/// Append-only sequence of computed steps, owned by the simulator.
#[derive(Debug, Default)]
pub(crate) struct TimeStepLog {
    steps: Vec<TimeStep>,
}

impl TimeStepLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        self.steps.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Record a step. Fill factors are clamped to [0, 1] at record time.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn save_timestep(
        &mut self,
        time: f64,
        dt: f64,
        p: DVector<f64>,
        v: Vec<Vector3<f64>>,
        fill_factor: Vec<f64>,
        free_surface: Vec<u8>,
        write_out: bool,
    ) {
        let fill_factor = fill_factor
            .into_iter()
            .map(|f| f.clamp(0.0, 1.0))
            .collect();
        let index = self.steps.len();
        self.steps.push(TimeStep {
            index,
            time,
            dt,
            p,
            v,
            fill_factor,
            free_surface,
            write_out,
        });
    }

    /// Synthesize the t = 0 record: prescribed pressures, full CVs and raised
    /// front flags exactly at the inlet nodes, zero velocity everywhere.
    pub(crate) fn save_initial_timestep(
        &mut self,
        n_nodes: usize,
        n_triangles: usize,
        bcs: &SolverBcs,
    ) {
        let mut p0 = DVector::zeros(n_nodes);
        let mut fill0 = vec![0.0; n_nodes];
        let mut front0 = vec![0u8; n_nodes];
        for (&i, &val) in bcs.dirichlet_idx.iter().zip(bcs.dirichlet_vals.iter()) {
            p0[i] = val;
            fill0[i] = 1.0;
            front0[i] = 1;
        }
        let v0 = vec![Vector3::zeros(); n_triangles];
        self.save_timestep(0.0, 0.0, p0, v0, fill0, front0, true);
    }

    /// Retroactively flag the final step for write-out and pack the solution
    /// from the write-out steps.
    pub(crate) fn pack_solution(&mut self) -> Solution {
        if let Some(last) = self.steps.last_mut() {
            last.write_out = true;
        }
        let wo: Vec<&TimeStep> = self.steps.iter().filter(|s| s.write_out).collect();
        Solution {
            time_steps: wo.len(),
            time: wo.iter().map(|s| s.time).collect(),
            p: wo.iter().map(|s| s.p.iter().copied().collect()).collect(),
            v: wo
                .iter()
                .map(|s| s.v.iter().map(|v| [v[0], v[1], v[2]]).collect())
                .collect(),
            fill_factor: wo.iter().map(|s| s.fill_factor.clone()).collect(),
            free_surface: wo.iter().map(|s| s.free_surface.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_step(log: &mut TimeStepLog, time: f64, write_out: bool) {
        log.save_timestep(
            time,
            1.0,
            DVector::zeros(2),
            vec![Vector3::zeros()],
            vec![0.5, 0.5],
            vec![0, 1],
            write_out,
        );
    }

    #[test]
    fn fill_factors_are_clamped_at_record_time() {
        let mut log = TimeStepLog::new();
        log.save_timestep(
            1.0,
            1.0,
            DVector::zeros(3),
            vec![],
            vec![-0.1, 0.5, 1.3],
            vec![0, 0, 0],
            true,
        );
        let solution = log.pack_solution();
        assert_eq!(solution.fill_factor[0], vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn packing_keeps_write_out_steps_and_forces_the_last() {
        let mut log = TimeStepLog::new();
        dummy_step(&mut log, 0.0, true);
        dummy_step(&mut log, 1.0, false);
        dummy_step(&mut log, 2.0, true);
        dummy_step(&mut log, 3.0, false);

        let solution = log.pack_solution();
        assert_eq!(solution.time_steps, 3);
        assert_eq!(solution.time, vec![0.0, 2.0, 3.0]);
        assert_eq!(solution.p.len(), 3);
        assert_eq!(solution.v.len(), 3);
    }

    #[test]
    fn initial_step_marks_inlet_nodes_only() {
        let bcs = SolverBcs {
            dirichlet_idx: vec![1],
            dirichlet_vals: vec![2e5],
            p0_idx: vec![0, 2],
        };
        let mut log = TimeStepLog::new();
        log.save_initial_timestep(3, 2, &bcs);

        let solution = log.pack_solution();
        assert_eq!(solution.time, vec![0.0]);
        assert_eq!(solution.p[0], vec![0.0, 2e5, 0.0]);
        assert_eq!(solution.fill_factor[0], vec![0.0, 1.0, 0.0]);
        assert_eq!(solution.free_surface[0], vec![0, 1, 0]);
        assert_eq!(solution.v[0], vec![[0.0; 3]; 2]);
    }

    #[test]
    fn reset_clears_the_log() {
        let mut log = TimeStepLog::new();
        dummy_step(&mut log, 0.0, true);
        assert_eq!(log.len(), 1);
        log.reset();
        assert_eq!(log.len(), 0);
    }
}
