// File: `src/lib/infusim/src/lib.rs`
//
// UNIT SYSTEM: SI UNITS (CONSISTENT THROUGHOUT)
// =============================================
// Pressure: pascal (Pa)
// Distance: meter (m)
// Time: second (s)
// Volume: cubic meter (m³)
// Permeability: square meter (m²)
// Viscosity: pascal-second (Pa·s)
// Porosity, fill factor, free-surface flag: dimensionless
//
// The core advances an isothermal, incompressible Darcy flow through an
// anisotropic porous preform by a CV/FE scheme: a steady pressure solve on
// the wetted sub-domain, per-element velocity recovery, and an explicit fill
// update sized to fill exactly one control volume per step. The loop runs
// until the domain is saturated.

mod bcond;
mod error;
mod fem;
mod materials;
mod mesh;
mod solver;
mod step;
mod timestep;

pub use bcond::{BcManager, Inlet};
pub use error::{Result, SimError};
pub use materials::{MaterialSet, PorousMaterial, Rosette};
pub use mesh::{ControlVolume, Line, Mesh, MeshInput, Node, SubEdge, Triangle};
pub use solver::SolverType;
pub use timestep::{Solution, TimeStep};

use crate::bcond::SolverBcs;
use crate::fem::VelocitySolver;
use crate::solver::PressureSolver;
use crate::timestep::TimeStepLog;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Global parameters of one infusion run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessParameters {
    /// Dynamic viscosity of the resin [Pa·s]
    pub mu: f64,
    /// Interval between scheduled write-outs [s]; non-positive writes out
    /// every computed step
    pub wo_delta_time: f64,
    /// Snap tolerance under which a CV counts as full
    pub fill_tolerance: f64,
}

impl Default for ProcessParameters {
    fn default() -> Self {
        Self {
            mu: 0.1,
            wo_delta_time: -1.0,
            fill_tolerance: 0.0,
        }
    }
}

impl ProcessParameters {
    /// Check the parameters are usable before any assembly happens.
    pub fn validate(&self) -> Result<()> {
        if !self.mu.is_finite() || self.mu <= 0.0 {
            return Err(SimError::Config(format!(
                "viscosity must be positive and finite, got: {}",
                self.mu
            )));
        }
        if !self.wo_delta_time.is_finite() {
            return Err(SimError::Config(format!(
                "write-out interval must be finite, got: {}",
                self.wo_delta_time
            )));
        }
        if !self.fill_tolerance.is_finite()
            || self.fill_tolerance < 0.0
            || self.fill_tolerance >= 1.0
        {
            return Err(SimError::Config(format!(
                "fill tolerance must lie in [0, 1), got: {}",
                self.fill_tolerance
            )));
        }
        Ok(())
    }
}

/// The CV/FE filling simulator.
///
/// Owns the mesh, the boundary conditions, the assembled pressure system and
/// the time-step log. Global FE assembly happens once at construction; each
/// step re-applies the current Dirichlet set on copies, solves for pressure,
/// recovers element velocities and advances the flow front.
pub struct InfusionSimulator {
    mesh: Mesh,
    bc_manager: BcManager,
    params: ProcessParameters,
    pressure: Box<dyn PressureSolver>,
    velocity: VelocitySolver,
    bcs: SolverBcs,
    /// Node-indexed mask of the inlet Dirichlet set
    dirichlet_mask: Vec<bool>,
    current_time: f64,
    next_wo_time: f64,
    n_empty_cvs: usize,
    log: TimeStepLog,
}

impl InfusionSimulator {
    /// Wire a simulator for `mesh` under `bc_manager`, assembling the global
    /// Darcy system with the chosen linear backend.
    pub fn new(
        mesh: Mesh,
        bc_manager: BcManager,
        solver_type: SolverType,
        params: ProcessParameters,
    ) -> Result<Self> {
        params.validate()?;
        let system = fem::assemble(&mesh, params.mu);
        let pressure = solver::build_pressure_solver(&system, solver_type);
        let velocity = VelocitySolver::new(&mesh);

        let mut sim = Self {
            mesh,
            bc_manager,
            params,
            pressure,
            velocity,
            bcs: SolverBcs::default(),
            dirichlet_mask: Vec::new(),
            current_time: 0.0,
            next_wo_time: params.wo_delta_time,
            n_empty_cvs: usize::MAX,
            log: TimeStepLog::new(),
        };
        sim.initialise_new_solution()?;
        Ok(sim)
    }

    /// Reset all simulation variables and record the initial step. Calling
    /// this and then `solve` again reruns the solution from scratch on the
    /// same mesh and boundary conditions.
    pub fn initialise_new_solution(&mut self) -> Result<()> {
        self.current_time = 0.0;
        self.next_wo_time = self.params.wo_delta_time;
        self.bcs = SolverBcs::default();
        self.mesh.empty_cvs();
        self.update_dirichlet_bcs()?;
        self.fill_initial_cvs();
        self.update_empty_nodes();
        self.log.reset();
        self.log
            .save_initial_timestep(self.mesh.n_nodes(), self.mesh.n_triangles(), &self.bcs);
        Ok(())
    }

    /// Run the filling loop until no empty CV remains and return the packed
    /// solution.
    pub fn solve(&mut self) -> Result<Solution> {
        let started = Instant::now();
        info!(
            "solve started for mesh with {} elements",
            self.mesh.n_triangles()
        );

        while self.n_empty_cvs > 0 {
            // Pressure field on the wetted sub-domain
            let p = self.pressure.solve(&self.bcs)?;
            let v = self.velocity.element_velocities(&p, self.params.mu);

            // Flow front, its net inflows, and the step that fills one CV
            let active = self.find_free_surface_cvs();
            let fluxes: Vec<f64> = active.iter().map(|&cv| self.cv_flux(cv, &v)).collect();
            let mut dt = self.calculate_time_step(&active, &fluxes)?;

            // A step crossing a scheduled write-out time is shortened to
            // land on it exactly
            let mut write_out = false;
            if self.params.wo_delta_time > 0.0 {
                if self.current_time + dt > self.next_wo_time {
                    dt = self.next_wo_time - self.current_time;
                    self.next_wo_time += self.params.wo_delta_time;
                    write_out = true;
                }
            } else {
                write_out = true;
            }

            self.fill_current_time_step(&active, &fluxes, dt);
            self.current_time += dt;

            let fills: Vec<f64> = self.mesh.cvs.iter().map(|cv| cv.fill).collect();
            let fronts: Vec<u8> = self
                .mesh
                .cvs
                .iter()
                .map(|cv| cv.free_surface as u8)
                .collect();
            self.log
                .save_timestep(self.current_time, dt, p, v, fills, fronts, write_out);

            self.update_empty_nodes();
            debug!(
                "fill time: {:.5} s, empty CVs: {}",
                self.current_time, self.n_empty_cvs
            );
        }

        let solution = self.log.pack_solution();
        info!(
            "solve completed in {:.2} s: {} steps computed, {} written out",
            started.elapsed().as_secs_f64(),
            self.log.len(),
            solution.time_steps
        );
        Ok(solution)
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Simulation time reached so far [s].
    pub fn current_time(&self) -> f64 {
        self.current_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_are_valid() {
        assert!(ProcessParameters::default().validate().is_ok());
    }

    #[test]
    fn parameter_validation_rejects_bad_values() {
        let mut params = ProcessParameters::default();
        params.mu = 0.0;
        assert!(matches!(params.validate(), Err(SimError::Config(_))));

        let mut params = ProcessParameters::default();
        params.fill_tolerance = 1.0;
        assert!(matches!(params.validate(), Err(SimError::Config(_))));

        let mut params = ProcessParameters::default();
        params.wo_delta_time = f64::NAN;
        assert!(matches!(params.validate(), Err(SimError::Config(_))));
    }
}
