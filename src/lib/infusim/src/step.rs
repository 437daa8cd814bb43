//! Filling engine: Dirichlet refresh, flow-front detection, CV fluxes,
//! time-step selection and the fill update.

use crate::error::{Result, SimError};
use crate::InfusionSimulator;
use nalgebra::Vector3;

impl InfusionSimulator {
    /// Rebuild the inlet Dirichlet vectors from the BC manager. Fatal when an
    /// inlet references a physical tag the mesh does not carry.
    pub(crate) fn update_dirichlet_bcs(&mut self) -> Result<()> {
        let mut idx = Vec::new();
        let mut vals = Vec::new();
        for inlet in self.bc_manager.inlets() {
            let nodes = self
                .mesh
                .boundaries
                .get(&inlet.physical_tag)
                .ok_or_else(|| SimError::UnknownPhysicalTag(inlet.physical_tag.clone()))?;
            idx.extend(nodes.iter().copied());
            vals.extend(std::iter::repeat(inlet.p_value).take(nodes.len()));
        }

        let mut mask = vec![false; self.mesh.n_nodes()];
        for &i in &idx {
            mask[i] = true;
        }
        self.bcs.dirichlet_idx = idx;
        self.bcs.dirichlet_vals = vals;
        self.dirichlet_mask = mask;
        Ok(())
    }

    /// Inlet CVs start full; they never join the empty set.
    pub(crate) fn fill_initial_cvs(&mut self) {
        for &i in &self.bcs.dirichlet_idx {
            self.mesh.cvs[i].fill = 1.0;
        }
    }

    /// Refresh the empty-node index list (fill < 1, forced to p = 0 in the
    /// next pressure solve) and the empty-CV count. Nodes in the inlet
    /// Dirichlet set are excluded, so the p = 0 pass can never overwrite a
    /// prescribed inlet value.
    pub(crate) fn update_empty_nodes(&mut self) {
        self.bcs.p0_idx = self
            .mesh
            .cvs
            .iter()
            .filter(|cv| cv.fill < 1.0 && !self.dirichlet_mask[cv.id])
            .map(|cv| cv.id)
            .collect();
        self.n_empty_cvs = self.bcs.p0_idx.len();
    }

    /// Flag and collect the flow front: CVs not yet full with at least one
    /// full neighbor.
    pub(crate) fn find_free_surface_cvs(&mut self) -> Vec<usize> {
        let fills: Vec<f64> = self.mesh.cvs.iter().map(|cv| cv.fill).collect();
        let mut active = Vec::new();
        for cv in &mut self.mesh.cvs {
            cv.free_surface = false;
            if cv.fill < 1.0 && cv.neighbor_ids.iter().any(|&n| fills[n] >= 1.0) {
                cv.free_surface = true;
                active.push(cv.id);
            }
        }
        active
    }

    /// Net volumetric inflow [m³/s] crossing the internal sub-edges of a CV.
    /// Sub-edge normals point outward, so negating the projections makes a
    /// positive value net inflow.
    pub(crate) fn cv_flux(&self, cv_id: usize, v: &[Vector3<f64>]) -> f64 {
        let cv = &self.mesh.cvs[cv_id];
        let mut flux = 0.0;
        for (&tid, [s1, s2]) in cv.support_triangle_ids.iter().zip(&cv.sub_edges) {
            let crossing = -s1.normal * s1.length - s2.normal * s2.length;
            flux += v[tid].dot(&crossing) * self.mesh.triangles[tid].thickness;
        }
        flux
    }

    /// Smallest time that finishes filling one positive-inflow CV on the
    /// front. No positive inflow anywhere means the front cannot advance.
    pub(crate) fn calculate_time_step(&self, active: &[usize], fluxes: &[f64]) -> Result<f64> {
        let mut dt = f64::INFINITY;
        for (&cv_id, &flux) in active.iter().zip(fluxes) {
            if flux > 0.0 {
                let cv = &self.mesh.cvs[cv_id];
                dt = dt.min((1.0 - cv.fill) * cv.volume / flux);
            }
        }
        if dt.is_finite() {
            Ok(dt)
        } else {
            Err(SimError::StalledFlow(self.current_time))
        }
    }

    /// Advance the fill factors of the active CVs over `dt`, then snap CVs
    /// within the configured tolerance to full.
    pub(crate) fn fill_current_time_step(&mut self, active: &[usize], fluxes: &[f64], dt: f64) {
        for (&cv_id, &flux) in active.iter().zip(fluxes) {
            let cv = &mut self.mesh.cvs[cv_id];
            cv.fill = (cv.fill + flux * dt / cv.volume).min(1.0);
        }
        for &cv_id in active {
            let cv = &mut self.mesh.cvs[cv_id];
            if cv.fill >= 1.0 - self.params.fill_tolerance {
                cv.fill = 1.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bcond::{BcManager, Inlet};
    use crate::materials::{MaterialSet, PorousMaterial};
    use crate::mesh::{Mesh, MeshInput};
    use crate::solver::SolverType;
    use crate::{InfusionSimulator, ProcessParameters, SimError};
    use std::collections::HashMap;

    /// Three-column strip on [0,1]×[0,0.5]; inlet along the left column.
    fn strip_input() -> MeshInput {
        MeshInput {
            all_nodes_coords: vec![
                [0.0, 0.0, 0.0],
                [0.5, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 0.5, 0.0],
                [0.5, 0.5, 0.0],
                [1.0, 0.5, 0.0],
            ],
            nodes_conn: vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]],
            physical_domains: HashMap::from([("domain".to_string(), vec![0, 1, 2, 3])]),
            physical_nodes: HashMap::from([("left_edge".to_string(), vec![0, 3])]),
        }
    }

    fn strip_simulator() -> InfusionSimulator {
        let mut materials = MaterialSet::new();
        materials.add_material("domain", PorousMaterial::new(1e-10, 1e-10, 1e-10, 0.5, 1.0));
        let mesh = Mesh::build(&strip_input(), &materials).unwrap();
        let mut bc = BcManager::new();
        bc.add_inlet(Inlet::new("left_edge", 1e5));
        InfusionSimulator::new(
            mesh,
            bc,
            SolverType::DirectDense,
            ProcessParameters::default(),
        )
        .unwrap()
    }

    #[test]
    fn initialisation_fills_inlets_and_lists_empty_nodes() {
        let sim = strip_simulator();
        assert_eq!(sim.mesh.cvs[0].fill, 1.0);
        assert_eq!(sim.mesh.cvs[3].fill, 1.0);
        assert_eq!(sim.bcs.dirichlet_idx, vec![0, 3]);
        assert_eq!(sim.bcs.p0_idx, vec![1, 2, 4, 5]);
        assert_eq!(sim.n_empty_cvs, 4);
    }

    #[test]
    fn unknown_inlet_tag_is_fatal() {
        let mut materials = MaterialSet::new();
        materials.add_material("domain", PorousMaterial::new(1e-10, 1e-10, 1e-10, 0.5, 1.0));
        let mesh = Mesh::build(&strip_input(), &materials).unwrap();
        let mut bc = BcManager::new();
        bc.add_inlet(Inlet::new("no_such_edge", 1e5));
        match InfusionSimulator::new(
            mesh,
            bc,
            SolverType::DirectDense,
            ProcessParameters::default(),
        ) {
            Err(SimError::UnknownPhysicalTag(tag)) => assert_eq!(tag, "no_such_edge"),
            other => panic!("expected UnknownPhysicalTag, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn free_surface_is_the_empty_neighborhood_of_the_full_set() {
        let mut sim = strip_simulator();
        let active = sim.find_free_surface_cvs();
        // Nodes 1 and 4 touch the full inlet column; 2 and 5 do not
        assert_eq!(active, vec![1, 4]);
        assert!(sim.mesh.cvs[1].free_surface);
        assert!(sim.mesh.cvs[4].free_surface);
        assert!(!sim.mesh.cvs[2].free_surface);
        assert!(!sim.mesh.cvs[5].free_surface);
    }

    #[test]
    fn front_flux_matches_the_analytic_inflow() {
        let mut sim = strip_simulator();
        let p = sim.pressure.solve(&sim.bcs).unwrap();
        let v = sim.velocity.element_velocities(&p, sim.params.mu);
        let active = sim.find_free_surface_cvs();

        // p = 1e5·(1 − 2x) in the wetted band, so v = 2e-4 m/s along x; the
        // two front CVs split the inflow v·h·W = 1e-4 m³/s evenly
        let fluxes: Vec<f64> = active.iter().map(|&cv| sim.cv_flux(cv, &v)).collect();
        for &flux in &fluxes {
            assert!((flux - 5e-5).abs() < 5e-5 * 1e-10, "flux = {flux}");
        }
    }

    #[test]
    fn time_step_fills_exactly_one_cv() {
        let mut sim = strip_simulator();
        let p = sim.pressure.solve(&sim.bcs).unwrap();
        let v = sim.velocity.element_velocities(&p, sim.params.mu);
        let active = sim.find_free_surface_cvs();
        let fluxes: Vec<f64> = active.iter().map(|&cv| sim.cv_flux(cv, &v)).collect();

        let dt = sim.calculate_time_step(&active, &fluxes).unwrap();
        let expected: f64 = active
            .iter()
            .zip(&fluxes)
            .map(|(&cv, &flux)| sim.mesh.cvs[cv].volume / flux)
            .fold(f64::INFINITY, f64::min);
        assert!((dt - expected).abs() < expected * 1e-12);

        // Mass conservation over the step: the filled volume equals Φ·dt
        let before: Vec<f64> = active.iter().map(|&cv| sim.mesh.cvs[cv].fill).collect();
        sim.fill_current_time_step(&active, &fluxes, dt);
        for ((&cv, &flux), &fill_before) in active.iter().zip(&fluxes).zip(&before) {
            let gained = (sim.mesh.cvs[cv].fill - fill_before) * sim.mesh.cvs[cv].volume;
            assert!((gained - flux * dt).abs() < flux * dt * 1e-9);
        }
        // At least the limiting CV is now full (up to roundoff in Φ·dt/V)
        assert!(active.iter().any(|&cv| sim.mesh.cvs[cv].fill >= 1.0 - 1e-12));
    }

    #[test]
    fn zero_velocity_stalls_the_flow() {
        let mut sim = strip_simulator();
        let active = sim.find_free_surface_cvs();
        let fluxes = vec![0.0; active.len()];
        assert!(matches!(
            sim.calculate_time_step(&active, &fluxes),
            Err(SimError::StalledFlow(_))
        ));
    }

    #[test]
    fn fill_tolerance_snaps_nearly_full_cvs() {
        let mut sim = strip_simulator();
        sim.params.fill_tolerance = 0.05;
        sim.mesh.cvs[1].fill = 0.9;
        let volume = sim.mesh.cvs[1].volume;

        // An inflow that brings the fill to 0.96 — within the snap band
        let flux = 0.06 * volume;
        sim.fill_current_time_step(&[1], &[flux], 1.0);
        assert_eq!(sim.mesh.cvs[1].fill, 1.0);
    }

    #[test]
    fn empty_node_refresh_tracks_fills_and_skips_inlets() {
        let mut sim = strip_simulator();
        sim.mesh.cvs[1].fill = 1.0;
        // An inlet CV artificially below 1 must still stay out of the p0 set
        sim.mesh.cvs[0].fill = 0.5;
        sim.update_empty_nodes();
        assert_eq!(sim.bcs.p0_idx, vec![2, 4, 5]);
        assert_eq!(sim.n_empty_cvs, 3);
    }
}
