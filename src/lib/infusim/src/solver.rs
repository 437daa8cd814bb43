//! Direct pressure solvers.
//!
//! Both backends own the pristine assembled system and impose the Dirichlet
//! set on per-step copies by row substitution: `K[i,:] = 0`, `K[i,i] = 1`,
//! `f[i] = v_i`. The substituted matrix is nonsingular but not symmetric, so
//! both paths factorize with LU.

use crate::bcond::SolverBcs;
use crate::error::{Result, SimError};
use crate::fem::DarcySystem;
use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use sprs::CsMat;

/// Linear solver selection for the pressure system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverType {
    /// Dense LU on the full matrix; fine for small meshes
    DirectDense,
    /// Sparse LU on CSR; the default for anything serious
    DirectSparse,
}

/// Backend contract: solve the pristine system under the given Dirichlet set.
pub(crate) trait PressureSolver {
    fn solve(&self, bcs: &SolverBcs) -> Result<DVector<f64>>;
}

pub(crate) fn build_pressure_solver(
    system: &DarcySystem,
    solver_type: SolverType,
) -> Box<dyn PressureSolver> {
    match solver_type {
        SolverType::DirectDense => Box::new(DenseDirectSolver::new(system)),
        SolverType::DirectSparse => Box::new(SparseDirectSolver::new(system)),
    }
}

pub(crate) struct DenseDirectSolver {
    k: DMatrix<f64>,
    f: DVector<f64>,
}

impl DenseDirectSolver {
    pub(crate) fn new(system: &DarcySystem) -> Self {
        let n = system.f.len();
        let mut k = DMatrix::zeros(n, n);
        for (&val, (r, c)) in system.k.iter() {
            k[(r, c)] += val;
        }
        Self {
            k,
            f: system.f.clone(),
        }
    }

    /// Row-substitute the Dirichlet set on copies of the pristine system.
    pub(crate) fn apply_bcs(&self, bcs: &SolverBcs) -> (DMatrix<f64>, DVector<f64>) {
        let mut k = self.k.clone();
        let mut f = self.f.clone();
        for (i, v) in bcs.combined() {
            k.row_mut(i).fill(0.0);
            k[(i, i)] = 1.0;
            f[i] = v;
        }
        (k, f)
    }
}

impl PressureSolver for DenseDirectSolver {
    fn solve(&self, bcs: &SolverBcs) -> Result<DVector<f64>> {
        let (k, f) = self.apply_bcs(bcs);
        k.lu()
            .solve(&f)
            .ok_or_else(|| SimError::SingularSystem("dense LU factorization failed".into()))
    }
}

pub(crate) struct SparseDirectSolver {
    k: CsMat<f64>,
    f: DVector<f64>,
}

impl SparseDirectSolver {
    pub(crate) fn new(system: &DarcySystem) -> Self {
        Self {
            k: system.k.clone(),
            f: system.f.clone(),
        }
    }

    /// Row-substitute the Dirichlet set: non-Dirichlet CSR rows are carried
    /// over as triplets, Dirichlet rows collapse to a unit diagonal.
    pub(crate) fn apply_bcs(
        &self,
        bcs: &SolverBcs,
    ) -> (Vec<Triplet<usize, usize, f64>>, DVector<f64>) {
        let n = self.f.len();
        let mut dirichlet = vec![false; n];
        for (i, _) in bcs.combined() {
            dirichlet[i] = true;
        }

        let mut triplets = Vec::with_capacity(self.k.nnz() + n);
        for (row, row_vec) in self.k.outer_iterator().enumerate() {
            if dirichlet[row] {
                continue;
            }
            for (&col, &val) in row_vec.indices().iter().zip(row_vec.data().iter()) {
                triplets.push(Triplet::new(row, col, val));
            }
        }

        let mut f = self.f.clone();
        for (i, v) in bcs.combined() {
            triplets.push(Triplet::new(i, i, 1.0));
            f[i] = v;
        }
        (triplets, f)
    }
}

impl PressureSolver for SparseDirectSolver {
    fn solve(&self, bcs: &SolverBcs) -> Result<DVector<f64>> {
        let (triplets, f) = self.apply_bcs(bcs);
        let n = f.len();

        let k = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| SimError::SingularSystem(format!("sparse assembly failed: {e:?}")))?;
        let lu = k.sp_lu().map_err(|e| {
            SimError::SingularSystem(format!("sparse LU factorization failed: {e:?}"))
        })?;

        let rhs = Mat::from_fn(n, 1, |i, _| f[i]);
        let x = lu.solve(&rhs);
        Ok(DVector::from_fn(n, |i, _| x[(i, 0)]))
    }
}
