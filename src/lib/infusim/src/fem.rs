//! Finite-element assembly of the global Darcy system and per-element
//! velocity recovery.
//!
//! The stiffness matrix is assembled exactly once per simulation, straight
//! into sparse triplets. It is singular until Dirichlet rows are substituted
//! by the pressure backends.

use crate::mesh::Mesh;
use nalgebra::{DVector, Matrix3, Vector3};
use sprs::{CsMat, TriMatI};

/// The assembled (singular) global system `K p = f`.
pub(crate) struct DarcySystem {
    pub k: CsMat<f64>,
    pub f: DVector<f64>,
}

/// Assemble `K_e = (∇N)ᵀ · k · ∇N · A · h / μ` per triangle and scatter into
/// the global matrix. The RHS has no source terms.
pub(crate) fn assemble(mesh: &Mesh, mu: f64) -> DarcySystem {
    let n = mesh.n_nodes();
    let mut triplets = TriMatI::<f64, usize>::new((n, n));

    for tri in &mesh.triangles {
        let k_el: Matrix3<f64> = tri.grad_n.transpose()
            * tri.permeability
            * tri.grad_n
            * (tri.area * tri.thickness / mu);
        for i in 0..3 {
            for j in 0..3 {
                triplets.add_triplet(tri.node_ids[i], tri.node_ids[j], k_el[(i, j)]);
            }
        }
    }

    DarcySystem {
        k: triplets.to_csr(),
        f: DVector::zeros(n),
    }
}

/// Per-element Darcy velocity recovery `v_e = −(1/μ) · B_e · p_e`, with
/// `B_e = k · ∇N` precomputed at construction.
pub(crate) struct VelocitySolver {
    b: Vec<Matrix3<f64>>,
    conn: Vec<[usize; 3]>,
}

impl VelocitySolver {
    pub(crate) fn new(mesh: &Mesh) -> Self {
        Self {
            b: mesh
                .triangles
                .iter()
                .map(|t| t.permeability * t.grad_n)
                .collect(),
            conn: mesh.triangles.iter().map(|t| t.node_ids).collect(),
        }
    }

    /// One world-frame velocity vector per triangle [m/s].
    pub(crate) fn element_velocities(&self, p: &DVector<f64>, mu: f64) -> Vec<Vector3<f64>> {
        self.b
            .iter()
            .zip(&self.conn)
            .map(|(b, conn)| {
                let p_local = Vector3::new(p[conn[0]], p[conn[1]], p[conn[2]]);
                -(b * p_local) / mu
            })
            .collect()
    }
}
