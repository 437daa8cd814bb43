//! Porous material model and rosette orientation.
//!
//! A `PorousMaterial` carries the principal-axis permeability tensor together
//! with porosity and effective thickness. A `Rosette` defines the reference
//! in-plane direction used to orient the principal axes on each triangle; the
//! projection along the element normal yields the rotation that takes the
//! diagonal tensor into world coordinates.

use crate::error::{Result, SimError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directions shorter than this have no usable in-plane component.
const DIRECTION_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PorousMaterial {
    /// Principal permeability along local e1 [m²]
    pub k1: f64,
    /// Principal permeability along local e2 [m²]
    pub k2: f64,
    /// Principal permeability along local e3 [m²]
    pub k3: f64,
    /// Porosity [dimensionless, (0, 1]]
    pub porosity: f64,
    /// Effective thickness of the preform [m]
    pub thickness: f64,
}

impl PorousMaterial {
    /// Create a material from its principal permeabilities, porosity and
    /// thickness. Values are validated when the material is bound to a mesh
    /// tag, not here.
    pub fn new(k1: f64, k2: f64, k3: f64, porosity: f64, thickness: f64) -> Self {
        Self {
            k1,
            k2,
            k3,
            porosity,
            thickness,
        }
    }

    /// Principal-axis permeability tensor diag(k1, k2, k3) [m²]
    pub fn k_diag(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(self.k1, self.k2, self.k3))
    }

    /// Check the material data is physically admissible.
    pub fn validate(&self) -> Result<()> {
        let ks = [self.k1, self.k2, self.k3];
        if ks.iter().any(|k| !k.is_finite() || *k <= 0.0) {
            return Err(SimError::Config(format!(
                "principal permeabilities must be positive and finite, got ({}, {}, {})",
                self.k1, self.k2, self.k3
            )));
        }
        if !self.porosity.is_finite() || self.porosity <= 0.0 || self.porosity > 1.0 {
            return Err(SimError::Config(format!(
                "porosity must lie in (0, 1], got: {}",
                self.porosity
            )));
        }
        if !self.thickness.is_finite() || self.thickness <= 0.0 {
            return Err(SimError::Config(format!(
                "thickness must be positive and finite, got: {}",
                self.thickness
            )));
        }
        Ok(())
    }
}

/// Reference in-plane direction orienting the material principal axes.
///
/// The rosette is a pure direction in world coordinates. On each triangle it
/// is projected onto the tangent plane and completed to the orthonormal triad
/// `[û v̂ n̂]` that rotates the principal-axis tensor into world coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Rosette {
    u: Vector3<f64>,
}

impl Rosette {
    /// Rosette from a direction vector (need not be normalized).
    pub fn new(direction: [f64; 3]) -> Self {
        Self {
            u: Vector3::from(direction),
        }
    }

    /// Rosette from two points, oriented from `p0` to `p1`.
    pub fn between(p0: [f64; 3], p1: [f64; 3]) -> Self {
        Self {
            u: Vector3::from(p1) - Vector3::from(p0),
        }
    }

    /// Project the rosette onto the plane of unit normal `normal` and return
    /// the rotation `[û v̂ n̂]` (columns). `None` when the rosette has no
    /// in-plane component, i.e. it is parallel to the normal.
    pub fn project_along_normal(&self, normal: &Vector3<f64>) -> Option<Matrix3<f64>> {
        let u_perp = self.u - normal * self.u.dot(normal);
        let norm = u_perp.norm();
        if norm < DIRECTION_EPS {
            return None;
        }
        let u_hat = u_perp / norm;
        let v_hat = u_hat.cross(normal).normalize();
        Some(Matrix3::from_columns(&[u_hat, v_hat, *normal]))
    }
}

impl Default for Rosette {
    /// World x-axis.
    fn default() -> Self {
        Self::new([1.0, 0.0, 0.0])
    }
}

/// Tag-keyed registry binding a material and a rosette to each physical
/// domain of the mesh. Built by the caller and handed to `Mesh::build`.
#[derive(Clone, Debug, Default)]
pub struct MaterialSet {
    entries: HashMap<String, (PorousMaterial, Rosette)>,
}

impl MaterialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `material` to `tag` with the default x-axis rosette.
    pub fn add_material(&mut self, tag: impl Into<String>, material: PorousMaterial) {
        self.entries
            .insert(tag.into(), (material, Rosette::default()));
    }

    /// Bind `material` to `tag` with an explicit rosette.
    pub fn add_material_oriented(
        &mut self,
        tag: impl Into<String>,
        material: PorousMaterial,
        rosette: Rosette,
    ) {
        self.entries.insert(tag.into(), (material, rosette));
    }

    pub fn get(&self, tag: &str) -> Option<(&PorousMaterial, &Rosette)> {
        self.entries.get(tag).map(|(m, r)| (m, r))
    }
}
