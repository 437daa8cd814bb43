//! Mesh entities and the median-dual control-volume tessellation.
//!
//! The mesh consumes a [`MeshInput`] record (produced by an external reader)
//! and builds flat, index-linked arrays of nodes, triangles, edges and
//! control volumes. Entities reference each other through dense ids only;
//! there are no owning cycles.
//!
//! Edges are retained three per triangle, without deduplication: edges shared
//! by adjacent triangles appear twice, each copy owned by its triangle. Only
//! boundary edges are unique.

use crate::error::{Result, SimError};
use crate::materials::{MaterialSet, PorousMaterial, Rosette};
use log::info;
use nalgebra::{Matrix2x3, Matrix3, Matrix3x2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Triangles below this area are considered collapsed.
const AREA_EPS: f64 = 1e-30;

/// Mesh input contract, as produced by an external mesh reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshInput {
    /// Node coordinates [m], dense ids 0..N-1
    pub all_nodes_coords: Vec<[f64; 3]>,
    /// Triangle connectivity, dense ids 0..M-1
    pub nodes_conn: Vec<[usize; 3]>,
    /// Physical tag -> triangle indices covered by that domain
    pub physical_domains: HashMap<String, Vec<usize>>,
    /// Physical tag -> node indices covered by that boundary line
    pub physical_nodes: HashMap<String, Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: usize,
    /// Position [m]
    pub coords: Vector3<f64>,
    /// Incident triangles
    pub triangle_ids: Vec<usize>,
    /// Topologically adjacent nodes, excluding self, sorted ascending
    pub node_ids: Vec<usize>,
}

/// Element edge. Without deduplication each line is owned by exactly one
/// triangle.
#[derive(Clone, Debug)]
pub struct Line {
    pub id: usize,
    pub node_ids: [usize; 2],
    pub midpoint: Vector3<f64>,
    /// Planar outward-sense normal (Δy/‖Δ‖, −Δx/‖Δ‖, 0)
    pub normal: Vector3<f64>,
    pub triangle_id: usize,
}

impl Line {
    fn new(id: usize, node_ids: [usize; 2], x1: Vector3<f64>, x2: Vector3<f64>, triangle_id: usize) -> Self {
        let dx = x1 - x2;
        let l = dx.norm();
        Self {
            id,
            node_ids,
            midpoint: 0.5 * (x1 + x2),
            normal: Vector3::new(dx[1] / l, -dx[0] / l, 0.0),
            triangle_id,
        }
    }
}

/// Linear triangular element embedded in 3D.
#[derive(Clone, Debug)]
pub struct Triangle {
    pub id: usize,
    pub node_ids: [usize; 3],
    pub line_ids: [usize; 3],
    pub material_tag: String,
    /// Unit normal (x0−x1)×(x0−x2), normalized
    pub normal: Vector3<f64>,
    /// Area [m²]
    pub area: f64,
    pub centroid: Vector3<f64>,
    /// Shape-function gradients in world coordinates; column i is ∇N_i
    pub grad_n: Matrix3<f64>,
    /// Permeability tensor in world coordinates after rosette projection [m²]
    pub permeability: Matrix3<f64>,
    pub porosity: f64,
    /// Effective thickness [m]
    pub thickness: f64,
}

/// One half of the internal CV boundary inside a support triangle, running
/// between an edge midpoint and the triangle centroid.
#[derive(Clone, Debug)]
pub struct SubEdge {
    pub p1: Vector3<f64>,
    pub p2: Vector3<f64>,
    /// Length [m]
    pub length: f64,
    /// Planar normal, enforced outward from the owning CV
    pub normal: Vector3<f64>,
}

impl SubEdge {
    fn new(p1: Vector3<f64>, p2: Vector3<f64>) -> Self {
        let dx = p1 - p2;
        let l = dx.norm();
        Self {
            p1,
            p2,
            length: l,
            normal: Vector3::new(dx[1] / l, -dx[0] / l, 0.0),
        }
    }
}

/// Median-dual control volume around one node; the unit of mass tracking.
#[derive(Clone, Debug)]
pub struct ControlVolume {
    /// Equals the id of the node it surrounds
    pub id: usize,
    /// Fraction of the pore volume occupied by fluid, in [0, 1]
    pub fill: f64,
    /// Set while the CV sits on the flow front
    pub free_surface: bool,
    /// Area of the xy-projected dual polygon [m²]
    pub area: f64,
    /// Pore volume: Σ slice_area · h · φ [m³]
    pub volume: f64,
    /// Incident triangles, parallel to `sub_edges`
    pub support_triangle_ids: Vec<usize>,
    /// Two sub-edges per support triangle, normals outward
    pub sub_edges: Vec<[SubEdge; 2]>,
    /// Adjacent CVs (same ids as the node's adjacent nodes)
    pub neighbor_ids: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub nodes: Vec<Node>,
    pub triangles: Vec<Triangle>,
    pub lines: Vec<Line>,
    pub cvs: Vec<ControlVolume>,
    /// Physical tag -> boundary node indices
    pub boundaries: HashMap<String, Vec<usize>>,
}

impl Mesh {
    /// Build the mesh and its control-volume tessellation from the input
    /// record, binding one material and rosette per physical tag.
    pub fn build(input: &MeshInput, materials: &MaterialSet) -> Result<Self> {
        let mut nodes: Vec<Node> = input
            .all_nodes_coords
            .iter()
            .enumerate()
            .map(|(id, x)| Node {
                id,
                coords: Vector3::from(*x),
                triangle_ids: Vec::new(),
                node_ids: Vec::new(),
            })
            .collect();

        // Invert the domain map: triangle -> physical tag
        let mut tri_tags = vec![String::new(); input.nodes_conn.len()];
        for (tag, tri_ids) in &input.physical_domains {
            for &t in tri_ids {
                tri_tags[t] = tag.clone();
            }
        }

        let mut triangles = Vec::with_capacity(input.nodes_conn.len());
        for (id, conn) in input.nodes_conn.iter().enumerate() {
            let tag = &tri_tags[id];
            let (material, rosette) = materials
                .get(tag)
                .ok_or_else(|| SimError::UnassignedMaterialTag(tag.clone()))?;
            material.validate()?;

            let tri = Self::make_triangle(id, *conn, tag.clone(), &nodes, material, rosette)?;
            for &n in conn {
                nodes[n].triangle_ids.push(id);
            }
            triangles.push(tri);
        }

        // Three edges per triangle, back-referencing the owner
        let mut lines = Vec::with_capacity(3 * triangles.len());
        for tri in &mut triangles {
            let [a, b, c] = tri.node_ids;
            for (slot, (p, q)) in [(a, b), (b, c), (c, a)].into_iter().enumerate() {
                let id = lines.len();
                lines.push(Line::new(id, [p, q], nodes[p].coords, nodes[q].coords, tri.id));
                tri.line_ids[slot] = id;
            }
        }

        // Node adjacency: union of incident-triangle nodes minus self
        for node in &mut nodes {
            let mut adj: Vec<usize> = node
                .triangle_ids
                .iter()
                .flat_map(|&t| triangles[t].node_ids)
                .filter(|&m| m != node.id)
                .collect();
            adj.sort_unstable();
            adj.dedup();
            node.node_ids = adj;
        }

        let mut cvs = Vec::with_capacity(nodes.len());
        for node in &nodes {
            cvs.push(Self::make_control_volume(node, &triangles, &lines)?);
        }

        info!(
            "mesh pre-processing completed: {} nodes, {} triangles, {} control volumes",
            nodes.len(),
            triangles.len(),
            cvs.len()
        );

        Ok(Self {
            nodes,
            triangles,
            lines,
            cvs,
            boundaries: input.physical_nodes.clone(),
        })
    }

    fn make_triangle(
        id: usize,
        conn: [usize; 3],
        material_tag: String,
        nodes: &[Node],
        material: &PorousMaterial,
        rosette: &Rosette,
    ) -> Result<Triangle> {
        let x0 = nodes[conn[0]].coords;
        let x1 = nodes[conn[1]].coords;
        let x2 = nodes[conn[2]].coords;

        // Jacobian of the reference-to-world map, columns (x1-x0, x2-x0)
        let j = Matrix3x2::from_columns(&[x1 - x0, x2 - x0]);
        let det_j = (x1 - x0).cross(&(x2 - x0)).norm();
        let area = 0.5 * det_j;
        if area < AREA_EPS {
            return Err(SimError::DegenerateTriangle(id));
        }

        // Pseudoinverse J⁺ = (JᵀJ)⁻¹ Jᵀ; JᵀJ is invertible for non-collapsed
        // triangles
        let jtj = j.transpose() * j;
        let jtj_inv = jtj
            .try_inverse()
            .ok_or(SimError::DegenerateTriangle(id))?;
        let j_pinv: Matrix2x3<f64> = jtj_inv * j.transpose();

        let dndxi = Matrix3x2::new(-1.0, -1.0, 1.0, 0.0, 0.0, 1.0);
        let grad_n = (dndxi * j_pinv).transpose();

        let normal = (x0 - x1).cross(&(x0 - x2)).normalize();
        let r = rosette
            .project_along_normal(&normal)
            .ok_or(SimError::RosetteParallelToNormal(id))?;
        let permeability = r * material.k_diag() * r.transpose();

        Ok(Triangle {
            id,
            node_ids: conn,
            line_ids: [0; 3],
            material_tag,
            normal,
            area,
            centroid: (x0 + x1 + x2) / 3.0,
            grad_n,
            permeability,
            porosity: material.porosity,
            thickness: material.thickness,
        })
    }

    fn make_control_volume(
        node: &Node,
        triangles: &[Triangle],
        lines: &[Line],
    ) -> Result<ControlVolume> {
        let mut sub_edges = Vec::with_capacity(node.triangle_ids.len());
        let mut area = 0.0;
        let mut volume = 0.0;

        for &tid in &node.triangle_ids {
            let tri = &triangles[tid];
            let side: Vec<&Line> = tri
                .line_ids
                .iter()
                .map(|&l| &lines[l])
                .filter(|l| l.node_ids.contains(&node.id))
                .collect();
            if side.len() != 2 {
                return Err(SimError::BrokenTopology {
                    node: node.id,
                    triangle: tid,
                    found: side.len(),
                });
            }

            let m1 = side[0].midpoint;
            let m2 = side[1].midpoint;
            let centroid = tri.centroid;
            let mut pair = [SubEdge::new(m1, centroid), SubEdge::new(centroid, m2)];

            // Enforce outward normals: the centroid offset by the normal must
            // move away from the node, not towards it
            for s in &mut pair {
                let outer = (centroid + s.normal - node.coords).norm();
                let inner = (centroid - s.normal - node.coords).norm();
                if outer < inner {
                    s.normal = -s.normal;
                }
            }

            let slice = polygon_area_xy(&[node.coords, m1, centroid, m2]);
            area += slice;
            volume += slice * tri.thickness * tri.porosity;
            sub_edges.push(pair);
        }

        Ok(ControlVolume {
            id: node.id,
            fill: 0.0,
            free_surface: false,
            area,
            volume,
            support_triangle_ids: node.triangle_ids.clone(),
            sub_edges,
            neighbor_ids: node.node_ids.clone(),
        })
    }

    /// Reset every control volume to the unfilled state.
    pub fn empty_cvs(&mut self) {
        for cv in &mut self.cvs {
            cv.fill = 0.0;
            cv.free_surface = false;
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_triangles(&self) -> usize {
        self.triangles.len()
    }
}

/// Shoelace area of a polygon projected onto the xy plane.
fn polygon_area_xy(points: &[Vector3<f64>]) -> f64 {
    let n = points.len();
    let mut area = 0.0;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        area += p[0] * q[1] - p[1] * q[0];
    }
    area.abs() / 2.0
}
