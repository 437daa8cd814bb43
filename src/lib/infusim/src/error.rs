//! Error types for the infusion core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    /// Process parameters or material data outside their admissible range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A triangle carries a physical tag with no material bound to it.
    #[error("mesh contains unassigned material tag: {0}")]
    UnassignedMaterialTag(String),

    /// An inlet references a physical tag the mesh does not define.
    #[error("mesh does not contain physical tag: {0}")]
    UnknownPhysicalTag(String),

    /// CV construction found a support triangle without exactly two
    /// node-incident edges.
    #[error(
        "control volume at node {node} expects two node-incident edges in triangle {triangle}, found {found}"
    )]
    BrokenTopology {
        node: usize,
        triangle: usize,
        found: usize,
    },

    /// The rosette direction has no in-plane component on this triangle.
    #[error("rosette direction is parallel to the normal of triangle {0}")]
    RosetteParallelToNormal(usize),

    #[error("triangle {0} is degenerate (zero area)")]
    DegenerateTriangle(usize),

    /// The pressure system could not be factorized after BC application.
    #[error("singular pressure system: {0}")]
    SingularSystem(String),

    /// No free-surface CV sees a positive net inflow; the front cannot
    /// advance and the remaining empty CVs are unreachable.
    #[error("stalled flow: no positive flux into any flow-front control volume at t = {0} s")]
    StalledFlow(f64),
}
