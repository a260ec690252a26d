//! Nodal (Dirichlet-type) boundary conditions.
//!
//! Integrated boundary conditions are ordinary weak forms run on sides; see
//! [`crate::kernel`]. Nodal conditions replace the residual row of each
//! constrained DOF with `u - g(x, t)` and its Jacobian row with the identity.

use crate::types::{BoundaryId, Point3, VarId};

/// Capability: constrains nodal values on node sets.
pub trait NodalBc: Send + Sync {
    fn name(&self) -> &str;

    fn variable(&self) -> VarId;

    fn boundaries(&self) -> &[BoundaryId];

    /// Prescribed value at a node.
    fn value(&self, point: &Point3, time: f64) -> f64;
}
