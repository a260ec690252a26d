//! Core data types shared across the assembly core.
//!
//! - Geometric primitives (points)
//! - Identifiers for subdomains, boundaries, variables and elements
//! - Temporal state and derivative selectors used by couplings and properties

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A point in 3D space. 1D and 2D meshes leave trailing components at zero.
pub type Point3 = Vector3<f64>;

/// Subdomain (block) identifier.
pub type SubdomainId = u16;

/// Boundary (node set / side set) identifier.
pub type BoundaryId = u16;

/// Element index in the mesh.
pub type ElementId = usize;

/// Index of a variable within its system.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VarId(pub usize);

/// Which point of the time history a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeState {
    /// Value at the current nonlinear iterate.
    #[default]
    Current,
    /// Value at the end of the previous time step.
    Old,
    /// Value two time steps back.
    Older,
}

impl TimeState {
    /// Short label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            TimeState::Current => "current",
            TimeState::Old => "old",
            TimeState::Older => "older",
        }
    }
}

/// Which derivative of a coupled field is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldDerivative {
    Value,
    Gradient,
    TimeDerivative,
}

/// Time-stepping context for the current step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeContext {
    /// Time at the end of the current step.
    pub time: f64,
    /// Step size used by backward-Euler time derivatives.
    pub dt: f64,
    /// Number of completed steps.
    pub step: usize,
}

impl Default for TimeContext {
    fn default() -> Self {
        Self {
            time: 0.0,
            dt: 1.0,
            step: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_current() {
        assert_eq!(TimeState::default(), TimeState::Current);
        assert_eq!(TimeState::Older.label(), "older");
    }

    #[test]
    fn test_var_ids_order() {
        let mut ids = vec![VarId(2), VarId(0), VarId(1)];
        ids.sort();
        assert_eq!(ids, vec![VarId(0), VarId(1), VarId(2)]);
    }
}
