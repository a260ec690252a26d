//! Boundary conditions.

use crate::ad::Number;
use crate::bc::NodalBc;
use crate::error::Result;
use crate::fields::KernelQp;
use crate::kernel::{ContributorInfo, HandCodedJacobian, ManualKernel, WeakForm};
use crate::params::ParameterSet;
use crate::registry::{bc_params, BuildContext, SimObject};
use crate::types::{BoundaryId, Point3, VarId};

/// `u = value` on the nodes of the listed boundaries.
pub struct DirichletBc {
    name: String,
    variable: VarId,
    boundaries: Vec<BoundaryId>,
    value: f64,
}

impl DirichletBc {
    pub fn valid_params() -> ParameterSet {
        let mut p = bc_params();
        p.add_param("value", 0.0, "Prescribed value");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(SimObject::NodalBc(Box::new(Self {
            name: ctx.object_name().to_string(),
            variable: ctx.variable(params, "variable")?,
            boundaries: params.get("boundary")?,
            value: params.get("value")?,
        })))
    }
}

impl NodalBc for DirichletBc {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable(&self) -> VarId {
        self.variable
    }

    fn boundaries(&self) -> &[BoundaryId] {
        &self.boundaries
    }

    fn value(&self, _point: &Point3, _time: f64) -> f64 {
        self.value
    }
}

/// Prescribed flux: `-(value, test)` on the sides of the listed boundaries.
pub struct NeumannBc {
    info: ContributorInfo,
    value: f64,
}

impl NeumannBc {
    pub fn valid_params() -> ParameterSet {
        let mut p = bc_params();
        p.add_param("value", 0.0, "Outward flux");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(SimObject::IntegratedBc(Box::new(ManualKernel(Self {
            info: ctx.contributor_info(params)?,
            value: params.get("value")?,
        }))))
    }
}

impl WeakForm for NeumannBc {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        N::constant(-self.value * q.test(i))
    }
}

impl HandCodedJacobian for NeumannBc {
    fn qp_jacobian(&self, _q: &KernelQp<'_, f64>, _i: usize, _j: usize) -> f64 {
        0.0
    }
}
