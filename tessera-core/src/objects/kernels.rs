//! Volume kernels.

use crate::ad::{DualNumber, Number};
use crate::coupling::CoupledValue;
use crate::error::Result;
use crate::fields::KernelQp;
use crate::kernel::{
    AdKernel, ContributorInfo, ElementContext, HandCodedJacobian, JacobianContributor, LocalBlocks,
    ManualKernel, ResidualContributor, WeakForm,
};
use crate::params::ParameterSet;
use crate::property::{OptionalProperty, PropertyHandle};
use crate::registry::{kernel_params, BuildContext, SimObject};
use crate::types::{TimeState, VarId};

fn manual<W: HandCodedJacobian>(w: W) -> SimObject {
    SimObject::Kernel(Box::new(ManualKernel(w)))
}

fn ad<W: WeakForm>(w: W) -> SimObject {
    SimObject::Kernel(Box::new(AdKernel(w)))
}

/// `(grad u, grad test)`
pub struct Diffusion {
    info: ContributorInfo,
}

impl Diffusion {
    pub fn valid_params() -> ParameterSet {
        kernel_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(manual(Self {
            info: ctx.contributor_info(params)?,
        }))
    }

    pub fn build_ad(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(ad(Self {
            info: ctx.contributor_info(params)?,
        }))
    }
}

impl WeakForm for Diffusion {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        q.grad_u().dot_real(q.grad_test(i))
    }
}

impl HandCodedJacobian for Diffusion {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        q.grad_phi(j).dot(q.grad_test(i))
    }
}

/// `coef * (grad u, grad test)` with a constant coefficient.
pub struct CoefDiffusion {
    info: ContributorInfo,
    coef: f64,
}

impl CoefDiffusion {
    pub fn valid_params() -> ParameterSet {
        let mut p = kernel_params();
        p.add_param("coef", 1.0, "Diffusion coefficient");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(manual(Self {
            info: ctx.contributor_info(params)?,
            coef: params.get("coef")?,
        }))
    }
}

impl WeakForm for CoefDiffusion {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        q.grad_u().dot_real(q.grad_test(i)) * self.coef
    }
}

impl HandCodedJacobian for CoefDiffusion {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        self.coef * q.grad_phi(j).dot(q.grad_test(i))
    }
}

/// `(k grad u, grad test)` with `k` a material property.
///
/// For every nonlinear variable `w` whose derivative `d<k>_d<w>` some
/// producer declares, the hand-coded Jacobian adds `dk/dw phi_j grad u` to
/// the `(u, w)` block.
pub struct MatDiffusion {
    info: ContributorInfo,
    k: PropertyHandle<f64>,
    dk: Vec<(VarId, OptionalProperty<f64>)>,
    off_diag: Vec<VarId>,
}

impl MatDiffusion {
    pub fn valid_params() -> ParameterSet {
        let mut p = kernel_params();
        p.add_param("diffusivity", "diffusivity".to_string(), "Diffusivity property");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let info = ctx.contributor_info(params)?;
        let name: String = params.get("diffusivity")?;
        let vars: Vec<(VarId, String)> = ctx
            .variables()
            .variables()
            .iter()
            .map(|v| (v.id, v.name.clone()))
            .collect();
        let mut dk = Vec::with_capacity(vars.len());
        for (var, var_name) in &vars {
            dk.push((*var, ctx.get_optional_property(&format!("d{name}_d{var_name}"))?));
        }
        let off_diag = vars
            .iter()
            .map(|(var, _)| *var)
            .filter(|var| *var != info.variable)
            .collect();
        Ok(manual(Self {
            info,
            k: ctx.get_property(&name)?,
            dk,
            off_diag,
        }))
    }

    fn derivative(&self, var: VarId) -> Option<PropertyHandle<f64>> {
        self.dk.iter().find(|(v, _)| *v == var).and_then(|(_, p)| p.get())
    }
}

impl WeakForm for MatDiffusion {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        q.grad_u().dot_real(q.grad_test(i)) * *q.property(&self.k)
    }
}

impl HandCodedJacobian for MatDiffusion {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        let gt = q.grad_test(i);
        let mut jac = *q.property(&self.k) * q.grad_phi(j).dot(gt);
        if let Some(dk) = self.derivative(self.info.variable) {
            jac += *q.property(&dk) * q.phi(j) * q.grad_u().dot(gt);
        }
        jac
    }

    fn qp_off_diag_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize, jvar: VarId) -> f64 {
        match self.derivative(jvar) {
            Some(dk) => *q.property(&dk) * q.phi(j) * q.grad_u().dot(q.grad_test(i)),
            None => 0.0,
        }
    }

    fn off_diag_vars(&self) -> &[VarId] {
        &self.off_diag
    }
}

/// `(k grad u, grad test)` with `k` a dual-number property.
///
/// Derivatives of `k` with respect to the local DOFs flow into the Jacobian,
/// so no derivative property is needed.
pub struct AdMatDiffusion {
    info: ContributorInfo,
    k: PropertyHandle<DualNumber>,
}

impl AdMatDiffusion {
    pub fn valid_params() -> ParameterSet {
        MatDiffusion::valid_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let info = ctx.contributor_info(params)?;
        let name: String = params.get("diffusivity")?;
        Ok(SimObject::Kernel(Box::new(Self {
            info,
            k: ctx.get_property(&name)?,
        })))
    }

    fn accumulate(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks, residual: bool, jacobian: bool) {
        let var = self.info.variable;
        for qp in 0..ctx.n_qp() {
            let q = KernelQp::new(ctx.dual_qp(qp), var, ctx.props);
            let jxw = q.jxw();
            let flux = q.grad_u().scale(q.property(&self.k));
            for i in 0..ctx.n_shape() {
                let r = flux.dot_real(q.grad_test(i));
                if residual {
                    local.add_residual(var, i, jxw * r.value());
                }
                if jacobian {
                    let row = local.row(var, i);
                    local.add_jacobian_row(row, r.derivatives(), jxw);
                }
            }
        }
    }
}

impl ResidualContributor for AdMatDiffusion {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn add_residual(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        self.accumulate(ctx, local, true, false);
    }
}

impl JacobianContributor for AdMatDiffusion {
    fn is_ad(&self) -> bool {
        true
    }

    fn add_jacobian(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        self.accumulate(ctx, local, false, true);
    }

    fn add_residual_and_jacobian(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        self.accumulate(ctx, local, true, true);
    }
}

/// `(du/dt, test)` with backward Euler.
pub struct TimeDerivative {
    info: ContributorInfo,
}

impl TimeDerivative {
    pub fn valid_params() -> ParameterSet {
        kernel_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(manual(Self {
            info: ctx.contributor_info(params)?,
        }))
    }

    pub fn build_ad(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(ad(Self {
            info: ctx.contributor_info(params)?,
        }))
    }
}

impl WeakForm for TimeDerivative {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        q.u_dot().clone() * q.test(i)
    }
}

impl HandCodedJacobian for TimeDerivative {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        q.du_dot_du() * q.phi(j) * q.test(i)
    }
}

/// `-(value * scale, test)`; `scale` may couple a field or postprocessor.
pub struct BodyForce {
    info: ContributorInfo,
    value: f64,
    scale: CoupledValue,
    off_diag: Vec<VarId>,
}

impl BodyForce {
    pub fn valid_params() -> ParameterSet {
        let mut p = kernel_params();
        p.add_param("value", 1.0, "Source magnitude");
        p.add_coupled_var_with_default("scale", 1.0, "Field or postprocessor scaling the source");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let couplings = ctx.couplings();
        let scale = couplings.coupled_value(params, "scale", TimeState::Current)?;
        let off_diag = couplings.coupled_var(params, "scale", 0)?.into_iter().collect();
        Ok(manual(Self {
            info: ctx.contributor_info(params)?,
            value: params.get("value")?,
            scale,
            off_diag,
        }))
    }
}

impl WeakForm for BodyForce {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        -(q.coupled(&self.scale) * (self.value * q.test(i)))
    }
}

impl HandCodedJacobian for BodyForce {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        if self.off_diag.contains(&self.info.variable) {
            -self.value * q.phi(j) * q.test(i)
        } else {
            0.0
        }
    }

    fn qp_off_diag_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize, _jvar: VarId) -> f64 {
        -self.value * q.phi(j) * q.test(i)
    }

    fn off_diag_vars(&self) -> &[VarId] {
        &self.off_diag
    }
}

/// `-(coef * v, test)` for a coupled field `v`.
pub struct CoupledForce {
    info: ContributorInfo,
    coef: f64,
    v: CoupledValue,
    v_var: Vec<VarId>,
}

impl CoupledForce {
    pub fn valid_params() -> ParameterSet {
        let mut p = kernel_params();
        p.add_required_coupled_var("v", "Field acting as the source");
        p.add_param("coef", 1.0, "Coefficient multiplying v");
        p
    }

    fn new(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<Self> {
        let couplings = ctx.couplings();
        let v = couplings.coupled_value(params, "v", TimeState::Current)?;
        let v_var = couplings.coupled_var(params, "v", 0)?.into_iter().collect();
        Ok(Self {
            info: ctx.contributor_info(params)?,
            coef: params.get("coef")?,
            v,
            v_var,
        })
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(manual(Self::new(params, ctx)?))
    }

    pub fn build_ad(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(ad(Self::new(params, ctx)?))
    }
}

impl WeakForm for CoupledForce {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        -(q.coupled(&self.v) * (self.coef * q.test(i)))
    }
}

impl HandCodedJacobian for CoupledForce {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        if self.v_var.contains(&self.info.variable) {
            -self.coef * q.phi(j) * q.test(i)
        } else {
            0.0
        }
    }

    fn qp_off_diag_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize, _jvar: VarId) -> f64 {
        -self.coef * q.phi(j) * q.test(i)
    }

    fn off_diag_vars(&self) -> &[VarId] {
        &self.v_var
    }
}

/// `(rate * u, test)`
pub struct Reaction {
    info: ContributorInfo,
    rate: f64,
}

impl Reaction {
    pub fn valid_params() -> ParameterSet {
        let mut p = kernel_params();
        p.add_param("rate", 1.0, "Reaction rate");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(manual(Self {
            info: ctx.contributor_info(params)?,
            rate: params.get("rate")?,
        }))
    }
}

impl WeakForm for Reaction {
    fn info(&self) -> &ContributorInfo {
        &self.info
    }

    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N {
        q.u().clone() * (self.rate * q.test(i))
    }
}

impl HandCodedJacobian for Reaction {
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64 {
        self.rate * q.phi(j) * q.test(i)
    }
}
