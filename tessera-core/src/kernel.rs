//! Residual and Jacobian contributors.
//!
//! A physics term is written once as a [`WeakForm`]: the residual at one
//! quadrature point for one test function, generic over [`Number`]. Two
//! adapters turn a weak form into the object-safe capability the element
//! loop calls:
//!
//! - [`ManualKernel`] evaluates with `f64` and takes the Jacobian from the
//!   author's [`HandCodedJacobian`] implementation.
//! - [`AdKernel`] evaluates with [`DualNumber`] and reads the Jacobian off
//!   the residual's derivatives.
//!
//! The same adapters serve volume kernels and integrated boundary conditions;
//! the loop decides where an object runs from its [`ContributorInfo`].

use crate::ad::{DualNumber, Number};
use crate::fe::FeValues;
use crate::fields::{ElementFields, KernelQp, Qp};
use crate::property::MaterialData;
use crate::types::{BoundaryId, SubdomainId, TimeContext, VarId};
use nalgebra::{DMatrix, DVector};

/// Identity and placement of a residual object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContributorInfo {
    pub name: String,
    /// Variable whose residual rows this object fills.
    pub variable: VarId,
    /// Subdomains the object is active on; empty means all.
    pub blocks: Vec<SubdomainId>,
    /// Side sets for integrated boundary conditions; empty for kernels.
    pub boundaries: Vec<BoundaryId>,
}

impl ContributorInfo {
    pub fn is_active_on(&self, subdomain: SubdomainId) -> bool {
        self.blocks.is_empty() || self.blocks.contains(&subdomain)
    }
}

/// Dense local residual and Jacobian of one element.
///
/// Local numbering is variable-major: row `var * n_nodes + i`.
#[derive(Debug, Clone)]
pub struct LocalBlocks {
    n_nodes: usize,
    residual: DVector<f64>,
    jacobian: DMatrix<f64>,
}

impl Default for LocalBlocks {
    fn default() -> Self {
        Self {
            n_nodes: 0,
            residual: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
        }
    }
}

impl LocalBlocks {
    /// Zero both blocks for an element with `n_nodes` nodes and `n_vars`
    /// variables, reallocating only when the size changes.
    pub fn reset(&mut self, n_nodes: usize, n_vars: usize) {
        let n = n_nodes * n_vars;
        self.n_nodes = n_nodes;
        if self.residual.len() != n {
            self.residual = DVector::zeros(n);
            self.jacobian = DMatrix::zeros(n, n);
        } else {
            self.residual.fill(0.0);
            self.jacobian.fill(0.0);
        }
    }

    #[inline]
    pub fn row(&self, var: VarId, i: usize) -> usize {
        var.0 * self.n_nodes + i
    }

    pub fn n_local(&self) -> usize {
        self.residual.len()
    }

    #[inline]
    pub fn add_residual(&mut self, var: VarId, i: usize, value: f64) {
        let r = self.row(var, i);
        self.residual[r] += value;
    }

    #[inline]
    pub fn add_jacobian(&mut self, var: VarId, i: usize, jvar: VarId, j: usize, value: f64) {
        let (r, c) = (self.row(var, i), self.row(jvar, j));
        self.jacobian[(r, c)] += value;
    }

    /// Add `scale * d(value)/d(local dof)` across a whole row.
    pub fn add_jacobian_row(&mut self, row: usize, derivs: &[f64], scale: f64) {
        for (c, d) in derivs.iter().enumerate() {
            self.jacobian[(row, c)] += scale * d;
        }
    }

    pub fn residual(&self) -> &DVector<f64> {
        &self.residual
    }

    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }
}

/// Read-only element data handed to contributors.
pub struct ElementContext<'a> {
    pub fe: &'a FeValues,
    pub fields: &'a ElementFields,
    pub props: &'a MaterialData,
    pub postprocessors: &'a [f64],
    pub time: &'a TimeContext,
}

impl<'a> ElementContext<'a> {
    pub fn n_qp(&self) -> usize {
        self.fe.n_qp()
    }

    pub fn n_shape(&self) -> usize {
        self.fe.n_nodes()
    }

    pub fn real_qp(&self, qp: usize) -> Qp<'a, f64> {
        Qp::new(
            qp,
            self.fe,
            self.fields.real(),
            self.fields,
            self.postprocessors,
            self.time,
        )
    }

    pub fn dual_qp(&self, qp: usize) -> Qp<'a, DualNumber> {
        Qp::new(
            qp,
            self.fe,
            self.fields.dual(),
            self.fields,
            self.postprocessors,
            self.time,
        )
    }
}

/// Capability: contributes to the residual.
pub trait ResidualContributor: Send + Sync {
    fn info(&self) -> &ContributorInfo;

    fn add_residual(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks);
}

/// Capability: contributes to the Jacobian as well.
pub trait JacobianContributor: ResidualContributor {
    /// Whether the Jacobian comes from dual numbers (needs seeded fields).
    fn is_ad(&self) -> bool;

    fn add_jacobian(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks);

    fn add_residual_and_jacobian(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        self.add_residual(ctx, local);
        self.add_jacobian(ctx, local);
    }
}

/// A weak-form term written once for both differentiation modes.
pub trait WeakForm: Send + Sync + 'static {
    fn info(&self) -> &ContributorInfo;

    /// Residual integrand (without `JxW`) for test function `i`.
    fn qp_residual<N: Number>(&self, q: &KernelQp<'_, N>, i: usize) -> N;
}

/// Hand-written derivatives of a [`WeakForm`] residual.
pub trait HandCodedJacobian: WeakForm {
    /// d(residual_i)/d(u_j) for the object's own variable (without `JxW`).
    fn qp_jacobian(&self, q: &KernelQp<'_, f64>, i: usize, j: usize) -> f64;

    /// d(residual_i)/d(v_j) for a coupled nonlinear variable `jvar`.
    fn qp_off_diag_jacobian(&self, _q: &KernelQp<'_, f64>, _i: usize, _j: usize, _jvar: VarId) -> f64 {
        0.0
    }

    /// Nonlinear variables this term couples to, i.e. the off-diagonal
    /// blocks it fills.
    fn off_diag_vars(&self) -> &[VarId] {
        &[]
    }
}

/// Weak form evaluated in `f64` with a hand-coded Jacobian.
#[derive(Debug, Clone)]
pub struct ManualKernel<W>(pub W);

/// Weak form evaluated with dual numbers.
#[derive(Debug, Clone)]
pub struct AdKernel<W>(pub W);

impl<W: HandCodedJacobian> ResidualContributor for ManualKernel<W> {
    fn info(&self) -> &ContributorInfo {
        self.0.info()
    }

    fn add_residual(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        let var = self.0.info().variable;
        for qp in 0..ctx.n_qp() {
            let q = KernelQp::new(ctx.real_qp(qp), var, ctx.props);
            let jxw = q.jxw();
            for i in 0..ctx.n_shape() {
                local.add_residual(var, i, jxw * self.0.qp_residual(&q, i));
            }
        }
    }
}

impl<W: HandCodedJacobian> JacobianContributor for ManualKernel<W> {
    fn is_ad(&self) -> bool {
        false
    }

    fn add_jacobian(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        let var = self.0.info().variable;
        let off_diag = self.0.off_diag_vars();
        let n = ctx.n_shape();
        for qp in 0..ctx.n_qp() {
            let q = KernelQp::new(ctx.real_qp(qp), var, ctx.props);
            let jxw = q.jxw();
            for i in 0..n {
                for j in 0..n {
                    local.add_jacobian(var, i, var, j, jxw * self.0.qp_jacobian(&q, i, j));
                    for &jvar in off_diag.iter().filter(|&&v| v != var) {
                        let value = self.0.qp_off_diag_jacobian(&q, i, j, jvar);
                        local.add_jacobian(var, i, jvar, j, jxw * value);
                    }
                }
            }
        }
    }
}

impl<W: WeakForm> AdKernel<W> {
    fn accumulate(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks, residual: bool, jacobian: bool) {
        let var = self.0.info().variable;
        for qp in 0..ctx.n_qp() {
            let q = KernelQp::new(ctx.dual_qp(qp), var, ctx.props);
            let jxw = q.jxw();
            for i in 0..ctx.n_shape() {
                let r = self.0.qp_residual(&q, i);
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

impl<W: WeakForm> ResidualContributor for AdKernel<W> {
    fn info(&self) -> &ContributorInfo {
        self.0.info()
    }

    fn add_residual(&self, ctx: &ElementContext<'_>, local: &mut LocalBlocks) {
        self.accumulate(ctx, local, true, false);
    }
}

impl<W: WeakForm> JacobianContributor for AdKernel<W> {
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
