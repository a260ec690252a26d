//! Field values at quadrature points and the per-qp evaluation context.
//!
//! [`ElementFields`] interpolates every variable onto the quadrature points
//! of the current element (or side) once; physics objects then read from it
//! through [`Qp`] and [`KernelQp`]. Nonlinear variables at the current state
//! exist twice: as plain `f64` and as [`DualNumber`]s seeded with the local
//! DOF derivatives, so the same weak form can run in either mode.

use crate::ad::{DualNumber, Gradient, Number, RealGradient};
use crate::coupling::{CoupledGradient, CoupledValue, FieldSource};
use crate::fe::FeValues;
use crate::property::{MaterialData, PropertyHandle, PropertyValue};
use crate::types::{FieldDerivative, Point3, TimeContext, TimeState, VarId};
use crate::variables::{DofMap, FieldKind, PostprocessorId, SolutionHistory};
use std::ops::Deref;

/// Values, gradients and time derivatives of a set of variables, `[var][qp]`.
#[derive(Debug, Clone, Default)]
pub struct FieldValues<N> {
    value: Vec<Vec<N>>,
    grad: Vec<Vec<Gradient<N>>>,
    dot: Vec<Vec<N>>,
}

impl<N: Number> FieldValues<N> {
    fn resize(&mut self, n_vars: usize, n_qp: usize) {
        self.value.resize_with(n_vars, Vec::new);
        self.grad.resize_with(n_vars, Vec::new);
        self.dot.resize_with(n_vars, Vec::new);
        for v in 0..n_vars {
            self.value[v].resize(n_qp, N::zero());
            self.grad[v].resize(n_qp, Gradient::zero());
            self.dot[v].resize(n_qp, N::zero());
        }
    }

    #[inline]
    pub fn value(&self, var: VarId, qp: usize) -> &N {
        &self.value[var.0][qp]
    }

    #[inline]
    pub fn gradient(&self, var: VarId, qp: usize) -> &Gradient<N> {
        &self.grad[var.0][qp]
    }

    #[inline]
    pub fn dot(&self, var: VarId, qp: usize) -> &N {
        &self.dot[var.0][qp]
    }
}

/// All field data on one element (or side).
#[derive(Debug, Clone, Default)]
pub struct ElementFields {
    n_qp: usize,
    n_nodes: usize,
    n_vars: usize,
    nl: FieldValues<f64>,
    nl_dual: FieldValues<DualNumber>,
    nl_old: FieldValues<f64>,
    nl_older: FieldValues<f64>,
    aux: FieldValues<f64>,
    aux_old: FieldValues<f64>,
    aux_older: FieldValues<f64>,
    nodal: Vec<f64>,
    nodal_old: Vec<f64>,
}

/// Global data the interpolation reads from.
#[derive(Debug, Clone, Copy)]
pub struct FieldSources<'a> {
    pub dofs: &'a DofMap,
    pub solution: &'a SolutionHistory,
    pub aux_dofs: &'a DofMap,
    pub aux_solution: &'a SolutionHistory,
    pub dt: f64,
}

impl ElementFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_qp(&self) -> usize {
        self.n_qp
    }

    /// Number of local nonlinear DOFs (`n_vars * n_nodes`).
    pub fn n_local(&self) -> usize {
        self.n_vars * self.n_nodes
    }

    pub fn real(&self) -> &FieldValues<f64> {
        &self.nl
    }

    pub fn dual(&self) -> &FieldValues<DualNumber> {
        &self.nl_dual
    }

    /// Interpolate every variable at the quadrature points of `fe`.
    ///
    /// With `seed` set, the dual values carry derivatives with respect to the
    /// local DOFs (`local = var * n_nodes + node`); otherwise they are
    /// constants.
    pub fn compute(&mut self, fe: &FeValues, nodes: &[usize], src: FieldSources<'_>, seed: bool) {
        let n_qp = fe.n_qp();
        let n_nodes = nodes.len();
        let n_vars = src.dofs.n_vars();
        let n_aux = src.aux_dofs.n_vars();
        self.n_qp = n_qp;
        self.n_nodes = n_nodes;
        self.n_vars = n_vars;

        self.nl.resize(n_vars, n_qp);
        self.nl_dual.resize(n_vars, n_qp);
        self.nl_old.resize(n_vars, n_qp);
        self.nl_older.resize(n_vars, n_qp);
        self.aux.resize(n_aux, n_qp);
        self.aux_old.resize(n_aux, n_qp);
        self.aux_older.resize(n_aux, n_qp);

        let inv_dt = 1.0 / src.dt;
        let n_local = n_vars * n_nodes;

        for v in 0..n_vars {
            let var = VarId(v);
            gather(&mut self.nodal, nodes, src.dofs, var, src.solution.current());
            gather(&mut self.nodal_old, nodes, src.dofs, var, src.solution.state(TimeState::Old));
            interpolate(fe, &self.nodal, &self.nodal_old, inv_dt, v, &mut self.nl);
            interpolate_value_grad(fe, &self.nodal_old, v, &mut self.nl_old);
            gather(&mut self.nodal_old, nodes, src.dofs, var, src.solution.state(TimeState::Older));
            interpolate_value_grad(fe, &self.nodal_old, v, &mut self.nl_older);

            for qp in 0..n_qp {
                let u = self.nl.value[v][qp];
                let g = &self.nl.grad[v][qp];
                let dot = self.nl.dot[v][qp];
                let value = &mut self.nl_dual.value[v][qp];
                let grad = &mut self.nl_dual.grad[v][qp];
                let rate = &mut self.nl_dual.dot[v][qp];
                if !seed {
                    value.set_constant(u);
                    for d in 0..3 {
                        grad.0[d].set_constant(g.0[d]);
                    }
                    rate.set_constant(dot);
                    continue;
                }
                value.reset(u, n_local);
                rate.reset(dot, n_local);
                for d in 0..3 {
                    grad.0[d].reset(g.0[d], n_local);
                }
                let offset = v * n_nodes;
                for a in 0..n_nodes {
                    let phi = fe.phi(a, qp);
                    value.derivatives_mut()[offset + a] = phi;
                    rate.derivatives_mut()[offset + a] = phi * inv_dt;
                    let gp = fe.grad_phi(a, qp);
                    for d in 0..3 {
                        grad.0[d].derivatives_mut()[offset + a] = gp.0[d];
                    }
                }
            }
        }

        for v in 0..n_aux {
            let var = VarId(v);
            gather(&mut self.nodal, nodes, src.aux_dofs, var, src.aux_solution.current());
            gather(&mut self.nodal_old, nodes, src.aux_dofs, var, src.aux_solution.state(TimeState::Old));
            interpolate(fe, &self.nodal, &self.nodal_old, inv_dt, v, &mut self.aux);
            interpolate_value_grad(fe, &self.nodal_old, v, &mut self.aux_old);
            gather(&mut self.nodal_old, nodes, src.aux_dofs, var, src.aux_solution.state(TimeState::Older));
            interpolate_value_grad(fe, &self.nodal_old, v, &mut self.aux_older);
        }
    }

    fn lagged(&self, kind: FieldKind, state: TimeState) -> &FieldValues<f64> {
        match (kind, state) {
            (FieldKind::Nonlinear, TimeState::Current) => &self.nl,
            (FieldKind::Nonlinear, TimeState::Old) => &self.nl_old,
            (FieldKind::Nonlinear, TimeState::Older) => &self.nl_older,
            (FieldKind::Auxiliary, TimeState::Current) => &self.aux,
            (FieldKind::Auxiliary, TimeState::Old) => &self.aux_old,
            (FieldKind::Auxiliary, TimeState::Older) => &self.aux_older,
        }
    }
}

fn gather(out: &mut Vec<f64>, nodes: &[usize], map: &DofMap, var: VarId, vector: &[f64]) {
    out.clear();
    out.extend(nodes.iter().map(|&n| vector[map.dof(n, var)]));
}

fn interpolate(
    fe: &FeValues,
    nodal: &[f64],
    nodal_old: &[f64],
    inv_dt: f64,
    v: usize,
    out: &mut FieldValues<f64>,
) {
    for qp in 0..fe.n_qp() {
        let mut u = 0.0;
        let mut u_old = 0.0;
        let mut g = RealGradient::zero();
        for (a, (&ua, &ua_old)) in nodal.iter().zip(nodal_old).enumerate() {
            let phi = fe.phi(a, qp);
            u += phi * ua;
            u_old += phi * ua_old;
            g.add_scaled_real(fe.grad_phi(a, qp), &ua);
        }
        out.value[v][qp] = u;
        out.grad[v][qp] = g;
        out.dot[v][qp] = (u - u_old) * inv_dt;
    }
}

fn interpolate_value_grad(fe: &FeValues, nodal: &[f64], v: usize, out: &mut FieldValues<f64>) {
    for qp in 0..fe.n_qp() {
        let mut u = 0.0;
        let mut g = RealGradient::zero();
        for (a, &ua) in nodal.iter().enumerate() {
            u += fe.phi(a, qp) * ua;
            g.add_scaled_real(fe.grad_phi(a, qp), &ua);
        }
        out.value[v][qp] = u;
        out.grad[v][qp] = g;
    }
}

/// Everything readable at one quadrature point, in number type `N`.
pub struct Qp<'a, N> {
    qp: usize,
    fe: &'a FeValues,
    current: &'a FieldValues<N>,
    fields: &'a ElementFields,
    postprocessors: &'a [f64],
    time: &'a TimeContext,
}

impl<'a, N: Number> Qp<'a, N> {
    pub fn new(
        qp: usize,
        fe: &'a FeValues,
        current: &'a FieldValues<N>,
        fields: &'a ElementFields,
        postprocessors: &'a [f64],
        time: &'a TimeContext,
    ) -> Self {
        Self {
            qp,
            fe,
            current,
            fields,
            postprocessors,
            time,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.qp
    }

    #[inline]
    pub fn jxw(&self) -> f64 {
        self.fe.jxw(self.qp)
    }

    pub fn point(&self) -> &Point3 {
        self.fe.q_point(self.qp)
    }

    /// Outward unit normal (side evaluations only).
    pub fn normal(&self) -> &RealGradient {
        self.fe.normal(self.qp)
    }

    pub fn time(&self) -> f64 {
        self.time.time
    }

    pub fn dt(&self) -> f64 {
        self.time.dt
    }

    /// Number of shape functions on the element.
    pub fn n_shape(&self) -> usize {
        self.fe.n_nodes()
    }

    #[inline]
    pub fn phi(&self, j: usize) -> f64 {
        self.fe.phi(j, self.qp)
    }

    #[inline]
    pub fn grad_phi(&self, j: usize) -> &RealGradient {
        self.fe.grad_phi(j, self.qp)
    }

    /// Current value of nonlinear variable `var`.
    #[inline]
    pub fn value(&self, var: VarId) -> &N {
        self.current.value(var, self.qp)
    }

    #[inline]
    pub fn gradient(&self, var: VarId) -> &Gradient<N> {
        self.current.gradient(var, self.qp)
    }

    #[inline]
    pub fn dot(&self, var: VarId) -> &N {
        self.current.dot(var, self.qp)
    }

    pub fn postprocessor(&self, id: PostprocessorId) -> f64 {
        self.postprocessors.get(id.0).copied().unwrap_or(0.0)
    }

    /// Read a coupled value accessor.
    ///
    /// Only current nonlinear values and time derivatives carry derivatives;
    /// lagged states, auxiliary fields, postprocessors and constants are
    /// constants.
    pub fn coupled(&self, c: &CoupledValue) -> N {
        let qp = self.qp;
        match (c.source, c.derivative) {
            (FieldSource::Constant(v), FieldDerivative::Value) => N::constant(v),
            (FieldSource::Postprocessor(id), FieldDerivative::Value) => {
                N::constant(self.postprocessor(id))
            }
            (FieldSource::Constant(_) | FieldSource::Postprocessor(_), _) => N::zero(),
            (FieldSource::Variable { kind, var }, FieldDerivative::TimeDerivative) => match kind {
                FieldKind::Nonlinear => self.current.dot(var, qp).clone(),
                FieldKind::Auxiliary => N::constant(*self.fields.aux.dot(var, qp)),
            },
            (FieldSource::Variable { kind, var }, _) => {
                if kind == FieldKind::Nonlinear && c.state == TimeState::Current {
                    self.current.value(var, qp).clone()
                } else {
                    N::constant(*self.fields.lagged(kind, c.state).value(var, qp))
                }
            }
        }
    }

    pub fn coupled_gradient(&self, c: &CoupledGradient) -> Gradient<N> {
        let qp = self.qp;
        match c.source {
            FieldSource::Constant(_) | FieldSource::Postprocessor(_) => Gradient::zero(),
            FieldSource::Variable { kind, var } => {
                if kind == FieldKind::Nonlinear && c.state == TimeState::Current {
                    self.current.gradient(var, qp).clone()
                } else {
                    Gradient::from_real(self.fields.lagged(kind, c.state).gradient(var, qp))
                }
            }
        }
    }
}

/// Quadrature-point context of a residual object acting on one variable.
pub struct KernelQp<'a, N> {
    qp: Qp<'a, N>,
    var: VarId,
    props: &'a MaterialData,
}

impl<'a, N: Number> KernelQp<'a, N> {
    pub fn new(qp: Qp<'a, N>, var: VarId, props: &'a MaterialData) -> Self {
        Self { qp, var, props }
    }

    pub fn variable(&self) -> VarId {
        self.var
    }

    #[inline]
    pub fn u(&self) -> &N {
        self.qp.value(self.var)
    }

    #[inline]
    pub fn grad_u(&self) -> &Gradient<N> {
        self.qp.gradient(self.var)
    }

    #[inline]
    pub fn u_dot(&self) -> &N {
        self.qp.dot(self.var)
    }

    /// d(u_dot)/du for backward Euler.
    pub fn du_dot_du(&self) -> f64 {
        1.0 / self.qp.dt()
    }

    #[inline]
    pub fn test(&self, i: usize) -> f64 {
        self.qp.phi(i)
    }

    #[inline]
    pub fn grad_test(&self, i: usize) -> &RealGradient {
        self.qp.grad_phi(i)
    }

    #[inline]
    pub fn property<T: PropertyValue>(&self, handle: &PropertyHandle<T>) -> &T {
        self.props.get(handle, self.qp.index())
    }
}

impl<'a, N> Deref for KernelQp<'a, N> {
    type Target = Qp<'a, N>;

    fn deref(&self) -> &Self::Target {
        &self.qp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Edge2, ReferenceElement};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn line_fe() -> FeValues {
        let coords = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)];
        let mut fe = FeValues::new();
        fe.reinit(&Edge2, &coords, &Edge2.quadrature(2)).unwrap();
        fe
    }

    #[test]
    fn test_interpolation_and_seeding() {
        let fe = line_fe();
        let dofs = DofMap::new(2, 1);
        let aux_dofs = DofMap::new(2, 0);
        let mut sol = SolutionHistory::zeros(2);
        sol.set_all(&[1.0, 1.0]).unwrap();
        sol.set_current(&[1.0, 3.0]).unwrap();
        let aux = SolutionHistory::zeros(0);
        let src = FieldSources {
            dofs: &dofs,
            solution: &sol,
            aux_dofs: &aux_dofs,
            aux_solution: &aux,
            dt: 0.5,
        };

        let mut fields = ElementFields::new();
        fields.compute(&fe, &[0, 1], src, true);
        assert_eq!(fields.n_local(), 2);

        for qp in 0..fe.n_qp() {
            let u = *fields.real().value(VarId(0), qp);
            let x = fe.q_point(qp).x;
            assert_relative_eq!(u, 1.0 + x, epsilon = 1e-12);
            assert_relative_eq!(fields.real().gradient(VarId(0), qp).0[0], 1.0, epsilon = 1e-12);
            // (u - u_old) / dt
            assert_relative_eq!(*fields.real().dot(VarId(0), qp), x / 0.5, epsilon = 1e-12);

            let du = fields.dual().value(VarId(0), qp);
            assert_relative_eq!(du.derivative(0), fe.phi(0, qp));
            assert_relative_eq!(du.derivative(1), fe.phi(1, qp));
            let ddot = fields.dual().dot(VarId(0), qp);
            assert_relative_eq!(ddot.derivative(1), fe.phi(1, qp) / 0.5);
        }

        fields.compute(&fe, &[0, 1], src, false);
        assert!(fields.dual().value(VarId(0), 0).derivatives().is_empty());
    }

    #[test]
    fn test_seeded_derivatives_reuse_storage() {
        let fe = line_fe();
        let dofs = [DofMap::new(2, 1), DofMap::new(2, 0)];
        let mut sol = SolutionHistory::zeros(2);
        sol.set_all(&[1.0, 2.0]).unwrap();
        let aux = SolutionHistory::zeros(0);
        let mut fields = ElementFields::new();
        fn src<'a>(dofs: &'a [DofMap; 2], sol: &'a SolutionHistory, aux: &'a SolutionHistory) -> FieldSources<'a> {
            FieldSources {
                dofs: &dofs[0],
                solution: sol,
                aux_dofs: &dofs[1],
                aux_solution: aux,
                dt: 1.0,
            }
        }

        fields.compute(&fe, &[0, 1], src(&dofs, &sol, &aux), true);
        let value_ptr = fields.dual().value(VarId(0), 0).derivatives().as_ptr();
        let grad_ptr = fields.dual().gradient(VarId(0), 1).0[0].derivatives().as_ptr();
        let dot_ptr = fields.dual().dot(VarId(0), 1).derivatives().as_ptr();

        fields.compute(&fe, &[0, 1], src(&dofs, &sol, &aux), false);
        sol.set_current(&[5.0, -1.0]).unwrap();
        fields.compute(&fe, &[0, 1], src(&dofs, &sol, &aux), true);

        let value = fields.dual().value(VarId(0), 0);
        assert_eq!(value.derivatives().as_ptr(), value_ptr);
        assert_eq!(fields.dual().gradient(VarId(0), 1).0[0].derivatives().as_ptr(), grad_ptr);
        assert_eq!(fields.dual().dot(VarId(0), 1).derivatives().as_ptr(), dot_ptr);

        assert_relative_eq!(value.value(), *fields.real().value(VarId(0), 0), epsilon = 1e-12);
        assert_relative_eq!(value.derivative(0), fe.phi(0, 0));
        assert_relative_eq!(
            fields.dual().gradient(VarId(0), 1).0[0].derivative(1),
            fe.grad_phi(1, 1).0[0]
        );
        assert_relative_eq!(fields.dual().gradient(VarId(0), 0).0[0].value(), -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coupled_accessors() {
        let fe = line_fe();
        let dofs = DofMap::new(2, 1);
        let aux_dofs = DofMap::new(2, 1);
        let mut sol = SolutionHistory::zeros(2);
        sol.set_all(&[2.0, 2.0]).unwrap();
        sol.set_current(&[4.0, 4.0]).unwrap();
        let mut aux = SolutionHistory::zeros(2);
        aux.set_all(&[7.0, 7.0]).unwrap();
        let src = FieldSources {
            dofs: &dofs,
            solution: &sol,
            aux_dofs: &aux_dofs,
            aux_solution: &aux,
            dt: 1.0,
        };
        let mut fields = ElementFields::new();
        fields.compute(&fe, &[0, 1], src, true);
        let time = TimeContext::default();
        let pps = [11.0];
        let q = Qp::new(0, &fe, fields.dual(), &fields, &pps, &time);

        let nl = FieldSource::Variable {
            kind: FieldKind::Nonlinear,
            var: VarId(0),
        };
        let current = CoupledValue {
            source: nl,
            state: TimeState::Current,
            derivative: FieldDerivative::Value,
        };
        let old = CoupledValue {
            state: TimeState::Old,
            ..current
        };
        assert_relative_eq!(q.coupled(&current).value(), 4.0, epsilon = 1e-12);
        assert!(!q.coupled(&current).derivatives().is_empty());
        assert_relative_eq!(q.coupled(&old).value(), 2.0, epsilon = 1e-12);
        assert!(q.coupled(&old).derivatives().is_empty());

        let aux_value = CoupledValue {
            source: FieldSource::Variable {
                kind: FieldKind::Auxiliary,
                var: VarId(0),
            },
            ..current
        };
        assert_relative_eq!(q.coupled(&aux_value).value(), 7.0, epsilon = 1e-12);

        let pp = CoupledValue {
            source: FieldSource::Postprocessor(PostprocessorId(0)),
            ..current
        };
        assert_relative_eq!(q.coupled(&pp).value(), 11.0);
        assert_relative_eq!(q.coupled(&CoupledValue::constant(3.0)).value(), 3.0);

        let grad = CoupledGradient {
            source: FieldSource::Constant(3.0),
            state: TimeState::Current,
        };
        assert_relative_eq!(q.coupled_gradient(&grad).0[0].value(), 0.0);
    }
}
