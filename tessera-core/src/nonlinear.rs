//! Newton driver and Jacobian checking.
//!
//! Each iteration assembles residual and Jacobian together, solves
//! `J du = -r` and updates the current solution. The residual norm is the
//! only place where non-finite values are detected: the element loop never
//! traps NaN or Inf, so they surface here as
//! [`Error::NumericalDivergence`].

use crate::error::{Error, Result};
use crate::problem::Problem;
use crate::solver::{create_solver, eliminate_identity_rows, LinearSolverKind};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Newton convergence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Converged when `|r| <= abs_tol`.
    pub abs_tol: f64,
    /// Converged when `|r| <= rel_tol * |r_0|`.
    pub rel_tol: f64,
    pub max_iterations: usize,
    pub linear_solver: LinearSolverKind,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-10,
            rel_tol: 1e-8,
            max_iterations: 25,
            linear_solver: LinearSolverKind::DenseLu,
        }
    }
}

impl NewtonConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, tol) in [("abs_tol", self.abs_tol), ("rel_tol", self.rel_tol)] {
            if !(tol >= 0.0 && tol.is_finite()) {
                return Err(Error::Config(format!("{name} must be finite and non-negative, got {tol}")));
            }
        }
        if self.abs_tol == 0.0 && self.rel_tol == 0.0 {
            return Err(Error::Config("abs_tol and rel_tol cannot both be zero".into()));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::Config(format!("newton config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Outcome of a Newton solve.
#[derive(Debug, Clone, PartialEq)]
pub struct NewtonReport {
    /// Linear solves performed.
    pub iterations: usize,
    pub initial_norm: f64,
    pub final_norm: f64,
    pub converged: bool,
    /// Residual norm before each update, then the final one.
    pub history: Vec<f64>,
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Solve the current step with Newton's method.
///
/// Returns a report with `converged == false` when the iteration limit is
/// reached. Postprocessors are re-evaluated at the final solution.
pub fn solve(problem: &mut Problem, config: &NewtonConfig) -> Result<NewtonReport> {
    config.validate()?;
    let solver = create_solver(config.linear_solver);
    let mut u = problem.solution().current().to_vec();
    let mut history = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    loop {
        let (residual, jacobian) = problem.compute_residual_and_jacobian()?;
        let norm = l2_norm(&residual);
        if !norm.is_finite() {
            return Err(Error::NumericalDivergence(format!(
                "residual norm is {norm} after {iterations} iterations"
            )));
        }
        history.push(norm);
        log::info!("newton iteration {:>2}: |R| = {:.6e}", iterations, norm);

        if norm <= config.abs_tol || norm <= config.rel_tol * history[0] {
            converged = true;
            break;
        }
        if iterations == config.max_iterations {
            log::warn!(
                "newton did not converge in {} iterations (|R| = {:.3e})",
                iterations,
                norm
            );
            break;
        }

        let mut rhs: Vec<f64> = residual.iter().map(|r| -r).collect();
        let du = if config.linear_solver.needs_symmetry() {
            let reduced = eliminate_identity_rows(&jacobian, &mut rhs)?;
            solver.solve(&reduced, &rhs)?
        } else {
            solver.solve(&jacobian, &rhs)?
        };
        for (ui, d) in u.iter_mut().zip(&du) {
            *ui += d;
        }
        problem.set_solution(&u)?;
        iterations += 1;
    }

    problem.compute_postprocessors()?;
    Ok(NewtonReport {
        iterations,
        initial_norm: history[0],
        final_norm: history[history.len() - 1],
        converged,
        history,
    })
}

/// Backward-Euler time stepping: `n_steps` steps of size `dt`.
pub fn solve_transient(
    problem: &mut Problem,
    config: &NewtonConfig,
    dt: f64,
    n_steps: usize,
) -> Result<Vec<NewtonReport>> {
    let mut reports = Vec::with_capacity(n_steps);
    for _ in 0..n_steps {
        problem.advance_step(dt)?;
        let report = solve(problem, config)?;
        log::info!(
            "step {} (t = {:.4}): {} iterations, converged: {}",
            problem.time().step,
            problem.time().time,
            report.iterations,
            report.converged
        );
        reports.push(report);
    }
    Ok(reports)
}

/// Central-difference Jacobian of the assembled residual.
///
/// Perturbs every DOF of the current solution by `±eps`; the solution is
/// restored afterwards. Perturbed passes leave stateful properties alone.
pub fn finite_difference_jacobian(problem: &mut Problem, eps: f64) -> Result<DMatrix<f64>> {
    let u0 = problem.solution().current().to_vec();
    let n = u0.len();
    let mut jac = DMatrix::zeros(n, n);
    let mut u = u0.clone();
    for j in 0..n {
        u[j] = u0[j] + eps;
        problem.set_solution(&u)?;
        let plus = problem.trial_residual()?;
        u[j] = u0[j] - eps;
        problem.set_solution(&u)?;
        let minus = problem.trial_residual()?;
        u[j] = u0[j];
        for i in 0..n {
            jac[(i, j)] = (plus[i] - minus[i]) / (2.0 * eps);
        }
    }
    problem.set_solution(&u0)?;
    Ok(jac)
}
