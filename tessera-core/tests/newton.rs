mod common;

use approx::assert_relative_eq;
use common::{add, line_problem, on_u};
use tessera_core::nonlinear::{solve, solve_transient};
use tessera_core::{ErrorKind, LinearSolverKind, NewtonConfig, Problem, TimeState};

fn dirichlet(problem: &mut Problem, name: &str, boundary: u16, value: f64) {
    add(problem, "DirichletBC", name, |p| {
        on_u(p)?;
        p.set("boundary", vec![boundary])?;
        p.set("value", value)?;
        Ok(())
    })
    .unwrap();
}

fn poisson(n: usize, source: f64) -> Problem {
    let mut problem = line_problem(n);
    add(&mut problem, "Diffusion", "diff", on_u).unwrap();
    add(&mut problem, "BodyForce", "source", |p| {
        on_u(p)?;
        p.set("value", source)?;
        Ok(())
    })
    .unwrap();
    dirichlet(&mut problem, "left", 0, 0.0);
    dirichlet(&mut problem, "right", 1, 0.0);
    problem.initial_setup().unwrap();
    problem
}

#[test]
fn test_linear_problem_converges_in_one_step() {
    for kind in [LinearSolverKind::DenseLu, LinearSolverKind::SparseCholesky] {
        let mut problem = poisson(10, 1.0);
        let config = NewtonConfig {
            linear_solver: kind,
            ..Default::default()
        };
        let report = solve(&mut problem, &config).unwrap();
        assert!(report.converged);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.history.len(), 2);

        // linear elements are nodally exact for -u'' = 1
        for (node, x) in problem.mesh().nodes().iter().enumerate() {
            assert_relative_eq!(
                problem.solution().current()[node],
                0.5 * x.x * (1.0 - x.x),
                epsilon = 1e-12
            );
        }
    }
}

fn nonlinear(ad: bool) -> Problem {
    let mut problem = line_problem(16);
    let (material, kernel) = if ad {
        ("ADVariableDependentDiffusivity", "ADMatDiffusion")
    } else {
        ("VariableDependentDiffusivity", "MatDiffusion")
    };
    add(&mut problem, material, "k", |p| {
        p.set_coupled("v", &["u"])?;
        p.set("k1", 1.0)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, kernel, "diff", on_u).unwrap();
    add(&mut problem, "BodyForce", "source", |p| {
        on_u(p)?;
        p.set("value", 4.0)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "ElementIntegralVariable", "total", |p| {
        p.set_coupled("variable", &["u"])?;
        Ok(())
    })
    .unwrap();
    dirichlet(&mut problem, "left", 0, 0.0);
    dirichlet(&mut problem, "right", 1, 1.0);
    problem.initial_setup().unwrap();
    problem
}

#[test]
fn test_nonlinear_diffusion_converges() {
    let mut manual = nonlinear(false);
    let report = solve(&mut manual, &NewtonConfig::default()).unwrap();
    assert!(report.converged);
    assert!(report.iterations >= 2 && report.iterations < 10);
    assert!(report.final_norm < report.initial_norm);

    let mut ad = nonlinear(true);
    let ad_report = solve(&mut ad, &NewtonConfig::default()).unwrap();
    assert!(ad_report.converged);
    for (a, b) in manual.solution().current().iter().zip(ad.solution().current()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-8);
    }

    // postprocessors follow the converged solution
    let total = manual.postprocessor_value("total").unwrap();
    assert!(total > 0.0);
    manual.compute_postprocessors().unwrap();
    assert_eq!(manual.postprocessor_value("total").unwrap(), total);
}

#[test]
fn test_iteration_limit_is_not_an_error() {
    let mut problem = nonlinear(false);
    let config = NewtonConfig {
        max_iterations: 1,
        abs_tol: 1e-14,
        rel_tol: 1e-14,
        ..Default::default()
    };
    let report = solve(&mut problem, &config).unwrap();
    assert!(!report.converged);
    assert_eq!(report.iterations, 1);
}

#[test]
fn test_non_finite_residual_is_divergence() {
    let mut problem = poisson(4, f64::NAN);
    let err = solve(&mut problem, &NewtonConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NumericalDivergence);
}

#[test]
fn test_backward_euler_decay() {
    let mut problem = line_problem(4);
    add(&mut problem, "TimeDerivative", "dt", on_u).unwrap();
    add(&mut problem, "Reaction", "decay", on_u).unwrap();
    problem.initial_setup().unwrap();
    problem.set_initial_condition("u", |_| 1.0).unwrap();

    let reports = solve_transient(&mut problem, &NewtonConfig::default(), 0.1, 3).unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.converged));
    assert_eq!(problem.time().step, 3);
    assert_relative_eq!(problem.time().time, 0.3, epsilon = 1e-12);

    // u_{n+1} = u_n / (1 + dt)
    let expected = 1.0 / 1.1f64.powi(3);
    for value in problem.solution().current() {
        assert_relative_eq!(*value, expected, epsilon = 1e-10);
    }
    assert_relative_eq!(
        problem.solution().state(TimeState::Old)[0],
        expected * 1.1,
        epsilon = 1e-10
    );
}

#[test]
fn test_invalid_time_step() {
    let mut problem = poisson(2, 1.0);
    for dt in [0.0, -1.0, f64::INFINITY] {
        let err = problem.advance_step(dt).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
