mod common;

use approx::assert_relative_eq;
use common::{add, line_problem, on_u};
use tessera_core::nonlinear::{finite_difference_jacobian, solve_transient};
use tessera_core::{NewtonConfig, Problem, TimeState};

/// `a = a_old + dt * 2`, starting from 1, integrated over [0, 1].
fn accumulating() -> Problem {
    let mut problem = line_problem(3);
    add(&mut problem, "Diffusion", "diff", on_u).unwrap();
    add(&mut problem, "AccumulatedSource", "acc", |p| {
        p.set_coupled("v", &["2.0"])?;
        p.set("initial", 1.0)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "ElementIntegralProperty", "total", |p| {
        p.set("property", "accumulated".to_string())?;
        Ok(())
    })
    .unwrap();
    problem.initial_setup().unwrap();
    problem
}

fn stored(problem: &Problem, state: TimeState) -> Vec<f64> {
    let id = problem.property_id("accumulated").unwrap();
    (0..problem.mesh().n_elements())
        .flat_map(|e| {
            problem
                .stateful_store()
                .values::<f64>(e, id, state)
                .unwrap()
                .to_vec()
        })
        .collect()
}

fn assert_all(values: &[f64], expected: f64) {
    assert!(!values.is_empty());
    for v in values {
        assert_relative_eq!(*v, expected, epsilon = 1e-12);
    }
}

#[test]
fn test_initial_values_fill_every_state() {
    let problem = accumulating();
    for state in [TimeState::Current, TimeState::Old, TimeState::Older] {
        assert_all(&stored(&problem, state), 1.0);
    }
}

#[test]
fn test_values_accumulate_across_steps() {
    let mut problem = accumulating();
    problem.advance_step(0.5).unwrap();
    problem.compute_residual().unwrap();
    assert_all(&stored(&problem, TimeState::Current), 2.0);

    // re-evaluating within a step reads the same old values
    problem.compute_residual().unwrap();
    assert_all(&stored(&problem, TimeState::Current), 2.0);

    problem.advance_step(0.5).unwrap();
    problem.compute_residual().unwrap();
    assert_all(&stored(&problem, TimeState::Current), 3.0);
    assert_all(&stored(&problem, TimeState::Old), 2.0);
    assert_all(&stored(&problem, TimeState::Older), 1.0);

    problem.compute_postprocessors().unwrap();
    assert_relative_eq!(problem.postprocessor_value("total").unwrap(), 3.0, epsilon = 1e-12);
}

#[test]
fn test_shift_without_new_values_is_a_no_op() {
    let mut problem = accumulating();
    problem.advance_step(0.5).unwrap();
    problem.compute_residual().unwrap();
    problem.advance_step(0.5).unwrap();
    problem.advance_step(0.5).unwrap();
    assert_all(&stored(&problem, TimeState::Old), 2.0);
    assert_all(&stored(&problem, TimeState::Older), 1.0);
    assert_eq!(problem.time().step, 3);
}

#[test]
fn test_finite_difference_jacobian_keeps_history() {
    let mut problem = line_problem(3);
    add(&mut problem, "Diffusion", "diff", on_u).unwrap();
    add(&mut problem, "AccumulatedSource", "acc", |p| {
        p.set_coupled("v", &["u"])?;
        p.set("initial", 1.0)?;
        Ok(())
    })
    .unwrap();
    problem.initial_setup().unwrap();
    problem.set_initial_condition("u", |_| 1.0).unwrap();

    problem.advance_step(1.0).unwrap();
    problem.compute_residual().unwrap();
    let before = stored(&problem, TimeState::Current);
    assert_all(&before, 2.0);

    finite_difference_jacobian(&mut problem, 0.1).unwrap();
    assert_eq!(stored(&problem, TimeState::Current), before);
    assert_eq!(problem.solution().current(), &[1.0; 4][..]);

    problem.advance_step(1.0).unwrap();
    assert_eq!(stored(&problem, TimeState::Old), before);
    assert_all(&stored(&problem, TimeState::Older), 1.0);
}

#[test]
fn test_transient_solve_rotates_history() {
    let mut problem = line_problem(4);
    add(&mut problem, "TimeDerivative", "dt", on_u).unwrap();
    add(&mut problem, "Reaction", "decay", on_u).unwrap();
    add(&mut problem, "AccumulatedSource", "acc", |p| {
        p.set_coupled("v", &["u"])?;
        Ok(())
    })
    .unwrap();
    problem.initial_setup().unwrap();
    problem.set_initial_condition("u", |_| 1.0).unwrap();

    // a_n = a_{n-1} + dt * u_n with u_n = 1.1^-n
    let config = NewtonConfig::default();
    let mut expected = vec![0.0];
    for n in 1..=3 {
        let reports = solve_transient(&mut problem, &config, 0.1, 1).unwrap();
        assert!(reports[0].converged);
        let a = expected[n - 1] + 0.1 / 1.1f64.powi(n as i32);
        expected.push(a);

        for v in stored(&problem, TimeState::Current) {
            assert_relative_eq!(v, a, epsilon = 1e-10);
        }
        for v in stored(&problem, TimeState::Old) {
            assert_relative_eq!(v, expected[n - 1], epsilon = 1e-10);
        }
        for v in stored(&problem, TimeState::Older) {
            assert_relative_eq!(v, expected[n.saturating_sub(2)], epsilon = 1e-10);
        }
    }
    assert_eq!(problem.time().step, 3);
}
