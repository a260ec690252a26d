mod common;

use approx::assert_relative_eq;
use common::{add, dense, factory, on_u};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_core::nonlinear::finite_difference_jacobian;
use tessera_core::{AssemblyOptions, Mesh, ParameterSet, Problem, Result, ScatterStrategy, VarId};

/// Nonlinear diffusion-reaction on a 7 × 5 quad mesh with every object kind.
fn build(options: AssemblyOptions, ad: bool, seed: u64) -> Problem {
    let mesh = Mesh::uniform_rectangle(7, 5, 1.0, 0.8).unwrap();
    let mut problem = Problem::new(mesh, factory());
    problem.set_options(options).unwrap();
    problem.add_variable("u").unwrap();
    problem.add_aux_variable("T").unwrap();

    let (material, kernel) = if ad {
        ("ADVariableDependentDiffusivity", "ADMatDiffusion")
    } else {
        ("VariableDependentDiffusivity", "MatDiffusion")
    };
    add(&mut problem, material, "k", |p| {
        p.set_coupled("v", &["u"])?;
        p.set("k0", 1.0)?;
        p.set("k1", 0.5)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, kernel, "diff", on_u).unwrap();
    add(&mut problem, "ElementAverageValue", "avg_u", |p| {
        p.set_coupled("variable", &["u"])?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "Reaction", "react", |p| {
        on_u(p)?;
        p.set("rate", 0.3)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "BodyForce", "source", |p| {
        on_u(p)?;
        p.set("value", 2.0)?;
        p.set_coupled("scale", &["avg_u"])?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "CoupledForce", "heating", |p| {
        on_u(p)?;
        p.set_coupled("v", &["T"])?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "NeumannBC", "flux", |p| {
        on_u(p)?;
        p.set("boundary", vec![1u16])?;
        p.set("value", 0.5)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, "DirichletBC", "left", |p| {
        on_u(p)?;
        p.set("boundary", vec![3u16])?;
        p.set("value", 0.25)?;
        Ok(())
    })
    .unwrap();
    problem.initial_setup().unwrap();

    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<f64> = (0..problem.n_dofs()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    problem.set_solution(&values).unwrap();
    problem.set_aux_values("T", |x| x.x * x.y).unwrap();
    problem.compute_postprocessors().unwrap();
    problem
}

fn options(n_threads: usize, scatter: ScatterStrategy) -> AssemblyOptions {
    AssemblyOptions {
        n_threads,
        scatter,
        chunk_size: 4,
        ..Default::default()
    }
}

#[test]
fn test_ordered_scatter_is_thread_count_invariant() {
    let mut one = build(options(1, ScatterStrategy::Ordered), false, 7);
    let mut four = build(options(4, ScatterStrategy::Ordered), false, 7);

    assert_eq!(
        one.postprocessor_value("avg_u").unwrap().to_bits(),
        four.postprocessor_value("avg_u").unwrap().to_bits()
    );
    let (r1, j1) = one.compute_residual_and_jacobian().unwrap();
    let (r4, j4) = four.compute_residual_and_jacobian().unwrap();
    assert_eq!(r1, r4);
    assert_eq!(j1.row_offsets(), j4.row_offsets());
    assert_eq!(j1.col_indices(), j4.col_indices());
    assert_eq!(j1.values(), j4.values());

    // repeated passes on the same pool are reproducible too
    assert_eq!(four.compute_residual().unwrap(), r4);
}

#[test]
fn test_locked_scatter_matches_ordered() {
    let mut ordered = build(options(1, ScatterStrategy::Ordered), false, 11);
    let mut locked = build(options(4, ScatterStrategy::Locked), false, 11);
    let (ro, jo) = ordered.compute_residual_and_jacobian().unwrap();
    let (rl, jl) = locked.compute_residual_and_jacobian().unwrap();
    for (a, b) in ro.iter().zip(&rl) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
    let (jo, jl) = (dense(&jo), dense(&jl));
    for (a, b) in jo.iter().zip(jl.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_separate_and_combined_passes_agree() {
    let mut problem = build(options(2, ScatterStrategy::Ordered), false, 3);
    let r = problem.compute_residual().unwrap();
    let j = problem.compute_jacobian().unwrap();
    let (rc, jc) = problem.compute_residual_and_jacobian().unwrap();
    assert_eq!(r, rc);
    assert_eq!(j.values(), jc.values());
}

fn assert_matrices_close(a: &DMatrix<f64>, b: &DMatrix<f64>, epsilon: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = epsilon);
    }
}

#[test]
fn test_dual_and_hand_coded_jacobians_agree() {
    for seed in [5, 17, 42, 101] {
        let mut manual = build(options(2, ScatterStrategy::Ordered), false, seed);
        let mut ad = build(options(2, ScatterStrategy::Ordered), true, seed);
        let (rm, jm) = manual.compute_residual_and_jacobian().unwrap();
        let (ra, ja) = ad.compute_residual_and_jacobian().unwrap();
        for (a, b) in rm.iter().zip(&ra) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert_matrices_close(&dense(&jm), &dense(&ja), 1e-10);
    }
}

#[test]
fn test_jacobian_matches_finite_differences() {
    for seed in [19, 64, 977] {
        for ad in [false, true] {
            let mut problem = build(options(2, ScatterStrategy::Ordered), ad, seed);
            let before = problem.solution().current().to_vec();
            let jac = dense(&problem.compute_jacobian().unwrap());
            let fd = finite_difference_jacobian(&mut problem, 1e-6).unwrap();
            assert_eq!(problem.solution().current(), before.as_slice());
            assert_matrices_close(&jac, &fd, 1e-6);
        }
    }
}

fn on_w(p: &mut ParameterSet) -> Result<()> {
    p.set("variable", "w".to_string())?;
    Ok(())
}

/// `u` diffuses with `k(w) = 1 + 0.7 w²`; `w` diffuses and decays.
fn coupled_pair(ad: bool, seed: u64) -> Problem {
    let mesh = Mesh::uniform_rectangle(4, 3, 1.0, 1.0).unwrap();
    let mut problem = Problem::new(mesh, factory());
    problem.add_variable("u").unwrap();
    problem.add_variable("w").unwrap();

    let (material, kernel) = if ad {
        ("ADVariableDependentDiffusivity", "ADMatDiffusion")
    } else {
        ("VariableDependentDiffusivity", "MatDiffusion")
    };
    add(&mut problem, material, "k", |p| {
        p.set_coupled("v", &["w"])?;
        p.set("k1", 0.7)?;
        Ok(())
    })
    .unwrap();
    add(&mut problem, kernel, "diff_u", on_u).unwrap();
    add(&mut problem, "Diffusion", "diff_w", on_w).unwrap();
    add(&mut problem, "Reaction", "decay_w", on_w).unwrap();
    problem.initial_setup().unwrap();

    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<f64> = (0..problem.n_dofs()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    problem.set_solution(&values).unwrap();
    problem
}

#[test]
fn test_cross_variable_property_derivative() {
    let problem = coupled_pair(false, 1);
    assert!(problem.property_id("ddiffusivity_dw").is_some());
    assert!(problem.property_id("ddiffusivity_du").is_none());

    for seed in [1, 8, 33] {
        let mut manual = coupled_pair(false, seed);
        let mut ad = coupled_pair(true, seed);
        let jm = dense(&manual.compute_jacobian().unwrap());
        let ja = dense(&ad.compute_jacobian().unwrap());
        assert_matrices_close(&jm, &ja, 1e-10);
        let fd = finite_difference_jacobian(&mut manual, 1e-6).unwrap();
        assert_matrices_close(&jm, &fd, 1e-6);

        // the (u, w) block is populated
        let dofs = *manual.dofs();
        let n = manual.mesh().n_nodes();
        let off_diag = (0..n)
            .flat_map(|a| (0..n).map(move |b| (a, b)))
            .map(|(a, b)| jm[(dofs.dof(a, VarId(0)), dofs.dof(b, VarId(1)))].abs())
            .fold(0.0, f64::max);
        assert!(off_diag > 1e-8);
    }
}

#[test]
fn test_dirichlet_rows() {
    let mut problem = build(options(1, ScatterStrategy::Ordered), false, 23);
    let u = problem.solution().current().to_vec();
    let (r, j) = problem.compute_residual_and_jacobian().unwrap();
    let j = dense(&j);
    let left: Vec<usize> = problem.mesh().node_set(3).to_vec();
    for node in left {
        let row = problem.dofs().dof(node, VarId(0));
        assert_relative_eq!(r[row], u[row] - 0.25, epsilon = 1e-14);
        for col in 0..problem.n_dofs() {
            let expected = if col == row { 1.0 } else { 0.0 };
            assert_eq!(j[(row, col)], expected);
        }
    }
}
