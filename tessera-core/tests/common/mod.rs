#![allow(dead_code)]

use nalgebra::DMatrix;
use std::sync::Arc;
use tessera_core::{register_objects, CsrMatrix, Factory, Mesh, ParameterSet, Problem, Result};

pub fn factory() -> Arc<Factory> {
    let mut factory = Factory::new();
    register_objects(&mut factory, "tessera").unwrap();
    Arc::new(factory)
}

/// Problem on a uniform line of `n` elements over [0, 1] with variable `u`.
pub fn line_problem(n: usize) -> Problem {
    let mut problem = Problem::new(Mesh::uniform_line(n, 0.0, 1.0).unwrap(), factory());
    problem.add_variable("u").unwrap();
    problem
}

/// Fetch the parameters of `type_name`, fill them in and add the object.
pub fn add(
    problem: &mut Problem,
    type_name: &str,
    name: &str,
    configure: impl FnOnce(&mut ParameterSet) -> Result<()>,
) -> Result<()> {
    let mut params = problem.params(type_name)?;
    configure(&mut params)?;
    problem.add_object(type_name, name, &params)
}

pub fn on_u(p: &mut ParameterSet) -> Result<()> {
    p.set("variable", "u".to_string())?;
    Ok(())
}

pub fn dense(m: &CsrMatrix) -> DMatrix<f64> {
    nalgebra_sparse::convert::serial::convert_csr_dense(m)
}
