//! Tessera Core - residual and Jacobian assembly for multiphysics FEM
//!
//! Physics is composed from small objects built by name through a
//! [`Factory`]:
//! - kernels and integrated boundary conditions fill residual rows
//! - materials produce named quadrature-point properties
//! - nodal boundary conditions constrain degrees of freedom
//! - postprocessors reduce element integrals to scalars
//!
//! # Architecture
//!
//! - [`ParameterSet`]: typed, documented construction parameters
//! - [`Factory`]: type registry with aliases and deprecation warnings
//! - [`property`]: declared properties, dependency ordering, stateful history
//! - [`coupling`]: resolution of coupled fields to variables, constants or
//!   postprocessors
//! - [`assembly`]: the parallel element loop with ordered or locked scatter
//! - [`Problem`]: owns everything above for one run
//! - [`nonlinear`]: Newton and backward-Euler drivers
//!
//! Residuals and Jacobians come either from hand-coded derivatives or from
//! forward-mode dual numbers ([`ad`]); both paths share one weak form.

pub mod ad;
pub mod assembly;
pub mod bc;
pub mod coupling;
pub mod element;
pub mod error;
pub mod fe;
pub mod fields;
pub mod kernel;
pub mod material;
pub mod mesh;
pub mod nonlinear;
pub mod objects;
pub mod params;
pub mod postprocessor;
pub mod problem;
pub mod property;
pub mod reduction;
pub mod registry;
pub mod solver;
pub mod sparse;
pub mod types;
pub mod variables;
pub mod warehouse;

pub use ad::{DualNumber, Number};
pub use assembly::{AssembledSystem, AssemblyMode, AssemblyOptions, ScatterStrategy};
pub use error::{Error, ErrorKind, Result};
pub use mesh::{ElementType, Mesh};
pub use nonlinear::{NewtonConfig, NewtonReport};
pub use objects::register_objects;
pub use params::ParameterSet;
pub use problem::Problem;
pub use registry::{Factory, SimObject};
pub use solver::{LinearSolverKind, Solver};
pub use sparse::CsrMatrix;
pub use types::{BoundaryId, Point3, SubdomainId, TimeState, VarId};
