//! Run-scoped problem context.
//!
//! A [`Problem`] owns the mesh, the variable system, every built object, the
//! property layout and the solution history. Setup happens in three phases:
//!
//! 1. add variables, auxiliary variables
//! 2. add objects through the factory ([`Problem::add_object`])
//! 3. [`Problem::initial_setup`]: optional properties are resolved, missing
//!    producers and dependency cycles reported, producers sorted, stateful
//!    properties initialised and postprocessors evaluated once
//!
//! After setup the assembly entry points may be called any number of times.

use crate::assembly::{
    self, AssembledSystem, AssemblyInput, AssemblyMode, AssemblyOptions,
};
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::params::ParameterSet;
use crate::property::{PropertyId, PropertyRegistry, PropertyWarehouse, StatefulStore};
use crate::registry::{BuildContext, Factory, SimObject};
use crate::sparse::CsrMatrix;
use crate::types::{Point3, TimeContext, VarId};
use crate::variables::{DofMap, FieldKind, SolutionHistory, VariableSystem};
use crate::warehouse::Warehouse;
use std::collections::HashSet;
use std::sync::Arc;

pub struct Problem {
    mesh: Mesh,
    factory: Arc<Factory>,
    vars: VariableSystem,
    registry: PropertyRegistry,
    warehouse: Warehouse,
    properties: Option<PropertyWarehouse>,
    stateful: StatefulStore,
    dofs: DofMap,
    aux_dofs: DofMap,
    solution: SolutionHistory,
    aux_solution: SolutionHistory,
    postprocessor_values: Vec<f64>,
    time: TimeContext,
    options: AssemblyOptions,
    pool: Option<rayon::ThreadPool>,
    object_names: HashSet<String>,
    n_objects: usize,
}

impl Problem {
    pub fn new(mesh: Mesh, factory: Arc<Factory>) -> Self {
        let n_nodes = mesh.n_nodes();
        let n_elements = mesh.n_elements();
        Self {
            mesh,
            factory,
            vars: VariableSystem::new(),
            registry: PropertyRegistry::new(),
            warehouse: Warehouse::new(),
            properties: None,
            stateful: StatefulStore::new(n_elements),
            dofs: DofMap::new(n_nodes, 0),
            aux_dofs: DofMap::new(n_nodes, 0),
            solution: SolutionHistory::zeros(0),
            aux_solution: SolutionHistory::zeros(0),
            postprocessor_values: Vec::new(),
            time: TimeContext::default(),
            options: AssemblyOptions::default(),
            pool: None,
            object_names: HashSet::new(),
            n_objects: 0,
        }
    }

    /// Replace the assembly options; builds a dedicated pool when asked to.
    pub fn set_options(&mut self, options: AssemblyOptions) -> Result<()> {
        options.validate()?;
        self.pool = options.build_pool()?;
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    fn ensure_not_setup(&self, what: &str) -> Result<()> {
        if self.properties.is_some() {
            return Err(Error::Assembly(format!("cannot {what} after initial_setup")));
        }
        Ok(())
    }

    pub fn add_variable(&mut self, name: &str) -> Result<VarId> {
        self.ensure_not_setup("add variables")?;
        let id = self.vars.add_variable(name)?;
        self.dofs = DofMap::new(self.mesh.n_nodes(), self.vars.n_variables());
        self.solution = SolutionHistory::zeros(self.dofs.n_dofs());
        Ok(id)
    }

    pub fn add_aux_variable(&mut self, name: &str) -> Result<VarId> {
        self.ensure_not_setup("add variables")?;
        let id = self.vars.add_aux_variable(name)?;
        self.aux_dofs = DofMap::new(self.mesh.n_nodes(), self.vars.n_aux_variables());
        self.aux_solution = SolutionHistory::zeros(self.aux_dofs.n_dofs());
        Ok(id)
    }

    /// Parameter set of a registered type, to be filled in for [`Problem::add_object`].
    pub fn params(&self, type_name: &str) -> Result<ParameterSet> {
        self.factory.params(type_name)
    }

    /// Build an object and file it under its capability.
    ///
    /// Postprocessors get a value slot under their object name, so objects
    /// coupling to a postprocessor must be added after it. On failure every
    /// property declaration or request made by the constructor is dropped.
    #[track_caller]
    pub fn add_object(&mut self, type_name: &str, name: &str, params: &ParameterSet) -> Result<()> {
        self.ensure_not_setup("add objects")?;
        if self.object_names.contains(name) {
            return Err(Error::InvalidParameter {
                param: "name".into(),
                reason: format!("an object named '{name}' already exists"),
            });
        }

        let index = self.n_objects;
        let built = {
            let mut ctx = BuildContext::new(&self.vars, &mut self.registry, index);
            self.factory.build(type_name, name, params, &mut ctx)
        };
        let result = built.and_then(|object| self.file_object(index, name, object));
        match result {
            Ok(()) => {
                self.n_objects += 1;
                self.object_names.insert(name.to_string());
                Ok(())
            }
            Err(err) => {
                self.registry.discard_object(index);
                Err(err)
            }
        }
    }

    fn file_object(&mut self, index: usize, name: &str, object: SimObject) -> Result<()> {
        let slot = match &object {
            SimObject::IntegratedBc(_) | SimObject::NodalBc(_)
                if self.registry.has_requests_from(index) =>
            {
                return Err(Error::InvalidParameter {
                    param: "boundary".into(),
                    reason: format!("boundary condition '{name}' cannot consume material properties"),
                });
            }
            SimObject::Postprocessor(_) => Some(self.vars.add_postprocessor(name)?),
            _ => None,
        };
        log::debug!("added {} '{}'", object.capability(), name);
        self.warehouse.insert(index, object, slot)
    }

    /// Validate the object graph and prepare everything the loops need.
    pub fn initial_setup(&mut self) -> Result<()> {
        if self.is_setup() {
            return Err(Error::Assembly("initial_setup already ran".into()));
        }
        let subdomains = self.mesh.subdomains();
        let properties = self.registry.finalize(&subdomains)?;
        self.warehouse.setup(&self.mesh, &properties)?;
        self.postprocessor_values = vec![0.0; self.vars.n_postprocessors()];
        self.stateful = StatefulStore::new(self.mesh.n_elements());
        self.properties = Some(properties);

        let initial = assembly::initial_stateful_values(&self.input()?)?;
        for (elem, columns) in initial {
            self.stateful.initialize(elem, columns);
        }
        self.compute_postprocessors()?;
        log::info!(
            "setup complete: {} dofs, {} aux dofs, {} properties, {} objects",
            self.dofs.n_dofs(),
            self.aux_dofs.n_dofs(),
            self.registry.n_properties(),
            self.n_objects
        );
        Ok(())
    }

    pub fn is_setup(&self) -> bool {
        self.properties.is_some()
    }

    fn input(&self) -> Result<AssemblyInput<'_>> {
        let properties = self
            .properties
            .as_ref()
            .ok_or_else(|| Error::Assembly("initial_setup has not run".into()))?;
        Ok(AssemblyInput {
            mesh: &self.mesh,
            dofs: &self.dofs,
            solution: &self.solution,
            aux_dofs: &self.aux_dofs,
            aux_solution: &self.aux_solution,
            warehouse: &self.warehouse,
            properties,
            stateful: &self.stateful,
            postprocessor_values: &self.postprocessor_values,
            time: &self.time,
            options: &self.options,
            pool: self.pool.as_ref(),
        })
    }

    /// Run one assembly pass and keep its stateful property values.
    pub fn assemble(&mut self, mode: AssemblyMode) -> Result<AssembledSystem> {
        let mut system = assembly::assemble(&self.input()?, mode)?;
        for (elem, columns) in std::mem::take(&mut system.stateful_updates) {
            self.stateful.install(elem, columns);
        }
        Ok(system)
    }

    pub fn compute_residual(&mut self) -> Result<Vec<f64>> {
        Ok(self.assemble(AssemblyMode::Residual)?.residual)
    }

    /// Residual at the current solution without touching stateful
    /// properties. Used for perturbed evaluations that must not become part
    /// of the step history.
    pub fn trial_residual(&self) -> Result<Vec<f64>> {
        Ok(assembly::assemble(&self.input()?, AssemblyMode::Residual)?.residual)
    }

    pub fn compute_jacobian(&mut self) -> Result<CsrMatrix> {
        self.assemble(AssemblyMode::Jacobian)?
            .jacobian
            .ok_or_else(|| Error::Assembly("Jacobian pass produced no matrix".into()))
    }

    pub fn compute_residual_and_jacobian(&mut self) -> Result<(Vec<f64>, CsrMatrix)> {
        let system = self.assemble(AssemblyMode::ResidualAndJacobian)?;
        let jacobian = system
            .jacobian
            .ok_or_else(|| Error::Assembly("Jacobian pass produced no matrix".into()))?;
        Ok((system.residual, jacobian))
    }

    /// Evaluate every postprocessor at the current solution.
    pub fn compute_postprocessors(&mut self) -> Result<()> {
        let values = assembly::integrate_postprocessors(&self.input()?)?;
        for (id, value) in values {
            self.postprocessor_values[id.0] = value;
        }
        Ok(())
    }

    pub fn postprocessor_value(&self, name: &str) -> Result<f64> {
        let id = self.vars.postprocessor(name).ok_or_else(|| Error::InvalidParameter {
            param: "postprocessor".into(),
            reason: format!("no postprocessor named '{name}'"),
        })?;
        Ok(self.postprocessor_values.get(id.0).copied().unwrap_or(0.0))
    }

    /// Start a new step of size `dt`.
    ///
    /// Solution and stateful property histories shift (`older ← old ←
    /// current`) and the time advances. The current solution stays as the
    /// initial guess.
    pub fn advance_step(&mut self, dt: f64) -> Result<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::InvalidParameter {
                param: "dt".into(),
                reason: format!("time step must be positive and finite, got {dt}"),
            });
        }
        self.solution.shift();
        self.aux_solution.shift();
        if !self.stateful.shift() {
            log::debug!("no stateful values computed since last shift");
        }
        self.time.time += dt;
        self.time.dt = dt;
        self.time.step += 1;
        Ok(())
    }

    /// Set one variable from a function of position, in every time state.
    pub fn set_initial_condition(&mut self, variable: &str, f: impl Fn(&Point3) -> f64) -> Result<()> {
        let info = self.vars.find(variable).ok_or_else(|| Error::InvalidParameter {
            param: "variable".into(),
            reason: format!("no variable named '{variable}'"),
        })?;
        let (map, history) = match info.kind {
            FieldKind::Nonlinear => (&self.dofs, &mut self.solution),
            FieldKind::Auxiliary => (&self.aux_dofs, &mut self.aux_solution),
        };
        let mut values = history.current().to_vec();
        for (node, x) in self.mesh.nodes().iter().enumerate() {
            values[map.dof(node, info.id)] = f(x);
        }
        history.set_all(&values)
    }

    /// Overwrite the current nonlinear solution.
    pub fn set_solution(&mut self, values: &[f64]) -> Result<()> {
        self.solution.set_current(values)
    }

    /// Overwrite the current values of one auxiliary variable.
    pub fn set_aux_values(&mut self, variable: &str, f: impl Fn(&Point3) -> f64) -> Result<()> {
        let info = self.vars.find(variable).ok_or_else(|| Error::InvalidParameter {
            param: "variable".into(),
            reason: format!("no variable named '{variable}'"),
        })?;
        if info.kind != FieldKind::Auxiliary {
            return Err(Error::InvalidParameter {
                param: "variable".into(),
                reason: format!("'{variable}' is not an auxiliary variable"),
            });
        }
        let id = info.id;
        let current = self.aux_solution.current_mut();
        for (node, x) in self.mesh.nodes().iter().enumerate() {
            current[self.aux_dofs.dof(node, id)] = f(x);
        }
        Ok(())
    }

    pub fn solution(&self) -> &SolutionHistory {
        &self.solution
    }

    pub fn aux_solution(&self) -> &SolutionHistory {
        &self.aux_solution
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn variables(&self) -> &VariableSystem {
        &self.vars
    }

    pub fn dofs(&self) -> &DofMap {
        &self.dofs
    }

    pub fn n_dofs(&self) -> usize {
        self.dofs.n_dofs()
    }

    pub fn time(&self) -> &TimeContext {
        &self.time
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn stateful_store(&self) -> &StatefulStore {
        &self.stateful
    }

    pub fn property_id(&self, name: &str) -> Option<PropertyId> {
        self.registry.lookup(name)
    }
}
