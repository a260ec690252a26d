//! Field variables, DOF numbering and solution history.
//!
//! All variables are first-order nodal Lagrange fields defined on the whole
//! mesh. Nonlinear variables are solved for; auxiliary variables are supplied
//! by the caller and only read. Postprocessor names are registered here too so
//! couplings can refer to them before their values exist.

use crate::error::{Error, Result};
use crate::types::{TimeState, VarId};

/// Which system a variable belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Nonlinear,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub kind: FieldKind,
    pub id: VarId,
}

/// Index of a postprocessor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostprocessorId(pub usize);

/// Names of all fields that couplings can refer to.
#[derive(Debug, Clone, Default)]
pub struct VariableSystem {
    nonlinear: Vec<VariableInfo>,
    auxiliary: Vec<VariableInfo>,
    postprocessors: Vec<String>,
}

impl VariableSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.find(name).is_some() || self.postprocessor(name).is_some() {
            return Err(Error::InvalidParameter {
                param: name.to_string(),
                reason: "a field with this name already exists".into(),
            });
        }
        Ok(())
    }

    pub fn add_variable(&mut self, name: &str) -> Result<VarId> {
        self.ensure_unique(name)?;
        let id = VarId(self.nonlinear.len());
        self.nonlinear.push(VariableInfo {
            name: name.to_string(),
            kind: FieldKind::Nonlinear,
            id,
        });
        Ok(id)
    }

    pub fn add_aux_variable(&mut self, name: &str) -> Result<VarId> {
        self.ensure_unique(name)?;
        let id = VarId(self.auxiliary.len());
        self.auxiliary.push(VariableInfo {
            name: name.to_string(),
            kind: FieldKind::Auxiliary,
            id,
        });
        Ok(id)
    }

    pub fn add_postprocessor(&mut self, name: &str) -> Result<PostprocessorId> {
        self.ensure_unique(name)?;
        self.postprocessors.push(name.to_string());
        Ok(PostprocessorId(self.postprocessors.len() - 1))
    }

    /// Look up a variable of either kind.
    pub fn find(&self, name: &str) -> Option<&VariableInfo> {
        self.nonlinear
            .iter()
            .chain(self.auxiliary.iter())
            .find(|v| v.name == name)
    }

    pub fn postprocessor(&self, name: &str) -> Option<PostprocessorId> {
        self.postprocessors
            .iter()
            .position(|p| p == name)
            .map(PostprocessorId)
    }

    pub fn postprocessor_name(&self, id: PostprocessorId) -> &str {
        &self.postprocessors[id.0]
    }

    pub fn n_variables(&self) -> usize {
        self.nonlinear.len()
    }

    pub fn n_aux_variables(&self) -> usize {
        self.auxiliary.len()
    }

    pub fn n_postprocessors(&self) -> usize {
        self.postprocessors.len()
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.nonlinear
    }

    pub fn aux_variables(&self) -> &[VariableInfo] {
        &self.auxiliary
    }

    pub fn variable_name(&self, id: VarId) -> &str {
        &self.nonlinear[id.0].name
    }
}

/// Node-major DOF numbering: `dof = node * n_vars + var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofMap {
    n_nodes: usize,
    n_vars: usize,
}

impl DofMap {
    pub fn new(n_nodes: usize, n_vars: usize) -> Self {
        Self { n_nodes, n_vars }
    }

    #[inline]
    pub fn dof(&self, node: usize, var: VarId) -> usize {
        node * self.n_vars + var.0
    }

    pub fn n_dofs(&self) -> usize {
        self.n_nodes * self.n_vars
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// Global DOFs of an element in local (var-major) order:
    /// `local = var * n_elem_nodes + a`.
    pub fn element_dofs_into(&self, nodes: &[usize], out: &mut Vec<usize>) {
        out.clear();
        for v in 0..self.n_vars {
            out.extend(nodes.iter().map(|&n| self.dof(n, VarId(v))));
        }
    }
}

/// Current, old and older copies of one global vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolutionHistory {
    current: Vec<f64>,
    old: Vec<f64>,
    older: Vec<f64>,
}

impl SolutionHistory {
    pub fn zeros(n: usize) -> Self {
        Self {
            current: vec![0.0; n],
            old: vec![0.0; n],
            older: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn state(&self, state: TimeState) -> &[f64] {
        match state {
            TimeState::Current => &self.current,
            TimeState::Old => &self.old,
            TimeState::Older => &self.older,
        }
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut [f64] {
        &mut self.current
    }

    pub fn set_current(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.current.len() {
            return Err(Error::Assembly(format!(
                "solution vector has length {}, expected {}",
                values.len(),
                self.current.len()
            )));
        }
        self.current.copy_from_slice(values);
        Ok(())
    }

    /// Set every state to the same values (initial conditions).
    pub fn set_all(&mut self, values: &[f64]) -> Result<()> {
        self.set_current(values)?;
        self.old.copy_from_slice(values);
        self.older.copy_from_slice(values);
        Ok(())
    }

    /// `older ← old`, `old ← current`; `current` keeps its values as the
    /// starting guess for the next step.
    pub fn shift(&mut self) {
        std::mem::swap(&mut self.older, &mut self.old);
        self.old.copy_from_slice(&self.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_names_are_unique_across_kinds() {
        let mut vars = VariableSystem::new();
        assert_eq!(vars.add_variable("u").unwrap(), VarId(0));
        assert_eq!(vars.add_aux_variable("T").unwrap(), VarId(0));
        assert_eq!(vars.add_variable("v").unwrap(), VarId(1));
        assert_eq!(
            vars.add_aux_variable("u").unwrap_err().kind(),
            ErrorKind::InvalidParameter
        );
        assert!(vars.add_postprocessor("T").is_err());
        assert_eq!(vars.find("T").unwrap().kind, FieldKind::Auxiliary);
    }

    #[test]
    fn test_dof_map_local_order() {
        let map = DofMap::new(5, 2);
        assert_eq!(map.n_dofs(), 10);
        let mut dofs = Vec::new();
        map.element_dofs_into(&[1, 2], &mut dofs);
        // var 0 at nodes 1, 2 then var 1 at nodes 1, 2
        assert_eq!(dofs, vec![2, 4, 3, 5]);
    }

    #[test]
    fn test_history_shift() {
        let mut h = SolutionHistory::zeros(2);
        h.set_all(&[1.0, 1.0]).unwrap();
        h.set_current(&[2.0, 3.0]).unwrap();
        h.shift();
        assert_eq!(h.state(TimeState::Old), &[2.0, 3.0]);
        assert_eq!(h.state(TimeState::Older), &[1.0, 1.0]);
        assert_eq!(h.current(), &[2.0, 3.0]);
        assert!(h.set_current(&[1.0]).is_err());
    }
}
