//! Resolution of coupled-field declarations.
//!
//! An object declares couplings in its parameter set (`add_coupled_var` and
//! friends). While the object is being built it asks a [`CouplingResolver`]
//! to turn each declaration into an accessor. Accessors are small `Copy`
//! values; at a quadrature point they are read through the `Qp` context, which
//! knows where the element's field values live.
//!
//! Resolution happens once per object. Afterwards accessors are immutable.

use crate::error::{Error, Result};
use crate::params::ParameterSet;
use crate::types::{FieldDerivative, TimeState, VarId};
use crate::variables::{FieldKind, PostprocessorId, VariableSystem};

/// What a coupling reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldSource {
    Variable { kind: FieldKind, var: VarId },
    Postprocessor(PostprocessorId),
    Constant(f64),
}

/// Per-qp scalar value (or time derivative) of a coupled field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoupledValue {
    pub(crate) source: FieldSource,
    pub(crate) state: TimeState,
    pub(crate) derivative: FieldDerivative,
}

impl CoupledValue {
    /// Accessor for a fixed value, independent of any field.
    pub fn constant(value: f64) -> Self {
        Self {
            source: FieldSource::Constant(value),
            state: TimeState::Current,
            derivative: FieldDerivative::Value,
        }
    }

    pub fn source(&self) -> FieldSource {
        self.source
    }

    pub fn state(&self) -> TimeState {
        self.state
    }

    pub fn is_time_derivative(&self) -> bool {
        self.derivative == FieldDerivative::TimeDerivative
    }
}

/// Per-qp gradient of a coupled field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoupledGradient {
    pub(crate) source: FieldSource,
    pub(crate) state: TimeState,
}

impl CoupledGradient {
    pub fn source(&self) -> FieldSource {
        self.source
    }

    pub fn state(&self) -> TimeState {
        self.state
    }
}

/// Turns coupling declarations of one object into accessors.
pub struct CouplingResolver<'a> {
    vars: &'a VariableSystem,
    object: &'a str,
}

impl<'a> CouplingResolver<'a> {
    pub fn new(vars: &'a VariableSystem, object: &'a str) -> Self {
        Self { vars, object }
    }

    fn missing(&self, coupling: &str, reason: String) -> Error {
        Error::MissingCoupling {
            object: self.object.to_string(),
            coupling: coupling.to_string(),
            reason,
        }
    }

    /// All sources coupled to `name`, in declaration order.
    ///
    /// An unsupplied optional coupling yields a single constant (its default,
    /// or zero).
    pub fn sources(&self, params: &ParameterSet, name: &str) -> Result<Vec<FieldSource>> {
        let decl = params.coupling_decl(name).ok_or_else(|| Error::InvalidParameter {
            param: name.to_string(),
            reason: format!("'{}' does not declare it as a coupled variable", self.object),
        })?;

        let names = params.coupled_names(name);
        if names.is_empty() {
            if decl.required {
                return Err(self.missing(name, "no field was supplied".into()));
            }
            return Ok(vec![FieldSource::Constant(decl.default.unwrap_or(0.0))]);
        }

        names.iter().map(|field| self.lookup(name, field)).collect()
    }

    fn lookup(&self, coupling: &str, field: &str) -> Result<FieldSource> {
        if let Some(info) = self.vars.find(field) {
            return Ok(FieldSource::Variable {
                kind: info.kind,
                var: info.id,
            });
        }
        if let Some(pp) = self.vars.postprocessor(field) {
            return Ok(FieldSource::Postprocessor(pp));
        }
        if let Ok(value) = field.parse::<f64>() {
            return Ok(FieldSource::Constant(value));
        }
        Err(self.missing(
            coupling,
            format!("no variable or postprocessor named '{}'", field),
        ))
    }

    fn component(&self, params: &ParameterSet, name: &str, comp: usize) -> Result<FieldSource> {
        let sources = self.sources(params, name)?;
        let n = sources.len();
        sources.get(comp).copied().ok_or_else(|| Error::InvalidParameter {
            param: name.to_string(),
            reason: format!("component {} requested but {} coupled", comp, n),
        })
    }

    /// Whether the user supplied anything for `name`.
    pub fn is_coupled(&self, params: &ParameterSet, name: &str) -> bool {
        !params.coupled_names(name).is_empty()
    }

    pub fn components(&self, params: &ParameterSet, name: &str) -> Result<usize> {
        Ok(self.sources(params, name)?.len())
    }

    pub fn coupled_value(
        &self,
        params: &ParameterSet,
        name: &str,
        state: TimeState,
    ) -> Result<CoupledValue> {
        self.coupled_component_value(params, name, 0, state)
    }

    pub fn coupled_component_value(
        &self,
        params: &ParameterSet,
        name: &str,
        comp: usize,
        state: TimeState,
    ) -> Result<CoupledValue> {
        Ok(CoupledValue {
            source: self.component(params, name, comp)?,
            state,
            derivative: FieldDerivative::Value,
        })
    }

    pub fn coupled_gradient(
        &self,
        params: &ParameterSet,
        name: &str,
        state: TimeState,
    ) -> Result<CoupledGradient> {
        self.coupled_component_gradient(params, name, 0, state)
    }

    pub fn coupled_component_gradient(
        &self,
        params: &ParameterSet,
        name: &str,
        comp: usize,
        state: TimeState,
    ) -> Result<CoupledGradient> {
        Ok(CoupledGradient {
            source: self.component(params, name, comp)?,
            state,
        })
    }

    /// Backward-Euler time derivative of the coupled field.
    pub fn coupled_dot(&self, params: &ParameterSet, name: &str) -> Result<CoupledValue> {
        self.coupled_component_dot(params, name, 0)
    }

    pub fn coupled_component_dot(
        &self,
        params: &ParameterSet,
        name: &str,
        comp: usize,
    ) -> Result<CoupledValue> {
        Ok(CoupledValue {
            source: self.component(params, name, comp)?,
            state: TimeState::Current,
            derivative: FieldDerivative::TimeDerivative,
        })
    }

    /// Nonlinear variable behind component `comp`, if any.
    ///
    /// Hand-coded Jacobian objects use this to report which off-diagonal
    /// blocks they fill.
    pub fn coupled_var(
        &self,
        params: &ParameterSet,
        name: &str,
        comp: usize,
    ) -> Result<Option<VarId>> {
        Ok(match self.component(params, name, comp)? {
            FieldSource::Variable {
                kind: FieldKind::Nonlinear,
                var,
            } => Some(var),
            _ => None,
        })
    }
}
