//! Property producers.

use crate::ad::DualNumber;
use crate::coupling::CoupledValue;
use crate::error::{Error, Result};
use crate::material::{MaterialQp, PropertyProducer};
use crate::params::ParameterSet;
use crate::property::{DeclaredProperty, MaterialData, PropertyHandle};
use crate::registry::{object_params, BuildContext, SimObject};
use crate::types::{SubdomainId, TimeState};

/// Constant `f64` properties from parallel name and value lists.
pub struct GenericConstantMaterial {
    name: String,
    blocks: Vec<SubdomainId>,
    props: Vec<(DeclaredProperty<f64>, f64)>,
}

impl GenericConstantMaterial {
    pub fn valid_params() -> ParameterSet {
        let mut p = object_params();
        p.add_required_param::<Vec<String>>("prop_names", "Names of the properties");
        p.add_required_param::<Vec<f64>>("prop_values", "Values, one per name");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let names: Vec<String> = params.get("prop_names")?;
        let values: Vec<f64> = params.get("prop_values")?;
        if names.len() != values.len() {
            return Err(Error::InvalidParameter {
                param: "prop_values".into(),
                reason: format!("{} names but {} values", names.len(), values.len()),
            });
        }
        let mut props = Vec::with_capacity(names.len());
        for (name, value) in names.iter().zip(values) {
            props.push((ctx.declare_property(name)?, value));
        }
        Ok(SimObject::Material(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            props,
        })))
    }
}

impl PropertyProducer for GenericConstantMaterial {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        for (prop, value) in &self.props {
            props.set(prop, q.index(), *value);
        }
    }
}

/// `output = factor * source` for another producer's property.
pub struct ScaledProperty {
    name: String,
    blocks: Vec<SubdomainId>,
    source: PropertyHandle<f64>,
    output: DeclaredProperty<f64>,
    factor: f64,
}

impl ScaledProperty {
    pub fn valid_params() -> ParameterSet {
        let mut p = object_params();
        p.add_required_param::<String>("source", "Property to scale");
        p.add_required_param::<String>("output", "Name of the scaled property");
        p.add_param("factor", 1.0, "Scale factor");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let source: String = params.get("source")?;
        let output: String = params.get("output")?;
        Ok(SimObject::Material(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            source: ctx.get_property(&source)?,
            output: ctx.declare_property(&output)?,
            factor: params.get("factor")?,
        })))
    }
}

impl PropertyProducer for ScaledProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        let qp = q.index();
        let value = self.factor * *props.get(&self.source, qp);
        props.set(&self.output, qp, value);
    }
}

fn diffusivity_params() -> ParameterSet {
    let mut p = object_params();
    p.add_required_coupled_var("v", "Field the diffusivity depends on");
    p.add_param("k0", 1.0, "Constant part");
    p.add_param("k1", 0.0, "Coefficient of v^2");
    p.add_param("property_name", "diffusivity".to_string(), "Name of the declared property");
    p
}

/// `k = k0 + k1 v²`.
///
/// When `v` is a nonlinear variable `w`, `dk/dw = 2 k1 v` is declared as
/// `d<name>_d<w>`.
pub struct VariableDependentDiffusivity {
    name: String,
    blocks: Vec<SubdomainId>,
    v: CoupledValue,
    k0: f64,
    k1: f64,
    k: DeclaredProperty<f64>,
    dk_dv: Option<DeclaredProperty<f64>>,
}

impl VariableDependentDiffusivity {
    pub fn valid_params() -> ParameterSet {
        diffusivity_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let prop: String = params.get("property_name")?;
        let couplings = ctx.couplings();
        let v = couplings.coupled_value(params, "v", TimeState::Current)?;
        let v_name = couplings
            .coupled_var(params, "v", 0)?
            .map(|var| ctx.variables().variable_name(var).to_string());
        let dk_dv = match v_name {
            Some(var) => Some(ctx.declare_property(&format!("d{prop}_d{var}"))?),
            None => None,
        };
        Ok(SimObject::Material(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            v,
            k0: params.get("k0")?,
            k1: params.get("k1")?,
            k: ctx.declare_property(&prop)?,
            dk_dv,
        })))
    }
}

impl PropertyProducer for VariableDependentDiffusivity {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        let qp = q.index();
        let v = q.real.coupled(&self.v);
        props.set(&self.k, qp, self.k0 + self.k1 * v * v);
        if let Some(dk) = &self.dk_dv {
            props.set(dk, qp, 2.0 * self.k1 * v);
        }
    }
}

/// Dual-number variant of [`VariableDependentDiffusivity`].
pub struct AdVariableDependentDiffusivity {
    name: String,
    blocks: Vec<SubdomainId>,
    v: CoupledValue,
    k0: f64,
    k1: f64,
    k: DeclaredProperty<DualNumber>,
}

impl AdVariableDependentDiffusivity {
    pub fn valid_params() -> ParameterSet {
        diffusivity_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let prop: String = params.get("property_name")?;
        let v = ctx.couplings().coupled_value(params, "v", TimeState::Current)?;
        Ok(SimObject::Material(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            v,
            k0: params.get("k0")?,
            k1: params.get("k1")?,
            k: ctx.declare_property(&prop)?,
        })))
    }
}

impl PropertyProducer for AdVariableDependentDiffusivity {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        let v = q.dual.coupled(&self.v);
        let k = (v.clone() * v) * self.k1 + self.k0;
        props.set(&self.k, q.index(), k);
    }
}

/// Stateful accumulator: `a = a_old + dt * v`, starting from `initial`.
pub struct AccumulatedSource {
    name: String,
    blocks: Vec<SubdomainId>,
    v: CoupledValue,
    initial: f64,
    value: DeclaredProperty<f64>,
    old: PropertyHandle<f64>,
}

impl AccumulatedSource {
    pub fn valid_params() -> ParameterSet {
        let mut p = object_params();
        p.add_required_coupled_var("v", "Rate of accumulation");
        p.add_param("initial", 0.0, "Value before the first step");
        p.add_param("property_name", "accumulated".to_string(), "Name of the declared property");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let prop: String = params.get("property_name")?;
        let v = ctx.couplings().coupled_value(params, "v", TimeState::Current)?;
        Ok(SimObject::Material(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            v,
            initial: params.get("initial")?,
            value: ctx.declare_property(&prop)?,
            old: ctx.get_property_old(&prop)?,
        })))
    }
}

impl PropertyProducer for AccumulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        let qp = q.index();
        let value = *props.get(&self.old, qp) + q.real.dt() * q.real.coupled(&self.v);
        props.set(&self.value, qp, value);
    }

    fn init_qp_stateful_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData) {
        props.set(&self.value, q.index(), self.initial);
    }
}
