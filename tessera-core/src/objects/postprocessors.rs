//! Element-integral postprocessors.

use crate::coupling::CoupledValue;
use crate::error::Result;
use crate::fields::Qp;
use crate::params::ParameterSet;
use crate::postprocessor::ElementPostprocessor;
use crate::property::{MaterialData, PropertyHandle};
use crate::registry::{object_params, BuildContext, SimObject};
use crate::types::{SubdomainId, TimeState};

fn variable_params() -> ParameterSet {
    let mut p = object_params();
    p.add_required_coupled_var("variable", "Field to integrate");
    p
}

/// `∫ v dΩ`
pub struct ElementIntegralVariable {
    name: String,
    blocks: Vec<SubdomainId>,
    v: CoupledValue,
}

impl ElementIntegralVariable {
    pub fn valid_params() -> ParameterSet {
        variable_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(SimObject::Postprocessor(Box::new(Self::new(params, ctx)?)))
    }

    fn new(params: &ParameterSet, ctx: &BuildContext<'_>) -> Result<Self> {
        Ok(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            v: ctx
                .couplings()
                .coupled_value(params, "variable", TimeState::Current)?,
        })
    }
}

impl ElementPostprocessor for ElementIntegralVariable {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn qp_integrand(&self, q: &Qp<'_, f64>, _props: &MaterialData) -> f64 {
        q.coupled(&self.v)
    }
}

/// `∫ v dΩ / ∫ dΩ`
pub struct ElementAverageValue(ElementIntegralVariable);

impl ElementAverageValue {
    pub fn valid_params() -> ParameterSet {
        variable_params()
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        Ok(SimObject::Postprocessor(Box::new(Self(
            ElementIntegralVariable::new(params, ctx)?,
        ))))
    }
}

impl ElementPostprocessor for ElementAverageValue {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn blocks(&self) -> &[SubdomainId] {
        self.0.blocks()
    }

    fn qp_integrand(&self, q: &Qp<'_, f64>, props: &MaterialData) -> f64 {
        self.0.qp_integrand(q, props)
    }

    fn finalize(&self, integral: f64, volume: f64) -> f64 {
        if volume > 0.0 {
            integral / volume
        } else {
            0.0
        }
    }
}

/// Integral of a scalar material property.
pub struct ElementIntegralProperty {
    name: String,
    blocks: Vec<SubdomainId>,
    prop: PropertyHandle<f64>,
}

impl ElementIntegralProperty {
    pub fn valid_params() -> ParameterSet {
        let mut p = object_params();
        p.add_required_param::<String>("property", "Property to integrate");
        p
    }

    pub fn build(params: &ParameterSet, ctx: &mut BuildContext<'_>) -> Result<SimObject> {
        let prop: String = params.get("property")?;
        Ok(SimObject::Postprocessor(Box::new(Self {
            name: ctx.object_name().to_string(),
            blocks: ctx.blocks().to_vec(),
            prop: ctx.get_property(&prop)?,
        })))
    }
}

impl ElementPostprocessor for ElementIntegralProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks(&self) -> &[SubdomainId] {
        &self.blocks
    }

    fn qp_integrand(&self, q: &Qp<'_, f64>, props: &MaterialData) -> f64 {
        *props.get(&self.prop, q.index())
    }
}
