//! Built-in object library.
//!
//! [`register_objects`] adds every type below to a [`Factory`] under one
//! application name.

pub mod bcs;
pub mod kernels;
pub mod materials;
pub mod postprocessors;

use crate::error::Result;
use crate::registry::Factory;
use std::sync::Arc;

pub use bcs::{DirichletBc, NeumannBc};
pub use kernels::{
    AdMatDiffusion, BodyForce, CoefDiffusion, CoupledForce, Diffusion, MatDiffusion, Reaction,
    TimeDerivative,
};
pub use materials::{
    AccumulatedSource, AdVariableDependentDiffusivity, GenericConstantMaterial, ScaledProperty,
    VariableDependentDiffusivity,
};
pub use postprocessors::{ElementAverageValue, ElementIntegralProperty, ElementIntegralVariable};

/// Register the built-in types under `app`.
pub fn register_objects(factory: &mut Factory, app: &str) -> Result<()> {
    factory.register_type("Diffusion", app, Diffusion::valid_params, Arc::new(Diffusion::build))?;
    factory.register_type(
        "ADDiffusion",
        app,
        Diffusion::valid_params,
        Arc::new(Diffusion::build_ad),
    )?;
    factory.register_type(
        "CoefDiffusion",
        app,
        CoefDiffusion::valid_params,
        Arc::new(CoefDiffusion::build),
    )?;
    factory.register_type(
        "MatDiffusion",
        app,
        MatDiffusion::valid_params,
        Arc::new(MatDiffusion::build),
    )?;
    factory.register_type(
        "ADMatDiffusion",
        app,
        AdMatDiffusion::valid_params,
        Arc::new(AdMatDiffusion::build),
    )?;
    factory.register_type(
        "TimeDerivative",
        app,
        TimeDerivative::valid_params,
        Arc::new(TimeDerivative::build),
    )?;
    factory.register_type(
        "ADTimeDerivative",
        app,
        TimeDerivative::valid_params,
        Arc::new(TimeDerivative::build_ad),
    )?;
    factory.register_type("BodyForce", app, BodyForce::valid_params, Arc::new(BodyForce::build))?;
    factory.register_type(
        "CoupledForce",
        app,
        CoupledForce::valid_params,
        Arc::new(CoupledForce::build),
    )?;
    factory.register_type(
        "ADCoupledForce",
        app,
        CoupledForce::valid_params,
        Arc::new(CoupledForce::build_ad),
    )?;
    factory.register_type("Reaction", app, Reaction::valid_params, Arc::new(Reaction::build))?;
    factory.register_type(
        "GenericConstantMaterial",
        app,
        GenericConstantMaterial::valid_params,
        Arc::new(GenericConstantMaterial::build),
    )?;
    factory.register_type(
        "ScaledProperty",
        app,
        ScaledProperty::valid_params,
        Arc::new(ScaledProperty::build),
    )?;
    factory.register_type(
        "VariableDependentDiffusivity",
        app,
        VariableDependentDiffusivity::valid_params,
        Arc::new(VariableDependentDiffusivity::build),
    )?;
    factory.register_type(
        "ADVariableDependentDiffusivity",
        app,
        AdVariableDependentDiffusivity::valid_params,
        Arc::new(AdVariableDependentDiffusivity::build),
    )?;
    factory.register_type(
        "AccumulatedSource",
        app,
        AccumulatedSource::valid_params,
        Arc::new(AccumulatedSource::build),
    )?;
    factory.register_type(
        "DirichletBC",
        app,
        DirichletBc::valid_params,
        Arc::new(DirichletBc::build),
    )?;
    factory.register_type("NeumannBC", app, NeumannBc::valid_params, Arc::new(NeumannBc::build))?;
    factory.register_type(
        "ElementIntegralVariable",
        app,
        ElementIntegralVariable::valid_params,
        Arc::new(ElementIntegralVariable::build),
    )?;
    factory.register_type(
        "ElementAverageValue",
        app,
        ElementAverageValue::valid_params,
        Arc::new(ElementAverageValue::build),
    )?;
    factory.register_type(
        "ElementIntegralProperty",
        app,
        ElementIntegralProperty::valid_params,
        Arc::new(ElementIntegralProperty::build),
    )?;
    factory.register_renamed("CoefficientDiffusion", "CoefDiffusion", app, "2027-06-30");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_every_type_has_params() {
        let mut factory = Factory::new();
        register_objects(&mut factory, "core").unwrap();
        for name in factory.registered_names() {
            assert!(factory.params(&name).is_ok(), "{name}");
        }
        assert!(factory.is_registered("CoefficientDiffusion"));
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut factory = Factory::new();
        register_objects(&mut factory, "core").unwrap();
        let err = register_objects(&mut factory, "core").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
    }
}
