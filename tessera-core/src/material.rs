//! Property producers (materials).
//!
//! A producer computes the current value of the properties it declared at
//! every quadrature point of an element. Producers on a subdomain run in the
//! dependency order fixed at setup, so a producer may read any property
//! declared by producers it depends on through the same [`MaterialData`] it
//! writes into.

use crate::ad::DualNumber;
use crate::fields::Qp;
use crate::property::MaterialData;
use crate::types::SubdomainId;

/// Field access for producers in both number types.
///
/// `dual` carries local-DOF derivatives only when the pass needs a
/// Jacobian; in residual-only passes its values are constants.
pub struct MaterialQp<'a> {
    pub real: Qp<'a, f64>,
    pub dual: Qp<'a, DualNumber>,
}

impl<'a> MaterialQp<'a> {
    pub fn index(&self) -> usize {
        self.real.index()
    }
}

/// Capability: computes material properties.
pub trait PropertyProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Subdomains this producer runs on; empty means all.
    fn blocks(&self) -> &[SubdomainId];

    /// Compute current property values at one quadrature point.
    fn compute_qp_properties(&self, q: &MaterialQp<'_>, props: &mut MaterialData);

    /// Initial values of stateful properties; called once per quadrature
    /// point before the first step.
    fn init_qp_stateful_properties(&self, _q: &MaterialQp<'_>, _props: &mut MaterialData) {}
}
