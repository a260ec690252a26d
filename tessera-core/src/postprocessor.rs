//! Element-integral postprocessors.
//!
//! Each postprocessor integrates a quadrature-point quantity over its active
//! subdomains. The integral and the covered volume are accumulated per
//! partition as [`Sum`]s and joined in partition order, then passed to
//! [`ElementPostprocessor::finalize`].

use crate::fields::Qp;
use crate::property::MaterialData;
use crate::reduction::{Join, Sum};
use crate::types::SubdomainId;

/// Capability: reduces an element integral to a scalar.
pub trait ElementPostprocessor: Send + Sync {
    fn name(&self) -> &str;

    /// Subdomains integrated over; empty means all.
    fn blocks(&self) -> &[SubdomainId];

    /// Integrand at one quadrature point (without `JxW`).
    fn qp_integrand(&self, q: &Qp<'_, f64>, props: &MaterialData) -> f64;

    /// Final value from the joined integral and volume.
    fn finalize(&self, integral: f64, _volume: f64) -> f64 {
        integral
    }

    fn is_active_on(&self, subdomain: SubdomainId) -> bool {
        let blocks = self.blocks();
        blocks.is_empty() || blocks.contains(&subdomain)
    }
}

/// Partial integral of one postprocessor over one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntegralPartial {
    pub integral: Sum<f64>,
    pub volume: Sum<f64>,
}

impl Join for IntegralPartial {
    fn join(self, other: Self) -> Self {
        Self {
            integral: self.integral.join(other.integral),
            volume: self.volume.join(other.volume),
        }
    }
}

impl IntegralPartial {
    pub fn add(&mut self, value_jxw: f64, jxw: f64) {
        self.integral.0 += value_jxw;
        self.volume.0 += jxw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduction::join_ordered;

    #[test]
    fn test_partials_join_in_order() {
        let mut a = IntegralPartial::default();
        a.add(2.0, 1.0);
        let mut b = IntegralPartial::default();
        b.add(4.0, 0.5);
        let total = join_ordered(vec![a, b]);
        assert_eq!(total.integral.0, 6.0);
        assert_eq!(total.volume.0, 1.5);
    }
}
