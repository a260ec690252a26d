//! Reference element trait and the first-order Lagrange elements.
//!
//! The ReferenceElement trait describes shape functions on the reference cell,
//! letting the assembly code evaluate finite-element values without knowing
//! which element type it is looking at.
//!
//! # Submodules
//!
//! - [`gauss`] - Gauss quadrature rules for numerical integration
//! - [`edge2`] - 2-node line element
//! - [`quad4`] - 4-node bilinear quadrilateral

use crate::mesh::ElementType;

pub mod edge2;
pub mod gauss;
pub mod quad4;

pub use edge2::Edge2;
pub use gauss::{gauss_1d, gauss_line, gauss_quad, GaussPoint};
pub use quad4::Quad4;

/// Quadrature point on an element side, in the element's reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidePoint {
    pub point: GaussPoint,
    /// Direction of the side parameter in reference coordinates (unused in 1D).
    pub tangent: [f64; 2],
}

/// Finite element shape functions on a reference cell.
///
/// Implementations must be thread-safe (Send + Sync); the assembly loop shares a
/// single static instance per element type between worker threads.
pub trait ReferenceElement: Send + Sync {
    /// Number of nodes (and shape functions).
    fn n_nodes(&self) -> usize;

    /// Reference dimension (1 or 2).
    fn dimension(&self) -> usize;

    /// Volume quadrature exact for polynomials of degree `order`.
    fn quadrature(&self, order: usize) -> Vec<GaussPoint>;

    /// Shape function values at `gp`, written into `out` (length `n_nodes`).
    fn shape_values(&self, gp: &GaussPoint, out: &mut [f64]);

    /// Reference-coordinate derivatives at `gp`, written into `out`.
    fn shape_derivatives(&self, gp: &GaussPoint, out: &mut [[f64; 2]]);

    /// Number of sides.
    fn n_sides(&self) -> usize;

    /// Local node indices on `side`.
    fn side_nodes(&self, side: usize) -> &'static [usize];

    /// Side quadrature exact for degree `order`.
    fn side_quadrature(&self, side: usize, order: usize) -> Vec<SidePoint>;
}

/// Get the reference element for a mesh element type.
pub fn create_element(element_type: ElementType) -> &'static dyn ReferenceElement {
    match element_type {
        ElementType::Edge2 => &Edge2,
        ElementType::Quad4 => &Quad4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partition_of_unity() {
        for ty in [ElementType::Edge2, ElementType::Quad4] {
            let elem = create_element(ty);
            let mut values = vec![0.0; elem.n_nodes()];
            let mut derivs = vec![[0.0; 2]; elem.n_nodes()];
            for gp in elem.quadrature(3) {
                elem.shape_values(&gp, &mut values);
                elem.shape_derivatives(&gp, &mut derivs);
                assert_relative_eq!(values.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
                for d in 0..2 {
                    let s: f64 = derivs.iter().map(|g| g[d]).sum();
                    assert_relative_eq!(s, 0.0, epsilon = 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_side_shape_functions_vanish_off_side() {
        let elem = create_element(ElementType::Quad4);
        let mut values = vec![0.0; 4];
        for side in 0..elem.n_sides() {
            let on_side = elem.side_nodes(side);
            for sp in elem.side_quadrature(side, 2) {
                elem.shape_values(&sp.point, &mut values);
                for (i, v) in values.iter().enumerate() {
                    if !on_side.contains(&i) {
                        assert_relative_eq!(*v, 0.0, epsilon = 1e-14);
                    }
                }
            }
        }
    }
}
