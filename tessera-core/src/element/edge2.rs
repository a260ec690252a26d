//! 2-node linear line element (Edge2).
//!
//! ```text
//!  0 ------- 1
//! ξ=-1      ξ=+1
//! ```
//!
//! Shape functions N0 = (1 - ξ)/2, N1 = (1 + ξ)/2. Sides are the end points:
//! side 0 is node 0, side 1 is node 1.

use super::gauss::{gauss_line, points_for_order, GaussPoint};
use super::{ReferenceElement, SidePoint};

/// 2-node line element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Edge2;

const SIDE_NODES: [[usize; 1]; 2] = [[0], [1]];

impl ReferenceElement for Edge2 {
    fn n_nodes(&self) -> usize {
        2
    }

    fn dimension(&self) -> usize {
        1
    }

    fn quadrature(&self, order: usize) -> Vec<GaussPoint> {
        gauss_line(points_for_order(order))
    }

    fn shape_values(&self, gp: &GaussPoint, out: &mut [f64]) {
        let xi = gp.xi();
        out[0] = 0.5 * (1.0 - xi);
        out[1] = 0.5 * (1.0 + xi);
    }

    fn shape_derivatives(&self, _gp: &GaussPoint, out: &mut [[f64; 2]]) {
        out[0] = [-0.5, 0.0];
        out[1] = [0.5, 0.0];
    }

    fn n_sides(&self) -> usize {
        2
    }

    fn side_nodes(&self, side: usize) -> &'static [usize] {
        &SIDE_NODES[side]
    }

    fn side_quadrature(&self, side: usize, _order: usize) -> Vec<SidePoint> {
        let xi = if side == 0 { -1.0 } else { 1.0 };
        vec![SidePoint {
            point: GaussPoint::new([xi, 0.0], 1.0),
            tangent: [0.0, 0.0],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nodal_interpolation() {
        let mut n = [0.0; 2];
        Edge2.shape_values(&GaussPoint::new([-1.0, 0.0], 1.0), &mut n);
        assert_relative_eq!(n[0], 1.0);
        assert_relative_eq!(n[1], 0.0);
    }

    #[test]
    fn test_end_point_sides() {
        let left = Edge2.side_quadrature(0, 1);
        assert_eq!(left.len(), 1);
        assert_relative_eq!(left[0].point.xi(), -1.0);
        assert_eq!(Edge2.side_nodes(1), &[1]);
    }
}
