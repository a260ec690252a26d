//! 4-node bilinear quadrilateral (Quad4).
//!
//! # Node Numbering
//!
//! ```text
//!  3---------2
//!  |         |
//!  |         |
//!  0---------1
//! ```
//!
//! Nodes are ordered counter-clockwise, so side normals computed from the side
//! tangent point outward. Side `s` runs from node `s` to node `(s + 1) % 4`.
//!
//! # Shape Functions
//!
//! ```text
//! N_i = (1/4)(1 + ξ_i*ξ)(1 + η_i*η)
//! ```

use super::gauss::{gauss_1d, gauss_quad, points_for_order, GaussPoint};
use super::{ReferenceElement, SidePoint};

/// 4-node bilinear quadrilateral.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quad4;

/// Node positions in natural coordinates.
const NODE_COORDS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

const SIDE_NODES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

impl ReferenceElement for Quad4 {
    fn n_nodes(&self) -> usize {
        4
    }

    fn dimension(&self) -> usize {
        2
    }

    fn quadrature(&self, order: usize) -> Vec<GaussPoint> {
        gauss_quad(points_for_order(order))
    }

    fn shape_values(&self, gp: &GaussPoint, out: &mut [f64]) {
        let (xi, eta) = (gp.xi(), gp.eta());
        for (i, &(xi_i, eta_i)) in NODE_COORDS.iter().enumerate() {
            out[i] = 0.25 * (1.0 + xi_i * xi) * (1.0 + eta_i * eta);
        }
    }

    fn shape_derivatives(&self, gp: &GaussPoint, out: &mut [[f64; 2]]) {
        let (xi, eta) = (gp.xi(), gp.eta());
        for (i, &(xi_i, eta_i)) in NODE_COORDS.iter().enumerate() {
            out[i] = [
                0.25 * xi_i * (1.0 + eta_i * eta),
                0.25 * eta_i * (1.0 + xi_i * xi),
            ];
        }
    }

    fn n_sides(&self) -> usize {
        4
    }

    fn side_nodes(&self, side: usize) -> &'static [usize] {
        &SIDE_NODES[side]
    }

    fn side_quadrature(&self, side: usize, order: usize) -> Vec<SidePoint> {
        let (a, b) = (NODE_COORDS[SIDE_NODES[side][0]], NODE_COORDS[SIDE_NODES[side][1]]);
        // Side parameter t ∈ [-1, 1] maps linearly from node a to node b.
        let tangent = [0.5 * (b.0 - a.0), 0.5 * (b.1 - a.1)];
        gauss_1d(points_for_order(order))
            .into_iter()
            .map(|(t, w)| {
                let xi = 0.5 * (a.0 + b.0) + tangent[0] * t;
                let eta = 0.5 * (a.1 + b.1) + tangent[1] * t;
                SidePoint {
                    point: GaussPoint::new([xi, eta], w),
                    tangent,
                }
            })
            .collect()
    }
}
