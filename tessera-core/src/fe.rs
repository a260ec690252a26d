//! Finite-element values at quadrature points.
//!
//! [`FeValues`] maps reference shape functions onto a physical element: shape
//! values, physical gradients, `JxW` (Jacobian determinant times weight),
//! quadrature point locations and, for sides, outward normals. One instance
//! lives in each element work item and is reinitialised per element, so its
//! buffers are allocated once per thread rather than once per element.

use crate::ad::{Gradient, RealGradient};
use crate::element::{GaussPoint, ReferenceElement, SidePoint};
use crate::error::{Error, Result};
use crate::types::Point3;
use nalgebra::{Matrix2, Vector2};

/// Shape function data on one element (or one element side).
#[derive(Debug, Clone, Default)]
pub struct FeValues {
    n_nodes: usize,
    n_qp: usize,
    /// phi[i][qp]
    phi: Vec<Vec<f64>>,
    /// grad_phi[i][qp]
    grad_phi: Vec<Vec<RealGradient>>,
    jxw: Vec<f64>,
    q_points: Vec<Point3>,
    normals: Vec<RealGradient>,
    ref_values: Vec<f64>,
    ref_derivs: Vec<[f64; 2]>,
}

impl FeValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_qp(&self) -> usize {
        self.n_qp
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    #[inline]
    pub fn phi(&self, i: usize, qp: usize) -> f64 {
        self.phi[i][qp]
    }

    #[inline]
    pub fn grad_phi(&self, i: usize, qp: usize) -> &RealGradient {
        &self.grad_phi[i][qp]
    }

    #[inline]
    pub fn jxw(&self, qp: usize) -> f64 {
        self.jxw[qp]
    }

    #[inline]
    pub fn q_point(&self, qp: usize) -> &Point3 {
        &self.q_points[qp]
    }

    /// Outward unit normal; only meaningful after [`FeValues::reinit_side`].
    #[inline]
    pub fn normal(&self, qp: usize) -> &RealGradient {
        &self.normals[qp]
    }

    fn resize(&mut self, n_nodes: usize, n_qp: usize) {
        self.n_nodes = n_nodes;
        self.n_qp = n_qp;
        self.phi.resize_with(n_nodes, Vec::new);
        self.grad_phi.resize_with(n_nodes, Vec::new);
        for i in 0..n_nodes {
            self.phi[i].resize(n_qp, 0.0);
            self.grad_phi[i].resize(n_qp, RealGradient::zero());
        }
        self.jxw.resize(n_qp, 0.0);
        self.q_points.resize(n_qp, Point3::zeros());
        self.normals.resize(n_qp, RealGradient::zero());
        self.ref_values.resize(n_nodes, 0.0);
        self.ref_derivs.resize(n_nodes, [0.0; 2]);
    }

    /// Evaluate volume quadrature on an element.
    pub fn reinit(
        &mut self,
        elem: &dyn ReferenceElement,
        coords: &[Point3],
        qrule: &[GaussPoint],
    ) -> Result<()> {
        self.resize(elem.n_nodes(), qrule.len());
        for (qp, gp) in qrule.iter().enumerate() {
            let det = self.map_point(elem, coords, gp, qp)?;
            self.jxw[qp] = det * gp.weight;
        }
        Ok(())
    }

    /// Evaluate side quadrature on an element.
    pub fn reinit_side(
        &mut self,
        elem: &dyn ReferenceElement,
        coords: &[Point3],
        side_points: &[SidePoint],
    ) -> Result<()> {
        self.resize(elem.n_nodes(), side_points.len());
        for (qp, sp) in side_points.iter().enumerate() {
            self.map_point(elem, coords, &sp.point, qp)?;
            if elem.dimension() == 1 {
                let t = tangent_1d(&self.ref_derivs, coords);
                let len = t.norm();
                let sign = if sp.point.xi() < 0.0 { -1.0 } else { 1.0 };
                self.normals[qp] = gradient_of(t * (sign / len));
                self.jxw[qp] = sp.point.weight;
            } else {
                let j = jacobian_2d(&self.ref_derivs, coords);
                let tx = j[(0, 0)] * sp.tangent[0] + j[(1, 0)] * sp.tangent[1];
                let ty = j[(0, 1)] * sp.tangent[0] + j[(1, 1)] * sp.tangent[1];
                let len = (tx * tx + ty * ty).sqrt();
                self.normals[qp] = Gradient([ty / len, -tx / len, 0.0]);
                self.jxw[qp] = sp.point.weight * len;
            }
        }
        Ok(())
    }

    /// Fill shape values, gradients and location at `qp`; return det(J).
    fn map_point(
        &mut self,
        elem: &dyn ReferenceElement,
        coords: &[Point3],
        gp: &GaussPoint,
        qp: usize,
    ) -> Result<f64> {
        elem.shape_values(gp, &mut self.ref_values);
        elem.shape_derivatives(gp, &mut self.ref_derivs);

        let mut x = Point3::zeros();
        for (i, c) in coords.iter().enumerate() {
            x += c * self.ref_values[i];
            self.phi[i][qp] = self.ref_values[i];
        }
        self.q_points[qp] = x;

        match elem.dimension() {
            1 => {
                let t = tangent_1d(&self.ref_derivs, coords);
                let det = t.norm();
                if det <= f64::EPSILON {
                    return Err(Error::Mesh("Degenerate line element: zero length".into()));
                }
                let unit = t / det;
                for i in 0..coords.len() {
                    let g = unit * (self.ref_derivs[i][0] / det);
                    self.grad_phi[i][qp] = gradient_of(g);
                }
                Ok(det)
            }
            _ => {
                let j = jacobian_2d(&self.ref_derivs, coords);
                let det = j.determinant();
                if det <= 0.0 {
                    return Err(Error::Mesh(format!(
                        "Degenerate or inverted element: det(J) = {}",
                        det
                    )));
                }
                let j_inv = j
                    .try_inverse()
                    .ok_or_else(|| Error::Mesh("Degenerate element: Jacobian is singular".into()))?;
                for i in 0..coords.len() {
                    let dnat = Vector2::new(self.ref_derivs[i][0], self.ref_derivs[i][1]);
                    let dphys = j_inv * dnat;
                    self.grad_phi[i][qp] = Gradient([dphys[0], dphys[1], 0.0]);
                }
                Ok(det)
            }
        }
    }
}

fn gradient_of(v: Point3) -> RealGradient {
    Gradient([v.x, v.y, v.z])
}

/// dX/dξ for a line element.
fn tangent_1d(ref_derivs: &[[f64; 2]], coords: &[Point3]) -> Point3 {
    coords
        .iter()
        .zip(ref_derivs)
        .fold(Point3::zeros(), |acc, (c, d)| acc + c * d[0])
}

/// J = [[∂x/∂ξ, ∂y/∂ξ], [∂x/∂η, ∂y/∂η]]
fn jacobian_2d(ref_derivs: &[[f64; 2]], coords: &[Point3]) -> Matrix2<f64> {
    let mut j = Matrix2::zeros();
    for (c, d) in coords.iter().zip(ref_derivs) {
        j[(0, 0)] += d[0] * c[0];
        j[(0, 1)] += d[0] * c[1];
        j[(1, 0)] += d[1] * c[0];
        j[(1, 1)] += d[1] * c[1];
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Edge2, Quad4};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_edge2_gradients_and_length() {
        let coords = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(3.0, 0.0, 0.0)];
        let mut fe = FeValues::new();
        fe.reinit(&Edge2, &coords, &Edge2.quadrature(2)).unwrap();

        let length: f64 = (0..fe.n_qp()).map(|qp| fe.jxw(qp)).sum();
        assert_relative_eq!(length, 2.0, epsilon = 1e-14);
        for qp in 0..fe.n_qp() {
            assert_relative_eq!(fe.grad_phi(0, qp).0[0], -0.5, epsilon = 1e-14);
            assert_relative_eq!(fe.grad_phi(1, qp).0[0], 0.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_quad4_area_and_gradient_of_linear_field() {
        // Parallelogram
        let coords = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(3.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
        ];
        let mut fe = FeValues::new();
        fe.reinit(&Quad4, &coords, &Quad4.quadrature(2)).unwrap();

        let area: f64 = (0..fe.n_qp()).map(|qp| fe.jxw(qp)).sum();
        assert_relative_eq!(area, 2.0, epsilon = 1e-12);

        // u = 2x + 3y interpolated exactly, so grad u = (2, 3) everywhere
        let u: Vec<f64> = coords.iter().map(|c| 2.0 * c.x + 3.0 * c.y).collect();
        for qp in 0..fe.n_qp() {
            let mut g = [0.0; 2];
            for i in 0..4 {
                g[0] += u[i] * fe.grad_phi(i, qp).0[0];
                g[1] += u[i] * fe.grad_phi(i, qp).0[1];
            }
            assert_relative_eq!(g[0], 2.0, epsilon = 1e-12);
            assert_relative_eq!(g[1], 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_side_normals_point_outward() {
        let coords = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ];
        let mut fe = FeValues::new();
        fe.reinit_side(&Quad4, &coords, &Quad4.side_quadrature(0, 2)).unwrap();
        let len: f64 = (0..fe.n_qp()).map(|qp| fe.jxw(qp)).sum();
        assert_relative_eq!(len, 1.0, epsilon = 1e-14);
        assert_relative_eq!(fe.normal(0).0[1], -1.0, epsilon = 1e-14);

        fe.reinit_side(&Quad4, &coords, &Quad4.side_quadrature(1, 2)).unwrap();
        assert_relative_eq!(fe.normal(0).0[0], 1.0, epsilon = 1e-14);

        let line = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
        fe.reinit_side(&Edge2, &line, &Edge2.side_quadrature(0, 1)).unwrap();
        assert_relative_eq!(fe.normal(0).0[0], -1.0);
        assert_relative_eq!(fe.phi(0, 0), 1.0);
    }

    #[test]
    fn test_inverted_element_is_an_error() {
        let coords = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
        ];
        let mut fe = FeValues::new();
        assert!(fe.reinit(&Quad4, &coords, &Quad4.quadrature(2)).is_err());
    }
}
