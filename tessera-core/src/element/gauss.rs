//! Gauss-Legendre quadrature rules.
//!
//! Rules for line elements and tensor-product rules for quadrilaterals, both on
//! the reference interval [-1, 1].
//!
//! # Usage
//!
//! ```
//! use tessera_core::element::gauss::{gauss_1d, gauss_quad};
//!
//! // 2-point 1D rule
//! let length: f64 = gauss_1d(2).iter().map(|&(_, w)| w).sum();
//! assert!((length - 2.0).abs() < 1e-14);
//!
//! // 2x2 quadrilateral rule
//! assert_eq!(gauss_quad(2).len(), 4);
//! ```

/// A quadrature point in reference coordinates with its weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    /// Reference coordinates [ξ, η]; η is zero on line elements.
    pub coords: [f64; 2],
    /// Integration weight.
    pub weight: f64,
}

impl GaussPoint {
    pub fn new(coords: [f64; 2], weight: f64) -> Self {
        Self { coords, weight }
    }

    #[inline]
    pub fn xi(&self) -> f64 {
        self.coords[0]
    }

    #[inline]
    pub fn eta(&self) -> f64 {
        self.coords[1]
    }
}

/// 1D Gauss-Legendre quadrature points and weights.
///
/// Returns (point, weight) pairs for integration on [-1, 1]. An `n`-point
/// rule integrates polynomials of degree `2n - 1` exactly.
///
/// # Panics
///
/// Panics if `n` is not in 1..=4.
pub fn gauss_1d(n: usize) -> Vec<(f64, f64)> {
    match n {
        1 => vec![(0.0, 2.0)],
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            vec![(-p, 1.0), (p, 1.0)]
        }
        3 => {
            let p = (3.0 / 5.0_f64).sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        4 => {
            // Points: ±√((3 ∓ 2√(6/5))/7), weights (18 ± √30) / 36
            let sqrt_6_5 = (6.0 / 5.0_f64).sqrt();
            let p1 = ((3.0 - 2.0 * sqrt_6_5) / 7.0).sqrt();
            let p2 = ((3.0 + 2.0 * sqrt_6_5) / 7.0).sqrt();
            let sqrt_30 = 30.0_f64.sqrt();
            let w1 = (18.0 + sqrt_30) / 36.0;
            let w2 = (18.0 - sqrt_30) / 36.0;
            vec![(-p2, w2), (-p1, w1), (p1, w1), (p2, w2)]
        }
        _ => panic!("gauss_1d: n must be 1, 2, 3, or 4, got {}", n),
    }
}

/// Line rule as [`GaussPoint`]s.
pub fn gauss_line(n: usize) -> Vec<GaussPoint> {
    gauss_1d(n)
        .into_iter()
        .map(|(xi, w)| GaussPoint::new([xi, 0.0], w))
        .collect()
}

/// Tensor-product rule on the reference square, `n` points per direction.
///
/// # Panics
///
/// Panics if `n` is not in 1..=4.
pub fn gauss_quad(n: usize) -> Vec<GaussPoint> {
    let rule_1d = gauss_1d(n);
    let mut points = Vec::with_capacity(n * n);

    for &(eta, w_eta) in &rule_1d {
        for &(xi, w_xi) in &rule_1d {
            points.push(GaussPoint::new([xi, eta], w_xi * w_eta));
        }
    }

    points
}

/// Smallest 1D point count integrating degree `order` exactly.
pub fn points_for_order(order: usize) -> usize {
    (order / 2 + 1).clamp(1, 4)
}
