//! Numeric types for the two differentiation modes.
//!
//! Weak forms are written once against [`Number`]. Evaluated with `f64` they
//! give plain residuals (the author supplies hand-coded Jacobians); evaluated
//! with [`DualNumber`] every quantity carries its derivative with respect to
//! the element's local degrees of freedom, and the Jacobian falls out of the
//! residual.
//!
//! The dual type is forward mode with a dense derivative vector. An empty
//! derivative vector means "constant" and is how residual-only passes avoid
//! paying for derivatives.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Scalar arithmetic shared by `f64` and [`DualNumber`].
pub trait Number:
    Clone
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// Value with zero derivatives.
    fn constant(value: f64) -> Self;

    /// Primal value.
    fn value(&self) -> f64;

    /// Derivative with respect to local degree of freedom `dof` (0 for `f64`).
    fn derivative(&self, dof: usize) -> f64;

    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn sqrt(&self) -> Self;

    fn exp(&self) -> Self;

    fn ln(&self) -> Self;

    fn powi(&self, n: i32) -> Self;

    fn powf(&self, p: f64) -> Self;
}

impl Number for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn value(&self) -> f64 {
        *self
    }

    fn derivative(&self, _dof: usize) -> f64 {
        0.0
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn exp(&self) -> Self {
        f64::exp(*self)
    }

    fn ln(&self) -> Self {
        f64::ln(*self)
    }

    fn powi(&self, n: i32) -> Self {
        f64::powi(*self, n)
    }

    fn powf(&self, p: f64) -> Self {
        f64::powf(*self, p)
    }
}

/// Forward-mode dual number over the local element DOFs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DualNumber {
    value: f64,
    derivs: Vec<f64>,
}

impl DualNumber {
    pub fn new(value: f64, derivs: Vec<f64>) -> Self {
        Self { value, derivs }
    }

    /// Independent variable: unit derivative at `index` out of `n`.
    pub fn seed(value: f64, index: usize, n: usize) -> Self {
        let mut derivs = vec![0.0; n];
        derivs[index] = 1.0;
        Self { value, derivs }
    }

    pub fn derivatives(&self) -> &[f64] {
        &self.derivs
    }

    pub fn derivatives_mut(&mut self) -> &mut [f64] {
        &mut self.derivs
    }

    /// Overwrite with `value` and `n` zero derivatives, keeping the
    /// derivative allocation.
    pub fn reset(&mut self, value: f64, n: usize) {
        self.value = value;
        self.derivs.clear();
        self.derivs.resize(n, 0.0);
    }

    /// Overwrite with a constant, keeping the derivative allocation.
    pub fn set_constant(&mut self, value: f64) {
        self.value = value;
        self.derivs.clear();
    }

    /// `a * x + b * y` over derivative vectors of possibly different length.
    fn combine(x: &[f64], a: f64, y: &[f64], b: f64) -> Vec<f64> {
        let n = x.len().max(y.len());
        (0..n)
            .map(|i| {
                a * x.get(i).copied().unwrap_or(0.0) + b * y.get(i).copied().unwrap_or(0.0)
            })
            .collect()
    }

    fn scaled(&self, value: f64, factor: f64) -> Self {
        Self {
            value,
            derivs: self.derivs.iter().map(|d| d * factor).collect(),
        }
    }
}

impl From<f64> for DualNumber {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl Add for DualNumber {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            derivs: Self::combine(&self.derivs, 1.0, &rhs.derivs, 1.0),
        }
    }
}

impl Sub for DualNumber {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
            derivs: Self::combine(&self.derivs, 1.0, &rhs.derivs, -1.0),
        }
    }
}

impl Mul for DualNumber {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        // (ab)' = a'b + ab'
        Self {
            value: self.value * rhs.value,
            derivs: Self::combine(&self.derivs, rhs.value, &rhs.derivs, self.value),
        }
    }
}

impl Div for DualNumber {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        // (a/b)' = a'/b - a b'/b²
        let inv = 1.0 / rhs.value;
        Self {
            value: self.value * inv,
            derivs: Self::combine(&self.derivs, inv, &rhs.derivs, -self.value * inv * inv),
        }
    }
}

impl Neg for DualNumber {
    type Output = Self;

    fn neg(self) -> Self {
        let value = -self.value;
        self.scaled(value, -1.0)
    }
}

impl AddAssign for DualNumber {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
        if self.derivs.len() < rhs.derivs.len() {
            self.derivs.resize(rhs.derivs.len(), 0.0);
        }
        for (d, r) in self.derivs.iter_mut().zip(rhs.derivs.iter()) {
            *d += r;
        }
    }
}

impl Add<f64> for DualNumber {
    type Output = Self;

    fn add(mut self, rhs: f64) -> Self {
        self.value += rhs;
        self
    }
}

impl Sub<f64> for DualNumber {
    type Output = Self;

    fn sub(mut self, rhs: f64) -> Self {
        self.value -= rhs;
        self
    }
}

impl Mul<f64> for DualNumber {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        let value = self.value * rhs;
        self.scaled(value, rhs)
    }
}

impl Div<f64> for DualNumber {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        let value = self.value / rhs;
        self.scaled(value, 1.0 / rhs)
    }
}

impl Number for DualNumber {
    fn constant(value: f64) -> Self {
        Self {
            value,
            derivs: Vec::new(),
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn derivative(&self, dof: usize) -> f64 {
        self.derivs.get(dof).copied().unwrap_or(0.0)
    }

    fn sqrt(&self) -> Self {
        let v = self.value.sqrt();
        self.scaled(v, 0.5 / v)
    }

    fn exp(&self) -> Self {
        let v = self.value.exp();
        self.scaled(v, v)
    }

    fn ln(&self) -> Self {
        self.scaled(self.value.ln(), 1.0 / self.value)
    }

    fn powi(&self, n: i32) -> Self {
        if n == 0 {
            return Self::constant(1.0);
        }
        let v = self.value.powi(n);
        self.scaled(v, n as f64 * self.value.powi(n - 1))
    }

    fn powf(&self, p: f64) -> Self {
        let v = self.value.powf(p);
        self.scaled(v, p * self.value.powf(p - 1.0))
    }
}

/// Spatial gradient with three components; unused dimensions stay zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient<N>(pub [N; 3]);

/// Gradient of a plain `f64` field or shape function.
pub type RealGradient = Gradient<f64>;

impl<N: Number> Gradient<N> {
    pub fn zero() -> Self {
        Self(std::array::from_fn(|_| N::zero()))
    }

    pub fn from_real(g: &RealGradient) -> Self {
        Self(std::array::from_fn(|d| N::constant(g.0[d])))
    }

    pub fn component(&self, d: usize) -> &N {
        &self.0[d]
    }

    pub fn dot(&self, other: &Self) -> N {
        let mut acc = N::zero();
        for d in 0..3 {
            acc += self.0[d].clone() * other.0[d].clone();
        }
        acc
    }

    /// Dot product with a plain gradient (typically a test function's).
    pub fn dot_real(&self, other: &RealGradient) -> N {
        let mut acc = N::zero();
        for d in 0..3 {
            acc += self.0[d].clone() * other.0[d];
        }
        acc
    }

    pub fn scale(&self, s: &N) -> Self {
        Self(std::array::from_fn(|d| self.0[d].clone() * s.clone()))
    }

    /// `self += s * g`.
    pub fn add_scaled_real(&mut self, g: &RealGradient, s: &N) {
        for d in 0..3 {
            self.0[d] += s.clone() * g.0[d];
        }
    }

    pub fn norm_squared(&self) -> N {
        self.dot(self)
    }
}

impl<N: Number> Default for Gradient<N> {
    fn default() -> Self {
        Self::zero()
    }
}
