//! Mathematical utilities for the 2D covariance transform.
//!
//! The sky-to-image covariance chain is composed from three 2x2 matrices:
//! a per-exposure pixel-scale matrix D, a rotation R(pa) by position angle,
//! and a diagonal axis-ratio scale S(q). This module provides the named
//! constructors for R and S, their derivatives with respect to the shape
//! parameters, and a symmetric 2x2 inverse. Everything else (determinants,
//! traces, transposes, products) uses `nalgebra` operators directly.

use nalgebra::Matrix2;

/// 2x2 rotation matrix for a position angle `theta` (radians).
///
/// R = |  cos θ   -sin θ |
///     |  sin θ    cos θ |
pub fn rotation(theta: f32) -> Matrix2<f32> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// Derivative of `rotation` with respect to the angle.
pub fn rotation_deriv(theta: f32) -> Matrix2<f32> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(-s, -c, c, -s)
}

/// Diagonal axis-ratio scale matrix S(q) = diag(1/q, q).
///
/// `q` is the square root of the projected axis ratio b/a, so S stretches
/// one principal axis by 1/q and shrinks the other by q while preserving
/// area. The half-light radius then sets the overall size separately.
pub fn axis_ratio_scale(q: f32) -> Matrix2<f32> {
    Matrix2::new(1.0 / q, 0.0, 0.0, q)
}

/// Derivative of `axis_ratio_scale` with respect to q: diag(-1/q^2, 1).
pub fn axis_ratio_scale_deriv(q: f32) -> Matrix2<f32> {
    Matrix2::new(-1.0 / (q * q), 0.0, 0.0, 1.0)
}

/// Invert a symmetric 2x2 matrix, returning the inverse and the
/// determinant of the inverse.
///
/// For Σ = [[a, b], [b, c]]:
///   Σ⁻¹ = 1/det(Σ) * [[c, -b], [-b, a]],   det(Σ⁻¹) = 1/det(Σ)
///
/// The caller guarantees positive-definiteness; a degenerate input
/// propagates non-finite values rather than panicking.
pub fn symmetric_inverse(m: &Matrix2<f32>) -> (Matrix2<f32>, f32) {
    let a = m[(0, 0)];
    let b = m[(0, 1)];
    let c = m[(1, 1)];
    let inv_det = 1.0 / (a * c - b * b);
    let inv = Matrix2::new(c * inv_det, -b * inv_det, -b * inv_det, a * inv_det);
    (inv, inv_det)
}
