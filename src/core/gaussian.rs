//! Gaussian mixture components: PSF records and convolved image-plane Gaussians.
//!
//! A `PsfGaussian` is one component of a per-exposure PSF mixture, in pixel
//! coordinates, paired with a specific Sersic radial bin. Convolving one
//! source's Sersic component with one PSF component (see
//! `diff::convolve_grad`) yields an `ImageGaussian`: the compact evaluation
//! record the per-pixel kernel consumes, carrying both the Gaussian's
//! image-plane parameters and its full Jacobian to sky parameters.

use serde::{Deserialize, Serialize};

use crate::core::limits::MAX_EXP_ARG;

/// One component of a point-spread-function mixture, in pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PsfGaussian {
    /// Mixture amplitude of this component
    pub amp: f32,

    /// Component mean, relative to the astrometric reference pixel
    pub xcen: f32,
    pub ycen: f32,

    /// Component covariance in pixel space
    pub cxx: f32,
    pub cxy: f32,
    pub cyy: f32,

    /// Index of the Sersic radial bin this component pairs with
    pub sersic_bin: u32,
}

/// A fully convolved image-plane Gaussian with its Jacobian to sky parameters.
///
/// The six evaluation parameters describe counts(x, y) = amp * G * H where
/// G = exp(-0.5 * d^T F d) and F = [[fxx, fxy], [fxy, fyy]] is the inverse
/// of the total (galaxy + PSF) covariance. The remaining fifteen fields are
/// the partial derivatives of (amp, xcen, ycen, fxx, fyy, fxy) with respect
/// to the seven sky parameters of the parent source, in the combinations
/// the chain rule in `diff::pixel_grad` consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageGaussian {
    // Gaussian parameters
    pub amp: f32,
    pub xcen: f32,
    pub ycen: f32,
    pub fxx: f32,
    pub fyy: f32,
    pub fxy: f32,

    // Amplitude partials
    pub damp_dflux: f32,
    pub damp_dq: f32,
    pub damp_dpa: f32,
    pub damp_dsersic: f32,
    pub damp_drh: f32,

    // Position partials (columns of the world-coordinate Jacobian)
    pub dx_dra: f32,
    pub dy_dra: f32,
    pub dx_ddec: f32,
    pub dy_ddec: f32,

    // Inverse-covariance partials
    pub dfxx_dq: f32,
    pub dfyy_dq: f32,
    pub dfxy_dq: f32,
    pub dfxx_dpa: f32,
    pub dfyy_dpa: f32,
    pub dfxy_dpa: f32,
}

impl ImageGaussian {
    /// Model counts this Gaussian contributes at pixel center (xp, yp).
    ///
    /// Components whose quadratic form reaches `MAX_EXP_ARG` contribute
    /// exactly zero. The factor H is the analytic second-order correction
    /// to the integral of the Gaussian over a unit pixel; it is valid
    /// where the Gaussian varies slowly across a pixel and is used
    /// unclamped even where a very broad or very sharp component drives it
    /// negative.
    pub fn counts(&self, xp: f32, yp: f32) -> f32 {
        let dx = xp - self.xcen;
        let dy = yp - self.ycen;
        let vx = self.fxx * dx + self.fxy * dy;
        let vy = self.fyy * dy + self.fxy * dx;
        let arg = dx * vx + dy * vy;
        if arg >= MAX_EXP_ARG {
            return 0.0;
        }
        let g = (-0.5 * arg).exp();
        let h = 1.0 + (vx * vx + vy * vy - self.fxx - self.fyy) / 24.0;
        self.amp * g * h
    }
}
