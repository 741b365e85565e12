//! Per-pixel derivatives of one Gaussian's counts, and the chain rule onto
//! sky parameters.
//!
//! Forward (see `ImageGaussian::counts`):
//!   C = amp * G * H
//!   G = exp(-0.5 * arg),  arg = dx*vx + dy*vy
//!   vx = fxx*dx + fxy*dy,  vy = fyy*dy + fxy*dx
//!   H = 1 + (vx^2 + vy^2 - fxx - fyy) / 24
//!
//! This module provides the six partials of C with respect to the
//! Gaussian's own image-plane parameters (amp, xcen, ycen, fxx, fyy, fxy),
//! including the H terms, and applies the stored Jacobian of those
//! parameters to accumulate one source's contribution to the seven-entry
//! sky-parameter gradient at one pixel.
//!
//! The partials are written division-free in amp and H, so zero-amplitude
//! Gaussians produce exact zeros.

use crate::core::limits::{MAX_EXP_ARG, NPARAMS};
use crate::core::ImageGaussian;

/// Value and image-plane partials of one Gaussian's counts at one pixel.
#[derive(Clone, Copy, Debug)]
pub struct PixelPartials {
    /// C = amp * G * H
    pub counts: f32,
    /// dC/d(amp) = G * H
    pub d_amp: f32,
    /// dC/d(xcen)
    pub d_x: f32,
    /// dC/d(ycen)
    pub d_y: f32,
    pub d_fxx: f32,
    pub d_fyy: f32,
    pub d_fxy: f32,
}

/// Evaluate one Gaussian at one pixel with its image-plane partials.
///
/// Returns `None` past the `MAX_EXP_ARG` skip threshold, where the
/// component contributes exactly zero.
pub fn pixel_partials(g: &ImageGaussian, xp: f32, yp: f32) -> Option<PixelPartials> {
    let dx = xp - g.xcen;
    let dy = yp - g.ycen;
    let vx = g.fxx * dx + g.fxy * dy;
    let vy = g.fyy * dy + g.fxy * dx;
    let arg = dx * vx + dy * vy;
    if arg >= MAX_EXP_ARG {
        return None;
    }

    let gauss = (-0.5 * arg).exp();
    let h = 1.0 + (vx * vx + vy * vy - g.fxx - g.fyy) / 24.0;
    let gh = gauss * h; // C / amp
    let c = g.amp * gh;
    let cg = g.amp * gauss; // C / H

    // Each partial carries a G-term (through arg) and an H-term (through
    // vx, vy and the -fxx - fyy correction).
    Some(PixelPartials {
        counts: c,
        d_amp: gh,
        d_x: c * vx - cg * (g.fxx * vx + g.fxy * vy) / 12.0,
        d_y: c * vy - cg * (g.fyy * vy + g.fxy * vx) / 12.0,
        d_fxx: -0.5 * c * dx * dx - cg * (1.0 - 2.0 * dx * vx) / 24.0,
        d_fyy: -0.5 * c * dy * dy - cg * (1.0 - 2.0 * dy * vy) / 24.0,
        d_fxy: -c * dx * dy + cg * (dy * vx + dx * vy) / 12.0,
    })
}

/// Accumulate one source's contribution to the sky-parameter gradient at
/// one pixel.
///
/// `gaussians` holds the source's ImageGaussians for the current exposure;
/// `scaled_residual` is residual * ierr^2. Entries of `acc` follow the
/// parameter order (flux, ra, dec, q, pa, sersic, rh).
pub fn accumulate_source_grads(
    gaussians: &[ImageGaussian],
    xp: f32,
    yp: f32,
    scaled_residual: f32,
    acc: &mut [f32; NPARAMS],
) {
    for g in gaussians {
        let Some(p) = pixel_partials(g, xp, yp) else {
            continue;
        };
        acc[0] += scaled_residual * g.damp_dflux * p.d_amp;
        acc[1] += scaled_residual * (g.dx_dra * p.d_x + g.dy_dra * p.d_y);
        acc[2] += scaled_residual * (g.dx_ddec * p.d_x + g.dy_ddec * p.d_y);
        acc[3] += scaled_residual
            * (g.damp_dq * p.d_amp
                + g.dfxx_dq * p.d_fxx
                + g.dfxy_dq * p.d_fxy
                + g.dfyy_dq * p.d_fyy);
        acc[4] += scaled_residual
            * (g.damp_dpa * p.d_amp
                + g.dfxx_dpa * p.d_fxx
                + g.dfxy_dpa * p.d_fxy
                + g.dfyy_dpa * p.d_fyy);
        acc[5] += scaled_residual * g.damp_dsersic * p.d_amp;
        acc[6] += scaled_residual * g.damp_drh * p.d_amp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_err(a: f32, b: f32) -> f32 {
        let denom = a.abs().max(b.abs()).max(1e-6);
        (a - b).abs() / denom
    }

    fn test_gaussian() -> ImageGaussian {
        ImageGaussian {
            amp: 1.3,
            xcen: 5.2,
            ycen: 4.7,
            fxx: 0.6,
            fyy: 0.45,
            fxy: 0.12,
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_matches_forward_evaluation() {
        let g = test_gaussian();
        let p = pixel_partials(&g, 6.0, 4.0).unwrap();
        assert!(rel_err(p.counts, g.counts(6.0, 4.0)) < 1e-6);
    }

    #[test]
    fn test_partials_match_finite_difference() {
        let g = test_gaussian();
        let (xp, yp) = (6.0f32, 4.0f32);
        let p = pixel_partials(&g, xp, yp).unwrap();
        let eps = 1e-3f32;

        let perturb: [(fn(&mut ImageGaussian, f32), f32); 6] = [
            (|g, e| g.amp += e, p.d_amp),
            (|g, e| g.xcen += e, p.d_x),
            (|g, e| g.ycen += e, p.d_y),
            (|g, e| g.fxx += e, p.d_fxx),
            (|g, e| g.fyy += e, p.d_fyy),
            (|g, e| g.fxy += e, p.d_fxy),
        ];
        for (set, analytic) in perturb {
            let mut plus = g;
            set(&mut plus, eps);
            let mut minus = g;
            set(&mut minus, -eps);
            let numeric =
                (plus.counts(xp, yp) as f64 - minus.counts(xp, yp) as f64) / (2.0 * eps as f64);
            assert!(
                rel_err(numeric as f32, analytic) < 1e-2,
                "numeric={numeric} analytic={analytic}"
            );
        }
    }

    #[test]
    fn test_skip_threshold_returns_none() {
        let mut g = test_gaussian();
        g.fxy = 0.0;
        g.fxx = 1.0;
        g.fyy = 1.0;
        assert!(pixel_partials(&g, g.xcen + 6.0, g.ycen).is_none());
        assert!(pixel_partials(&g, g.xcen + 5.99, g.ycen).is_some());
    }

    #[test]
    fn test_zero_amplitude_gives_zero_gradient_terms() {
        let mut g = test_gaussian();
        g.amp = 0.0;
        let p = pixel_partials(&g, 6.0, 4.0).unwrap();
        assert_eq!(p.counts, 0.0);
        assert_eq!(p.d_x, 0.0);
        assert_eq!(p.d_fxx, 0.0);
        // The amplitude direction stays live: G*H is amp independent.
        assert!(p.d_amp != 0.0);
    }
}
