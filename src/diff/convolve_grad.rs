//! Convolution of one source's Sersic component with one PSF component,
//! with the full Jacobian to sky parameters.
//!
//! Forward chain for a (source, PSF-component) pair:
//!   T = D R(pa) S(q)                     pixel-scale, rotation, axis-ratio
//!   Σ = covar T Tᵀ + Σ_psf               covar = rad2[bin], the Sersic variance
//!   F = Σ⁻¹
//!   μ = CW (ra - crval, dec - crval) + crpix + psf offset
//!   amp = flux G a_bin psf_amp √det(F) / 2π
//!
//! Derivatives use the matrix identities
//!   dΣ = covar (dT Tᵀ + T dTᵀ)
//!   dF = -F dΣ F
//!   d det(F) = det(F) tr(Σ dF)
//! with the amplitude partials factored so that zero flux and
//! zero-amplitude radial bins yield exact zeros rather than 0/0.

use nalgebra::{Matrix2, Vector2};

use crate::core::math::{
    axis_ratio_scale, axis_ratio_scale_deriv, rotation, rotation_deriv, symmetric_inverse,
};
use crate::core::{ImageGaussian, Patch, PsfGaussian, Source};

/// Build the image-plane Gaussian for one (source, PSF-component) pair.
///
/// `flux` is the source's flux through the exposure's band; `d` and `cw`
/// are the per-(exposure, source) astrometric matrices; `gain` converts
/// flux to counts.
#[allow(clippy::too_many_arguments)]
pub fn convolve_source_psf(
    source: &Source,
    flux: f32,
    d: &Matrix2<f32>,
    cw: &Matrix2<f32>,
    crpix: &Vector2<f32>,
    crval: &Vector2<f32>,
    gain: f32,
    rad2: &[f32],
    psf: &PsfGaussian,
) -> ImageGaussian {
    let r = rotation(source.pa);
    let s = axis_ratio_scale(source.q);
    let t = d * r * s;
    let dt_dq = d * r * axis_ratio_scale_deriv(source.q);
    let dt_dpa = d * rotation_deriv(source.pa) * s;

    let bin = psf.sersic_bin as usize;
    let covar = rad2[bin];

    // Image-plane mean: sky offset through the world-coordinate Jacobian,
    // plus the reference pixel and the PSF component offset.
    let sky = Vector2::new(source.ra - crval.x, source.dec - crval.y);
    let mean = cw * sky + crpix;
    let xcen = mean.x + psf.xcen;
    let ycen = mean.y + psf.ycen;

    // Total covariance: transformed Sersic component plus the PSF component.
    let sigma = (t * t.transpose()) * covar + Matrix2::new(psf.cxx, psf.cxy, psf.cxy, psf.cyy);
    let (f, detf) = symmetric_inverse(&sigma);

    let a_bin = source.mixture_amplitudes[bin];
    let norm = gain * psf.amp * detf.sqrt() * 0.5 * std::f32::consts::FRAC_1_PI;
    let amp = flux * a_bin * norm;

    let dsigma_dq = (dt_dq * t.transpose() + t * dt_dq.transpose()) * covar;
    let dsigma_dpa = (dt_dpa * t.transpose() + t * dt_dpa.transpose()) * covar;
    let df_dq = -(f * dsigma_dq * f);
    let df_dpa = -(f * dsigma_dpa * f);
    let ddetf_dq = detf * (sigma * df_dq).trace();
    let ddetf_dpa = detf * (sigma * df_dpa).trace();

    ImageGaussian {
        amp,
        xcen,
        ycen,
        fxx: f[(0, 0)],
        fyy: f[(1, 1)],
        fxy: f[(0, 1)],

        damp_dflux: a_bin * norm,
        damp_dq: amp * ddetf_dq / (2.0 * detf),
        damp_dpa: amp * ddetf_dpa / (2.0 * detf),
        damp_dsersic: flux * norm * source.damplitude_dsersic[bin],
        damp_drh: flux * norm * source.damplitude_drh[bin],

        dx_dra: cw[(0, 0)],
        dy_dra: cw[(1, 0)],
        dx_ddec: cw[(0, 1)],
        dy_ddec: cw[(1, 1)],

        dfxx_dq: df_dq[(0, 0)],
        dfyy_dq: df_dq[(1, 1)],
        dfxy_dq: df_dq[(0, 1)],
        dfxx_dpa: df_dpa[(0, 0)],
        dfyy_dpa: df_dpa[(1, 1)],
        dfxy_dpa: df_dpa[(0, 1)],
    }
}

/// Build the ImageGaussian list for one exposure, row-major over
/// `[source][psf-component]`. The pairing is independent per entry, so the
/// list order is fixed regardless of how callers parallelize.
pub fn image_gaussians_for_exposure(
    patch: &Patch,
    proposal: &[Source],
    e: usize,
    band: usize,
) -> Vec<ImageGaussian> {
    let psf = patch.exposure_psf(e, band);
    let mut out = Vec::with_capacity(proposal.len() * psf.len());
    for (s, source) in proposal.iter().enumerate() {
        let (d, cw) = patch.jacobians(e, s);
        for component in psf {
            out.push(convolve_source_psf(
                source,
                source.flux(band),
                d,
                cw,
                &patch.crpix[e],
                &patch.crval[e],
                patch.gain[e],
                &patch.rad2,
                component,
            ));
        }
    }
    out
}
