//! The proposal driver: chi-square and its gradient for one proposed scene.
//!
//! Each band is reduced independently, mirroring the layout of the data
//! (bands share no exposures). Within a band, exposures are walked in
//! order; for each exposure the convolved ImageGaussians are built once,
//! then the exposure's pixels are striped across parallel workers in
//! fixed-width chunks. Every chunk writes its slice of the residual image
//! and produces a private partial accumulator; the partials are coadded in
//! chunk order.
//!
//! Fixing the chunk width (`PIXEL_CHUNK`) and the coadd order fixes the
//! shape of the floating-point reduction tree, so results are bit-exact
//! from run to run regardless of how many threads the pool schedules.
//! Changing `PIXEL_CHUNK` changes the tree and may move results at the
//! level of float rounding; the physical values are unaffected.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::limits::{NPARAMS, PIXEL_CHUNK};
use crate::core::{Patch, Source};
use crate::diff::convolve_grad::image_gaussians_for_exposure;
use crate::diff::pixel_grad::accumulate_source_grads;
use crate::eval::residual::residual_at;

/// Per-band output: chi-square and its gradient with respect to every
/// active source parameter. `dchi2_dparam` has `n_active * NPARAMS`
/// entries in `[source][param]` row order, with parameters ordered
/// (flux, ra, dec, q, pa, sersic, rh).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandResponse {
    pub chi2: f32,
    pub dchi2_dparam: Vec<f32>,
}

/// Partial reduction state for one worker.
struct Accumulator {
    chi2: f32,
    dchi2: Vec<f32>,
}

impl Accumulator {
    fn zeros(n_active: usize) -> Self {
        Self {
            chi2: 0.0,
            dchi2: vec![0.0; n_active * NPARAMS],
        }
    }

    fn coadd(&mut self, other: &Accumulator) {
        self.chi2 += other.chi2;
        for (a, b) in self.dchi2.iter_mut().zip(&other.dchi2) {
            *a += b;
        }
    }
}

/// Evaluate a proposal, writing the residual image into `residual` and
/// returning one `BandResponse` per band.
///
/// `residual` must hold exactly `patch.n_pixels()` entries; it is the only
/// buffer the kernel writes. The pixel sums accumulate
/// `∂model/∂θ · residual · ierr²`, which is −½ of the chi-square gradient;
/// the factor −2 is applied at write-out so `dchi2_dparam` is ∂chi²/∂θ.
///
/// The kernel is total on a validated patch: pixels with zero inverse
/// uncertainty contribute nothing, and components are skipped once their
/// exponential argument passes `MAX_EXP_ARG`.
pub fn evaluate_proposal_into(
    patch: &Patch,
    proposal: &[Source],
    residual: &mut [f32],
) -> Vec<BandResponse> {
    assert_eq!(
        residual.len(),
        patch.n_pixels(),
        "residual buffer must cover every patch pixel"
    );
    let n_active = proposal.len();
    if n_active == 0 {
        log::warn!("evaluating a proposal with no active sources");
    }

    let mut responses = Vec::with_capacity(patch.n_bands as usize);
    for band in 0..patch.n_bands as usize {
        let n_psf = patch.n_psf_per_source[band] as usize;
        let mut band_acc = Accumulator::zeros(n_active);

        for e in patch.band_exposures(band) {
            let gaussians = image_gaussians_for_exposure(patch, proposal, e, band);
            let pixels = patch.exposure_pixels(e);
            let xpix = &patch.xpix[pixels.clone()];
            let ypix = &patch.ypix[pixels.clone()];
            let data = &patch.data[pixels.clone()];
            let ierr = &patch.ierr[pixels.clone()];

            let partials: Vec<Accumulator> = residual[pixels]
                .par_chunks_mut(PIXEL_CHUNK)
                .enumerate()
                .map(|(chunk, out)| {
                    let lo = chunk * PIXEL_CHUNK;
                    let mut acc = Accumulator::zeros(n_active);
                    for (i, r_out) in out.iter_mut().enumerate() {
                        let p = lo + i;
                        let r = residual_at(&gaussians, xpix[p], ypix[p], data[p]);
                        *r_out = r;

                        let chi = r * ierr[p];
                        acc.chi2 += chi * chi;

                        let scaled = chi * ierr[p];
                        if scaled != 0.0 {
                            for s in 0..n_active {
                                let mut dp = [0.0f32; NPARAMS];
                                accumulate_source_grads(
                                    &gaussians[s * n_psf..(s + 1) * n_psf],
                                    xpix[p],
                                    ypix[p],
                                    scaled,
                                    &mut dp,
                                );
                                for (a, d) in
                                    acc.dchi2[s * NPARAMS..(s + 1) * NPARAMS].iter_mut().zip(dp)
                                {
                                    *a += d;
                                }
                            }
                        }
                    }
                    acc
                })
                .collect();

            // Chunk order is fixed, so this coadd is the same tree every run.
            for p in &partials {
                band_acc.coadd(p);
            }
        }

        responses.push(BandResponse {
            chi2: band_acc.chi2,
            dchi2_dparam: band_acc.dchi2.iter().map(|g| -2.0 * g).collect(),
        });
    }
    responses
}

/// Convenience wrapper that allocates the residual buffer.
pub fn evaluate_proposal(patch: &Patch, proposal: &[Source]) -> (Vec<BandResponse>, Vec<f32>) {
    let mut residual = vec![0.0f32; patch.n_pixels()];
    let responses = evaluate_proposal_into(patch, proposal, &mut residual);
    (responses, residual)
}
