//! Gradient checking tests - the most important tests in the suite.
//!
//! These verify that the analytic chi-square gradient returned by
//! `evaluate_proposal` matches numerical gradients computed via symmetric
//! finite differences, for every sky parameter of every active source.
//!
//! The Sersic mixture amplitudes are kernel inputs, tabulated per source;
//! perturbing the Sersic index or the half-light radius therefore has to
//! re-tabulate them the way the host would. The tests use an amplitude
//! model that is linear in (sersic, rh) so its derivative tables are exact.
//!
//! Chi-square values for the differencing are accumulated in f64 from the
//! single-precision residual image, which keeps the subtraction noise well
//! below the finite-difference step.

use nalgebra::{Matrix2, Vector2};
use sersic_rs::core::Exposure;
use sersic_rs::{evaluate_proposal, Patch, PatchBuilder, PsfGaussian, Source};

const AMP_BASE: [f32; 2] = [0.55, 0.35];
const AMP_DN: [f32; 2] = [0.12, -0.08];
const AMP_DRH: [f32; 2] = [-0.30, 0.45];

fn rel_err(a: f64, b: f64) -> f64 {
    let denom = a.abs().max(b.abs()).max(1e-9);
    (a - b).abs() / denom
}

/// Tabulate the mixture amplitudes for the source's current (sersic, rh).
fn set_mixture(source: &mut Source) {
    for bin in 0..2 {
        source.mixture_amplitudes[bin] =
            AMP_BASE[bin] + AMP_DN[bin] * source.sersic + AMP_DRH[bin] * source.rh;
        source.damplitude_dsersic[bin] = AMP_DN[bin];
        source.damplitude_drh[bin] = AMP_DRH[bin];
    }
}

fn make_source(ra: f32, dec: f32, q: f32, pa: f32, sersic: f32, rh: f32, flux: f32) -> Source {
    let mut source = Source {
        ra,
        dec,
        q,
        pa,
        sersic,
        rh,
        ..Source::default()
    };
    source.fluxes[0] = flux;
    set_mixture(&mut source);
    source
}

fn two_component_psf() -> Vec<PsfGaussian> {
    vec![
        PsfGaussian {
            amp: 0.6,
            xcen: 0.2,
            ycen: -0.1,
            cxx: 1.1,
            cxy: 0.15,
            cyy: 0.9,
            sersic_bin: 0,
        },
        PsfGaussian {
            amp: 0.4,
            xcen: -0.3,
            ycen: 0.25,
            cxx: 2.0,
            cxy: -0.2,
            cyy: 1.6,
            sersic_bin: 1,
        },
    ]
}

fn grid_exposure(n_sources: usize) -> Exposure {
    let (nx, ny) = (15usize, 15usize);
    let mut xpix = Vec::with_capacity(nx * ny);
    let mut ypix = Vec::with_capacity(nx * ny);
    for y in 0..ny {
        for x in 0..nx {
            xpix.push(x as f32);
            ypix.push(y as f32);
        }
    }
    let d = Matrix2::new(1.05, 0.08, -0.04, 0.97);
    let cw = Matrix2::new(0.95, 0.12, -0.06, 1.02);
    Exposure {
        gain: 1.5,
        crpix: Vector2::new(7.0, 7.0),
        crval: Vector2::new(0.0, 0.0),
        d: vec![d; n_sources],
        cw: vec![cw; n_sources],
        psf: two_component_psf(),
        data: vec![0.0; nx * ny],
        ierr: vec![1.0; nx * ny],
        xpix,
        ypix,
    }
}

/// One band, one exposure, data synthesized from a "truth" scene that the
/// proposal does not match, so residuals and gradients are well away from
/// zero.
fn fixture(proposal: &[Source], truth: &[Source]) -> Patch {
    let mut builder = PatchBuilder::new(proposal.len(), vec![0.8, 2.0]);
    builder.start_band(2);
    builder.add_exposure(grid_exposure(proposal.len()));
    let mut patch = builder.finish().expect("valid patch");

    let (_, residual) = evaluate_proposal(&patch, truth);
    for (d, r) in patch.data.iter_mut().zip(&residual) {
        *d = -r;
    }
    patch
}

fn chi2_f64(patch: &Patch, proposal: &[Source]) -> f64 {
    let (_, residual) = evaluate_proposal(patch, proposal);
    patch
        .ierr
        .iter()
        .zip(&residual)
        .map(|(&ie, &r)| {
            let chi = r as f64 * ie as f64;
            chi * chi
        })
        .sum()
}

/// Return a copy of `proposal` with parameter `param` of source `s` moved
/// by `h`, re-tabulating the mixture amplitudes where the host would.
fn perturbed(proposal: &[Source], s: usize, param: usize, h: f32) -> Vec<Source> {
    let mut out = proposal.to_vec();
    let source = &mut out[s];
    match param {
        0 => source.fluxes[0] += h,
        1 => source.ra += h,
        2 => source.dec += h,
        3 => source.q += h,
        4 => source.pa += h,
        5 => {
            source.sersic += h;
            set_mixture(source);
        }
        6 => {
            source.rh += h;
            set_mixture(source);
        }
        _ => unreachable!(),
    }
    out
}

const PARAM_NAMES: [&str; 7] = ["flux", "ra", "dec", "q", "pa", "sersic", "rh"];

fn check_all_gradients(patch: &Patch, proposal: &[Source]) {
    let (response, _) = evaluate_proposal(patch, proposal);
    assert_eq!(response.len(), 1);
    let grads = &response[0].dchi2_dparam;

    let h = 5e-3f32;
    for s in 0..proposal.len() {
        for param in 0..7 {
            let plus = chi2_f64(patch, &perturbed(proposal, s, param, h));
            let minus = chi2_f64(patch, &perturbed(proposal, s, param, -h));
            let numeric = (plus - minus) / (2.0 * h as f64);
            let analytic = grads[s * 7 + param] as f64;
            let err = rel_err(numeric, analytic);
            assert!(
                err < 1e-2 || (numeric - analytic).abs() < 1e-3,
                "source {s} {}: numeric={numeric} analytic={analytic} rel_err={err}",
                PARAM_NAMES[param]
            );
        }
    }
}

#[test]
fn test_single_source_gradients_match_finite_differences() {
    let proposal = vec![make_source(0.4, -0.3, 0.75, 0.6, 2.0, 1.2, 20.0)];
    let truth = vec![make_source(0.7, -0.05, 0.85, 0.3, 1.7, 1.05, 23.0)];
    let patch = fixture(&proposal, &truth);
    check_all_gradients(&patch, &proposal);
}

#[test]
fn test_two_source_gradients_match_finite_differences() {
    let proposal = vec![
        make_source(0.4, -0.3, 0.75, 0.6, 2.0, 1.2, 20.0),
        make_source(-1.1, 0.8, 0.9, -0.4, 1.5, 0.9, 12.0),
    ];
    let truth = vec![
        make_source(0.55, -0.2, 0.8, 0.45, 1.8, 1.1, 18.0),
        make_source(-0.9, 0.95, 0.85, -0.25, 1.6, 1.0, 14.0),
    ];
    let patch = fixture(&proposal, &truth);
    check_all_gradients(&patch, &proposal);
}

#[test]
fn test_randomized_scene_gradients_match_finite_differences() {
    // A few seeded random scenes, to keep the check from overfitting to
    // hand-picked geometry.
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5EB5_1C2E);
    for _ in 0..3 {
        let mut random_source = |scale: f32| {
            make_source(
                rng.gen_range(-1.5..1.5),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(0.6..0.95),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(1.0..3.5),
                rng.gen_range(0.7..1.4),
                scale * rng.gen_range(8.0..25.0),
            )
        };
        let proposal = vec![random_source(1.0), random_source(1.0)];
        let truth = vec![random_source(1.1), random_source(0.9)];
        let patch = fixture(&proposal, &truth);
        check_all_gradients(&patch, &proposal);
    }
}

#[test]
fn test_gradient_is_zero_at_the_truth() {
    // When the proposal reproduces the data exactly, chi-square sits at its
    // minimum and every gradient component vanishes.
    let truth = vec![make_source(0.4, -0.3, 0.75, 0.6, 2.0, 1.2, 20.0)];
    let patch = fixture(&truth, &truth);
    let (response, _) = evaluate_proposal(&patch, &truth);
    assert!(response[0].chi2 < 1e-8, "chi2 = {}", response[0].chi2);
    for (i, g) in response[0].dchi2_dparam.iter().enumerate() {
        assert!(
            g.abs() < 1e-3,
            "gradient {} = {g} at the truth",
            PARAM_NAMES[i % 7]
        );
    }
}
