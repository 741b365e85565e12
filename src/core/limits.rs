//! Fixed sizing limits and kernel constants.
//!
//! The serialization records in `io::flat` bake `MAX_BANDS` and `MAX_RADII`
//! into their layout, so changing either is a wire-format change. `NPARAMS`
//! is entangled with the Jacobian layout of `ImageGaussian` and the chain
//! rule in `diff::pixel_grad`; it cannot be changed in isolation.

/// Maximum number of photometric bands in a patch.
pub const MAX_BANDS: usize = 30;

/// Maximum number of active sources in a proposal.
pub const MAX_SOURCES: usize = 30;

/// Number of on-sky parameters per source that yield derivatives:
/// flux, ra, dec, q, pa, sersic index, half-light radius.
pub const NPARAMS: usize = 7;

/// Maximum number of radial bins in a Sersic mixture.
pub const MAX_RADII: usize = 10;

/// Gaussians are treated as zero where the quadratic form Y in exp(-0.5*Y)
/// reaches this threshold. exp(-18) is about 1.5e-8, below modeling
/// tolerance.
pub const MAX_EXP_ARG: f32 = 36.0;

/// Number of pixels each parallel worker accumulates before its partial
/// sums enter the reduction tree. Fixing this width fixes the shape of the
/// reduction, which makes chi-square and gradient results bit-exact from
/// run to run on any thread count.
pub const PIXEL_CHUNK: usize = 32;
