//! Analytic derivative building blocks.
//!
//! Each submodule pairs a forward operation with its partial derivatives:
//! - `convolve_grad`: sky parameters -> image-plane Gaussian, with the full
//!   Jacobian of the Gaussian's amplitude, center, and inverse covariance
//! - `pixel_grad`: image-plane Gaussian -> per-pixel counts, with the chain
//!   rule back onto the seven sky parameters

pub mod convolve_grad;
pub mod pixel_grad;

pub use convolve_grad::{convolve_source_psf, image_gaussians_for_exposure};
pub use pixel_grad::{accumulate_source_grads, pixel_partials, PixelPartials};
