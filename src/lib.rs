//! # sersic-rs: Forward-Modeling Galaxy Photometry in Rust
//!
//! This crate implements the numerical kernel of a forward-modeling galaxy
//! photometry engine. Each galaxy is represented as a mixture of concentric
//! 2D Gaussians (a Sersic-profile approximation), convolved with a
//! per-exposure Gaussian-mixture PSF and projected through a per-exposure
//! astrometric transform. Given a proposed set of on-sky source parameters,
//! the kernel computes the chi-square against observed pixel data across
//! many exposures and bands, together with the analytic gradient of that
//! chi-square with respect to every active source parameter.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - `core`: Fundamental data structures (patches, sources, Gaussians, math utilities)
//! - `diff`: Analytic derivative building blocks (convolution Jacobian, per-pixel partials)
//! - `eval`: Forward evaluation and the proposal driver
//! - `io`: Flat binary serialization of patches, proposals, and responses
//!
//! The kernel is a pure function of its inputs: it reads a prepared patch
//! (pixels, astrometry, PSF mixtures) and a proposal (active source
//! parameters), writes a residual image, and returns one chi-square and
//! gradient vector per band.

// Core data structures and math
pub mod core;

// Analytic derivative building blocks
pub mod diff;

// Forward evaluation and the proposal driver
pub mod eval;

// Flat binary serialization
pub mod io;

// Re-export commonly used types at crate root for convenience
pub use crate::core::{ImageGaussian, Patch, PatchBuilder, PatchError, PsfGaussian, Source};
pub use crate::eval::{evaluate_proposal, evaluate_proposal_into, BandResponse};
pub use crate::io::FormatError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
