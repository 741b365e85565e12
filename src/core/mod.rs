//! Core data structures and mathematical operations.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Patch`: pixel data, astrometry, and PSF mixtures for one sky cutout
//! - `Source`: one active galaxy and its fitted parameters
//! - `PsfGaussian` / `ImageGaussian`: PSF mixture components and the
//!   convolved image-plane Gaussians they produce
//! - Math utilities: rotation and axis-ratio scale matrices, symmetric inverses
//!
//! All types here are "pure data" - no I/O, no evaluation logic.

mod gaussian;
pub mod limits;
pub mod math;
mod patch;
mod source;

// Re-export public types
pub use gaussian::{ImageGaussian, PsfGaussian};
pub use limits::{MAX_BANDS, MAX_EXP_ARG, MAX_RADII, MAX_SOURCES, NPARAMS, PIXEL_CHUNK};
pub use patch::{Exposure, Patch, PatchBuilder, PatchError};
pub use source::Source;
