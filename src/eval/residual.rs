//! Residual evaluation: observed pixel value minus the model sum.

use crate::core::ImageGaussian;

/// Total model counts at pixel center (xp, yp): the sum over every
/// ImageGaussian of every active source for the current exposure.
pub fn model_counts(gaussians: &[ImageGaussian], xp: f32, yp: f32) -> f32 {
    gaussians.iter().map(|g| g.counts(xp, yp)).sum()
}

/// Residual at one pixel: data - model.
pub fn residual_at(gaussians: &[ImageGaussian], xp: f32, yp: f32, data: f32) -> f32 {
    data - model_counts(gaussians, xp, yp)
}
