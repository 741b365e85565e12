//! Forward evaluation and the proposal driver.
//!
//! - `residual`: sum the image-plane Gaussians at a pixel and subtract from
//!   the observed value. No gradients here - see `diff` for those.
//! - `proposal`: the kernel driver. Per band, it walks the band's
//!   exposures, builds the convolved Gaussians, evaluates residual,
//!   chi-square, and the per-source gradient over every pixel, and reduces
//!   the results into one `BandResponse`.

pub mod proposal;
pub mod residual;

// Re-export
pub use proposal::{evaluate_proposal, evaluate_proposal_into, BandResponse};
pub use residual::{model_counts, residual_at};
