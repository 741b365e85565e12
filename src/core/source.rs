//! Source representation: one active galaxy and its fitted parameters.
//!
//! A source is parameterized by:
//! - Sky position (ra, dec)
//! - Shape: axis ratio q, position angle pa
//! - Profile: Sersic index and half-light radius
//! - Per-band total fluxes
//!
//! The Sersic radial profile itself enters through a precomputed mixture:
//! one amplitude per radial bin, interpolated from a spline table on the
//! host, together with the amplitude derivatives with respect to the Sersic
//! index and the half-light radius. The kernel never evaluates the spline;
//! it only consumes these tabulated coefficients.

use serde::{Deserialize, Serialize};

use crate::core::limits::{MAX_BANDS, MAX_RADII};

/// One active galaxy. Seven sky parameters carry derivatives: flux (per
/// band), ra, dec, q, pa, sersic, rh.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Sky position
    pub ra: f32,
    pub dec: f32,

    /// Square root of the projected axis ratio b/a
    pub q: f32,

    /// Position angle (radians)
    pub pa: f32,

    /// Sersic index
    pub sersic: f32,

    /// Half-light radius
    pub rh: f32,

    /// Total flux through each band
    pub fluxes: [f32; MAX_BANDS],

    /// Sersic mixture amplitude per radial bin
    pub mixture_amplitudes: [f32; MAX_RADII],

    /// Derivative of each mixture amplitude with respect to the Sersic index
    pub damplitude_dsersic: [f32; MAX_RADII],

    /// Derivative of each mixture amplitude with respect to the half-light radius
    pub damplitude_drh: [f32; MAX_RADII],
}

impl Source {
    /// Flux through band `b`.
    pub fn flux(&self, b: usize) -> f32 {
        self.fluxes[b]
    }
}

impl Default for Source {
    fn default() -> Self {
        Self {
            ra: 0.0,
            dec: 0.0,
            q: 1.0,
            pa: 0.0,
            sersic: 1.0,
            rh: 1.0,
            fluxes: [0.0; MAX_BANDS],
            mixture_amplitudes: [0.0; MAX_RADII],
            damplitude_dsersic: [0.0; MAX_RADII],
            damplitude_drh: [0.0; MAX_RADII],
        }
    }
}
