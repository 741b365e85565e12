//! Patch: all pixel data, astrometry, and PSF mixtures for one sky cutout.
//!
//! A patch gathers every exposure, across every band, that overlaps a small
//! region of sky. The evaluation kernel treats it as read-only. Layout is
//! struct-of-arrays: pixels are flattened across exposures and addressed by
//! per-exposure (start, count) index pairs, and exposures are addressed the
//! same way per band. The per-(exposure, source) astrometric matrices D
//! (pixel scale) and CW (world-coordinate Jacobian) are stored row-major in
//! a single flat list.
//!
//! `PatchBuilder` assembles a patch band by band and exposure by exposure,
//! maintaining the index arrays so hand-built patches cannot go
//! inconsistent. `Patch::validate` checks every shape and bound invariant
//! the kernel relies on.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use crate::core::gaussian::PsfGaussian;
use crate::core::limits::{MAX_BANDS, MAX_RADII, MAX_SOURCES};

/// Errors reported by `Patch::validate` (and by the readers in `io::flat`).
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{array} has length {got}, expected {expected}")]
    ArrayLength {
        array: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("{count} {what} exceeds the limit of {limit}")]
    OverLimit {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("{what} range {start}..{end} exceeds the {len} available")]
    RangeOutOfBounds {
        what: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("exposure {exposure} is claimed by {claims} band ranges")]
    BandCoverage { exposure: usize, claims: usize },

    #[error("PSF component {index} references radial bin {bin}, but the patch has {n_radii} bins")]
    SersicBinOutOfRange { index: usize, bin: u32, n_radii: u32 },

    #[error("pixel {index} has negative inverse uncertainty {value}")]
    NegativeIerr { index: usize, value: f32 },

    #[error("non-finite value in {array} at index {index}")]
    NonFinite { array: &'static str, index: usize },
}

/// Read-only input describing one astronomical cutout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub n_bands: u32,
    pub n_sources: u32,
    pub n_radii: u32,

    /// Per-band range of exposure indices
    pub band_start: Vec<u32>,
    pub band_n: Vec<u32>,

    /// Per-band number of PSF components paired with each source
    pub n_psf_per_source: Vec<u32>,

    /// Per-exposure range of pixel indices
    pub exposure_start: Vec<u32>,
    pub exposure_n: Vec<u32>,

    /// Per-exposure offset into `psfgauss`
    pub psfgauss_start: Vec<u32>,

    /// Per-exposure photometric gain (flux-to-counts factor)
    pub gain: Vec<f32>,

    /// Per-exposure astrometric reference pixel and reference sky coordinates
    pub crpix: Vec<Vector2<f32>>,
    pub crval: Vec<Vector2<f32>>,

    /// Per-(exposure, source) pixel-scale matrices, `[e * n_sources + s]`
    pub d: Vec<Matrix2<f32>>,

    /// Per-(exposure, source) world-coordinate Jacobians, `[e * n_sources + s]`
    pub cw: Vec<Matrix2<f32>>,

    /// Pixel centers, flattened across exposures
    pub xpix: Vec<f32>,
    pub ypix: Vec<f32>,

    /// Observed flux and inverse uncertainty per pixel
    pub data: Vec<f32>,
    pub ierr: Vec<f32>,

    /// Squared Sersic-mixture radii, global to the patch
    pub rad2: Vec<f32>,

    /// PSF mixture components, addressed by `psfgauss_start`
    pub psfgauss: Vec<PsfGaussian>,
}

impl Patch {
    pub fn n_exposures(&self) -> usize {
        self.exposure_start.len()
    }

    pub fn n_pixels(&self) -> usize {
        self.xpix.len()
    }

    /// Exposure index range for band `b`.
    pub fn band_exposures(&self, b: usize) -> Range<usize> {
        let start = self.band_start[b] as usize;
        start..start + self.band_n[b] as usize
    }

    /// Pixel index range for exposure `e`.
    pub fn exposure_pixels(&self, e: usize) -> Range<usize> {
        let start = self.exposure_start[e] as usize;
        start..start + self.exposure_n[e] as usize
    }

    /// PSF components for exposure `e`, which belongs to band `band`.
    pub fn exposure_psf(&self, e: usize, band: usize) -> &[PsfGaussian] {
        let start = self.psfgauss_start[e] as usize;
        &self.psfgauss[start..start + self.n_psf_per_source[band] as usize]
    }

    /// Pixel-scale and world-coordinate Jacobians for (exposure, source).
    pub fn jacobians(&self, e: usize, s: usize) -> (&Matrix2<f32>, &Matrix2<f32>) {
        let idx = e * self.n_sources as usize + s;
        (&self.d[idx], &self.cw[idx])
    }

    /// Check every shape and bound invariant the kernel relies on.
    pub fn validate(&self) -> Result<(), PatchError> {
        let n_bands = self.n_bands as usize;
        let n_sources = self.n_sources as usize;
        let n_radii = self.n_radii as usize;

        check_limit("bands", n_bands, MAX_BANDS)?;
        check_limit("sources", n_sources, MAX_SOURCES)?;
        check_limit("radial bins", n_radii, MAX_RADII)?;

        check_len("band_start", self.band_start.len(), n_bands)?;
        check_len("band_n", self.band_n.len(), n_bands)?;
        check_len("n_psf_per_source", self.n_psf_per_source.len(), n_bands)?;

        let n_exposures = self.exposure_start.len();
        check_len("exposure_n", self.exposure_n.len(), n_exposures)?;
        check_len("psfgauss_start", self.psfgauss_start.len(), n_exposures)?;
        check_len("gain", self.gain.len(), n_exposures)?;
        check_len("crpix", self.crpix.len(), n_exposures)?;
        check_len("crval", self.crval.len(), n_exposures)?;
        check_len("d", self.d.len(), n_exposures * n_sources)?;
        check_len("cw", self.cw.len(), n_exposures * n_sources)?;

        let n_pixels = self.xpix.len();
        check_len("ypix", self.ypix.len(), n_pixels)?;
        check_len("data", self.data.len(), n_pixels)?;
        check_len("ierr", self.ierr.len(), n_pixels)?;
        check_len("rad2", self.rad2.len(), n_radii)?;

        // Every exposure must belong to exactly one band, so that its PSF
        // slice width n_psf_per_source[band] is well defined.
        let mut claims = vec![0usize; n_exposures];
        for b in 0..n_bands {
            let range = self.band_exposures(b);
            if range.end > n_exposures {
                return Err(PatchError::RangeOutOfBounds {
                    what: "band exposure",
                    start: range.start,
                    end: range.end,
                    len: n_exposures,
                });
            }
            for e in range {
                claims[e] += 1;
            }
        }
        if let Some(e) = claims.iter().position(|&c| c != 1) {
            return Err(PatchError::BandCoverage {
                exposure: e,
                claims: claims[e],
            });
        }

        for b in 0..n_bands {
            let n_psf = self.n_psf_per_source[b] as usize;
            for e in self.band_exposures(b) {
                let range = self.exposure_pixels(e);
                if range.end > n_pixels {
                    return Err(PatchError::RangeOutOfBounds {
                        what: "exposure pixel",
                        start: range.start,
                        end: range.end,
                        len: n_pixels,
                    });
                }
                let start = self.psfgauss_start[e] as usize;
                if start + n_psf > self.psfgauss.len() {
                    return Err(PatchError::RangeOutOfBounds {
                        what: "PSF component",
                        start,
                        end: start + n_psf,
                        len: self.psfgauss.len(),
                    });
                }
            }
        }

        for (i, psf) in self.psfgauss.iter().enumerate() {
            if psf.sersic_bin >= self.n_radii {
                return Err(PatchError::SersicBinOutOfRange {
                    index: i,
                    bin: psf.sersic_bin,
                    n_radii: self.n_radii,
                });
            }
            for (array, v) in [
                ("psfgauss.amp", psf.amp),
                ("psfgauss.xcen", psf.xcen),
                ("psfgauss.ycen", psf.ycen),
                ("psfgauss.cxx", psf.cxx),
                ("psfgauss.cxy", psf.cxy),
                ("psfgauss.cyy", psf.cyy),
            ] {
                if !v.is_finite() {
                    return Err(PatchError::NonFinite { array, index: i });
                }
            }
        }

        for (i, &v) in self.ierr.iter().enumerate() {
            if !v.is_finite() {
                return Err(PatchError::NonFinite {
                    array: "ierr",
                    index: i,
                });
            }
            if v < 0.0 {
                return Err(PatchError::NegativeIerr { index: i, value: v });
            }
        }
        check_finite("xpix", &self.xpix)?;
        check_finite("ypix", &self.ypix)?;
        check_finite("data", &self.data)?;
        check_finite("gain", &self.gain)?;
        check_finite("rad2", &self.rad2)?;
        for (array, mats) in [("d", &self.d), ("cw", &self.cw)] {
            if let Some(i) = mats.iter().position(|m| !m.iter().all(|v| v.is_finite())) {
                return Err(PatchError::NonFinite { array, index: i });
            }
        }

        Ok(())
    }
}

fn check_limit(what: &'static str, count: usize, limit: usize) -> Result<(), PatchError> {
    if count > limit {
        return Err(PatchError::OverLimit { what, count, limit });
    }
    Ok(())
}

fn check_len(array: &'static str, got: usize, expected: usize) -> Result<(), PatchError> {
    if got != expected {
        return Err(PatchError::ArrayLength {
            array,
            got,
            expected,
        });
    }
    Ok(())
}

fn check_finite(array: &'static str, values: &[f32]) -> Result<(), PatchError> {
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(PatchError::NonFinite { array, index });
    }
    Ok(())
}

/// One exposure's worth of data for `PatchBuilder::add_exposure`.
#[derive(Clone, Debug)]
pub struct Exposure {
    pub gain: f32,
    pub crpix: Vector2<f32>,
    pub crval: Vector2<f32>,

    /// One pixel-scale matrix per source
    pub d: Vec<Matrix2<f32>>,

    /// One world-coordinate Jacobian per source
    pub cw: Vec<Matrix2<f32>>,

    /// PSF mixture for this exposure; length must match the band's
    /// `n_psf_per_source`
    pub psf: Vec<PsfGaussian>,

    pub xpix: Vec<f32>,
    pub ypix: Vec<f32>,
    pub data: Vec<f32>,
    pub ierr: Vec<f32>,
}

/// Incremental patch assembly.
///
/// Bands are opened with `start_band` and exposures appended with
/// `add_exposure`; the builder maintains the flat index arrays. `finish`
/// runs `Patch::validate` before handing the patch out.
#[derive(Debug)]
pub struct PatchBuilder {
    patch: Patch,
    in_band: bool,
}

impl PatchBuilder {
    pub fn new(n_sources: usize, rad2: Vec<f32>) -> Self {
        let patch = Patch {
            n_sources: n_sources as u32,
            n_radii: rad2.len() as u32,
            rad2,
            ..Patch::default()
        };
        Self {
            patch,
            in_band: false,
        }
    }

    /// Open a new band whose exposures pair each source with
    /// `n_psf_per_source` PSF components.
    pub fn start_band(&mut self, n_psf_per_source: usize) -> &mut Self {
        self.patch.n_bands += 1;
        self.patch
            .band_start
            .push(self.patch.exposure_start.len() as u32);
        self.patch.band_n.push(0);
        self.patch.n_psf_per_source.push(n_psf_per_source as u32);
        self.in_band = true;
        self
    }

    /// Append one exposure to the currently open band.
    pub fn add_exposure(&mut self, exp: Exposure) -> &mut Self {
        assert!(self.in_band, "add_exposure called before start_band");
        let n_sources = self.patch.n_sources as usize;
        let n_psf = *self.patch.n_psf_per_source.last().unwrap() as usize;
        assert_eq!(exp.d.len(), n_sources, "one D matrix per source");
        assert_eq!(exp.cw.len(), n_sources, "one CW matrix per source");
        assert_eq!(exp.psf.len(), n_psf, "PSF mixture size fixed by the band");
        let n_pix = exp.xpix.len();
        assert_eq!(exp.ypix.len(), n_pix, "pixel arrays must agree in length");
        assert_eq!(exp.data.len(), n_pix, "pixel arrays must agree in length");
        assert_eq!(exp.ierr.len(), n_pix, "pixel arrays must agree in length");

        *self.patch.band_n.last_mut().unwrap() += 1;
        self.patch.exposure_start.push(self.patch.xpix.len() as u32);
        self.patch.exposure_n.push(n_pix as u32);
        self.patch
            .psfgauss_start
            .push(self.patch.psfgauss.len() as u32);
        self.patch.gain.push(exp.gain);
        self.patch.crpix.push(exp.crpix);
        self.patch.crval.push(exp.crval);
        self.patch.d.extend(exp.d);
        self.patch.cw.extend(exp.cw);
        self.patch.psfgauss.extend(exp.psf);
        self.patch.xpix.extend(exp.xpix);
        self.patch.ypix.extend(exp.ypix);
        self.patch.data.extend(exp.data);
        self.patch.ierr.extend(exp.ierr);
        self
    }

    /// Validate and return the assembled patch.
    pub fn finish(self) -> Result<Patch, PatchError> {
        self.patch.validate()?;
        log::debug!(
            "assembled patch: {} bands, {} exposures, {} pixels, {} PSF components",
            self.patch.n_bands,
            self.patch.n_exposures(),
            self.patch.n_pixels(),
            self.patch.psfgauss.len()
        );
        Ok(self.patch)
    }
}
