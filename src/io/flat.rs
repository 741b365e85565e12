//! Flat little-endian serialization of patches, proposals, and responses.
//!
//! All values are single-precision floats or 32-bit unsigned integers, in
//! little-endian order. Serializing and deserializing any of the three
//! buffers is the identity.
//!
//! Layout:
//! ```text
//! Patch:
//!   Header (6 x u32): n_bands, n_sources, n_radii,
//!                     n_exposures, n_pixels, n_psfgauss
//!   Per band:     band_start[], band_n[], n_psf_per_source[]   (u32 each)
//!   Per exposure: exposure_start[], exposure_n[], psfgauss_start[] (u32),
//!                 gain[], crpix[][2], crval[][2]                 (f32)
//!   Per pixel:    xpix[], ypix[], data[], ierr[], residual[]     (f32)
//!   PSF records:  amp, xcen, ycen, cxx, cxy, cyy (f32), sersic_bin (u32)
//!   Jacobians:    D[] then CW[], 4 f32 each, row-major,
//!                 n_exposures * n_sources entries apiece
//!   Radii:        rad2[] (f32, n_radii entries)
//!
//! Proposal:
//!   u32 count, then per source: ra, dec, q, pa, sersic, rh,
//!   fluxes[MAX_BANDS], mixture_amplitudes[MAX_RADII],
//!   damplitude_dsersic[MAX_RADII], damplitude_drh[MAX_RADII]  (all f32)
//!
//! Response:
//!   u32 n_bands, u32 n_active, then per band: chi2 followed by
//!   n_active * NPARAMS gradient floats in [source][param] row order
//! ```
//!
//! The residual image travels with the patch buffer but is kept out of the
//! in-memory `Patch` (the kernel takes it as a separate mutable slice), so
//! the patch functions read and write the pair.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use nalgebra::{Matrix2, Vector2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::core::limits::{MAX_BANDS, MAX_RADII, MAX_SOURCES, NPARAMS};
use crate::core::{Patch, PatchError, PsfGaussian, Source};
use crate::eval::BandResponse;

/// Errors from reading or writing the flat buffers.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{count} {what} exceeds the serializable limit of {limit}")]
    OverLimit {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("invalid patch: {0}")]
    InvalidPatch(#[from] PatchError),

    #[error("inconsistent buffer: {0}")]
    Inconsistent(String),
}

fn check_limit(what: &'static str, count: usize, limit: usize) -> Result<(), FormatError> {
    if count > limit {
        return Err(FormatError::OverLimit { what, count, limit });
    }
    Ok(())
}

// Small typed helpers over byteorder; everything below is expressed in
// terms of these.

fn write_u32s<W: Write>(w: &mut W, values: &[u32]) -> Result<(), FormatError> {
    for &v in values {
        w.write_u32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn read_u32s<R: Read>(r: &mut R, n: usize) -> Result<Vec<u32>, FormatError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(r.read_u32::<LittleEndian>()?);
    }
    Ok(out)
}

fn write_f32s<W: Write>(w: &mut W, values: &[f32]) -> Result<(), FormatError> {
    for &v in values {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn read_f32s<R: Read>(r: &mut R, n: usize) -> Result<Vec<f32>, FormatError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(r.read_f32::<LittleEndian>()?);
    }
    Ok(out)
}

fn write_vec2s<W: Write>(w: &mut W, values: &[Vector2<f32>]) -> Result<(), FormatError> {
    for v in values {
        w.write_f32::<LittleEndian>(v.x)?;
        w.write_f32::<LittleEndian>(v.y)?;
    }
    Ok(())
}

fn read_vec2s<R: Read>(r: &mut R, n: usize) -> Result<Vec<Vector2<f32>>, FormatError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let x = r.read_f32::<LittleEndian>()?;
        let y = r.read_f32::<LittleEndian>()?;
        out.push(Vector2::new(x, y));
    }
    Ok(out)
}

fn write_mat2s<W: Write>(w: &mut W, values: &[Matrix2<f32>]) -> Result<(), FormatError> {
    for m in values {
        write_f32s(w, &[m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]])?;
    }
    Ok(())
}

fn read_mat2s<R: Read>(r: &mut R, n: usize) -> Result<Vec<Matrix2<f32>>, FormatError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let v = read_f32s(r, 4)?;
        out.push(Matrix2::new(v[0], v[1], v[2], v[3]));
    }
    Ok(out)
}

/// Write a patch and its residual image.
pub fn write_patch<W: Write>(
    w: &mut W,
    patch: &Patch,
    residual: &[f32],
) -> Result<(), FormatError> {
    patch.validate()?;
    if residual.len() != patch.n_pixels() {
        return Err(FormatError::Inconsistent(format!(
            "residual has {} entries for {} pixels",
            residual.len(),
            patch.n_pixels()
        )));
    }

    let n_exposures = patch.n_exposures();
    write_u32s(
        w,
        &[
            patch.n_bands,
            patch.n_sources,
            patch.n_radii,
            n_exposures as u32,
            patch.n_pixels() as u32,
            patch.psfgauss.len() as u32,
        ],
    )?;

    write_u32s(w, &patch.band_start)?;
    write_u32s(w, &patch.band_n)?;
    write_u32s(w, &patch.n_psf_per_source)?;

    write_u32s(w, &patch.exposure_start)?;
    write_u32s(w, &patch.exposure_n)?;
    write_u32s(w, &patch.psfgauss_start)?;
    write_f32s(w, &patch.gain)?;
    write_vec2s(w, &patch.crpix)?;
    write_vec2s(w, &patch.crval)?;

    write_f32s(w, &patch.xpix)?;
    write_f32s(w, &patch.ypix)?;
    write_f32s(w, &patch.data)?;
    write_f32s(w, &patch.ierr)?;
    write_f32s(w, residual)?;

    for psf in &patch.psfgauss {
        write_f32s(
            w,
            &[psf.amp, psf.xcen, psf.ycen, psf.cxx, psf.cxy, psf.cyy],
        )?;
        w.write_u32::<LittleEndian>(psf.sersic_bin)?;
    }

    write_mat2s(w, &patch.d)?;
    write_mat2s(w, &patch.cw)?;
    write_f32s(w, &patch.rad2)?;
    Ok(())
}

/// Read a patch and its residual image. The patch is validated before it
/// is returned.
pub fn read_patch<R: Read>(r: &mut R) -> Result<(Patch, Vec<f32>), FormatError> {
    let header = read_u32s(r, 6)?;
    let (n_bands, n_sources, n_radii) = (header[0], header[1], header[2]);
    let n_exposures = header[3] as usize;
    let n_pixels = header[4] as usize;
    let n_psfgauss = header[5] as usize;

    check_limit("bands", n_bands as usize, MAX_BANDS)?;
    check_limit("sources", n_sources as usize, MAX_SOURCES)?;
    check_limit("radial bins", n_radii as usize, MAX_RADII)?;

    let band_start = read_u32s(r, n_bands as usize)?;
    let band_n = read_u32s(r, n_bands as usize)?;
    let n_psf_per_source = read_u32s(r, n_bands as usize)?;

    let exposure_start = read_u32s(r, n_exposures)?;
    let exposure_n = read_u32s(r, n_exposures)?;
    let psfgauss_start = read_u32s(r, n_exposures)?;
    let gain = read_f32s(r, n_exposures)?;
    let crpix = read_vec2s(r, n_exposures)?;
    let crval = read_vec2s(r, n_exposures)?;

    let xpix = read_f32s(r, n_pixels)?;
    let ypix = read_f32s(r, n_pixels)?;
    let data = read_f32s(r, n_pixels)?;
    let ierr = read_f32s(r, n_pixels)?;
    let residual = read_f32s(r, n_pixels)?;

    let mut psfgauss = Vec::with_capacity(n_psfgauss);
    for _ in 0..n_psfgauss {
        let v = read_f32s(r, 6)?;
        let sersic_bin = r.read_u32::<LittleEndian>()?;
        psfgauss.push(PsfGaussian {
            amp: v[0],
            xcen: v[1],
            ycen: v[2],
            cxx: v[3],
            cxy: v[4],
            cyy: v[5],
            sersic_bin,
        });
    }

    let d = read_mat2s(r, n_exposures * n_sources as usize)?;
    let cw = read_mat2s(r, n_exposures * n_sources as usize)?;
    let rad2 = read_f32s(r, n_radii as usize)?;

    let patch = Patch {
        n_bands,
        n_sources,
        n_radii,
        band_start,
        band_n,
        n_psf_per_source,
        exposure_start,
        exposure_n,
        psfgauss_start,
        gain,
        crpix,
        crval,
        d,
        cw,
        xpix,
        ypix,
        data,
        ierr,
        rad2,
        psfgauss,
    };
    patch.validate()?;
    Ok((patch, residual))
}

/// Write a proposal: the array of active sources.
pub fn write_proposal<W: Write>(w: &mut W, proposal: &[Source]) -> Result<(), FormatError> {
    check_limit("active sources", proposal.len(), MAX_SOURCES)?;
    w.write_u32::<LittleEndian>(proposal.len() as u32)?;
    for s in proposal {
        write_f32s(w, &[s.ra, s.dec, s.q, s.pa, s.sersic, s.rh])?;
        write_f32s(w, &s.fluxes)?;
        write_f32s(w, &s.mixture_amplitudes)?;
        write_f32s(w, &s.damplitude_dsersic)?;
        write_f32s(w, &s.damplitude_drh)?;
    }
    Ok(())
}

/// Read a proposal.
pub fn read_proposal<R: Read>(r: &mut R) -> Result<Vec<Source>, FormatError> {
    let n_active = r.read_u32::<LittleEndian>()? as usize;
    check_limit("active sources", n_active, MAX_SOURCES)?;
    let mut out = Vec::with_capacity(n_active);
    for _ in 0..n_active {
        let head = read_f32s(r, 6)?;
        let mut source = Source {
            ra: head[0],
            dec: head[1],
            q: head[2],
            pa: head[3],
            sersic: head[4],
            rh: head[5],
            ..Source::default()
        };
        source.fluxes.copy_from_slice(&read_f32s(r, MAX_BANDS)?);
        source
            .mixture_amplitudes
            .copy_from_slice(&read_f32s(r, MAX_RADII)?);
        source
            .damplitude_dsersic
            .copy_from_slice(&read_f32s(r, MAX_RADII)?);
        source
            .damplitude_drh
            .copy_from_slice(&read_f32s(r, MAX_RADII)?);
        out.push(source);
    }
    Ok(out)
}

/// Write a response: one chi-square and gradient block per band.
pub fn write_response<W: Write>(w: &mut W, response: &[BandResponse]) -> Result<(), FormatError> {
    check_limit("bands", response.len(), MAX_BANDS)?;
    let n_active = match response.first() {
        Some(band) => band.dchi2_dparam.len() / NPARAMS,
        None => 0,
    };
    for (b, band) in response.iter().enumerate() {
        if band.dchi2_dparam.len() != n_active * NPARAMS {
            return Err(FormatError::Inconsistent(format!(
                "band {b} carries {} gradient entries, expected {}",
                band.dchi2_dparam.len(),
                n_active * NPARAMS
            )));
        }
    }

    write_u32s(w, &[response.len() as u32, n_active as u32])?;
    for band in response {
        w.write_f32::<LittleEndian>(band.chi2)?;
        write_f32s(w, &band.dchi2_dparam)?;
    }
    Ok(())
}

/// Read a response.
pub fn read_response<R: Read>(r: &mut R) -> Result<Vec<BandResponse>, FormatError> {
    let n_bands = r.read_u32::<LittleEndian>()? as usize;
    let n_active = r.read_u32::<LittleEndian>()? as usize;
    check_limit("bands", n_bands, MAX_BANDS)?;
    check_limit("active sources", n_active, MAX_SOURCES)?;
    let mut out = Vec::with_capacity(n_bands);
    for _ in 0..n_bands {
        let chi2 = r.read_f32::<LittleEndian>()?;
        let dchi2_dparam = read_f32s(r, n_active * NPARAMS)?;
        out.push(BandResponse { chi2, dchi2_dparam });
    }
    Ok(out)
}

/// Save a patch and residual image to a file.
pub fn save_patch(path: &Path, patch: &Patch, residual: &[f32]) -> Result<(), FormatError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_patch(&mut w, patch, residual)
}

/// Load a patch and residual image from a file.
pub fn load_patch(path: &Path) -> Result<(Patch, Vec<f32>), FormatError> {
    let mut r = BufReader::new(File::open(path)?);
    let (patch, residual) = read_patch(&mut r)?;
    log::debug!(
        "loaded patch from {}: {} bands, {} exposures, {} pixels",
        path.display(),
        patch.n_bands,
        patch.n_exposures(),
        patch.n_pixels()
    );
    Ok((patch, residual))
}

/// Save a proposal to a file.
pub fn save_proposal(path: &Path, proposal: &[Source]) -> Result<(), FormatError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_proposal(&mut w, proposal)
}

/// Load a proposal from a file.
pub fn load_proposal(path: &Path) -> Result<Vec<Source>, FormatError> {
    let mut r = BufReader::new(File::open(path)?);
    read_proposal(&mut r)
}

/// Save a response to a file.
pub fn save_response(path: &Path, response: &[BandResponse]) -> Result<(), FormatError> {
    let mut w = BufWriter::new(File::create(path)?);
    write_response(&mut w, response)
}

/// Load a response from a file.
pub fn load_response(path: &Path) -> Result<Vec<BandResponse>, FormatError> {
    let mut r = BufReader::new(File::open(path)?);
    read_response(&mut r)
}
