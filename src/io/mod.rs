//! I/O operations for loading and saving kernel buffers.
//!
//! One flat binary format covers the three buffer kinds the kernel
//! exchanges with its callers: patches (pixel data, astrometry, PSF
//! mixtures), proposals (active source parameters), and responses
//! (per-band chi-square and gradient).

mod flat;

// Re-export public types and functions
pub use flat::{
    load_patch, load_proposal, load_response, read_patch, read_proposal, read_response,
    save_patch, save_proposal, save_response, write_patch, write_proposal, write_response,
    FormatError,
};
