//! Generic raw-binary raster access engine.
//!
//! Exposes a rectangular, multi-band image stored as raw samples in one
//! or more byte streams as a uniform random-access raster. A band is
//! described by its byte geometry alone (image offset, signed pixel and
//! line strides, sample type, byte order), so the same code serves
//! pixel-interleaved, line-interleaved and band-sequential files, stored
//! top-down or bottom-up, left-to-right or right-to-left.
//!
//! Reads and writes move either through a per-band one-scanline cache
//! ([RawBand::read_block] / [RawBand::write_block]) or, for large
//! contiguous requests, through a direct path issuing one stream I/O per
//! scanline ([RawBand::raster_io]). [RawDataset] routes interleaved
//! multi-band requests band by band, and reports the on-disk layout.
//! Format-specific header parsing is a caller concern: drivers construct
//! [BandGeometry] values, run [preflight] against the declared layout
//! and hand the bands a stream.
//!
//! ```no_run
//! use rawsterio::{Access, BandGeometry, RawBand, RawIoConfig, SampleType};
//! use std::fs::File;
//!
//! # fn main() -> rawsterio::Result<()> {
//! let file = File::open("image.bil").expect("raster payload");
//! let geometry = BandGeometry {
//!     image_offset: 0,
//!     pixel_stride: 2,
//!     line_stride: 2 * 512,
//!     sample_type: SampleType::U16,
//!     native_order: true,
//!     width: 512,
//!     height: 512,
//! };
//! let mut band = RawBand::with_stream(file, geometry, Access::ReadOnly, RawIoConfig::default())?;
//! let mut scanline = vec![0u8; band.block_len()];
//! band.read_block(0, &mut scanline)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod components;
pub mod config;
pub mod copy;
pub mod errors;
pub mod sample;
pub mod swap;

pub use buffer::{BufferError, BufferGeometry, Window};
pub use components::band::{
    BandGeometry, ColorEntry, ColorInterpretation, ColorTable, GeometryError, RawBand,
};
pub use components::dataset::RawDataset;
pub use components::direct::{IoOp, Progress, Resampling};
pub use components::layout::{Interleaving, RawBinaryLayout};
pub use components::preflight::{preflight, PreflightError, PreflightParams};
pub use components::stream::{shared, Access, RawStream, SharedStream, StreamOwnership};
pub use components::{BlockReader, BlockWriter};
pub use config::RawIoConfig;
pub use errors::{RawsterioError, Result};
pub use sample::{Sample, SampleType};
