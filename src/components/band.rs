use log::{error, info};
use std::{fmt::Debug, io::SeekFrom};

use crate::{
    components::stream::{Access, RawStream, SharedStream, StreamOwnership},
    config::RawIoConfig,
    copy::{copy_samples, Run},
    errors::{RawsterioError, Result},
    sample::SampleType,
    swap::swap_samples,
};

#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("raster dimensions {width}x{height} are out of range")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("image offset, strides and dimensions address bytes before the file start")]
    OffsetUnderflow,
    #[error("image offset, strides and dimensions exceed the 64-bit file range")]
    OffsetOverflow,
    #[error("scanline of stride {pixel_stride} at width {width} overflows a 32-bit size")]
    LineTooLong { pixel_stride: i32, width: u32 },
    #[error("scanline {line} is outside a raster of height {height}")]
    LineOutOfBounds { line: u32, height: u32 },
    #[error("window {window:?} exceeds the raster extent {width}x{height}")]
    WindowOutOfBounds {
        window: crate::buffer::Window,
        width: u32,
        height: u32,
    },
    #[error("block buffer holds {len} bytes, scanline needs exactly {expected}")]
    BlockSizeMismatch { len: usize, expected: usize },
    #[error("dataset bands must agree on raster dimensions")]
    MismatchedBands,
    #[error("band index {index} is out of range")]
    BandOutOfRange { index: usize },
}

const MAX_DIMENSION: u32 = i32::MAX as u32;

/// Immutable on-disk geometry of one raw band.
///
/// `pixel_stride` may be negative (scanlines stored right-to-left) or
/// wider than one sample (pixel-interleaved layouts); `line_stride` may be
/// negative (bottom-up storage). `image_offset` is the absolute byte
/// position of pixel (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandGeometry {
    pub image_offset: u64,
    pub pixel_stride: i32,
    pub line_stride: i64,
    pub sample_type: SampleType,
    /// When false every sample is byte-swapped on its way in and out.
    pub native_order: bool,
    pub width: u32,
    pub height: u32,
}

impl BandGeometry {
    /// Bytes spanned by one scanline on disk.
    pub(crate) fn line_size(&self) -> usize {
        self.pixel_stride.unsigned_abs() as usize * (self.width as usize - 1)
            + self.sample_type.size()
    }

    /// Smallest byte offset any sample of the band touches.
    fn smallest_offset(&self) -> i128 {
        let px = i128::from(self.pixel_stride) * i128::from(self.width - 1);
        let ln = i128::from(self.line_stride) * i128::from(self.height - 1);
        self.image_offset as i128 + px.min(0) + ln.min(0)
    }

    /// One past the largest byte offset any sample of the band touches.
    fn largest_offset(&self) -> i128 {
        let px = i128::from(self.pixel_stride) * i128::from(self.width - 1);
        let ln = i128::from(self.line_stride) * i128::from(self.height - 1);
        self.image_offset as i128 + px.max(0) + ln.max(0) + self.sample_type.size() as i128
    }

    /// Proves, before any I/O, that no addressable sample can land outside
    /// the signed 64-bit file range.
    fn validate(&self) -> std::result::Result<(), GeometryError> {
        if self.width == 0
            || self.height == 0
            || self.width > MAX_DIMENSION
            || self.height > MAX_DIMENSION
        {
            return Err(GeometryError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.smallest_offset() < 0 {
            return Err(GeometryError::OffsetUnderflow);
        }
        if self.largest_offset() - 1 > i128::from(i64::MAX) {
            return Err(GeometryError::OffsetOverflow);
        }
        let line_span = i64::from(self.pixel_stride.unsigned_abs()) * i64::from(self.width - 1)
            + self.sample_type.size() as i64;
        if line_span > i64::from(i32::MAX) {
            return Err(GeometryError::LineTooLong {
                pixel_stride: self.pixel_stride,
                width: self.width,
            });
        }
        Ok(())
    }

    /// File offset of the leftmost byte of scanline `line`. Negative
    /// strides subtract; the construction invariants keep the result
    /// inside `[smallest_offset, largest_offset)`.
    pub(crate) fn line_start_offset(&self, line: u32) -> u64 {
        let mut offset =
            self.image_offset as i128 + i128::from(self.line_stride) * i128::from(line);
        if self.pixel_stride < 0 {
            offset += i128::from(self.pixel_stride) * i128::from(self.width - 1);
        }
        debug_assert!(offset >= 0);
        offset as u64
    }

    /// File offset of sample (`x`, `line`). Only meaningful on the
    /// direct-I/O path, where `pixel_stride >= 0`.
    pub(crate) fn sample_offset(&self, x: u32, line: u64) -> u64 {
        let offset = self.image_offset as i128
            + i128::from(self.line_stride) * line as i128
            + i128::from(self.pixel_stride) * i128::from(x);
        debug_assert!(offset >= 0);
        offset as u64
    }
}

/// Per-band one-scanline cache.
///
/// `start` is the byte offset inside `buffer` at which logical pixel
/// (0, y) resides: 0 for non-negative pixel strides, the last sample slot
/// for right-to-left scanlines. The buffer always holds native-order
/// bytes.
#[derive(Debug)]
pub(crate) struct LineCache {
    pub(crate) buffer: Vec<u8>,
    pub(crate) start: usize,
    /// Loaded scanline, -1 when nothing is resident.
    pub(crate) loaded: i64,
    /// A stream-level flush is pending; the bytes themselves are already
    /// written through.
    pub(crate) dirty: bool,
}

/// Allocates a zeroed buffer, surfacing allocation failure as an error
/// instead of aborting.
pub(crate) fn try_alloc(len: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RawsterioError::OutOfMemory(len))?;
    buffer.resize(len, 0);
    Ok(buffer)
}

impl LineCache {
    fn new(geometry: &BandGeometry) -> Result<Self> {
        let buffer = try_alloc(geometry.line_size())?;
        let start = if geometry.pixel_stride >= 0 {
            0
        } else {
            geometry.pixel_stride.unsigned_abs() as usize * (geometry.width as usize - 1)
        };
        Ok(Self {
            buffer,
            start,
            loaded: -1,
            dirty: false,
        })
    }
}

/// Palette interpretation of a band's samples; opaque to the I/O core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorInterpretation {
    #[default]
    Undefined,
    Gray,
    Palette,
    Red,
    Green,
    Blue,
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorEntry {
    pub red: i16,
    pub green: i16,
    pub blue: i16,
    pub alpha: i16,
}

#[derive(Debug, Clone, Default)]
pub struct ColorTable(pub Vec<ColorEntry>);

/// One channel of a raw-binary raster: the scanline cache, the block
/// reader/writer and the rectangular I/O entry point.
pub struct RawBand {
    pub(crate) stream: SharedStream,
    pub(crate) ownership: StreamOwnership,
    pub(crate) access: Access,
    /// Treat short reads past end of file as zeros (sparse formats).
    pub(crate) sparse_tolerant: bool,
    pub(crate) geometry: BandGeometry,
    pub(crate) config: RawIoConfig,
    pub(crate) line: LineCache,
    color_interpretation: ColorInterpretation,
    color_table: Option<ColorTable>,
    category_names: Vec<String>,
    nodata_value: Option<f64>,
}

impl Debug for RawBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBand")
            .field("geometry", &self.geometry)
            .field("access", &self.access)
            .field("ownership", &self.ownership)
            .field("loaded", &self.line.loaded)
            .field("dirty", &self.line.dirty)
            .finish()
    }
}

impl RawBand {
    /// Builds a band over a shared stream, validating the geometry and
    /// allocating the scanline cache up front. Invalid geometry never
    /// produces a band.
    pub fn new(
        stream: SharedStream,
        geometry: BandGeometry,
        access: Access,
        ownership: StreamOwnership,
        config: RawIoConfig,
    ) -> Result<Self> {
        geometry.validate()?;
        let line = LineCache::new(&geometry)?;
        let band = Self {
            stream,
            ownership,
            access,
            sparse_tolerant: false,
            geometry,
            config,
            line,
            color_interpretation: ColorInterpretation::default(),
            color_table: None,
            category_names: Vec::new(),
            nodata_value: None,
        };
        info!("new {band:?}");
        Ok(band)
    }

    /// Convenience constructor taking sole ownership of `stream`.
    pub fn with_stream(
        stream: impl RawStream + 'static,
        geometry: BandGeometry,
        access: Access,
        config: RawIoConfig,
    ) -> Result<Self> {
        Self::new(
            super::stream::shared(stream),
            geometry,
            access,
            StreamOwnership::Owned,
            config,
        )
    }

    /// Marks the band sparse-tolerant: reads beyond the physical end of
    /// the stream come back zero-filled instead of failing.
    pub fn sparse_tolerant(mut self, tolerant: bool) -> Self {
        self.sparse_tolerant = tolerant;
        self
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn sample_type(&self) -> SampleType {
        self.geometry.sample_type
    }

    pub fn geometry(&self) -> &BandGeometry {
        &self.geometry
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_sparse_tolerant(&self) -> bool {
        self.sparse_tolerant
    }

    /// Bytes of one tightly packed block row, the length `read_block` /
    /// `write_block` buffers must have.
    pub fn block_len(&self) -> usize {
        self.geometry.width as usize * self.geometry.sample_type.size()
    }

    pub(crate) fn sparse_read_ok(&self) -> bool {
        // Update-mode files may legitimately be shorter than the declared
        // geometry while they are being filled in.
        self.access == Access::Update || self.sparse_tolerant
    }

    /// Loads scanline `line` into the cache in native byte order.
    pub(crate) fn access_line(&mut self, line: u32) -> Result<()> {
        if self.line.loaded == i64::from(line) {
            return Ok(());
        }
        if self.line.dirty {
            self.flush()?;
        }
        // The buffer is about to be clobbered; a failed read must not
        // leave the old tag pointing at it.
        self.line.loaded = -1;

        let read_start = self.geometry.line_start_offset(line);
        let line_size = self.geometry.line_size();
        let mut stream = self.stream.borrow_mut();
        match stream.seek(SeekFrom::Start(read_start)) {
            Ok(_) => {}
            Err(source) => {
                if self.sparse_read_ok() {
                    self.line.buffer.fill(0);
                    self.line.loaded = i64::from(line);
                    return Ok(());
                }
                return Err(RawsterioError::Seek {
                    offset: read_start,
                    source,
                });
            }
        }

        let read = stream
            .read_fully(&mut self.line.buffer)
            .map_err(|source| RawsterioError::Read {
                offset: read_start,
                len: line_size,
                source,
            })?;
        drop(stream);
        if read < line_size {
            if !self.sparse_read_ok() {
                return Err(RawsterioError::ShortRead {
                    offset: read_start,
                    len: line_size,
                    read,
                });
            }
            self.line.buffer[read..].fill(0);
        }

        if !self.geometry.native_order {
            swap_samples(
                &mut self.line.buffer,
                self.geometry.sample_type,
                self.geometry.width as usize,
                self.geometry.pixel_stride.unsigned_abs() as usize,
            );
        }

        self.line.loaded = i64::from(line);
        Ok(())
    }

    /// Reads scanline `line` into `out`, tightly packed, native order.
    pub fn read_block(&mut self, line: u32, out: &mut [u8]) -> Result<()> {
        self.check_block(line, out.len())?;
        self.access_line(line)?;
        copy_samples(
            Run::new(
                &self.line.buffer,
                self.line.start,
                self.geometry.sample_type,
                self.geometry.pixel_stride as isize,
            ),
            Run::packed(out, self.geometry.sample_type),
            self.geometry.width as usize,
        );
        Ok(())
    }

    /// Writes scanline `line` from `data` (tightly packed, native order)
    /// through the cache to the stream.
    pub fn write_block(&mut self, line: u32, data: &[u8]) -> Result<()> {
        self.check_block(line, data.len())?;
        if self.access != Access::Update {
            return Err(RawsterioError::ReadOnly);
        }

        // A scanline shared with other bands must be pre-read so their
        // samples survive the write-back.
        if self.geometry.pixel_stride.unsigned_abs() as usize > self.geometry.sample_type.size() {
            self.access_line(line)?;
        }

        // The buffer is about to hold bytes the stream has not accepted.
        self.line.loaded = -1;

        copy_samples(
            Run::packed(data, self.geometry.sample_type),
            Run::new(
                &mut self.line.buffer,
                self.line.start,
                self.geometry.sample_type,
                self.geometry.pixel_stride as isize,
            ),
            self.geometry.width as usize,
        );

        let width = self.geometry.width as usize;
        let stride = self.geometry.pixel_stride.unsigned_abs() as usize;
        if !self.geometry.native_order {
            swap_samples(
                &mut self.line.buffer,
                self.geometry.sample_type,
                width,
                stride,
            );
        }

        let write_start = self.geometry.line_start_offset(line);
        let line_size = self.geometry.line_size();
        let result = {
            let mut stream = self.stream.borrow_mut();
            stream
                .seek(SeekFrom::Start(write_start))
                .map_err(|source| RawsterioError::Seek {
                    offset: write_start,
                    source,
                })
                .and_then(|_| {
                    stream
                        .write_fully(&self.line.buffer)
                        .map_err(|source| RawsterioError::Write {
                            offset: write_start,
                            source,
                        })
                })
                .and_then(|written| {
                    if written < line_size {
                        Err(RawsterioError::ShortWrite {
                            offset: write_start,
                            len: line_size,
                            written,
                        })
                    } else {
                        Ok(())
                    }
                })
        };

        // Back to native order so the cache stays coherent for reads.
        if !self.geometry.native_order {
            swap_samples(
                &mut self.line.buffer,
                self.geometry.sample_type,
                width,
                stride,
            );
        }

        // Retag the cache and mark the flush pending only once the write
        // has landed; a failed write must not masquerade as persisted.
        result.map(|()| {
            self.line.loaded = i64::from(line);
            self.line.dirty = true;
        })
    }

    /// Commits buffered stream writes. The bytes are already written
    /// through, so this only forces the stream flush; idempotent.
    pub fn flush(&mut self) -> Result<()> {
        if self.line.dirty {
            self.stream
                .borrow_mut()
                .flush()
                .map_err(RawsterioError::Flush)?;
            self.line.dirty = false;
        }
        Ok(())
    }

    fn check_block(&self, line: u32, len: usize) -> Result<()> {
        if line >= self.geometry.height {
            return Err(GeometryError::LineOutOfBounds {
                line,
                height: self.geometry.height,
            }
            .into());
        }
        let expected = self.block_len();
        if len != expected {
            return Err(GeometryError::BlockSizeMismatch { len, expected }.into());
        }
        Ok(())
    }

    pub fn color_interpretation(&self) -> ColorInterpretation {
        self.color_interpretation
    }

    pub fn set_color_interpretation(&mut self, interpretation: ColorInterpretation) {
        self.color_interpretation = interpretation;
    }

    pub fn color_table(&self) -> Option<&ColorTable> {
        self.color_table.as_ref()
    }

    pub fn set_color_table(&mut self, table: Option<ColorTable>) {
        self.color_table = table;
    }

    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    pub fn set_category_names(&mut self, names: Vec<String>) {
        self.category_names = names;
    }

    pub fn nodata_value(&self) -> Option<f64> {
        self.nodata_value
    }

    pub fn set_nodata_value(&mut self, value: Option<f64>) {
        self.nodata_value = value;
    }
}

impl Drop for RawBand {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("flush on band teardown failed: {e}");
        }
        if self.ownership == StreamOwnership::Owned {
            if let Err(e) = self.stream.borrow_mut().close() {
                error!("{}", RawsterioError::Close(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::stream::shared;
    use std::io::Cursor;

    fn u8_band(geometry: BandGeometry, bytes: Vec<u8>) -> RawBand {
        RawBand::new(
            shared(Cursor::new(bytes)),
            geometry,
            Access::Update,
            StreamOwnership::Owned,
            RawIoConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_zero_dimensions() {
        let geometry = BandGeometry {
            image_offset: 0,
            pixel_stride: 1,
            line_stride: 1,
            sample_type: SampleType::U8,
            native_order: true,
            width: 0,
            height: 1,
        };
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn rejects_negative_smallest_offset() {
        let geometry = BandGeometry {
            image_offset: 5,
            pixel_stride: 1,
            line_stride: -10,
            sample_type: SampleType::U8,
            native_order: true,
            width: 10,
            height: 2,
        };
        assert!(matches!(
            geometry.validate(),
            Err(GeometryError::OffsetUnderflow)
        ));
    }

    #[test]
    fn rejects_64bit_overflow() {
        let geometry = BandGeometry {
            image_offset: u64::MAX - 100,
            pixel_stride: 1,
            line_stride: 1000,
            sample_type: SampleType::U8,
            native_order: true,
            width: 100,
            height: 100,
        };
        assert!(matches!(
            geometry.validate(),
            Err(GeometryError::OffsetOverflow)
        ));
    }

    #[test]
    fn negative_line_stride_targets_image_offset_on_last_line() {
        let geometry = BandGeometry {
            image_offset: 30,
            pixel_stride: 1,
            line_stride: -10,
            sample_type: SampleType::U8,
            native_order: true,
            width: 10,
            height: 4,
        };
        geometry.validate().unwrap();
        assert_eq!(geometry.line_start_offset(3), 0);
        assert_eq!(geometry.line_start_offset(0), 30);
    }

    #[test]
    fn line_cache_start_for_negative_pixel_stride() {
        let geometry = BandGeometry {
            image_offset: 9,
            pixel_stride: -1,
            line_stride: 10,
            sample_type: SampleType::U8,
            native_order: true,
            width: 10,
            height: 1,
        };
        let cache = LineCache::new(&geometry).unwrap();
        assert_eq!(cache.buffer.len(), 10);
        assert_eq!(cache.start, 9);
        assert_eq!(geometry.line_start_offset(0), 0);
    }

    #[test]
    fn write_then_read_is_coherent_without_flush() {
        let geometry = BandGeometry {
            image_offset: 0,
            pixel_stride: 1,
            line_stride: 4,
            sample_type: SampleType::U8,
            native_order: true,
            width: 4,
            height: 2,
        };
        let mut band = u8_band(geometry, vec![0; 8]);
        band.write_block(1, &[7, 8, 9, 10]).unwrap();
        let mut out = [0u8; 4];
        band.read_block(1, &mut out).unwrap();
        assert_eq!(out, [7, 8, 9, 10]);
    }

    #[test]
    fn block_len_mismatch_is_rejected() {
        let geometry = BandGeometry {
            image_offset: 0,
            pixel_stride: 2,
            line_stride: 8,
            sample_type: SampleType::U16,
            native_order: true,
            width: 4,
            height: 2,
        };
        let mut band = u8_band(geometry, vec![0; 16]);
        let mut short = [0u8; 6];
        assert!(band.read_block(0, &mut short).is_err());
        let mut exact = [0u8; 8];
        assert!(band.read_block(0, &mut exact).is_ok());
    }
}
