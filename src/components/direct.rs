//! Rectangular random-access I/O over a band, bypassing the scanline
//! cache for large contiguous requests.

use log::debug;
use ndarray::Array2;
use std::io::SeekFrom;

use crate::{
    buffer::{BufferGeometry, Window},
    components::{
        band::{try_alloc, GeometryError, RawBand},
        stream::Access,
    },
    copy::{copy_samples, Run},
    errors::{RawsterioError, Result},
    sample::Sample,
    swap::swap_samples,
};

/// Direction of a rectangular I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

/// Resampling applied when the window and buffer shapes differ. Only
/// nearest-neighbour is implemented; everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    Average,
}

/// Progress callback: receives the completed fraction, returns false to
/// cancel between scanlines.
pub type Progress<'a> = &'a mut dyn FnMut(f64) -> bool;

/// Reborrows a [Progress] callback for a shorter lifetime than the one
/// it was originally handed with. `Option::as_deref_mut` can't do this
/// directly: the trait object's implicit lifetime bound is invariant
/// and tied to the original borrow, so reusing it across branches or
/// loop iterations within the same function needs this explicit
/// function-boundary reborrow instead.
pub(crate) fn reborrow_progress<'a>(progress: &'a mut Option<Progress<'_>>) -> Option<Progress<'a>> {
    match progress {
        Some(report) => Some(&mut **report),
        None => None,
    }
}

// Direct I/O is worthwhile once a scanline is this long...
const DIRECT_IO_LINE_BYTES: usize = 50_000;
// ...and the request covers under 40% of it (2/5).
const DIRECT_IO_WIDTH_NUM: usize = 2;
const DIRECT_IO_WIDTH_DEN: usize = 5;
// A request with more than 5% of its scanlines already cached reads
// cheaper through the cache.
const CACHED_LINES_DEN: u32 = 20;

impl RawBand {
    /// Decides whether a request takes the direct path: never for
    /// right-to-left scanlines or non-nearest resampling; otherwise per
    /// the `one_big_read` override, falling back to the
    /// long-scanline/narrow-window/cold-cache heuristic.
    pub(crate) fn can_use_direct_io(&self, window: &Window, resampling: Resampling) -> bool {
        if self.geometry.pixel_stride < 0 || resampling != Resampling::Nearest {
            return false;
        }
        match self.config.one_big_read {
            Some(forced) => forced,
            None => {
                let line_size = self.geometry.line_size();
                if line_size < DIRECT_IO_LINE_BYTES {
                    return false;
                }
                let pixels_per_line = line_size / self.geometry.pixel_stride as usize;
                if window.width as usize > pixels_per_line / DIRECT_IO_WIDTH_DEN * DIRECT_IO_WIDTH_NUM
                {
                    return false;
                }
                !self.significant_lines_cached(window.y_off, window.height)
            }
        }
    }

    /// The only cache this engine owns is the band's own scanline, so the
    /// residency test degenerates to it.
    fn significant_lines_cached(&self, y_off: u32, lines: u32) -> bool {
        let loaded = self.line.loaded;
        let resident =
            (loaded >= i64::from(y_off) && loaded < i64::from(y_off) + i64::from(lines)) as u32;
        resident > lines / CACHED_LINES_DEN
    }

    /// Rectangular read or write between the band and a caller buffer of
    /// independent layout, with optional nearest-neighbour sub-sampling.
    ///
    /// `data` and `geometry` describe the caller buffer per
    /// [BufferGeometry]; its extents are proven in range before any I/O.
    /// The progress callback runs between scanlines and cancels the
    /// operation by returning false.
    pub fn raster_io(
        &mut self,
        op: IoOp,
        window: Window,
        data: &mut [u8],
        geometry: &BufferGeometry,
        resampling: Resampling,
        mut progress: Option<Progress<'_>>,
    ) -> Result<()> {
        if !window.fits_within(self.geometry.width, self.geometry.height) {
            return Err(GeometryError::WindowOutOfBounds {
                window,
                width: self.geometry.width,
                height: self.geometry.height,
            }
            .into());
        }
        geometry.validate(data.len())?;
        if op == IoOp::Write && self.access != Access::Update {
            return Err(RawsterioError::ReadOnly);
        }

        if !self.can_use_direct_io(&window, resampling) {
            // Shape-preserving requests never resample, whatever the
            // caller asked for.
            if resampling != Resampling::Nearest
                && (window.width != geometry.width || window.height != geometry.height)
            {
                return Err(RawsterioError::Unsupported(format!(
                    "{resampling:?} resampling"
                )));
            }
            let reborrowed = reborrow_progress(&mut progress);
            return self.raster_io_blocked(op, window, data, geometry, reborrowed);
        }
        debug!("using direct I/O for {window:?}");
        match op {
            IoOp::Read => self.direct_read(window, data, geometry, reborrow_progress(&mut progress)),
            IoOp::Write => self.direct_write(window, data, geometry, reborrow_progress(&mut progress)),
        }
    }

    /// Reads `out.len()` raw bytes at `offset`, zero-filling whatever the
    /// stream cannot provide when the sparse policy allows, then swaps
    /// `count` samples of stride `stride` into native order.
    fn access_block(
        &mut self,
        offset: u64,
        out: &mut [u8],
        count: usize,
        stride: usize,
    ) -> Result<()> {
        let mut stream = self.stream.borrow_mut();
        if let Err(source) = stream.seek(SeekFrom::Start(offset)) {
            if self.sparse_read_ok() {
                out.fill(0);
                return Ok(());
            }
            return Err(RawsterioError::Seek { offset, source });
        }
        let read = stream
            .read_fully(out)
            .map_err(|source| RawsterioError::Read {
                offset,
                len: out.len(),
                source,
            })?;
        drop(stream);
        if read < out.len() {
            if !self.sparse_read_ok() {
                return Err(RawsterioError::ShortRead {
                    offset,
                    len: out.len(),
                    read,
                });
            }
            out[read..].fill(0);
        }
        if !self.geometry.native_order {
            swap_samples(out, self.geometry.sample_type, count, stride);
        }
        Ok(())
    }

    pub(crate) fn direct_read(
        &mut self,
        window: Window,
        data: &mut [u8],
        geometry: &BufferGeometry,
        mut progress: Option<Progress<'_>>,
    ) -> Result<()> {
        let sample_type = self.geometry.sample_type;
        let size = sample_type.size();
        let pixel_stride = self.geometry.pixel_stride as usize;

        // Contiguous case: full-width window, no resampling, matching
        // types and packed layouts on both sides. One read covers it.
        if window.width == self.geometry.width
            && window.width == geometry.width
            && window.height == geometry.height
            && geometry.sample_type == sample_type
            && pixel_stride == size
            && geometry.is_packed()
        {
            let offset = self.geometry.sample_offset(0, u64::from(window.y_off));
            let total = window.width as usize * window.height as usize * size;
            let out = &mut data[geometry.origin..geometry.origin + total];
            return self.access_block(offset, out, window.width as usize * window.height as usize, size);
        }

        // General case: one read per output scanline, de-interleaving
        // and/or sub-sampling on the way into the caller buffer.
        let row_span = pixel_stride * (window.width as usize - 1) + size;
        let mut scratch = try_alloc(row_span)?;
        for i_line in 0..geometry.height {
            let src_y = u64::from(window.y_off)
                + u64::from(i_line) * u64::from(window.height) / u64::from(geometry.height);
            let offset = self.geometry.sample_offset(window.x_off, src_y);
            self.access_block(offset, &mut scratch, window.width as usize, pixel_stride)?;

            let line_base = geometry.line_base(i_line as usize);
            if window.width == geometry.width && window.height == geometry.height {
                copy_samples(
                    Run::new(&scratch, 0, sample_type, pixel_stride as isize),
                    Run::new(
                        data,
                        line_base,
                        geometry.sample_type,
                        geometry.pixel_space as isize,
                    ),
                    geometry.width as usize,
                );
            } else {
                for i_pixel in 0..geometry.width {
                    let src_x = (u64::from(i_pixel) * u64::from(window.width)
                        / u64::from(geometry.width)) as usize;
                    let dst_base =
                        (line_base as i64 + i64::from(i_pixel) * geometry.pixel_space) as usize;
                    copy_samples(
                        Run::new(
                            &scratch,
                            src_x * pixel_stride,
                            sample_type,
                            pixel_stride as isize,
                        ),
                        Run::new(data, dst_base, geometry.sample_type, geometry.pixel_space as isize),
                        1,
                    );
                }
            }

            if let Some(report) = progress.as_deref_mut() {
                if !report(f64::from(i_line + 1) / f64::from(geometry.height)) {
                    return Err(RawsterioError::Cancelled);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn direct_write(
        &mut self,
        window: Window,
        data: &mut [u8],
        geometry: &BufferGeometry,
        mut progress: Option<Progress<'_>>,
    ) -> Result<()> {
        let sample_type = self.geometry.sample_type;
        let size = sample_type.size();
        let pixel_stride = self.geometry.pixel_stride as usize;

        // Contiguous case: swap the caller buffer in place, write it in
        // one shot, swap back so the caller never observes the disk
        // order.
        if window.width == self.geometry.width
            && window.width == geometry.width
            && window.height == geometry.height
            && geometry.sample_type == sample_type
            && pixel_stride == size
            && geometry.is_packed()
        {
            let count = window.width as usize * window.height as usize;
            let total = count * size;
            let offset = self.geometry.sample_offset(0, u64::from(window.y_off));
            let slice = &mut data[geometry.origin..geometry.origin + total];
            if !self.geometry.native_order {
                swap_samples(slice, sample_type, count, size);
            }
            let result = self.write_at(offset, slice);
            if !self.geometry.native_order {
                swap_samples(slice, sample_type, count, size);
            }
            self.invalidate_cached_window(&window);
            return result;
        }

        // General case: assemble each on-disk row in a scratch buffer,
        // pre-reading rows shared with other bands, then write it out.
        let row_span = pixel_stride * (window.width as usize - 1) + size;
        let mut scratch = try_alloc(row_span)?;
        for i_line in 0..geometry.height {
            let src_y = u64::from(window.y_off)
                + u64::from(i_line) * u64::from(window.height) / u64::from(geometry.height);
            let offset = self.geometry.sample_offset(window.x_off, src_y);

            if pixel_stride > size {
                self.access_block(offset, &mut scratch, window.width as usize, pixel_stride)?;
            }

            let line_base = geometry.line_base(i_line as usize);
            if window.width == geometry.width && window.height == geometry.height {
                copy_samples(
                    Run::new(
                        data,
                        line_base,
                        geometry.sample_type,
                        geometry.pixel_space as isize,
                    ),
                    Run::new(&mut scratch, 0, sample_type, pixel_stride as isize),
                    geometry.width as usize,
                );
            } else {
                for i_pixel in 0..geometry.width {
                    let src_x = (u64::from(i_pixel) * u64::from(window.width)
                        / u64::from(geometry.width)) as usize;
                    let src_base =
                        (line_base as i64 + i64::from(i_pixel) * geometry.pixel_space) as usize;
                    copy_samples(
                        Run::new(data, src_base, geometry.sample_type, geometry.pixel_space as isize),
                        Run::new(
                            &mut scratch,
                            src_x * pixel_stride,
                            sample_type,
                            pixel_stride as isize,
                        ),
                        1,
                    );
                }
            }

            if !self.geometry.native_order {
                swap_samples(&mut scratch, sample_type, window.width as usize, pixel_stride);
            }
            self.write_at(offset, &scratch)?;
            if !self.geometry.native_order {
                swap_samples(&mut scratch, sample_type, window.width as usize, pixel_stride);
            }

            if let Some(report) = progress.as_deref_mut() {
                if !report(f64::from(i_line + 1) / f64::from(geometry.height)) {
                    return Err(RawsterioError::Cancelled);
                }
            }
        }
        self.line.dirty = true;
        self.invalidate_cached_window(&window);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut stream = self.stream.borrow_mut();
        stream
            .seek(SeekFrom::Start(offset))
            .map_err(|source| RawsterioError::Seek { offset, source })?;
        let written = stream
            .write_fully(bytes)
            .map_err(|source| RawsterioError::Write { offset, source })?;
        if written < bytes.len() {
            return Err(RawsterioError::ShortWrite {
                offset,
                len: bytes.len(),
                written,
            });
        }
        Ok(())
    }

    /// Direct writes bypass the scanline cache; drop a cached line the
    /// window just overwrote.
    fn invalidate_cached_window(&mut self, window: &Window) {
        let loaded = self.line.loaded;
        if loaded >= i64::from(window.y_off)
            && loaded < i64::from(window.y_off) + i64::from(window.height)
        {
            self.line.loaded = -1;
        }
    }

    /// Cache-backed fallback: every covered scanline moves through
    /// [RawBand::read_block] / [RawBand::write_block].
    pub(crate) fn raster_io_blocked(
        &mut self,
        op: IoOp,
        window: Window,
        data: &mut [u8],
        geometry: &BufferGeometry,
        mut progress: Option<Progress<'_>>,
    ) -> Result<()> {
        let sample_type = self.geometry.sample_type;
        let size = sample_type.size();
        let mut block = try_alloc(self.block_len())?;
        for i_line in 0..geometry.height {
            let src_y = window.y_off
                + (u64::from(i_line) * u64::from(window.height) / u64::from(geometry.height)) as u32;
            let line_base = geometry.line_base(i_line as usize);
            match op {
                IoOp::Read => {
                    self.read_block(src_y, &mut block)?;
                    if window.width == geometry.width && window.height == geometry.height {
                        copy_samples(
                            Run::new(&block, window.x_off as usize * size, sample_type, size as isize),
                            Run::new(
                                data,
                                line_base,
                                geometry.sample_type,
                                geometry.pixel_space as isize,
                            ),
                            geometry.width as usize,
                        );
                    } else {
                        for i_pixel in 0..geometry.width {
                            let src_x = window.x_off as usize
                                + (u64::from(i_pixel) * u64::from(window.width)
                                    / u64::from(geometry.width))
                                    as usize;
                            let dst_base = (line_base as i64
                                + i64::from(i_pixel) * geometry.pixel_space)
                                as usize;
                            copy_samples(
                                Run::new(&block, src_x * size, sample_type, size as isize),
                                Run::new(
                                    data,
                                    dst_base,
                                    geometry.sample_type,
                                    geometry.pixel_space as isize,
                                ),
                                1,
                            );
                        }
                    }
                }
                IoOp::Write => {
                    // Keep samples the copy below will not cover intact:
                    // columns outside the window, and gaps a sub-sampled
                    // scatter leaves between mapped pixels.
                    if window.width < self.geometry.width || geometry.width != window.width {
                        self.read_block(src_y, &mut block)?;
                    }
                    if window.width == geometry.width && window.height == geometry.height {
                        copy_samples(
                            Run::new(
                                data,
                                line_base,
                                geometry.sample_type,
                                geometry.pixel_space as isize,
                            ),
                            Run::new(&mut block, window.x_off as usize * size, sample_type, size as isize),
                            geometry.width as usize,
                        );
                    } else {
                        for i_pixel in 0..geometry.width {
                            let src_x = window.x_off as usize
                                + (u64::from(i_pixel) * u64::from(window.width)
                                    / u64::from(geometry.width))
                                    as usize;
                            let src_base = (line_base as i64
                                + i64::from(i_pixel) * geometry.pixel_space)
                                as usize;
                            copy_samples(
                                Run::new(
                                    data,
                                    src_base,
                                    geometry.sample_type,
                                    geometry.pixel_space as isize,
                                ),
                                Run::new(&mut block, src_x * size, sample_type, size as isize),
                                1,
                            );
                        }
                    }
                    self.write_block(src_y, &block)?;
                }
            }

            if let Some(report) = progress.as_deref_mut() {
                if !report(f64::from(i_line + 1) / f64::from(geometry.height)) {
                    return Err(RawsterioError::Cancelled);
                }
            }
        }
        Ok(())
    }

    /// Reads `window` at native resolution into a `(height, width)`
    /// array of `T`.
    pub fn read_as_array<T: Sample>(&mut self, window: Window) -> Result<Array2<T>> {
        let (width, height) = (window.width as usize, window.height as usize);
        let mut samples = vec![T::zero(); width * height];
        let geometry = BufferGeometry::packed(window.width, window.height, T::SAMPLE_TYPE);
        self.raster_io(
            IoOp::Read,
            window,
            bytemuck::cast_slice_mut(&mut samples),
            &geometry,
            Resampling::Nearest,
            None,
        )?;
        Ok(Array2::from_shape_vec((height, width), samples)?)
    }

    /// Writes a `(height, width)` array of `T` over `window` at native
    /// resolution.
    pub fn write_from_array<T: Sample>(&mut self, window: Window, array: &Array2<T>) -> Result<()> {
        let (height, width) = array.dim();
        if (width, height) != (window.width as usize, window.height as usize) {
            return Err(GeometryError::BlockSizeMismatch {
                len: array.len() * T::SAMPLE_TYPE.size(),
                expected: window.width as usize
                    * window.height as usize
                    * T::SAMPLE_TYPE.size(),
            }
            .into());
        }
        let mut samples: Vec<T> = array.iter().copied().collect();
        let geometry = BufferGeometry::packed(window.width, window.height, T::SAMPLE_TYPE);
        self.raster_io(
            IoOp::Write,
            window,
            bytemuck::cast_slice_mut(&mut samples),
            &geometry,
            Resampling::Nearest,
            None,
        )
    }
}
