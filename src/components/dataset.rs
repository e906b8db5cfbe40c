use log::{debug, info};
use ndarray::Array3;

use crate::{
    buffer::{BufferGeometry, Window},
    components::{
        band::{GeometryError, RawBand},
        direct::{reborrow_progress, IoOp, Progress, Resampling},
        layout::{probe, Interleaving, RawBinaryLayout},
        stream::Access,
    },
    errors::{RawsterioError, Result},
    sample::Sample,
};

/// Collection of bands sharing one raster extent, usually one underlying
/// stream, and a single on-disk interleaving.
pub struct RawDataset {
    bands: Vec<RawBand>,
    interleaving: Interleaving,
}

impl std::fmt::Debug for RawDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDataset")
            .field("bands", &self.bands.len())
            .field("interleaving", &self.interleaving)
            .field("shape", &(self.width(), self.height()))
            .finish()
    }
}

impl RawDataset {
    /// Assembles a dataset from bands of one raster. The interleaving
    /// hint used by the multi-band router is probed from the band
    /// geometry; [Self::with_interleaving] overrides it when the format
    /// driver knows better.
    pub fn new(bands: Vec<RawBand>) -> Result<Self> {
        let first = bands
            .first()
            .ok_or(GeometryError::MismatchedBands)?
            .geometry();
        let (width, height) = (first.width, first.height);
        if bands
            .iter()
            .any(|band| band.width() != width || band.height() != height)
        {
            return Err(GeometryError::MismatchedBands.into());
        }
        let interleaving = probe(&bands).interleaving;
        let dataset = Self {
            bands,
            interleaving,
        };
        info!("new {dataset:?}");
        Ok(dataset)
    }

    pub fn with_interleaving(mut self, interleaving: Interleaving) -> Self {
        self.interleaving = interleaving;
        self
    }

    pub fn width(&self) -> u32 {
        self.bands[0].width()
    }

    pub fn height(&self) -> u32 {
        self.bands[0].height()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band(&self, index: usize) -> Option<&RawBand> {
        self.bands.get(index)
    }

    pub fn band_mut(&mut self, index: usize) -> Option<&mut RawBand> {
        self.bands.get_mut(index)
    }

    pub fn interleaving(&self) -> Interleaving {
        self.interleaving
    }

    /// Introspection report of the shared on-disk layout; a pure
    /// function of the band descriptors.
    pub fn raw_binary_layout(&self) -> RawBinaryLayout {
        probe(&self.bands)
    }

    /// Commits pending stream flushes of every band; idempotent.
    pub fn flush(&mut self) -> Result<()> {
        for band in &mut self.bands {
            band.flush()?;
        }
        Ok(())
    }

    /// Cross-band rectangular I/O into one interleaved caller buffer.
    ///
    /// `geometry` describes a single band plane inside `data`;
    /// `band_space` is the signed byte stride between corresponding
    /// samples of consecutive bands in `band_list` (indices into this
    /// dataset, in the caller's order). When the storage is
    /// pixel-interleaved, no resampling is requested and every band
    /// individually qualifies for direct I/O, the bands are issued as
    /// back-to-back direct transfers; otherwise every band moves through
    /// the scanline-cache block path. A single-band list simply forwards
    /// to that band's [RawBand::raster_io]. Either way the caller's
    /// progress callback sees the sub-range `[i/n, (i+1)/n]` for band
    /// `i`, and the first failing band aborts the sequence without
    /// rolling back completed writes.
    #[allow(clippy::too_many_arguments)]
    pub fn raster_io(
        &mut self,
        op: IoOp,
        window: Window,
        data: &mut [u8],
        geometry: &BufferGeometry,
        band_space: i64,
        band_list: &[usize],
        resampling: Resampling,
        mut progress: Option<Progress<'_>>,
    ) -> Result<()> {
        // Prove every band plane fits the buffer before any I/O starts.
        let shifted_geometries: Vec<BufferGeometry> = band_list
            .iter()
            .enumerate()
            .map(|(slot, _)| BufferGeometry {
                origin: (geometry.origin as i64 + slot as i64 * band_space) as usize,
                ..*geometry
            })
            .collect();
        for shifted in &shifted_geometries {
            shifted.validate(data.len())?;
        }

        if let [index] = *band_list {
            let band = self
                .bands
                .get_mut(index)
                .ok_or(GeometryError::BandOutOfRange { index })?;
            return band.raster_io(
                op,
                window,
                data,
                &shifted_geometries[0],
                resampling,
                reborrow_progress(&mut progress),
            );
        }

        if !window.fits_within(self.width(), self.height()) {
            return Err(GeometryError::WindowOutOfBounds {
                window,
                width: self.width(),
                height: self.height(),
            }
            .into());
        }
        let no_resampling =
            window.width == geometry.width && window.height == geometry.height;
        if resampling != Resampling::Nearest && !no_resampling {
            return Err(RawsterioError::Unsupported(format!(
                "{resampling:?} resampling"
            )));
        }
        if op == IoOp::Write
            && band_list.iter().any(|&index| {
                self.bands
                    .get(index)
                    .is_some_and(|band| band.access() != Access::Update)
            })
        {
            return Err(RawsterioError::ReadOnly);
        }

        // Back-to-back direct transfers beat the block loop only when
        // every requested band takes them; one cache-bound band sends
        // the whole request down the block path.
        let use_direct = no_resampling
            && self.interleaving == Interleaving::Bip
            && band_list.iter().all(|&index| {
                self.bands
                    .get(index)
                    .is_some_and(|band| band.can_use_direct_io(&window, resampling))
            });
        if use_direct {
            debug!(
                "pixel-interleaved direct I/O across {} bands",
                band_list.len()
            );
        }

        let n_bands = band_list.len() as f64;
        for (slot, &index) in band_list.iter().enumerate() {
            let low = slot as f64 / n_bands;
            let high = (slot + 1) as f64 / n_bands;
            let mut scaled = |fraction: f64| match progress.as_deref_mut() {
                Some(report) => report(low + fraction * (high - low)),
                None => true,
            };
            let band = self
                .bands
                .get_mut(index)
                .ok_or(GeometryError::BandOutOfRange { index })?;
            let shifted = &shifted_geometries[slot];
            if use_direct {
                match op {
                    IoOp::Read => band.direct_read(window, data, shifted, Some(&mut scaled))?,
                    IoOp::Write => band.direct_write(window, data, shifted, Some(&mut scaled))?,
                }
            } else {
                band.raster_io_blocked(op, window, data, shifted, Some(&mut scaled))?;
            }
        }
        Ok(())
    }

    /// Reads all bands of `window` at native resolution into a
    /// `(bands, height, width)` array.
    pub fn read_as_array<T: Sample>(&mut self, window: Window) -> Result<Array3<T>> {
        let (width, height) = (window.width as usize, window.height as usize);
        let n_bands = self.bands.len();
        let plane = width * height;
        let mut samples = vec![T::zero(); n_bands * plane];
        let geometry = BufferGeometry::packed(window.width, window.height, T::SAMPLE_TYPE);
        let band_list: Vec<usize> = (0..n_bands).collect();
        self.raster_io(
            IoOp::Read,
            window,
            bytemuck::cast_slice_mut(&mut samples),
            &geometry,
            (plane * T::SAMPLE_TYPE.size()) as i64,
            &band_list,
            Resampling::Nearest,
            None,
        )?;
        Ok(Array3::from_shape_vec((n_bands, height, width), samples)?)
    }
}
