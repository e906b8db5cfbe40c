use itertools::Itertools;

use crate::{components::band::RawBand, sample::SampleType};

/// On-disk interleaving of a multi-band raw raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interleaving {
    #[default]
    Unknown,
    /// Pixel-interleaved: R,G,B,R,G,B,...
    Bip,
    /// Line-interleaved: one full scanline per band before the next.
    Bil,
    /// Band-sequential: each band's plane contiguous.
    Bsq,
}

/// Introspection report over a dataset's band descriptors; derived from
/// the geometry alone, no I/O involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBinaryLayout {
    pub interleaving: Interleaving,
    pub sample_type: SampleType,
    pub little_endian: bool,
    pub image_offset: u64,
    pub pixel_stride: i32,
    pub line_stride: i64,
    /// Byte distance between the image offsets of consecutive bands;
    /// zero when the bands are not uniformly spaced.
    pub band_offset: i64,
}

/// Classifies the layout of `bands` (at least one) per the BIP/BIL/BSQ
/// stride equations. Bands that disagree on their geometry, or whose
/// image offsets are not uniformly spaced, classify as
/// [Interleaving::Unknown] with the first band's geometry reported.
pub(crate) fn probe(bands: &[RawBand]) -> RawBinaryLayout {
    let first = *bands[0].geometry();
    let uniform = bands.iter().all(|band| {
        let g = band.geometry();
        g.pixel_stride == first.pixel_stride
            && g.line_stride == first.line_stride
            && g.native_order == first.native_order
            && g.sample_type == first.sample_type
    });

    let offsets: Vec<i64> = bands
        .iter()
        .map(|band| band.geometry().image_offset as i64)
        .collect();
    let band_offset = if offsets.len() >= 2 {
        offsets[1] - offsets[0]
    } else {
        0
    };
    let evenly_spaced = offsets
        .iter()
        .tuple_windows()
        .all(|(a, b)| b - a == band_offset);

    let mut interleaving = Interleaving::Unknown;
    if bands.len() > 1 && uniform && evenly_spaced {
        let size = first.sample_type.size() as i64;
        let n_bands = bands.len() as i64;
        let width = i64::from(first.width);
        let height = i64::from(first.height);
        let pixel_stride = i64::from(first.pixel_stride);
        let line_stride = first.line_stride;

        if pixel_stride == n_bands * size
            && line_stride == pixel_stride * width
            && band_offset == size
        {
            interleaving = Interleaving::Bip;
        } else if pixel_stride == size
            && line_stride == size * n_bands * width
            && band_offset == size * width
        {
            interleaving = Interleaving::Bil;
        } else if pixel_stride == size
            && line_stride == size * width
            && band_offset == line_stride * height
        {
            interleaving = Interleaving::Bsq;
        }
    }

    RawBinaryLayout {
        interleaving,
        sample_type: first.sample_type,
        little_endian: if cfg!(target_endian = "little") {
            first.native_order
        } else {
            !first.native_order
        },
        image_offset: first.image_offset,
        pixel_stride: first.pixel_stride,
        line_stride: first.line_stride,
        band_offset: if uniform && evenly_spaced {
            band_offset
        } else {
            0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::{
            band::BandGeometry,
            stream::{shared, Access, StreamOwnership},
        },
        config::RawIoConfig,
    };
    use std::io::Cursor;

    fn bands(geometries: &[BandGeometry]) -> Vec<RawBand> {
        let stream = shared(Cursor::new(vec![0u8; 4096]));
        geometries
            .iter()
            .map(|geometry| {
                RawBand::new(
                    stream.clone(),
                    *geometry,
                    Access::ReadOnly,
                    StreamOwnership::Borrowed,
                    RawIoConfig::default(),
                )
                .unwrap()
            })
            .collect()
    }

    fn geometry(image_offset: u64, pixel_stride: i32, line_stride: i64) -> BandGeometry {
        BandGeometry {
            image_offset,
            pixel_stride,
            line_stride,
            sample_type: SampleType::U8,
            native_order: true,
            width: 10,
            height: 10,
        }
    }

    #[test]
    fn single_band_is_unknown() {
        let bands = bands(&[geometry(0, 1, 10)]);
        let layout = probe(&bands);
        assert_eq!(layout.interleaving, Interleaving::Unknown);
        assert_eq!(layout.band_offset, 0);
    }

    #[test]
    fn classifies_bip() {
        let bands = bands(&[geometry(0, 3, 30), geometry(1, 3, 30), geometry(2, 3, 30)]);
        let layout = probe(&bands);
        assert_eq!(layout.interleaving, Interleaving::Bip);
        assert_eq!(layout.band_offset, 1);
    }

    #[test]
    fn classifies_bil() {
        let bands = bands(&[geometry(0, 1, 30), geometry(10, 1, 30), geometry(20, 1, 30)]);
        assert_eq!(probe(&bands).interleaving, Interleaving::Bil);
    }

    #[test]
    fn classifies_bsq() {
        let bands = bands(&[geometry(0, 1, 10), geometry(100, 1, 10), geometry(200, 1, 10)]);
        let layout = probe(&bands);
        assert_eq!(layout.interleaving, Interleaving::Bsq);
        assert_eq!(layout.band_offset, 100);
    }

    #[test]
    fn disagreeing_strides_are_unknown() {
        let bands = bands(&[geometry(0, 1, 10), geometry(100, 2, 10)]);
        assert_eq!(probe(&bands).interleaving, Interleaving::Unknown);
    }

    #[test]
    fn uneven_spacing_is_unknown() {
        let bands = bands(&[geometry(0, 1, 10), geometry(100, 1, 10), geometry(250, 1, 10)]);
        let layout = probe(&bands);
        assert_eq!(layout.interleaving, Interleaving::Unknown);
        assert_eq!(layout.band_offset, 0);
    }

    #[test]
    fn endianness_reported_for_host() {
        let bands = bands(&[geometry(0, 1, 10)]);
        let layout = probe(&bands);
        assert_eq!(layout.little_endian, cfg!(target_endian = "little"));
    }
}
