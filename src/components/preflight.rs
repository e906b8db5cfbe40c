use std::io::SeekFrom;

use crate::{
    components::stream::RawStream,
    config::RawIoConfig,
    errors::Result,
};

#[derive(thiserror::Error, Debug)]
pub enum PreflightError {
    #[error("image file is too small: expected at least {expected} bytes, found {actual}")]
    FileTooSmall { expected: u64, actual: u64 },
    /// Declared offsets overflow the 64-bit range; reported the same way
    /// as a short file since both mean the header lies about the layout.
    #[error("image file is too small: declared layout exceeds the 64-bit offset range")]
    LayoutOverflow,
    #[error("raster dimensions {width}x{height} are out of range")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("scanline buffers would need too much memory: {line_size} bytes per band x {n_bands} bands")]
    TooMuchMemory { line_size: u64, n_bands: u32 },
    #[error("could not determine the stream size: {0}")]
    Stat(#[from] std::io::Error),
}

/// Declared layout of a raw raster about to be opened, as parsed from a
/// (potentially hostile) header.
#[derive(Debug, Clone, Copy)]
pub struct PreflightParams {
    pub width: u32,
    pub height: u32,
    pub n_bands: u32,
    /// Bytes per sample.
    pub sample_size: usize,
    pub pixel_stride: i32,
    pub line_stride: i64,
    pub header_size: u64,
    pub band_offset: u64,
}

// Band counts / scanline sizes above these always trigger the file-size
// check; below them only an explicit override does.
const CHECK_BANDS_THRESHOLD: u32 = 10;
const CHECK_LINE_BYTES_THRESHOLD: i64 = 20_000;

const MAX_BUFFER_MEM: u64 = i32::MAX as u64 / 4;

/// Sanity-checks a declared layout before any band (and thus any scanline
/// buffer) is constructed.
///
/// Allocates nothing; its only stream side effect is one seek-to-end to
/// learn the physical size. The size comparison keeps a 50% margin since
/// some raw formats allow sparse files. Every multiplication and addition
/// in the expected-size computation is overflow-checked: malformed
/// headers are expected input.
pub fn preflight(
    params: &PreflightParams,
    config: &RawIoConfig,
    stream: &mut dyn RawStream,
) -> Result<()> {
    if params.width == 0
        || params.height == 0
        || params.width > i32::MAX as u32
        || params.height > i32::MAX as u32
    {
        return Err(PreflightError::InvalidDimensions {
            width: params.width,
            height: params.height,
        }
        .into());
    }

    let triggered = params.n_bands > CHECK_BANDS_THRESHOLD
        || i64::from(params.pixel_stride) * i64::from(params.width) > CHECK_LINE_BYTES_THRESHOLD;
    let check = match config.check_file_size {
        Some(forced) => forced,
        None => triggered,
    };

    if check {
        let expected =
            expected_file_size(params).ok_or(PreflightError::LayoutOverflow)?;
        let actual = stream
            .seek(SeekFrom::End(0))
            .map_err(PreflightError::Stat)?;
        if actual < expected / 2 {
            return Err(PreflightError::FileTooSmall { expected, actual }.into());
        }
    }

    if params.n_bands > 0 {
        let line_size = u64::from(params.pixel_stride.unsigned_abs())
            * u64::from(params.width.saturating_sub(1))
            + params.sample_size as u64;
        if line_size > MAX_BUFFER_MEM / u64::from(params.n_bands) {
            return Err(PreflightError::TooMuchMemory {
                line_size,
                n_bands: params.n_bands,
            }
            .into());
        }
    }

    Ok(())
}

/// Smallest file that can hold the declared layout, or None on 64-bit
/// overflow. Negative strides contribute nothing: their extent lies
/// below the image offset.
fn expected_file_size(params: &PreflightParams) -> Option<u64> {
    let mut expected = params.header_size;
    expected = expected.checked_add(
        u64::from(params.n_bands.checked_sub(1)?).checked_mul(params.band_offset)?,
    )?;
    if params.line_stride >= 0 {
        expected = expected.checked_add(
            u64::from(params.height.checked_sub(1)?).checked_mul(params.line_stride as u64)?,
        )?;
    }
    if params.pixel_stride >= 0 {
        expected = expected.checked_add(
            u64::from(params.width.checked_sub(1)?).checked_mul(params.pixel_stride as u64)?,
        )?;
    }
    expected.checked_add(params.sample_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RawsterioError;
    use std::io::Cursor;

    fn params(width: u32, height: u32, n_bands: u32) -> PreflightParams {
        PreflightParams {
            width,
            height,
            n_bands,
            sample_size: 1,
            pixel_stride: 1,
            line_stride: i64::from(width),
            header_size: 0,
            band_offset: u64::from(width) * u64::from(height),
        }
    }

    #[test]
    fn small_layouts_skip_the_size_check() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        // 100x100, 1 band: below both thresholds, an empty file passes.
        preflight(&params(100, 100, 1), &RawIoConfig::default(), &mut stream).unwrap();
    }

    #[test]
    fn forced_check_rejects_short_file() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let config = RawIoConfig {
            check_file_size: Some(true),
            ..Default::default()
        };
        let err = preflight(&params(100, 100, 1), &config, &mut stream).unwrap_err();
        assert!(matches!(
            err,
            RawsterioError::Preflight(PreflightError::FileTooSmall { .. })
        ));
    }

    #[test]
    fn fifty_percent_margin_tolerates_sparse_files() {
        // Expected size 10000; a 6000-byte file is over half and passes.
        let mut stream = Cursor::new(vec![0u8; 6000]);
        let config = RawIoConfig {
            check_file_size: Some(true),
            ..Default::default()
        };
        preflight(&params(100, 100, 1), &config, &mut stream).unwrap();
    }

    #[test]
    fn many_bands_trigger_the_check() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let err = preflight(&params(100, 100, 11), &RawIoConfig::default(), &mut stream)
            .unwrap_err();
        assert!(matches!(
            err,
            RawsterioError::Preflight(PreflightError::FileTooSmall { .. })
        ));
    }

    #[test]
    fn forced_off_suppresses_the_check() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let config = RawIoConfig {
            check_file_size: Some(false),
            ..Default::default()
        };
        preflight(&params(100, 100, 11), &config, &mut stream).unwrap();
    }

    #[test]
    fn rejects_height_2_pow_31() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let err = preflight(&params(10, 1 << 31, 1), &RawIoConfig::default(), &mut stream)
            .unwrap_err();
        assert!(matches!(
            err,
            RawsterioError::Preflight(PreflightError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn overflowing_geometry_rejected_without_io() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let mut p = params(1000, 2_000_000_000, 2);
        p.line_stride = i64::MAX / 2;
        p.band_offset = u64::MAX / 2;
        let config = RawIoConfig {
            check_file_size: Some(true),
            ..Default::default()
        };
        let err = preflight(&p, &config, &mut stream).unwrap_err();
        assert!(matches!(
            err,
            RawsterioError::Preflight(PreflightError::LayoutOverflow)
        ));
    }

    #[test]
    fn line_memory_cap() {
        let mut stream = Cursor::new(vec![0u8; 1]);
        let mut p = params(2_000_000_000, 1, 4);
        p.line_stride = 1;
        p.band_offset = 0;
        let config = RawIoConfig {
            check_file_size: Some(false),
            ..Default::default()
        };
        let err = preflight(&p, &config, &mut stream).unwrap_err();
        assert!(matches!(
            err,
            RawsterioError::Preflight(PreflightError::TooMuchMemory { .. })
        ));
    }
}
