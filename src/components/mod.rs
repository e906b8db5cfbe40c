pub mod band;
pub mod dataset;
pub mod direct;
pub mod layout;
pub mod preflight;
pub mod stream;

use crate::errors::Result;

/// Trait for scanline-block reads on a band.
pub trait BlockReader {
    fn read_block(&mut self, line: u32, out: &mut [u8]) -> Result<()>;
}

/// Trait for scanline-block writes on a band.
pub trait BlockWriter {
    fn write_block(&mut self, line: u32, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

impl BlockReader for band::RawBand {
    fn read_block(&mut self, line: u32, out: &mut [u8]) -> Result<()> {
        band::RawBand::read_block(self, line, out)
    }
}

impl BlockWriter for band::RawBand {
    fn write_block(&mut self, line: u32, data: &[u8]) -> Result<()> {
        band::RawBand::write_block(self, line, data)
    }

    fn flush(&mut self) -> Result<()> {
        band::RawBand::flush(self)
    }
}
