use std::io;

pub type Result<T> = std::result::Result<T, RawsterioError>;

#[derive(thiserror::Error, Debug)]
pub enum RawsterioError {
    /// crate mod errors
    #[error(transparent)]
    Geometry(#[from] crate::components::band::GeometryError),
    #[error(transparent)]
    Preflight(#[from] crate::components::preflight::PreflightError),
    #[error(transparent)]
    Buffer(#[from] crate::buffer::BufferError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    /// stream errors
    #[error("failed to seek to offset {offset}: {source}")]
    Seek { offset: u64, source: io::Error },
    #[error("failed to read {len} bytes at offset {offset}: {source}")]
    Read {
        offset: u64,
        len: usize,
        source: io::Error,
    },
    #[error("short read at offset {offset}: wanted {len} bytes, got {read}")]
    ShortRead {
        offset: u64,
        len: usize,
        read: usize,
    },
    #[error("failed to write {len} bytes at offset {offset}: {written} bytes written")]
    ShortWrite {
        offset: u64,
        len: usize,
        written: usize,
    },
    #[error("failed to write at offset {offset}: {source}")]
    Write { offset: u64, source: io::Error },
    #[error("failed to flush raw stream: {0}")]
    Flush(#[source] io::Error),
    #[error("failed to close raw stream: {0}")]
    Close(#[source] io::Error),
    /// crate lib errors
    #[error("band is not opened for update")]
    ReadOnly,
    #[error("could not allocate buffer of {0} bytes")]
    OutOfMemory(usize),
    #[error("operation cancelled by progress callback")]
    Cancelled,
    #[error("unsupported: {0}")]
    Unsupported(String),
}
