use thiserror::Error;

pub mod nrv2b;

pub use nrv2b::Nrv2b;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressError {
    #[error("compressed output needs at least {needed_at_least:#x} bytes, {available:#x} available")]
    OutputFull {
        needed_at_least: usize,
        available: usize,
    },
    #[error("input of {len:#x} bytes is too large to compress")]
    InputTooLarge { len: usize },
}

/// Compresses a byte range straight into the output image.
///
/// Implementations write into `dst` from its start and return how many bytes
/// they produced. `dst` is the whole remaining output capacity.
pub trait Compressor {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CompressError>;
}
