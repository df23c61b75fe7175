use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("zinfo file has invalid length {len} (not a multiple of {record_size})")]
    InvalidRecordFile { len: usize, record_size: usize },
    #[error("unknown zinfo record type \"{tag}\" at record {index}")]
    UnknownRecordType { index: usize, tag: String },
}

pub mod zinfo;
