use std::fmt;

use log::debug;
use thiserror::Error;

use crate::compress::{CompressError, Compressor};
use crate::format::zinfo::{Record, Width};
use crate::image::{align, ImageError, InputImage, OutputImage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("invalid divisor 0")]
    InvalidDivisor,
    #[error("invalid alignment 0")]
    InvalidAlignment,
    #[error("compression failure: {0}")]
    CompressionFailed(CompressError),
    #[error("interpreter has already {0}")]
    Halted(State),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {index} ({record}): {kind}")]
pub struct ProcessError {
    pub index: usize,
    pub record: Record,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Executes zinfo records against one input image.
///
/// The interpreter owns the output image for the whole run. Records run in
/// order and the first failure ends the run.
pub struct Interpreter<'a> {
    input: InputImage<'a>,
    output: OutputImage,
    compressor: &'a dyn Compressor,
    state: State,
    executed: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(input: &'a [u8], capacity: usize, compressor: &'a dyn Compressor) -> Self {
        Self {
            input: InputImage::new(input),
            output: OutputImage::with_capacity(capacity),
            compressor,
            state: State::Running,
            executed: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn output(&self) -> &OutputImage {
        &self.output
    }

    pub fn run(mut self, records: &[Record]) -> Result<OutputImage, ProcessError> {
        for record in records {
            self.step(record)?;
        }
        self.state = State::Completed;
        Ok(self.output)
    }

    pub fn step(&mut self, record: &Record) -> Result<(), ProcessError> {
        let index = self.executed;
        if self.state != State::Running {
            return Err(ProcessError {
                index,
                record: *record,
                kind: ErrorKind::Halted(self.state),
            });
        }
        let result = match *record {
            Record::Copy { offset, length, align } => self.copy(offset, length, align),
            Record::Pack { offset, length, align } => self.pack(offset, length, align),
            Record::Subtract { width, offset, divisor } => self.subtract(width, offset, divisor),
        };
        self.executed += 1;
        result.map_err(|kind| {
            self.state = State::Failed;
            ProcessError {
                index,
                record: *record,
                kind,
            }
        })
    }

    fn copy(&mut self, offset: u32, length: u32, boundary: u32) -> Result<(), ErrorKind> {
        if boundary == 0 {
            return Err(ErrorKind::InvalidAlignment);
        }
        let src = self.input.slice(offset.into(), length.into())?;
        let at = align(self.output.written() as u64, boundary.into());
        if !self.output.fits(at, length.into()) {
            return Err(ImageError::OutputOverrun {
                needed: at + u64::from(length),
                capacity: self.output.capacity() as u64,
            }
            .into());
        }

        self.output.align_cursor(boundary.into())?;
        let at = self.output.append(src)?;
        debug!(
            "COPY [{:#x},{:#x}) to [{:#x},{:#x})",
            offset,
            u64::from(offset) + u64::from(length),
            at,
            at + src.len()
        );
        Ok(())
    }

    fn pack(&mut self, offset: u32, length: u32, boundary: u32) -> Result<(), ErrorKind> {
        if boundary == 0 {
            return Err(ErrorKind::InvalidAlignment);
        }
        let src = self.input.slice(offset.into(), length.into())?;
        let at = self.output.align_cursor(boundary.into())?;
        let capacity = self.output.capacity() as u64;

        let packed = self
            .compressor
            .compress(src, self.output.spare_mut())
            .map_err(|err| match err {
                CompressError::OutputFull { needed_at_least, .. } => {
                    ErrorKind::Image(ImageError::OutputOverrun {
                        needed: (at + needed_at_least) as u64,
                        capacity,
                    })
                }
                other => ErrorKind::CompressionFailed(other),
            })?;
        self.output.reserve_for_append(packed)?;
        debug!(
            "PACK [{:#x},{:#x}) to [{:#x},{:#x})",
            offset,
            u64::from(offset) + u64::from(length),
            at,
            at + packed
        );
        Ok(())
    }

    fn subtract(&mut self, width: Width, offset: u32, divisor: u32) -> Result<(), ErrorKind> {
        if divisor == 0 {
            return Err(ErrorKind::InvalidDivisor);
        }
        let old = self.output.read_le(offset.into(), width.bytes())?;
        let delta = size_delta(self.output.written() as u64, self.input.len(), divisor);
        let new = width.mask(old.wrapping_add(delta as u32));
        self.output.patch(offset.into(), width.bytes(), new)?;
        debug!(
            "SUB{} [{:#x},{:#x}) ({:#x}+({:#x}/{:#x})-({:#x}/{:#x})) = {:#x}",
            match width {
                Width::Byte => 'B',
                Width::Word => 'W',
                Width::Long => 'L',
            },
            offset,
            u64::from(offset) + width.bytes() as u64,
            old,
            self.output.written(),
            divisor,
            self.input.len(),
            divisor,
            new
        );
        Ok(())
    }
}

/// Change in image size, in units of `divisor`, between the input layout and
/// the output written so far. Division truncates toward zero.
pub fn size_delta(written: u64, input_len: u64, divisor: u32) -> i64 {
    let divisor = u64::from(divisor);
    let raw = align(written, divisor) as i64 - align(input_len, divisor) as i64;
    raw / divisor as i64
}
