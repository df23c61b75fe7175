use thiserror::Error;

/// Fill value for output bytes that alignment skips over.
pub const PAD_BYTE: u8 = 0xff;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("input overrun: [{offset:#x},+{length:#x}) exceeds input size {size:#x}")]
    InputOverrun { offset: u64, length: u64, size: u64 },
    #[error("output overrun: {needed:#x} bytes needed, capacity is {capacity:#x}")]
    OutputOverrun { needed: u64, capacity: u64 },
    #[error("patch at {offset:#x} (width {width}) outside written output {written:#x}")]
    PatchOutOfBounds { offset: u64, width: usize, written: u64 },
}

/// Rounds `value` up to the next multiple of `boundary`.
///
/// Only meaningful when `boundary` is a nonzero power of two; other values are
/// accepted and produce the same bit-mask result the record format has always
/// produced.
pub fn align(value: u64, boundary: u64) -> u64 {
    debug_assert!(boundary > 0, "alignment boundary must be nonzero");
    let mask = boundary - 1;
    value.wrapping_add(mask) & !mask
}

#[derive(Debug, Clone, Copy)]
pub struct InputImage<'a> {
    bytes: &'a [u8],
}

impl<'a> InputImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn slice(&self, offset: u64, length: u64) -> Result<&'a [u8], ImageError> {
        let overrun = ImageError::InputOverrun {
            offset,
            length,
            size: self.len(),
        };
        let end = offset.checked_add(length).ok_or(overrun.clone())?;
        if end > self.len() {
            return Err(overrun);
        }
        // end <= len, so both fit in usize.
        Ok(&self.bytes[offset as usize..end as usize])
    }
}

/// Output buffer with a capacity fixed at creation.
///
/// `written` is both the write cursor and the committed length. Nothing ever
/// grows the allocation; a write that does not fit fails instead.
#[derive(Debug, Clone)]
pub struct OutputImage {
    buf: Box<[u8]>,
    written: usize,
}

impl OutputImage {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![PAD_BYTE; capacity].into_boxed_slice(),
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.written]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.buf.into_vec();
        bytes.truncate(self.written);
        bytes
    }

    pub fn fits(&self, at: u64, length: u64) -> bool {
        at.checked_add(length)
            .is_some_and(|end| end <= self.capacity() as u64)
    }

    pub fn align_cursor(&mut self, boundary: u64) -> Result<usize, ImageError> {
        let aligned = align(self.written as u64, boundary);
        if aligned > self.capacity() as u64 {
            return Err(ImageError::OutputOverrun {
                needed: aligned,
                capacity: self.capacity() as u64,
            });
        }
        self.written = aligned as usize;
        Ok(self.written)
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, ImageError> {
        let at = self.written;
        self.reserve_for_append(bytes.len())?;
        self.buf[at..self.written].copy_from_slice(bytes);
        Ok(at)
    }

    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.written..]
    }

    /// Commits `length` bytes at the cursor without copying; the caller has
    /// already filled them through `spare_mut`.
    pub fn reserve_for_append(&mut self, length: usize) -> Result<usize, ImageError> {
        let at = self.written;
        if !self.fits(at as u64, length as u64) {
            return Err(ImageError::OutputOverrun {
                needed: (at as u64).saturating_add(length as u64),
                capacity: self.capacity() as u64,
            });
        }
        self.written = at + length;
        Ok(at)
    }

    pub fn read_le(&self, offset: u64, width: usize) -> Result<u32, ImageError> {
        let range = self.committed_range(offset, width)?;
        let mut raw = [0u8; 4];
        raw[..width].copy_from_slice(&self.buf[range]);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn patch(&mut self, offset: u64, width: usize, value: u32) -> Result<(), ImageError> {
        let range = self.committed_range(offset, width)?;
        self.buf[range].copy_from_slice(&value.to_le_bytes()[..width]);
        Ok(())
    }

    fn committed_range(&self, offset: u64, width: usize) -> Result<std::ops::Range<usize>, ImageError> {
        debug_assert!(width <= 4);
        let written = self.written as u64;
        match offset.checked_add(width as u64) {
            Some(end) if end <= written => Ok(offset as usize..end as usize),
            _ => Err(ImageError::PatchOutOfBounds {
                offset,
                width,
                written,
            }),
        }
    }
}
