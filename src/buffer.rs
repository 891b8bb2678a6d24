//! Memory-backed stream
//!
//! This module provides [`BufferStream`], a cursor over a caller-owned byte
//! slice. The slice is borrowed for the whole lifetime of the stream and is
//! never copied, modified or freed.
//!
//! Unlike the file backing, positioning never fails: every seek is clamped
//! into `[0, len]`.

use std::io::{self, Read, Seek, SeekFrom};

use crate::token::{self, Token, TokenKind};
use crate::SeekMode;

/// Upper bound on how far a successful token scan moves the cursor past the
/// first byte of the token. Leading whitespace skipped before the token is
/// not counted, so the cursor itself may move further.
const MAX_TOKEN_ADVANCE: usize = 25;

/// A read cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BufferStream<'a> {
    data: &'a [u8],
    /// Invariant: `position <= data.len()`.
    position: usize,
}

// ===== impl BufferStream ====================================================
impl<'a> BufferStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// A slice is always readable.
    pub fn is_valid(&self) -> bool {
        true
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the slice.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Copies up to `elem_size * count` bytes into `dst` and returns how many
    /// *complete* elements were copied.
    ///
    /// The transfer is capped by `dst.len()` and by the bytes left in the
    /// slice. A trailing partial element is still copied and consumed but is
    /// not counted.
    pub fn read_elements(&mut self, dst: &mut [u8], elem_size: usize, count: usize) -> usize {
        if elem_size == 0 {
            return 0;
        }
        let wanted = elem_size.saturating_mul(count).min(dst.len());
        let n = wanted.min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        n / elem_size
    }

    /// Moves the cursor and returns the new position.
    ///
    /// Targets before the start clamp to 0 and targets past the end clamp to
    /// `len`, whatever the mode.
    pub fn seek_to(&mut self, offset: i64, mode: SeekMode) -> u64 {
        let base = match mode {
            SeekMode::FromStart => 0,
            SeekMode::FromCurrent => self.position,
            SeekMode::FromEnd => self.data.len(),
        };
        let target = base as i128 + i128::from(offset);
        self.position = target.clamp(0, self.data.len() as i128) as usize;
        self.position as u64
    }

    pub fn tell(&self) -> u64 {
        self.position as u64
    }

    /// Consumes and returns the byte under the cursor, `None` at the end.
    pub fn get_char(&mut self) -> Option<u8> {
        let b = *self.data.get(self.position)?;
        self.position += 1;
        Some(b)
    }

    /// Copies one line into `dst` and NUL-terminates it.
    ///
    /// Copying stops after the first `\n` (kept in the output), after
    /// `dst.len() - 1` bytes, or at the end of the slice. The cursor moves past
    /// exactly the bytes copied. Returns the number of bytes copied, or `None`
    /// when the cursor was already at the end.
    pub fn read_line(&mut self, dst: &mut [u8]) -> Option<usize> {
        if self.at_end() {
            return None;
        }
        let max = dst.len().saturating_sub(1);
        let window = &self.data[self.position..];
        let window = &window[..window.len().min(max)];
        let n = match window.iter().position(|&b| b == b'\n') {
            Some(nl) => nl + 1,
            None => window.len(),
        };

        dst[..n].copy_from_slice(&window[..n]);
        if let Some(terminator) = dst.get_mut(n) {
            *terminator = 0;
        }
        self.position += n;
        Some(n)
    }

    /// Parses one token of `kind` at the cursor.
    ///
    /// The text is read like a C string: it ends at the first NUL byte or at
    /// the end of the slice. On success the cursor skips leading whitespace,
    /// then moves forward until whitespace, a NUL byte, the end of the slice,
    /// or `MAX_TOKEN_ADVANCE` bytes past the first byte of the token. On
    /// failure the cursor does not move.
    pub fn scan_token(&mut self, kind: TokenKind) -> Option<Token> {
        let rest = &self.data[self.position..];
        let text = match rest.iter().position(|&b| b == 0) {
            Some(nul) => &rest[..nul],
            None => rest,
        };
        let (value, _) = token::scan(text, kind)?;

        let start = self.position + token::skip_space(text);
        let limit = (start + MAX_TOKEN_ADVANCE).min(self.data.len());
        let mut end = start + 1;
        while end < limit && !is_boundary(self.data[end]) {
            end += 1;
        }
        self.position = end;
        Some(value)
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.data.len()
    }
}

fn is_boundary(b: u8) -> bool {
    b == 0 || token::is_space(b)
}

impl<'a> From<&'a [u8]> for BufferStream<'a> {
    fn from(data: &'a [u8]) -> Self {
        BufferStream::new(data)
    }
}

// ===== std::io trait implementations =======================================
impl Read for BufferStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_elements(buf, 1, buf.len()))
    }
}

impl Seek for BufferStream<'_> {
    /// Clamping seek; never returns an error.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, mode) = SeekMode::split(pos);
        Ok(self.seek_to(offset, mode))
    }
}
