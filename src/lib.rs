//! Seekable byte streams for RAW image parsers.
//!
//! [`Stream`] is the only I/O surface a format parser needs: it reads, seeks,
//! fetches single bytes, reads lines and scans numeric tokens, whether the
//! bytes come from a file ([`FileStream`]) or from a caller-owned slice
//! ([`BufferStream`]).
//!
//! Two redirections can be layered on top of that:
//! - a *subfile*, which swaps the file being read for another file on disk
//!   (file backing only), and
//! - a *temporary buffer*, which puts a [`BufferStream`] in front of whatever
//!   backs the stream. While it is installed every reading primitive goes to
//!   that buffer and the backing is not touched at all.

pub mod buffer;
pub mod error;
pub mod file;
pub mod token;

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

pub use buffer::BufferStream;
pub use error::{Result, StreamError};
pub use file::FileStream;
pub use token::{Token, TokenKind};

/// Reference point of a seek offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    FromStart,
    FromCurrent,
    FromEnd,
}

impl SeekMode {
    /// Splits a [`SeekFrom`] into a signed offset and a mode. Start offsets
    /// beyond `i64::MAX` saturate.
    pub(crate) fn split(pos: SeekFrom) -> (i64, SeekMode) {
        match pos {
            SeekFrom::Start(o) => (i64::try_from(o).unwrap_or(i64::MAX), SeekMode::FromStart),
            SeekFrom::Current(o) => (o, SeekMode::FromCurrent),
            SeekFrom::End(o) => (o, SeekMode::FromEnd),
        }
    }
}

/// What a [`Stream`] reads from when no temporary buffer is installed.
#[derive(Debug)]
pub enum Backing<'a> {
    File(FileStream),
    Buffer(BufferStream<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    File,
    Buffer,
}

/// A byte stream over a file or a borrowed buffer, with an optional temporary
/// buffer installed in front of it.
///
/// The lifetime `'a` covers the caller's buffers: the primary buffer of a
/// buffer-backed stream and any temporary buffer installed with
/// [`Stream::install_override`].
#[derive(Debug)]
pub struct Stream<'a> {
    backing: Backing<'a>,
    overlay: Option<BufferStream<'a>>,
}

/// Runs `$call` on the temporary buffer when one is installed, otherwise on the
/// backing. Buffer results are infallible and get wrapped in `Ok`.
macro_rules! dispatch {
    ($self:ident, |$s:ident| $call:expr) => {
        if let Some($s) = $self.overlay.as_mut() {
            Ok($call)
        } else {
            match &mut $self.backing {
                Backing::File($s) => $call,
                Backing::Buffer($s) => Ok($call),
            }
        }
    };
}

// ===== impl Stream ==========================================================
impl<'a> Stream<'a> {
    pub fn new(backing: Backing<'a>) -> Self {
        Self {
            backing,
            overlay: None,
        }
    }

    /// Opens a file-backed stream. Check [`Stream::is_valid`] before use.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::from_file(FileStream::new(path))
    }

    pub fn from_file(file: FileStream) -> Self {
        Self::new(Backing::File(file))
    }

    /// A stream over `data`. The bytes are borrowed, never copied.
    pub fn from_buffer(data: &'a [u8]) -> Self {
        Self::new(Backing::Buffer(BufferStream::new(data)))
    }

    pub fn kind(&self) -> BackingKind {
        match self.backing {
            Backing::File(_) => BackingKind::File,
            Backing::Buffer(_) => BackingKind::Buffer,
        }
    }

    /// Whether the backing is usable.
    ///
    /// This always describes the backing, even while a temporary buffer is
    /// installed.
    pub fn is_valid(&self) -> bool {
        match &self.backing {
            Backing::File(f) => f.is_valid(),
            Backing::Buffer(b) => b.is_valid(),
        }
    }

    /// Reads up to `elem_size * count` bytes into `dst` and returns the number
    /// of complete elements read. A short count means the data ran out.
    pub fn read_elements(&mut self, dst: &mut [u8], elem_size: usize, count: usize) -> Result<usize> {
        dispatch!(self, |s| s.read_elements(dst, elem_size, count))
    }

    /// Moves the cursor and returns the new absolute position.
    ///
    /// Buffers clamp the target into `[0, len]`; files pass it to the OS and
    /// may fail.
    pub fn seek_to(&mut self, offset: i64, mode: SeekMode) -> Result<u64> {
        dispatch!(self, |s| s.seek_to(offset, mode))
    }

    pub fn tell(&mut self) -> Result<u64> {
        dispatch!(self, |s| s.tell())
    }

    /// Consumes one byte and returns it; `Ok(None)` at end of stream.
    pub fn get_char(&mut self) -> Result<Option<u8>> {
        dispatch!(self, |s| s.get_char())
    }

    /// Reads one line, `\n` included, into `dst` and NUL-terminates it.
    ///
    /// At most `dst.len() - 1` bytes are read. Returns the line length, or
    /// `Ok(None)` when nothing is left to read.
    pub fn read_line(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        dispatch!(self, |s| s.read_line(dst))
    }

    /// Parses one numeric token at the cursor.
    ///
    /// # Errors
    ///
    /// [`StreamError::Parse`] when no token of `kind` starts at the cursor
    /// (after whitespace). The cursor is left where it was.
    pub fn scan_token(&mut self, kind: TokenKind) -> Result<Token> {
        let token: Option<Token> = dispatch!(self, |s| s.scan_token(kind))?;
        token.ok_or(StreamError::Parse(kind))
    }

    /// Parses one token given a scanf-style format, `%d` or `%f`.
    pub fn scan_format(&mut self, format: &str) -> Result<Token> {
        let kind = format.parse()?;
        self.scan_token(kind)
    }

    pub fn scan_int(&mut self) -> Result<i32> {
        match self.scan_token(TokenKind::Int)? {
            Token::Int(v) => Ok(v),
            Token::Float(_) => Err(StreamError::Parse(TokenKind::Int)),
        }
    }

    pub fn scan_float(&mut self) -> Result<f32> {
        match self.scan_token(TokenKind::Float)? {
            Token::Float(v) => Ok(v),
            Token::Int(_) => Err(StreamError::Parse(TokenKind::Float)),
        }
    }

    /// Whether the next read would find no data. Consumes nothing.
    pub fn at_end(&mut self) -> Result<bool> {
        dispatch!(self, |s| s.at_end())
    }

    /// Total length of whatever is being read right now.
    pub fn size(&mut self) -> Result<u64> {
        dispatch!(self, |s| s.size())
    }

    /// Path of the file backing, for diagnostics. `None` for buffers.
    pub fn name(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(f) => f.name(),
            Backing::Buffer(_) => None,
        }
    }

    /// Switches the file backing to another file until
    /// [`Stream::close_subfile`] is called.
    ///
    /// This acts on the file backing even while a temporary buffer is
    /// installed.
    ///
    /// # Errors
    ///
    /// [`StreamError::Busy`] if a subfile is already open,
    /// [`StreamError::NotFound`] if `path` cannot be opened (nothing changes),
    /// [`StreamError::Unsupported`] on a buffer-backed stream.
    pub fn open_subfile(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match &mut self.backing {
            Backing::File(f) => f.open_subfile(path),
            Backing::Buffer(_) => Err(StreamError::Unsupported("subfiles on a buffer stream")),
        }
    }

    /// Goes back to the master file. No-op when no subfile is open.
    pub fn close_subfile(&mut self) {
        if let Backing::File(f) = &mut self.backing {
            f.close_subfile();
        }
    }

    pub fn in_subfile(&self) -> bool {
        match &self.backing {
            Backing::File(f) => f.in_subfile(),
            Backing::Buffer(_) => false,
        }
    }

    /// Puts a temporary buffer over `bytes` in front of the backing.
    ///
    /// Every reading primitive goes to that buffer, starting at offset 0, until
    /// [`Stream::end_override`]. The backing keeps its own position.
    ///
    /// # Errors
    ///
    /// [`StreamError::Busy`] if a temporary buffer is already installed; the
    /// installed one stays in place.
    pub fn install_override(&mut self, bytes: &'a [u8]) -> Result<()> {
        if self.overlay.is_some() {
            return Err(StreamError::Busy);
        }
        debug!("Installing temporary buffer of {} bytes", bytes.len());
        self.overlay = Some(BufferStream::new(bytes));
        Ok(())
    }

    /// Removes the temporary buffer, if any.
    pub fn end_override(&mut self) {
        if self.overlay.take().is_some() {
            debug!("Temporary buffer removed");
        }
    }

    pub fn has_override(&self) -> bool {
        self.overlay.is_some()
    }
}

impl From<FileStream> for Stream<'_> {
    fn from(file: FileStream) -> Self {
        Stream::from_file(file)
    }
}

impl<'a> From<BufferStream<'a>> for Stream<'a> {
    fn from(buffer: BufferStream<'a>) -> Self {
        Stream::new(Backing::Buffer(buffer))
    }
}

// ===== std::io trait implementations =======================================
impl Read for Stream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(overlay) = self.overlay.as_mut() {
            return overlay.read(buf);
        }
        match &mut self.backing {
            Backing::File(f) => f.read(buf),
            Backing::Buffer(b) => b.read(buf),
        }
    }
}

impl Seek for Stream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let Some(overlay) = self.overlay.as_mut() {
            return overlay.seek(pos);
        }
        match &mut self.backing {
            Backing::File(f) => f.seek(pos),
            Backing::Buffer(b) => b.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_seek_from() {
        assert_eq!(SeekMode::split(SeekFrom::Start(3)), (3, SeekMode::FromStart));
        assert_eq!(SeekMode::split(SeekFrom::Start(u64::MAX)), (i64::MAX, SeekMode::FromStart));
        assert_eq!(SeekMode::split(SeekFrom::Current(-2)), (-2, SeekMode::FromCurrent));
        assert_eq!(SeekMode::split(SeekFrom::End(0)), (0, SeekMode::FromEnd));
    }

    #[test]
    fn test_override_shadows_buffer_backing() {
        let primary = b"primary";
        let temp = b"123\n45";
        let mut stream = Stream::from_buffer(primary);
        stream.seek_to(3, SeekMode::FromStart).unwrap();

        stream.install_override(temp).unwrap();
        assert!(stream.has_override());
        assert_eq!(stream.tell().unwrap(), 0);
        assert_eq!(stream.size().unwrap(), 6);

        let mut line = [0u8; 10];
        assert_eq!(stream.read_line(&mut line).unwrap(), Some(4));
        assert_eq!(stream.scan_int().unwrap(), 45);
        assert!(stream.at_end().unwrap());

        assert!(matches!(stream.install_override(primary), Err(StreamError::Busy)));
        assert_eq!(stream.tell().unwrap(), 6);

        stream.end_override();
        assert!(!stream.has_override());
        assert_eq!(stream.tell().unwrap(), 3);
        assert_eq!(stream.get_char().unwrap(), Some(b'm'));

        stream.end_override();
        assert_eq!(stream.tell().unwrap(), 4);
    }

    #[test]
    fn test_is_valid_ignores_override() {
        let mut stream = Stream::from_path("/nonexistent/raw.nef");
        assert!(!stream.is_valid());
        assert!(matches!(stream.tell(), Err(StreamError::Unusable)));

        stream.install_override(b"7").unwrap();
        assert!(!stream.is_valid());
        assert_eq!(stream.scan_int().unwrap(), 7);
    }

    #[test]
    fn test_buffer_backing_has_no_subfile() {
        let mut stream = Stream::from_buffer(b"data");
        assert_eq!(stream.kind(), BackingKind::Buffer);
        assert!(stream.name().is_none());
        assert!(matches!(stream.open_subfile("x"), Err(StreamError::Unsupported(_))));
        stream.close_subfile();
        assert!(!stream.in_subfile());
    }

    #[test]
    fn test_scan_format_and_parse_error() {
        let mut stream = Stream::from_buffer(b"2.5 abc");
        assert_eq!(stream.scan_format("%f").unwrap(), Token::Float(2.5));
        assert!(matches!(stream.scan_format("%x"), Err(StreamError::UnsupportedFormat(_))));
        assert!(matches!(stream.scan_int(), Err(StreamError::Parse(TokenKind::Int))));
        assert_eq!(stream.tell().unwrap(), 3);
    }
}
