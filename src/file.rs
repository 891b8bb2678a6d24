//! File-backed stream
//!
//! This module provides [`FileStream`], a thin wrapper around [`std::fs::File`]
//! that exposes the stream primitives used by RAW parsers and implements
//! [`std::io::Read`] and [`std::io::Seek`].
//!
//! The active handle can be swapped for another file ("subfile") so that an
//! embedded thumbnail or sidecar referenced by the container can be parsed
//! with the same primitives, then swapped back to the master file.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::error::{Result, StreamError};
use crate::token::{self, Token, TokenKind};
use crate::SeekMode;

/// Bytes fetched at once when looking for a numeric token.
const SCAN_WINDOW: usize = 512;

/// A read-only stream over an opened file.
///
/// Construction never fails: when the file cannot be opened the stream is
/// still built, [`FileStream::is_valid`] reports `false` and every primitive
/// returns [`StreamError::Unusable`].
#[derive(Debug, Default)]
pub struct FileStream {
    /// The active handle. `None` when the open at construction failed.
    file: Option<File>,
    /// The master handle, stashed while a subfile is active.
    saved: Option<File>,
    /// Path given at construction, for diagnostics.
    path: Option<PathBuf>,
}

// ===== impl FileStream ======================================================
impl FileStream {
    /// Opens the file at `path` for reading.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => {
                debug!("Opened stream on '{}'", path.display());
                Some(file)
            }
            Err(err) => {
                warn!("Cannot open '{}': {}", path.display(), err);
                None
            }
        };
        Self {
            file,
            saved: None,
            path: Some(path.to_path_buf()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.file.is_some()
    }

    /// The path given at construction. Unchanged while a subfile is active.
    pub fn name(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a subfile currently replaces the master file.
    pub fn in_subfile(&self) -> bool {
        self.saved.is_some()
    }

    fn handle(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(StreamError::Unusable)
    }

    /// Reads up to `elem_size * count` bytes into `dst` and returns how many
    /// complete elements were read. Short counts happen at end of file.
    pub fn read_elements(&mut self, dst: &mut [u8], elem_size: usize, count: usize) -> Result<usize> {
        let file = self.handle()?;
        if elem_size == 0 {
            return Ok(0);
        }
        let wanted = elem_size.saturating_mul(count).min(dst.len());
        let n = fill(file, &mut dst[..wanted])?;
        Ok(n / elem_size)
    }

    /// Moves the file cursor and returns the new absolute position.
    ///
    /// Nothing is clamped: a target before the start of the file is an error,
    /// a target past its end is accepted like [`File::seek`] does.
    pub fn seek_to(&mut self, offset: i64, mode: SeekMode) -> Result<u64> {
        let file = self.handle()?;
        let pos = match mode {
            SeekMode::FromStart => {
                let start = u64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
                })?;
                SeekFrom::Start(start)
            }
            SeekMode::FromCurrent => SeekFrom::Current(offset),
            SeekMode::FromEnd => SeekFrom::End(offset),
        };
        Ok(file.seek(pos)?)
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.handle()?.stream_position()?)
    }

    /// Consumes one byte. `None` at end of file.
    pub fn get_char(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = fill(self.handle()?, &mut byte)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Reads one line into `dst` and NUL-terminates it.
    ///
    /// Reading stops after the first `\n` (kept in the output) or after
    /// `dst.len() - 1` bytes. Bytes fetched past the terminator are given back
    /// by seeking. Returns the line length, or `None` at end of file.
    pub fn read_line(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        let max = dst.len().saturating_sub(1);
        if max == 0 {
            if self.at_end()? {
                return Ok(None);
            }
            if let Some(terminator) = dst.first_mut() {
                *terminator = 0;
            }
            return Ok(Some(0));
        }

        let file = self.handle()?;
        let n = fill(file, &mut dst[..max])?;
        if n == 0 {
            return Ok(None);
        }
        let line = match dst[..n].iter().position(|&b| b == b'\n') {
            Some(nl) => nl + 1,
            None => n,
        };
        if line < n {
            file.seek(SeekFrom::Current(line as i64 - n as i64))?;
        }
        dst[line] = 0;
        Ok(Some(line))
    }

    /// Parses one token of `kind` at the cursor and moves past it.
    ///
    /// The cursor moves back to where it was when no token is found.
    pub fn scan_token(&mut self, kind: TokenKind) -> Result<Option<Token>> {
        let file = self.handle()?;
        let start = file.stream_position()?;
        let mut window = vec![0u8; SCAN_WINDOW];
        let mut base = start;

        let mut n = fill(file, &mut window)?;
        loop {
            let lead = token::skip_space(&window[..n]);
            if lead == n && n == SCAN_WINDOW {
                base += n as u64;
                n = fill(file, &mut window)?;
                continue;
            }
            if lead > 0 {
                base += lead as u64;
                file.seek(SeekFrom::Start(base))?;
                n = fill(file, &mut window)?;
            }
            break;
        }

        match token::scan(&window[..n], kind) {
            Some((value, used)) => {
                file.seek(SeekFrom::Start(base + used as u64))?;
                Ok(Some(value))
            }
            None => {
                file.seek(SeekFrom::Start(start))?;
                Ok(None)
            }
        }
    }

    /// Whether the next read would hit end of file. Consumes nothing.
    pub fn at_end(&mut self) -> Result<bool> {
        let file = self.handle()?;
        let mut byte = [0u8; 1];
        let n = fill(file, &mut byte)?;
        if n == 1 {
            file.seek(SeekFrom::Current(-1))?;
        }
        Ok(n == 0)
    }

    /// Length of the active file.
    pub fn size(&mut self) -> Result<u64> {
        Ok(self.handle()?.metadata()?.len())
    }

    /// Replaces the active handle with `path`, keeping the master handle aside.
    ///
    /// # Errors
    ///
    /// [`StreamError::Busy`] when a subfile is already active,
    /// [`StreamError::NotFound`] when `path` cannot be opened. In both cases the
    /// stream keeps reading from the file it was reading before.
    pub fn open_subfile(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.saved.is_some() {
            return Err(StreamError::Busy);
        }
        if self.file.is_none() {
            return Err(StreamError::Unusable);
        }

        let subfile = File::open(path).map_err(|source| {
            warn!("Cannot open subfile '{}': {}", path.display(), source);
            StreamError::NotFound {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.saved = self.file.replace(subfile);
        debug!("Switched to subfile '{}'", path.display());
        Ok(())
    }

    /// Drops the subfile handle and goes back to the master file.
    /// Does nothing when no subfile is active.
    pub fn close_subfile(&mut self) {
        if let Some(master) = self.saved.take() {
            self.file = Some(master);
            debug!("Back to master file");
        }
    }
}

/// Reads until `buf` is full or end of file. Returns the bytes read.
fn fill(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ===== std::io trait implementations =======================================
impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.handle()?.read(buf)?)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.handle()?.seek(pos)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_unopened_stream_is_unusable() {
        let mut stream = FileStream::new("/nonexistent/dir/image.cr2");
        assert!(!stream.is_valid());
        assert_eq!(stream.name(), Some(Path::new("/nonexistent/dir/image.cr2")));

        let mut buf = [0u8; 4];
        assert!(matches!(stream.read_elements(&mut buf, 1, 4), Err(StreamError::Unusable)));
        assert!(matches!(stream.tell(), Err(StreamError::Unusable)));
        assert!(matches!(stream.get_char(), Err(StreamError::Unusable)));
        assert!(matches!(stream.at_end(), Err(StreamError::Unusable)));
        assert!(matches!(stream.open_subfile("/tmp"), Err(StreamError::Unusable)));

        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_default_has_no_name() {
        let stream = FileStream::default();
        assert!(!stream.is_valid());
        assert!(stream.name().is_none());
    }

    #[test]
    fn test_read_elements_short_at_eof() {
        let temp_file = temp_with(b"0123456");
        let mut stream = FileStream::new(temp_file.path());

        let mut buf = [0u8; 8];
        assert_eq!(stream.read_elements(&mut buf, 4, 2).unwrap(), 1);
        assert_eq!(&buf[..7], b"0123456");
        assert_eq!(stream.tell().unwrap(), 7);
        assert_eq!(stream.read_elements(&mut buf, 4, 2).unwrap(), 0);
    }

    #[test]
    fn test_seek_passes_through() {
        let temp_file = temp_with(b"0123456789");
        let mut stream = FileStream::new(temp_file.path());

        assert_eq!(stream.seek_to(4, SeekMode::FromStart).unwrap(), 4);
        assert_eq!(stream.seek_to(-1, SeekMode::FromCurrent).unwrap(), 3);
        assert_eq!(stream.seek_to(-2, SeekMode::FromEnd).unwrap(), 8);
        assert_eq!(stream.seek_to(100, SeekMode::FromStart).unwrap(), 100);
        assert!(stream.at_end().unwrap());

        assert!(matches!(stream.seek_to(-1, SeekMode::FromStart), Err(StreamError::Io(_))));
        stream.seek_to(2, SeekMode::FromStart).unwrap();
        assert!(stream.seek_to(-5, SeekMode::FromCurrent).is_err());
    }

    #[test]
    fn test_get_char_and_at_end() {
        let temp_file = temp_with(b"\xffA");
        let mut stream = FileStream::new(temp_file.path());

        assert!(!stream.at_end().unwrap());
        assert_eq!(stream.tell().unwrap(), 0);
        assert_eq!(stream.get_char().unwrap(), Some(0xff));
        assert_eq!(stream.get_char().unwrap(), Some(b'A'));
        assert!(stream.at_end().unwrap());
        assert_eq!(stream.get_char().unwrap(), None);
    }

    #[test]
    fn test_read_line_then_scan() {
        let temp_file = temp_with(b"123\n45");
        let mut stream = FileStream::new(temp_file.path());

        let mut line = [0xffu8; 10];
        assert_eq!(stream.read_line(&mut line).unwrap(), Some(4));
        assert_eq!(&line[..5], b"123\n\0");
        assert_eq!(stream.tell().unwrap(), 4);

        assert_eq!(stream.scan_token(TokenKind::Int).unwrap(), Some(Token::Int(45)));
        assert_eq!(stream.tell().unwrap(), 6);
        assert_eq!(stream.read_line(&mut line).unwrap(), None);
    }

    #[test]
    fn test_read_line_small_capacity() {
        let temp_file = temp_with(b"abcdef\n");
        let mut stream = FileStream::new(temp_file.path());

        let mut line = [0xffu8; 4];
        assert_eq!(stream.read_line(&mut line).unwrap(), Some(3));
        assert_eq!(&line, b"abc\0");

        let mut one = [0xffu8; 1];
        assert_eq!(stream.read_line(&mut one).unwrap(), Some(0));
        assert_eq!(one, [0]);
        assert_eq!(stream.tell().unwrap(), 3);
    }

    #[test]
    fn test_scan_skips_long_whitespace() {
        let mut content = vec![b' '; SCAN_WINDOW + 10];
        content.extend_from_slice(b"-2.5e1 tail");
        let temp_file = temp_with(&content);
        let mut stream = FileStream::new(temp_file.path());

        assert_eq!(stream.scan_token(TokenKind::Float).unwrap(), Some(Token::Float(-25.0)));
        assert_eq!(stream.tell().unwrap(), (SCAN_WINDOW + 16) as u64);

        assert_eq!(stream.scan_token(TokenKind::Int).unwrap(), None);
        assert_eq!(stream.tell().unwrap(), (SCAN_WINDOW + 16) as u64);
    }

    #[test]
    fn test_subfile_switch() {
        let master = temp_with(b"MASTER");
        let thumb = temp_with(b"thumb");
        let mut stream = FileStream::new(master.path());
        stream.seek_to(2, SeekMode::FromStart).unwrap();

        stream.open_subfile(thumb.path()).unwrap();
        assert!(stream.in_subfile());
        assert_eq!(stream.size().unwrap(), 5);
        assert_eq!(stream.get_char().unwrap(), Some(b't'));
        assert!(matches!(stream.open_subfile(master.path()), Err(StreamError::Busy)));
        assert_eq!(stream.get_char().unwrap(), Some(b'h'));

        stream.close_subfile();
        assert!(!stream.in_subfile());
        assert_eq!(stream.name(), Some(master.path()));
        assert_eq!(stream.get_char().unwrap(), Some(b'S'));

        stream.close_subfile();
        assert_eq!(stream.tell().unwrap(), 3);
    }

    #[test]
    fn test_subfile_not_found_keeps_master() {
        let master = temp_with(b"MASTER");
        let mut stream = FileStream::new(master.path());

        let err = stream.open_subfile("/nonexistent/thumb.jpg").unwrap_err();
        assert!(matches!(err, StreamError::NotFound { .. }));
        assert!(!stream.in_subfile());

        let mut buf = [0u8; 6];
        assert_eq!(stream.read_elements(&mut buf, 1, 6).unwrap(), 6);
        assert_eq!(&buf, b"MASTER");
    }
}
