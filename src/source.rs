//! # Line Sources
//!
//! Restartable line-oriented inputs. A source is opened twice per run: once
//! to count its lines and once for the running pass, which may start past a
//! number of already processed lines.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;

use memchr::memchr_iter;
use thiserror::Error;

use crate::constants::COUNT_BUFFER_SIZE;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Lazy sequence of lines produced by a [`LineSource`].
pub type Lines<'a> = Box<dyn Iterator<Item = io::Result<String>> + Send + 'a>;

/// A finite, restartable, line-oriented input.
pub trait LineSource: Send + Sync {
    /// Human readable name used in logs.
    fn describe(&self) -> String;

    /// Open the source, discarding the first `start` lines.
    fn open(&self, start: u64) -> Result<Lines<'_>, SourceError>;

    /// Count every line with a full pass over the source.
    fn count_lines(&self) -> Result<u64, SourceError> {
        let mut count = 0u64;
        for line in self.open(0)? {
            line?;
            count += 1;
        }
        Ok(count)
    }
}

/// Wordlist backed by a file on disk. Reopened on every pass.
pub struct FileLineSource {
    path: PathBuf,
}

impl FileLineSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_file(&self) -> Result<File, SourceError> {
        File::open(&self.path).map_err(|source| SourceError::Open {
            path: self.path.clone(),
            source,
        })
    }
}

impl LineSource for FileLineSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self, start: u64) -> Result<Lines<'_>, SourceError> {
        let mut lines = LineIter {
            reader: BufReader::new(self.open_file()?),
        };
        skip_lines(&mut lines, start)?;
        Ok(Box::new(lines))
    }

    fn count_lines(&self) -> Result<u64, SourceError> {
        let mut file = self.open_file()?;
        let mut buf = vec![0u8; COUNT_BUFFER_SIZE];
        let mut count = 0u64;
        let mut last = None;
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            count += memchr_iter(b'\n', &buf[..n]).count() as u64;
            last = Some(buf[n - 1]);
        }
        // unterminated final line
        if matches!(last, Some(byte) if byte != b'\n') {
            count += 1;
        }
        Ok(count)
    }
}

/// Discard up to `count` lines. Stops quietly at end of input; read errors
/// in the skipped prefix are returned.
fn skip_lines<I>(lines: &mut I, count: u64) -> io::Result<()>
where
    I: Iterator<Item = io::Result<String>>,
{
    for _ in 0..count {
        match lines.next() {
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err),
            None => break,
        }
    }
    Ok(())
}

/// Splits on `\n`, trimming a trailing `\r`. Invalid UTF-8 is replaced rather
/// than rejected so a single bad entry does not end the run.
struct LineIter<R> {
    reader: R,
}

impl<R: BufRead> Iterator for LineIter<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(0) => None,
            Ok(_) => {
                if raw.last() == Some(&b'\n') {
                    raw.pop();
                    if raw.last() == Some(&b'\r') {
                        raw.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&raw).into_owned()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
