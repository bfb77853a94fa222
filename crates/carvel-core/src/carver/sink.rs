//! Destinations for recovered files.
//!
//! The [`OutputSink`] trait decides where the bytes of each recovered file
//! end up. The carver only ever holds one target at a time and hands it
//! back through [`OutputSink::finish`] when the file is complete.
//!
//! # Example
//!
//! ```no_run
//! use carvel_core::{Carver, DirectorySink};
//! use std::fs::File;
//!
//! let sink = DirectorySink::new("./recovered")?.no_clobber(true);
//! let report = Carver::new(sink).run(File::open("card.raw")?)?;
//! println!("recovered {} files", report.file_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::trace;

/// Receives the recovered files produced by a scan.
pub trait OutputSink {
    /// Writer for a single recovered file
    type Target: Write;

    /// Open a new target for the file called `name`
    fn create(&mut self, name: &str) -> Result<Self::Target>;

    /// Complete a target. Called exactly once for every created target
    /// that was not abandoned by an error.
    fn finish(&mut self, name: &str, mut target: Self::Target) -> Result<()> {
        target
            .flush()
            .map_err(|e| Error::output_write(self.location(name), e))
    }

    /// Where `name` ends up, for diagnostics
    fn location(&self, name: &str) -> PathBuf {
        PathBuf::from(name)
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    type Target = S::Target;

    fn create(&mut self, name: &str) -> Result<Self::Target> {
        (**self).create(name)
    }

    fn finish(&mut self, name: &str, target: Self::Target) -> Result<()> {
        (**self).finish(name, target)
    }

    fn location(&self, name: &str) -> PathBuf {
        (**self).location(name)
    }
}

/// Writes recovered files into a directory on disk
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    no_clobber: bool,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::directory_create(&dir, e))?;
        Ok(Self {
            dir,
            no_clobber: false,
        })
    }

    /// Refuse to replace files that already exist
    pub fn no_clobber(mut self, no_clobber: bool) -> Self {
        self.no_clobber = no_clobber;
        self
    }
}

impl OutputSink for DirectorySink {
    type Target = BufWriter<File>;

    fn create(&mut self, name: &str) -> Result<Self::Target> {
        let path = self.location(name);
        let mut options = OpenOptions::new();
        options.write(true);
        if self.no_clobber {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }

        let file = options.open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::output_exists(&path)
            } else {
                Error::output_create(&path, e)
            }
        })?;

        trace!("Created {}", path.display());
        Ok(BufWriter::new(file))
    }

    fn finish(&mut self, name: &str, target: Self::Target) -> Result<()> {
        let path = self.location(name);
        // into_inner flushes; a failed flush must not go unnoticed on drop
        target
            .into_inner()
            .map_err(|e| Error::output_write(&path, e.into_error()))?;
        Ok(())
    }

    fn location(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Keeps recovered files in memory, in creation order
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    /// Creates an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished files as `(name, contents)` pairs
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    /// Consumes the sink, returning the finished files
    pub fn into_files(self) -> Vec<(String, Vec<u8>)> {
        self.files
    }
}

impl OutputSink for MemorySink {
    type Target = Vec<u8>;

    fn create(&mut self, _name: &str) -> Result<Self::Target> {
        Ok(Vec::new())
    }

    fn finish(&mut self, name: &str, target: Self::Target) -> Result<()> {
        self.files.push((name.to_string(), target));
        Ok(())
    }
}

/// Discards everything; used for dry runs
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl OutputSink for DiscardSink {
    type Target = io::Sink;

    fn create(&mut self, _name: &str) -> Result<Self::Target> {
        Ok(io::sink())
    }
}
