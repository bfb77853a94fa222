//! Block-by-block JPEG carving.
//!
//! ## Algorithm Overview
//!
//! 1. Read the image one [`BLOCK_SIZE`] block at a time; a short read ends the scan
//! 2. A block starting with a JPEG signature closes the current output file
//!    (if any) and opens the next one, named `000.jpg`, `001.jpg`, ...
//! 3. Every block, the signature block included, is appended to the open file
//! 4. Blocks seen before the first signature are discarded
//!
//! Signatures are only recognised at block boundaries, so a recovered file is
//! always a whole number of blocks and may carry slack after the JPEG's own
//! end-of-image marker.

mod sink;

pub use sink::{DirectorySink, DiscardSink, MemorySink, OutputSink};

use crate::block::{read_block, Block, BlockKind, BLOCK_SIZE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Name of the recovered file with the given zero-based index.
///
/// Indices up to 999 are zero-padded to three digits. Larger indices keep
/// all their digits (`1000.jpg`), so names stay unique and sort by length
/// first.
pub fn recovered_file_name(index: usize) -> String {
    format!("{:03}.jpg", index)
}

/// One file produced by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredFile {
    /// Zero-based creation index
    pub index: usize,
    /// Output name, derived from `index`
    pub name: String,
    /// Index in the image of the signature block that started this file
    pub first_block: u64,
    /// Number of blocks written
    pub blocks: u64,
}

impl RecoveredFile {
    fn new(index: usize, first_block: u64) -> Self {
        Self {
            index,
            name: recovered_file_name(index),
            first_block,
            blocks: 0,
        }
    }

    /// Size of the file in bytes
    pub fn size(&self) -> u64 {
        self.blocks * BLOCK_SIZE as u64
    }

    /// Byte range in the original image that this file was copied from
    pub fn byte_range(&self) -> Range<u64> {
        let start = self.first_block * BLOCK_SIZE as u64;
        start..start + self.size()
    }
}

/// Summary of a completed scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarveReport {
    /// Recovered files in creation order
    pub files: Vec<RecoveredFile>,
    /// Number of full blocks read from the image
    pub blocks_read: u64,
    /// Full blocks dropped because no file was open yet
    pub blocks_discarded: u64,
    /// Bytes of an incomplete final block, ignored
    pub trailing_bytes: usize,
    /// The scan stopped at the configured file limit
    pub limit_reached: bool,
}

impl CarveReport {
    /// Number of files created
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Total bytes written across all recovered files
    pub fn bytes_recovered(&self) -> u64 {
        self.files.iter().map(RecoveredFile::size).sum()
    }
}

/// Configuration for the carver
#[derive(Debug, Clone, Default)]
pub struct CarverConfig {
    /// Maximum number of files to recover (0 = unlimited)
    pub max_files: usize,
}

impl CarverConfig {
    /// Creates a new carver config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of files to recover
    pub fn max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    fn limit_reached(&self, files_created: usize) -> bool {
        self.max_files > 0 && files_created >= self.max_files
    }
}

/// Output file currently receiving blocks
struct ActiveFile<T> {
    record: RecoveredFile,
    target: T,
}

enum FileState<T> {
    NoActiveFile,
    WritingFile(ActiveFile<T>),
}

/// Everything that changes while a scan runs. Owned by a single call to
/// [`Carver::run`], so an open target is dropped on every exit path.
struct ScanState<T> {
    file: FileState<T>,
    files_created: usize,
}

impl<T> ScanState<T> {
    fn new() -> Self {
        Self {
            file: FileState::NoActiveFile,
            files_created: 0,
        }
    }

    fn take_active(&mut self) -> Option<ActiveFile<T>> {
        match std::mem::replace(&mut self.file, FileState::NoActiveFile) {
            FileState::WritingFile(active) => Some(active),
            FileState::NoActiveFile => None,
        }
    }
}

/// Sequential JPEG carver writing into an [`OutputSink`]
#[derive(Debug)]
pub struct Carver<S> {
    sink: S,
    config: CarverConfig,
}

impl<S: OutputSink> Carver<S> {
    /// Creates a carver with default configuration
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, CarverConfig::default())
    }

    /// Creates a carver with custom configuration
    pub fn with_config(sink: S, config: CarverConfig) -> Self {
        Self { sink, config }
    }

    /// Consumes the carver, returning its sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Scan `input` to the end, writing every recovered file to the sink.
    ///
    /// Any I/O failure aborts the scan. Files finished before the failure
    /// stay in the sink; the file being written is dropped as-is.
    pub fn run<R: Read>(&mut self, mut input: R) -> Result<CarveReport> {
        let mut report = CarveReport::default();
        let mut state = ScanState::new();
        let mut block: Block = [0; BLOCK_SIZE];

        debug!("Starting scan");

        loop {
            let offset = report.blocks_read * BLOCK_SIZE as u64;
            let filled =
                read_block(&mut input, &mut block).map_err(|e| Error::input_read(offset, e))?;

            if filled < BLOCK_SIZE {
                report.trailing_bytes = filled;
                break;
            }

            let block_index = report.blocks_read;
            report.blocks_read += 1;

            if BlockKind::of(&block) == BlockKind::Signature {
                trace!("Signature at block {}", block_index);

                if let Some(active) = state.take_active() {
                    self.close(active, &mut report)?;
                }

                if self.config.limit_reached(state.files_created) {
                    debug!("File limit of {} reached", self.config.max_files);
                    report.limit_reached = true;
                    break;
                }

                let active = self.open(state.files_created, block_index)?;
                state.files_created += 1;
                state.file = FileState::WritingFile(active);
            }

            match &mut state.file {
                FileState::WritingFile(active) => {
                    active
                        .target
                        .write_all(&block)
                        .map_err(|e| Error::output_write(self.sink.location(&active.record.name), e))?;
                    active.record.blocks += 1;
                }
                FileState::NoActiveFile => {
                    trace!("Discarding block {}", block_index);
                    report.blocks_discarded += 1;
                }
            }
        }

        if let Some(active) = state.take_active() {
            self.close(active, &mut report)?;
        }

        if report.trailing_bytes > 0 {
            debug!(
                "Ignoring {} trailing bytes after block {}",
                report.trailing_bytes, report.blocks_read
            );
        }

        debug!(
            "Scan complete: {} blocks read, {} files recovered",
            report.blocks_read,
            report.file_count()
        );
        Ok(report)
    }

    fn open(&mut self, index: usize, first_block: u64) -> Result<ActiveFile<S::Target>> {
        let record = RecoveredFile::new(index, first_block);
        let target = self.sink.create(&record.name)?;
        debug!("Opened {} at block {}", record.name, first_block);
        Ok(ActiveFile { record, target })
    }

    fn close(&mut self, active: ActiveFile<S::Target>, report: &mut CarveReport) -> Result<()> {
        let ActiveFile { record, target } = active;
        self.sink.finish(&record.name, target)?;
        debug!("Closed {} ({} bytes)", record.name, record.size());
        report.files.push(record);
        Ok(())
    }
}

/// Open an image for scanning
pub fn open_image(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::input_open(path, e))?;
    Ok(BufReader::new(file))
}

/// Carve `input` into `output_dir`, returning the number of files created.
pub fn carve<R: Read>(input: R, output_dir: impl Into<PathBuf>) -> Result<usize> {
    let sink = DirectorySink::new(output_dir)?;
    let report = Carver::new(sink).run(input)?;
    Ok(report.file_count())
}

/// Carve the image at `path` into `output_dir`
pub fn carve_file(path: impl AsRef<Path>, output_dir: impl Into<PathBuf>) -> Result<CarveReport> {
    carve_file_with_config(path, output_dir, CarverConfig::default())
}

/// Carve the image at `path` into `output_dir` with custom configuration
pub fn carve_file_with_config(
    path: impl AsRef<Path>,
    output_dir: impl Into<PathBuf>,
    config: CarverConfig,
) -> Result<CarveReport> {
    let input = open_image(path)?;
    let sink = DirectorySink::new(output_dir)?;
    Carver::with_config(sink, config).run(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::{self, Cursor};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Signature block whose body is filled with `fill`
    fn sig(fill: u8) -> Block {
        let mut block = [fill; BLOCK_SIZE];
        block[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0 | (fill & 0x0F)]);
        block
    }

    /// Non-signature block filled with `fill`
    fn data(fill: u8) -> Block {
        [fill; BLOCK_SIZE]
    }

    fn image(blocks: &[Block]) -> Vec<u8> {
        blocks.concat()
    }

    fn carve_in_memory(bytes: &[u8]) -> (CarveReport, Vec<(String, Vec<u8>)>) {
        let mut carver = Carver::new(MemorySink::new());
        let report = carver.run(Cursor::new(bytes)).unwrap();
        (report, carver.into_sink().into_files())
    }

    #[test]
    fn test_file_names() {
        assert_eq!(recovered_file_name(0), "000.jpg");
        assert_eq!(recovered_file_name(7), "007.jpg");
        assert_eq!(recovered_file_name(42), "042.jpg");
        assert_eq!(recovered_file_name(999), "999.jpg");
        assert_eq!(recovered_file_name(1000), "1000.jpg");
    }

    #[test]
    fn test_carver_config_builder() {
        let config = CarverConfig::new().max_files(3);
        assert_eq!(config.max_files, 3);
        assert!(!config.limit_reached(2));
        assert!(config.limit_reached(3));
        assert!(!CarverConfig::new().limit_reached(usize::MAX));
    }

    #[test]
    fn test_empty_input() {
        let (report, files) = carve_in_memory(&[]);
        assert!(files.is_empty());
        assert_eq!(report, CarveReport::default());
    }

    #[test]
    fn test_no_signature_yields_nothing() {
        let bytes = image(&[data(1), data(2), data(3)]);
        let (report, files) = carve_in_memory(&bytes);

        assert!(files.is_empty());
        assert_eq!(report.blocks_read, 3);
        assert_eq!(report.blocks_discarded, 3);
    }

    #[test]
    fn test_leading_data_is_dropped() {
        // data, sig, data
        let bytes = image(&[data(0xAA), sig(0x11), data(0x22)]);
        let (report, files) = carve_in_memory(&bytes);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "000.jpg");
        assert_eq!(files[0].1, bytes[BLOCK_SIZE..].to_vec());
        assert!(!files[0].1.contains(&0xAA));
        assert_eq!(report.blocks_discarded, 1);
        assert_eq!(report.files[0].first_block, 1);
        assert_eq!(report.files[0].byte_range(), 512..1536);
    }

    #[test]
    fn test_two_files() {
        // sig, data, sig, data
        let blocks = [sig(0x10), data(0x20), sig(0x30), data(0x40)];
        let bytes = image(&blocks);
        let (report, files) = carve_in_memory(&bytes);

        assert_eq!(report.file_count(), 2);
        assert_eq!(files[0].0, "000.jpg");
        assert_eq!(files[0].1, image(&blocks[0..2]));
        assert_eq!(files[1].0, "001.jpg");
        assert_eq!(files[1].1, image(&blocks[2..4]));
        assert_eq!(report.bytes_recovered(), 2048);
    }

    #[test]
    fn test_single_signature_block() {
        let bytes = image(&[sig(0x55)]);
        let (report, files) = carve_in_memory(&bytes);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, bytes);
        assert_eq!(report.files[0].blocks, 1);
    }

    #[test]
    fn test_back_to_back_signatures() {
        let blocks = [sig(1), sig(2), sig(3)];
        let (report, files) = carve_in_memory(&image(&blocks));

        assert_eq!(files.len(), 3);
        for (i, (name, contents)) in files.iter().enumerate() {
            assert_eq!(name, &recovered_file_name(i));
            assert_eq!(contents, &blocks[i].to_vec());
        }
        assert_eq!(report.blocks_discarded, 0);
    }

    #[test]
    fn test_trailing_partial_block_ignored() {
        let mut bytes = image(&[sig(0x01), data(0x02)]);
        bytes.extend_from_slice(&[0xEE; 100]);
        let (report, files) = carve_in_memory(&bytes);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1.len(), 2 * BLOCK_SIZE);
        assert!(!files[0].1.contains(&0xEE));
        assert_eq!(report.trailing_bytes, 100);
    }

    /// Log output collected in memory
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_trailing_bytes_quiet_at_warn_level() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();

        let mut bytes = image(&[sig(0x01), data(0x02), data(0x03)]);
        bytes.extend_from_slice(&[0xEE; 100]);
        let (report, _) = tracing::subscriber::with_default(subscriber, || carve_in_memory(&bytes));

        assert_eq!(report.trailing_bytes, 100);
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_trailing_partial_signature_ignored() {
        let mut bytes = image(&[sig(0x01)]);
        bytes.extend_from_slice(&sig(0x02)[..BLOCK_SIZE - 1]);
        let (report, files) = carve_in_memory(&bytes);

        assert_eq!(files.len(), 1);
        assert_eq!(report.trailing_bytes, BLOCK_SIZE - 1);
    }

    #[test]
    fn test_signature_straddling_blocks_not_detected() {
        let mut first = data(0x00);
        first[BLOCK_SIZE - 2..].copy_from_slice(&[0xFF, 0xD8]);
        let mut second = data(0x00);
        second[..2].copy_from_slice(&[0xFF, 0xE0]);

        let (_, files) = carve_in_memory(&image(&[first, second]));
        assert!(files.is_empty());
    }

    #[test]
    fn test_block_partition_property() {
        let layouts: &[(usize, &[usize])] = &[
            (1, &[]),
            (5, &[1]),
            (5, &[4]),
            (8, &[2, 3, 7]),
            (10, &[1, 5, 6, 9]),
            (16, &[3, 8, 12]),
        ];

        for &(k, sig_at) in layouts {
            let blocks: Vec<Block> = (0..k)
                .map(|i| {
                    if sig_at.contains(&i) {
                        sig(i as u8)
                    } else {
                        data(i as u8)
                    }
                })
                .collect();
            let bytes = image(&blocks);
            let (report, files) = carve_in_memory(&bytes);

            assert_eq!(files.len(), sig_at.len(), "layout {k} {sig_at:?}");
            for (j, &start) in sig_at.iter().enumerate() {
                let end = sig_at.get(j + 1).copied().unwrap_or(k);
                assert_eq!(files[j].1, image(&blocks[start..end]), "file {j} of {sig_at:?}");
                assert_eq!(report.files[j].first_block, start as u64);
            }

            // round trip: everything from the first signature on, nothing else
            let joined: Vec<u8> = files.iter().flat_map(|(_, c)| c.iter().copied()).collect();
            let first = sig_at.first().copied().unwrap_or(k);
            assert_eq!(joined, bytes[first * BLOCK_SIZE..].to_vec());
            assert_eq!(report.blocks_discarded, first as u64);
        }
    }

    #[test]
    fn test_max_files_stops_scan() {
        let blocks = [sig(1), data(2), sig(3), data(4), sig(5), data(6)];
        let mut carver = Carver::with_config(MemorySink::new(), CarverConfig::new().max_files(2));
        let report = carver.run(Cursor::new(image(&blocks))).unwrap();

        assert!(report.limit_reached);
        assert_eq!(report.file_count(), 2);
        let files = carver.into_sink().into_files();
        assert_eq!(files[1].1, image(&blocks[2..4]));
    }

    #[test]
    fn test_max_files_not_reached() {
        let mut carver = Carver::with_config(MemorySink::new(), CarverConfig::new().max_files(2));
        let report = carver.run(Cursor::new(image(&[sig(1), data(2)]))).unwrap();
        assert!(!report.limit_reached);
        assert_eq!(report.file_count(), 1);
    }

    #[test]
    fn test_carve_scenario_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let blocks = [data(0x01), sig(0x02), data(0x03)];
        let bytes = image(&blocks);

        let count = carve(Cursor::new(&bytes), temp_dir.path()).unwrap();
        assert_eq!(count, 1);

        let written = fs::read(temp_dir.path().join("000.jpg")).unwrap();
        assert_eq!(written.len(), 1024);
        assert_eq!(written, image(&blocks[1..]));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_carve_file_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let image_path = temp_dir.path().join("card.raw");
        let out = temp_dir.path().join("out");
        fs::write(&image_path, image(&[sig(1), data(2), sig(3), data(4)])).unwrap();

        let first = carve_file(&image_path, &out).unwrap();
        let snapshot: Vec<Vec<u8>> = first
            .files
            .iter()
            .map(|f| fs::read(out.join(&f.name)).unwrap())
            .collect();

        let second = carve_file(&image_path, &out).unwrap();
        assert_eq!(first, second);
        for (f, before) in second.files.iter().zip(&snapshot) {
            assert_eq!(&fs::read(out.join(&f.name)).unwrap(), before);
        }
    }

    #[test]
    fn test_carve_file_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let err = carve_file(temp_dir.path().join("nope.raw"), temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::InputOpen { .. }));
        assert!(err.is_input_error());
    }

    /// Reader that serves `good` bytes and then fails
    struct FailingReader {
        good: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.good.read(buf)? {
                0 => Err(io::Error::other("bad sector")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_input_read_error_aborts() {
        let mut sink = MemorySink::new();
        let reader = FailingReader {
            good: Cursor::new(image(&[sig(1), sig(2)])),
        };

        let err = Carver::new(&mut sink).run(reader).unwrap_err();
        match err {
            Error::InputRead { offset, .. } => assert_eq!(offset, 1024),
            other => panic!("unexpected error: {other}"),
        }
        // the first file was finished when the second signature arrived
        assert_eq!(sink.files().len(), 1);
        assert_eq!(sink.files()[0].0, "000.jpg");
    }

    /// Sink that fails to create or write a chosen file
    #[derive(Default)]
    struct FlakySink {
        fail_create: Option<&'static str>,
        fail_write: Option<&'static str>,
        finished: Vec<String>,
    }

    struct FlakyTarget {
        broken: bool,
    }

    impl Write for FlakyTarget {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                Err(io::Error::other("disk full"))
            } else {
                Ok(buf.len())
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl OutputSink for FlakySink {
        type Target = FlakyTarget;

        fn create(&mut self, name: &str) -> Result<FlakyTarget> {
            if self.fail_create == Some(name) {
                return Err(Error::output_create(name, io::Error::other("read-only")));
            }
            Ok(FlakyTarget {
                broken: self.fail_write == Some(name),
            })
        }

        fn finish(&mut self, name: &str, _target: FlakyTarget) -> Result<()> {
            self.finished.push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_output_write_error_aborts() {
        let mut sink = FlakySink {
            fail_write: Some("001.jpg"),
            ..Default::default()
        };
        let bytes = image(&[sig(1), data(2), sig(3), data(4), sig(5)]);

        let err = Carver::new(&mut sink).run(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::OutputWrite { .. }));
        assert!(err.to_string().contains("001.jpg"));
        assert_eq!(sink.finished, vec!["000.jpg".to_string()]);
    }

    #[test]
    fn test_output_create_error_aborts() {
        let mut sink = FlakySink {
            fail_create: Some("000.jpg"),
            ..Default::default()
        };
        let bytes = image(&[sig(1), data(2)]);

        let err = Carver::new(&mut sink).run(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::OutputCreate { .. }));
        assert!(!err.is_input_error());
        assert!(sink.finished.is_empty());
    }

    #[test]
    fn test_no_clobber_aborts_on_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("001.jpg"), b"keep me").unwrap();

        let sink = DirectorySink::new(temp_dir.path()).unwrap().no_clobber(true);
        let bytes = image(&[sig(1), sig(2)]);
        let err = Carver::new(sink).run(Cursor::new(bytes)).unwrap_err();

        assert!(matches!(err, Error::OutputExists { .. }));
        assert_eq!(fs::read(temp_dir.path().join("000.jpg")).unwrap(), sig(1).to_vec());
        assert_eq!(fs::read(temp_dir.path().join("001.jpg")).unwrap(), b"keep me");
    }
}
