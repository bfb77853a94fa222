//! carvel - Recover JPEG files from raw memory-card and disk images
//!
//! This tool scans an image in 512-byte blocks and writes every run of
//! blocks that starts with a JPEG signature to its own numbered file.

use anyhow::{Context, Result};
use carvel_core::{
    open_image, CarveReport, Carver, CarverConfig, DirectorySink, DiscardSink, OutputSink,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Recover JPEG files from a raw memory-card or disk image
#[derive(Parser, Debug)]
#[command(name = "carvel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raw image to scan
    image: PathBuf,

    /// Output directory for recovered files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum number of files to recover (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_files: usize,

    /// Dry run - don't write files, just show what would be recovered
    #[arg(long)]
    dry_run: bool,

    /// Refuse to overwrite existing files in the output directory
    #[arg(long)]
    no_clobber: bool,

    /// Print a BLAKE3 manifest line for each recovered file
    #[arg(long)]
    manifest: bool,
}

/// Wraps a sink and records a BLAKE3 digest of every finished file
struct HashingSink<S> {
    inner: S,
    digests: Vec<(String, blake3::Hash)>,
}

impl<S> HashingSink<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            digests: Vec::new(),
        }
    }
}

struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: OutputSink> OutputSink for HashingSink<S> {
    type Target = HashingWriter<S::Target>;

    fn create(&mut self, name: &str) -> carvel_core::Result<Self::Target> {
        Ok(HashingWriter {
            inner: self.inner.create(name)?,
            hasher: blake3::Hasher::new(),
        })
    }

    fn finish(&mut self, name: &str, target: Self::Target) -> carvel_core::Result<()> {
        let HashingWriter { inner, hasher } = target;
        self.inner.finish(name, inner)?;
        self.digests.push((name.to_string(), hasher.finalize()));
        Ok(())
    }

    fn location(&self, name: &str) -> PathBuf {
        self.inner.location(name)
    }
}

/// One line of a `b3sum`-compatible manifest
fn manifest_line(name: &str, hash: &blake3::Hash) -> String {
    format!("{}  {}", hash.to_hex(), name)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(parse_exit_code(&e));
        }
    };

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    ExitCode::from(report_outcome(run(&cli)))
}

/// Exit status for a command line that failed to parse.
///
/// Usage errors exit 1; `--help` and `--version` exit 0.
fn parse_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

/// Report the outcome of a run on stderr and return the exit status
fn report_outcome(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", diagnostic(&e));
            1
        }
    }
}

/// Single-line message for a fatal error, causes included
fn diagnostic(err: &anyhow::Error) -> String {
    format!("error: {:#}", err)
}

fn run(cli: &Cli) -> Result<()> {
    let input = open_image(&cli.image)?;
    let config = CarverConfig::new().max_files(cli.max_files);

    debug!("Scanning {}", cli.image.display());

    if cli.dry_run {
        let mut sink = HashingSink::new(DiscardSink);
        let report = carve_into(cli, input, &mut sink, config)?;
        for file in &report.files {
            println!(
                "Would write: {} ({} bytes)",
                cli.output.join(&file.name).display(),
                file.size()
            );
        }
        print_manifest(cli, &sink.digests);
        print_summary(&report);
        return Ok(());
    }

    let directory = DirectorySink::new(&cli.output)?.no_clobber(cli.no_clobber);
    let mut sink = HashingSink::new(directory);
    let report = carve_into(cli, input, &mut sink, config)?;

    print_manifest(cli, &sink.digests);
    print_summary(&report);
    Ok(())
}

/// Run the carver over `input`, writing into `sink`
fn carve_into<S: OutputSink>(
    cli: &Cli,
    input: impl io::Read,
    sink: S,
    config: CarverConfig,
) -> Result<CarveReport> {
    Carver::with_config(sink, config)
        .run(input)
        .with_context(|| format!("scan of {} aborted", cli.image.display()))
}

fn print_manifest(cli: &Cli, digests: &[(String, blake3::Hash)]) {
    if !cli.manifest {
        return;
    }
    for (name, hash) in digests {
        println!("{}", manifest_line(name, hash));
    }
}

fn print_summary(report: &CarveReport) {
    info!(
        "Summary: {} blocks read, {} discarded, {} files recovered ({} bytes)",
        report.blocks_read,
        report.blocks_discarded,
        report.file_count(),
        report.bytes_recovered()
    );
    if report.limit_reached {
        info!("Stopped early at the file limit");
    }
}
