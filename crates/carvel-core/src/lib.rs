//! # carvel-core
//!
//! A library for carving JPEG files out of raw, block-aligned disk and
//! memory-card images.
//!
//! The image is read sequentially in 512-byte blocks. A block that starts
//! with a JPEG signature begins a new recovered file; every following block
//! is appended to it until the next signature or the end of the image.
//!
//! ## Architecture
//!
//! - [`block`]: Block reading and signature detection
//! - [`carver`]: The scan loop, output-file lifecycle and output sinks
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use carvel_core::{open_image, Carver, CarverConfig, DirectorySink};
//!
//! let input = open_image("card.raw")?;
//! let sink = DirectorySink::new("./recovered")?;
//! let report = Carver::with_config(sink, CarverConfig::new()).run(input)?;
//!
//! for file in &report.files {
//!     println!("{} ({} bytes)", file.name, file.size());
//! }
//! # Ok::<(), carvel_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! Recovered files can be sent anywhere by implementing [`OutputSink`].

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod block;
pub mod carver;
pub mod error;

// Re-export primary types for convenience
pub use block::{is_jpeg_signature, Block, BlockKind, BLOCK_SIZE};
pub use carver::{
    carve, carve_file, carve_file_with_config, open_image, recovered_file_name, CarveReport,
    Carver, CarverConfig, DirectorySink, DiscardSink, MemorySink, OutputSink, RecoveredFile,
};
pub use error::{Error, Result};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
