//! Fixed-size blocks and JPEG signature detection.
//!
//! Images are consumed as a sequence of [`BLOCK_SIZE`]-byte blocks. Only
//! the first four bytes of a block are ever inspected:
//!
//! ```text
//!  0    1    2    3
//! FF   D8   FF   Ex      x = any nibble
//! ```
//!
//! `FF D8` is the JPEG start-of-image marker and `FF Ex` the APPn marker
//! that always follows it in files written by cameras.

use std::io::{ErrorKind, Read};

/// Size in bytes of one block of the input image
pub const BLOCK_SIZE: usize = 512;

/// One block of the input image
pub type Block = [u8; BLOCK_SIZE];

/// Fixed leading bytes of a JPEG signature
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Mask applied to the fourth signature byte
const APPN_MASK: u8 = 0xF0;

/// Expected high nibble of the fourth signature byte
const APPN_MARKER: u8 = 0xE0;

/// Classification of a block during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Block begins with a JPEG signature
    Signature,
    /// Anything else
    Data,
}

impl BlockKind {
    /// Classifies a block by its first four bytes
    pub fn of(block: &Block) -> Self {
        if is_jpeg_signature(block) {
            BlockKind::Signature
        } else {
            BlockKind::Data
        }
    }
}

/// Returns true if the block starts with a JPEG signature.
pub fn is_jpeg_signature(block: &Block) -> bool {
    let [b0, b1, b2, fourth, ..] = *block;
    [b0, b1, b2] == JPEG_MAGIC && fourth & APPN_MASK == APPN_MARKER
}

/// Fill `block` from `reader`.
///
/// Returns the number of bytes read. Anything short of [`BLOCK_SIZE`]
/// means the stream ended; the partial contents are left in `block` but
/// are not part of any recovered file.
pub fn read_block<R: Read + ?Sized>(reader: &mut R, block: &mut Block) -> std::io::Result<usize> {
    let mut filled = 0;

    while filled < BLOCK_SIZE {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}
