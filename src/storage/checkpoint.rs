//! # Checkpoint Format
//!
//! The database persists as a single checkpoint file: a fixed header
//! followed by every record in ascending id order as raw 32-byte blobs. The
//! format is opaque to callers and stable within one version.
//!
//! ## File Layout
//!
//! ```text
//! +-----------------------+
//! | magic     [u8; 8]     |  "SAMPLEDB"
//! | version   u32         |  1
//! | crc32     u32         |  CRC-32/ISO-HDLC over the payload
//! | count     u64         |  number of record blobs
//! | height    u64         |  tree height at save time (informational)
//! +-----------------------+
//! | payload               |  count x 32-byte Record blobs, ascending id
//! +-----------------------+
//! ```
//!
//! Header and payload are little-endian native layouts read through
//! zerocopy; the payload begins at offset 32, which keeps the 8-byte-aligned
//! `Record` slice directly mappable.
//!
//! ## Load Path
//!
//! Loading memory-maps the file, validates magic, version, length, and
//! checksum, then views the payload as a `[Record]` slice without copying.
//! The caller rebuilds the tree by sorted bulk insertion. A corrupt or
//! truncated checkpoint fails the load and leaves the database untouched.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crc::{Crc, CRC_32_ISO_HDLC};
use eyre::{bail, ensure, Result, WrapErr};
use memmap2::Mmap;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::record::{Record, RECORD_SIZE};

const MAGIC: [u8; 8] = *b"SAMPLEDB";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = std::mem::size_of::<CheckpointHeader>();

const CHECKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct CheckpointHeader {
    magic: [u8; 8],
    version: u32,
    crc32: u32,
    record_count: u64,
    tree_height: u64,
}

const _: () = assert!(HEADER_SIZE == 32, "header must stay 32 bytes");

/// Writes a checkpoint for `records` (already in ascending id order from the
/// leaf walk).
pub fn save(path: &Path, records: &[Record], tree_height: u32) -> Result<()> {
    let mut digest = CHECKSUM.digest();
    for record in records {
        digest.update(record.as_bytes());
    }

    let header = CheckpointHeader {
        magic: MAGIC,
        version: FORMAT_VERSION,
        crc32: digest.finalize(),
        record_count: records.len() as u64,
        tree_height: tree_height as u64,
    };

    let file = File::create(path)
        .wrap_err_with(|| format!("cannot create checkpoint at {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(header.as_bytes())?;
    for record in records {
        writer.write_all(record.as_bytes())?;
    }
    writer
        .flush()
        .wrap_err_with(|| format!("cannot flush checkpoint at {}", path.display()))?;
    Ok(())
}

/// Result of loading a checkpoint: the stored records plus the height the
/// tree had when it was saved.
#[derive(Debug)]
pub struct LoadedCheckpoint {
    pub records: Vec<Record>,
    pub tree_height: u64,
}

/// Reads and validates a checkpoint file.
pub fn load(path: &Path) -> Result<LoadedCheckpoint> {
    let file = File::open(path)
        .wrap_err_with(|| format!("cannot open checkpoint at {}", path.display()))?;
    // Safety: the mapping is read-only and dropped before this function
    // returns; records are copied out of it.
    let mmap = unsafe { Mmap::map(&file) }
        .wrap_err_with(|| format!("cannot map checkpoint at {}", path.display()))?;

    ensure!(
        mmap.len() >= HEADER_SIZE,
        "checkpoint truncated: {} bytes is smaller than the header",
        mmap.len()
    );

    let header = CheckpointHeader::read_from_bytes(&mmap[..HEADER_SIZE])
        .map_err(|_| eyre::eyre!("checkpoint header is malformed"))?;
    ensure!(header.magic == MAGIC, "not a sampledb checkpoint");
    ensure!(
        header.version == FORMAT_VERSION,
        "unsupported checkpoint version {}",
        header.version
    );

    let payload = &mmap[HEADER_SIZE..];
    let expected = header.record_count as usize * RECORD_SIZE;
    ensure!(
        payload.len() == expected,
        "checkpoint payload is {} bytes, expected {} for {} records",
        payload.len(),
        expected,
        header.record_count
    );

    if CHECKSUM.checksum(payload) != header.crc32 {
        bail!("checkpoint payload failed checksum validation");
    }

    let records = <[Record]>::ref_from_bytes(payload)
        .map_err(|_| eyre::eyre!("checkpoint payload is not a valid record array"))?;

    Ok(LoadedCheckpoint {
        records: records.to_vec(),
        tree_height: header.tree_height,
    })
}
