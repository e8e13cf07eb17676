//! # Fixed-Layout Record
//!
//! The engine understands exactly one row shape: a 32-byte record with a
//! 64-bit primary key, a floating-point aggregation target, two categorical
//! dimensions, and an opaque timestamp. The layout is `#[repr(C)]` with no
//! padding, so the same bytes serve three roles:
//!
//! - the in-memory value stored in tree leaves,
//! - the slot in the flat leaf cache, addressable as
//!   `base + index * RECORD_SIZE`,
//! - the on-disk checkpoint blob.
//!
//! ## Binary Layout
//!
//! ```text
//! +--------+--------+--------+------------+-----------+
//! | id     | amount | region | product_id | timestamp |
//! | i64    | f64    | i32    | i32        | i64       |
//! | @0     | @8     | @16    | @20        | @24       |
//! +--------+--------+--------+------------+-----------+
//! ```
//!
//! Records are plain values (`Copy`, no interior references), so snapshots
//! and per-worker partitions never alias tree memory.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Width of one record in bytes; the address stride of the leaf cache and
/// the checkpoint payload.
pub const RECORD_SIZE: usize = std::mem::size_of::<Record>();

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Record {
    /// Primary key; determines tree order. Duplicates are allowed.
    pub id: i64,
    /// Aggregation target.
    pub amount: f64,
    /// Categorical filter dimension.
    pub region: i32,
    /// Categorical filter dimension.
    pub product_id: i32,
    /// Temporal dimension, opaque to the engine.
    pub timestamp: i64,
}

const _: () = assert!(RECORD_SIZE == 32, "record layout must stay 32 bytes");

impl Record {
    pub fn new(id: i64, amount: f64, region: i32, product_id: i32, timestamp: i64) -> Self {
        Self {
            id,
            amount,
            region,
            product_id,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    #[test]
    fn record_is_packed_32_bytes() {
        assert_eq!(std::mem::size_of::<Record>(), 32);
        assert_eq!(std::mem::align_of::<Record>(), 8);
    }

    #[test]
    fn record_bytes_round_trip() {
        let record = Record::new(7, 42.5, 3, 9, 1_700_000_000);
        let bytes = record.as_bytes();
        assert_eq!(bytes.len(), RECORD_SIZE);

        let decoded = Record::read_from_bytes(bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn field_offsets_match_layout() {
        let record = Record::new(1, 2.0, 3, 4, 5);
        let bytes = record.as_bytes();
        assert_eq!(i64::from_le_bytes(bytes[0..8].try_into().unwrap()), 1);
        assert_eq!(f64::from_le_bytes(bytes[8..16].try_into().unwrap()), 2.0);
        assert_eq!(i32::from_le_bytes(bytes[16..20].try_into().unwrap()), 3);
        assert_eq!(i32::from_le_bytes(bytes[20..24].try_into().unwrap()), 4);
        assert_eq!(i64::from_le_bytes(bytes[24..32].try_into().unwrap()), 5);
    }
}
