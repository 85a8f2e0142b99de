// crates/cdb_core/src/consts.rs

use core::mem::size_of;

/// Number of first-level buckets, selected by the low byte of a key hash.
pub const BUCKETS: usize = 256;

/// One header entry: `pos: u32` + `slots: u32`.
pub const POINTER_SIZE: usize = 8;
pub const HEADER_SIZE: usize = BUCKETS * POINTER_SIZE;

/// One slot table cell: `hash: u32` + `offset: u32`.
pub const SLOT_SIZE: u64 = 8;

/// Record prefix: `key_len: u32` + `val_len: u32`.
pub const RECORD_PREFIX: u64 = 8;

pub const HASH_SEED: u32 = 5381;

/// Slot offset meaning "never filled". Records start at `HEADER_SIZE`, so no
/// record can live here.
pub const EMPTY_OFFSET: u32 = 0;

/// Every offset and length in the file is a u32.
pub const MAX_FILE_LEN: u64 = u32::MAX as u64;

const _: () = { assert!(HEADER_SIZE == 2048); };
const _: () = { assert!(size_of::<u32>() * 2 == POINTER_SIZE); };
