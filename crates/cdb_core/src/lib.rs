//! Constant database: an immutable, single-file key/value store with a
//! two-level hash index.
//!
//! ```text
//! 0      256 x { pos: u32, slots: u32 }            header, 2048 bytes
//! 2048   { key_len: u32, val_len: u32, key, value } records, in insertion order
//! ...    256 slot tables, each slots x { hash: u32, offset: u32 }
//! ```
//!
//! All integers are little-endian. Built once with [`build`] or
//! [`CdbWriter`], then opened read-only with [`ConstantDatabase::open`].

pub mod bucket;
pub mod consts;
pub mod errors;
pub mod hash;
pub mod io;
pub mod reader;
pub mod record;
pub mod utils;
pub mod writer;

pub use bucket::{Header, Slot, TablePointer};
pub use errors::{CdbError, Result};
pub use hash::hash;
pub use io::ReadAt;
pub use reader::{ConstantDatabase, DbStats, RecordIter};
pub use record::Record;
pub use writer::{build, build_from_map, BuildStats, CdbWriter};
