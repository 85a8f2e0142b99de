//! Record codec: `[key_len u32][val_len u32][key][value]`, little-endian.

use crate::consts::{HEADER_SIZE, MAX_FILE_LEN, RECORD_PREFIX};
use crate::errors::{CdbError, Result};
use crate::io::ReadAt;
use crate::utils::{read_u32, write_u32};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    /// Bytes this record occupies on disk, prefix included.
    pub fn encoded_len(&self) -> u64 { encoded_len(&self.key, &self.value) }
}

pub fn encoded_len(key: &[u8], value: &[u8]) -> u64 {
    RECORD_PREFIX + key.len() as u64 + value.len() as u64
}

/// Writes one record and returns the number of bytes written.
pub fn encode<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> Result<u64> {
    let klen = u32::try_from(key.len()).map_err(|_| CdbError::TooLarge)?;
    let vlen = u32::try_from(value.len()).map_err(|_| CdbError::TooLarge)?;
    write_u32(w, klen)?;
    write_u32(w, vlen)?;
    w.write_all(key)?;
    w.write_all(value)?;
    Ok(encoded_len(key, value))
}

/// Decodes the record starting at `offset`, never reading past `file_len`.
pub fn decode_at<S: ReadAt + ?Sized>(src: &S, offset: u64, file_len: u64) -> Result<Record> {
    if offset < HEADER_SIZE as u64 || offset > MAX_FILE_LEN {
        return Err(CdbError::Corrupt("record offset outside records region"));
    }
    if offset + RECORD_PREFIX > file_len {
        return Err(CdbError::Corrupt("record prefix past end of file"));
    }
    let mut prefix = [0u8; RECORD_PREFIX as usize];
    read_exact_at(src, &mut prefix, offset)?;
    let mut cur = &prefix[..];
    let klen = read_u32(&mut cur)? as u64;
    let vlen = read_u32(&mut cur)? as u64;

    let body = offset + RECORD_PREFIX;
    if body + klen + vlen > file_len {
        return Err(CdbError::Corrupt("record length past end of file"));
    }
    let mut key = vec![0u8; klen as usize];
    read_exact_at(src, &mut key, body)?;
    let mut value = vec![0u8; vlen as usize];
    read_exact_at(src, &mut value, body + klen)?;
    Ok(Record { key, value })
}

/// Positioned read where running out of bytes means the file is truncated.
pub(crate) fn read_exact_at<S: ReadAt + ?Sized>(src: &S, buf: &mut [u8], offset: u64) -> Result<()> {
    if buf.is_empty() { return Ok(()); }
    src.read_exact_at(buf, offset).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CdbError::Corrupt("short read"),
        _ => CdbError::Io(e),
    })
}
