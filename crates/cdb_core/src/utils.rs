use byteorder::{ByteOrder, LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> { w.write_u32::<LE>(v) }
pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> { r.read_u32::<LE>() }

/// Caller guarantees `buf` holds at least `pos + 4` bytes.
#[inline]
pub fn u32_at(buf: &[u8], pos: usize) -> u32 { LE::read_u32(&buf[pos..pos + 4]) }

#[inline]
pub fn put_u32(out: &mut Vec<u8>, v: u32) { out.extend_from_slice(&v.to_le_bytes()); }
