//! cdbmake text format: one `+klen,dlen:key->data\n` line per record, closed
//! by an empty line. Lengths are decimal byte counts, so keys and data may
//! hold any bytes, newlines included.

use anyhow::{anyhow, bail, Result};
use std::io::Write;

pub fn parse(input: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    loop {
        match input.get(pos) {
            // a missing terminator line is tolerated
            None => return Ok(out),
            Some(b'\n') => return Ok(out),
            Some(b'+') => pos += 1,
            Some(c) => bail!("record {}: expected '+' at byte {pos}, found {:?}", out.len(), *c as char),
        }
        let klen = number(input, &mut pos, b',')?;
        let dlen = number(input, &mut pos, b':')?;
        let key = take(input, &mut pos, klen)?;
        expect(input, &mut pos, b"->")?;
        let data = take(input, &mut pos, dlen)?;
        expect(input, &mut pos, b"\n")?;
        out.push((key.to_vec(), data.to_vec()));
    }
}

fn number(input: &[u8], pos: &mut usize, end: u8) -> Result<usize> {
    let start = *pos;
    let stop = input[start..]
        .iter()
        .position(|b| *b == end)
        .ok_or_else(|| anyhow!("unterminated length at byte {start}"))?;
    let digits = &input[start..start + stop];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        bail!("bad length at byte {start}");
    }
    *pos = start + stop + 1;
    Ok(std::str::from_utf8(digits)?.parse()?)
}

fn take<'a>(input: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(n).filter(|e| *e <= input.len())
        .ok_or_else(|| anyhow!("truncated record at byte {pos}"))?;
    let s = &input[*pos..end];
    *pos = end;
    Ok(s)
}

fn expect(input: &[u8], pos: &mut usize, lit: &[u8]) -> Result<()> {
    if take(input, pos, lit.len())? != lit {
        bail!("expected {:?} before byte {pos}", String::from_utf8_lossy(lit));
    }
    Ok(())
}

pub fn write_record<W: Write>(w: &mut W, key: &[u8], data: &[u8]) -> std::io::Result<()> {
    write!(w, "+{},{}:", key.len(), data.len())?;
    w.write_all(key)?;
    w.write_all(b"->")?;
    w.write_all(data)?;
    w.write_all(b"\n")
}

pub fn write_end<W: Write>(w: &mut W) -> std::io::Result<()> { w.write_all(b"\n") }
