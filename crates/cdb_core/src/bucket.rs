//! Two-level index: a fixed header of 256 table pointers, each naming an
//! exactly-sized open-addressing slot table.
//!
//! Table pointer (8 bytes, LE): `pos: u32` (file offset of slot 0), `slots: u32`.
//! Slot (8 bytes, LE): `hash: u32`, `offset: u32` (record offset, 0 = empty).
//!
//! Bucket `i` holds the keys with `hash & 0xFF == i`. A key's probe starts at
//! `(hash >> 8) % slots` and walks forward with wraparound.

use crate::consts::{BUCKETS, EMPTY_OFFSET, HEADER_SIZE, MAX_FILE_LEN, POINTER_SIZE, SLOT_SIZE};
use crate::errors::{CdbError, Result};
use crate::hash::{bucket_of, primary_slot};
use crate::utils::{put_u32, u32_at};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TablePointer {
    pub pos: u32,
    pub slots: u32,
}

impl TablePointer {
    #[inline]
    pub fn is_empty(&self) -> bool { self.slots == 0 }

    #[inline]
    pub fn slot_pos(&self, slot: u32) -> u64 { self.pos as u64 + slot as u64 * SLOT_SIZE }

    /// One past the last byte of this table.
    #[inline]
    pub fn end(&self) -> u64 { self.slot_pos(self.slots) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    pub hash: u32,
    pub offset: u32,
}

impl Slot {
    #[inline]
    pub fn is_empty(&self) -> bool { self.offset == EMPTY_OFFSET }

    pub fn decode(buf: &[u8]) -> Self {
        Self { hash: u32_at(buf, 0), offset: u32_at(buf, 4) }
    }
}

/// The first 2048 bytes of every database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pointers: [TablePointer; BUCKETS],
}

impl Default for Header {
    fn default() -> Self {
        Self { pointers: [TablePointer::default(); BUCKETS] }
    }
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CdbError::Corrupt("file shorter than header"));
        }
        let mut hdr = Self::default();
        for (i, p) in hdr.pointers.iter_mut().enumerate() {
            let at = i * POINTER_SIZE;
            *p = TablePointer { pos: u32_at(buf, at), slots: u32_at(buf, at + 4) };
        }
        Ok(hdr)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        for p in &self.pointers {
            put_u32(&mut out, p.pos);
            put_u32(&mut out, p.slots);
        }
        out
    }

    #[inline]
    pub fn pointer(&self, bucket: usize) -> TablePointer { self.pointers[bucket] }

    pub fn pointers(&self) -> &[TablePointer; BUCKETS] { &self.pointers }

    /// Number of records indexed, one slot per record.
    pub fn total_slots(&self) -> u64 {
        self.pointers.iter().map(|p| p.slots as u64).sum()
    }

    /// End of the records region: the first slot table, or the whole file
    /// when every bucket is empty.
    pub fn records_end(&self, file_len: u64) -> u64 {
        self.pointers
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.pos as u64)
            .min()
            .unwrap_or(file_len)
    }

    /// Every non-empty table must sit between the header and end of file.
    pub fn validate(&self, file_len: u64) -> Result<()> {
        for p in self.pointers.iter().filter(|p| !p.is_empty()) {
            if (p.pos as u64) < HEADER_SIZE as u64 || p.end() > file_len {
                return Err(CdbError::Corrupt("slot table outside file"));
            }
        }
        Ok(())
    }
}

/// Slot indices visited for `hash`, starting at its primary slot and
/// covering every slot of the table exactly once.
#[derive(Debug, Clone)]
pub struct ProbeSeq {
    next: u32,
    slots: u32,
    remaining: u32,
}

impl ProbeSeq {
    pub fn new(hash: u32, slots: u32) -> Self {
        let next = if slots == 0 { 0 } else { primary_slot(hash, slots) };
        Self { next, slots, remaining: slots }
    }
}

impl Iterator for ProbeSeq {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 { return None; }
        self.remaining -= 1;
        let cur = self.next;
        self.next = if cur + 1 == self.slots { 0 } else { cur + 1 };
        Some(cur)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

/// In-memory slot table for one bucket, sized exactly to its membership.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn with_len(n: usize) -> Self { Self { slots: vec![Slot::default(); n] } }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }
    pub fn slots(&self) -> &[Slot] { &self.slots }

    /// Linear-probes from the primary slot to the first empty cell.
    /// Returns the probe distance, or `None` if the table is full.
    pub fn insert(&mut self, hash: u32, offset: u32) -> Option<u32> {
        debug_assert_ne!(offset, EMPTY_OFFSET);
        for (dist, idx) in ProbeSeq::new(hash, self.slots.len() as u32).enumerate() {
            let slot = &mut self.slots[idx as usize];
            if slot.is_empty() {
                *slot = Slot { hash, offset };
                return Some(dist as u32);
            }
        }
        None
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for s in &self.slots {
            put_u32(out, s.hash);
            put_u32(out, s.offset);
        }
    }
}

/// Build-time view of all 256 buckets: `(hash, offset)` per record, kept in
/// insertion order within each bucket.
pub struct BucketIndex {
    members: [Vec<Slot>; BUCKETS],
    len: usize,
}

impl Default for BucketIndex {
    fn default() -> Self { Self::new() }
}

impl BucketIndex {
    pub fn new() -> Self {
        Self { members: std::array::from_fn(|_| Vec::new()), len: 0 }
    }

    pub fn push(&mut self, hash: u32, offset: u32) {
        self.members[bucket_of(hash)].push(Slot { hash, offset });
        self.len += 1;
    }

    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn bucket_len(&self, bucket: usize) -> usize { self.members[bucket].len() }

    /// Places every record into its bucket's table and serializes the tables
    /// back to back starting at `tables_start`. Empty buckets get `(0, 0)`.
    pub fn layout(&self, tables_start: u64) -> Result<(Header, Vec<u8>)> {
        let table_bytes = self.len as u64 * SLOT_SIZE;
        if tables_start + table_bytes > MAX_FILE_LEN {
            return Err(CdbError::TooLarge);
        }
        let mut header = Header::default();
        let mut out = Vec::with_capacity(table_bytes as usize);
        let mut pos = tables_start;
        for (bucket, members) in self.members.iter().enumerate() {
            if members.is_empty() { continue; }
            let mut table = SlotTable::with_len(members.len());
            for m in members {
                table
                    .insert(m.hash, m.offset)
                    .ok_or(CdbError::Corrupt("bucket table overflow"))?;
            }
            table.encode_into(&mut out);
            header.pointers[bucket] = TablePointer { pos: pos as u32, slots: members.len() as u32 };
            pos += members.len() as u64 * SLOT_SIZE;
        }
        Ok((header, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_wraps_and_visits_each_slot_once() {
        let h = 2u32 << 8;
        let seq: Vec<u32> = ProbeSeq::new(h, 4).collect();
        assert_eq!(seq, vec![2, 3, 0, 1]);
        assert_eq!(ProbeSeq::new(h, 0).count(), 0);
    }

    #[test]
    fn insert_linear_probes_on_collision() {
        let mut t = SlotTable::with_len(3);
        let h = 1u32 << 8; // primary slot 1
        assert_eq!(t.insert(h, 2048), Some(0));
        assert_eq!(t.insert(h, 2060), Some(1));
        assert_eq!(t.insert(h, 2070), Some(2));
        assert_eq!(t.insert(h, 2080), None);
        let offsets: Vec<u32> = t.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![2070, 2048, 2060]);
    }

    #[test]
    fn header_roundtrip_and_empty_default() {
        let empty = Header::default();
        assert!(empty.encode().iter().all(|b| *b == 0));
        assert_eq!(empty.encode().len(), HEADER_SIZE);

        let mut buf = empty.encode();
        buf[7 * 8..7 * 8 + 4].copy_from_slice(&3000u32.to_le_bytes());
        buf[7 * 8 + 4..7 * 8 + 8].copy_from_slice(&2u32.to_le_bytes());
        let hdr = Header::decode(&buf).unwrap();
        assert_eq!(hdr.pointer(7), TablePointer { pos: 3000, slots: 2 });
        assert_eq!(hdr.total_slots(), 2);
        assert_eq!(hdr.encode(), buf);
    }

    #[test]
    fn short_header_is_corrupt() {
        assert!(matches!(Header::decode(&[0u8; 100]), Err(CdbError::Corrupt(_))));
    }

    #[test]
    fn validate_rejects_tables_outside_file() {
        let mut hdr = Header::default();
        hdr.pointers[3] = TablePointer { pos: 2100, slots: 4 };
        assert!(hdr.validate(2132).is_ok());
        assert!(hdr.validate(2131).is_err());
        hdr.pointers[3] = TablePointer { pos: 8, slots: 1 };
        assert!(hdr.validate(10_000).is_err());
    }

    #[test]
    fn layout_assigns_cumulative_positions() {
        let mut idx = BucketIndex::new();
        idx.push(0x0000_0105, 2048); // bucket 5
        idx.push(0x0000_0201, 2060); // bucket 1
        idx.push(0x0000_0305, 2070); // bucket 5
        let (hdr, tables) = idx.layout(4000).unwrap();

        assert_eq!(hdr.pointer(0), TablePointer::default());
        assert_eq!(hdr.pointer(1), TablePointer { pos: 4000, slots: 1 });
        assert_eq!(hdr.pointer(5), TablePointer { pos: 4008, slots: 2 });
        assert_eq!(hdr.total_slots(), 3);
        assert_eq!(hdr.records_end(5000), 4000);
        assert_eq!(tables.len(), 24);

        // bucket 5: 0x105 -> slot 1, 0x305 -> slot 1, probes to 0
        let s0 = Slot::decode(&tables[8..16]);
        let s1 = Slot::decode(&tables[16..24]);
        assert_eq!(s0, Slot { hash: 0x305, offset: 2070 });
        assert_eq!(s1, Slot { hash: 0x105, offset: 2048 });
    }

    #[test]
    fn layout_rejects_oversized_tables() {
        let mut idx = BucketIndex::new();
        idx.push(1, 2048);
        assert!(matches!(idx.layout(MAX_FILE_LEN), Err(CdbError::TooLarge)));
    }
}
