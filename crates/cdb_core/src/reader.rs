use crate::bucket::{Header, ProbeSeq, Slot, TablePointer};
use crate::consts::{HEADER_SIZE, SLOT_SIZE};
use crate::errors::{CdbError, Result};
use crate::hash::{bucket_of, hash, primary_slot};
use crate::io::ReadAt;
use crate::record::{self, read_exact_at, Record};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Probe distance bins reported by [`ConstantDatabase::stats`]; the last bin
/// collects every distance `>= PROBE_BINS - 1`.
pub const PROBE_BINS: usize = 11;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub records: u64,
    pub file_len: u64,
    pub buckets_used: usize,
    pub max_bucket_len: u32,
    /// `probe_distances[d]`: records stored `d` slots past their primary slot.
    pub probe_distances: Vec<u64>,
}

/// Read-only handle on a finished database.
///
/// The 2048-byte header is cached at open; slots and records are fetched
/// with positioned reads per lookup, so `&self` lookups are safe from any
/// number of threads at once.
#[derive(Debug)]
pub struct ConstantDatabase<S = File> {
    src: S,
    header: Header,
    file_len: u64,
}

impl ConstantDatabase<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path)?;
        let db = Self::from_source(f)?;
        debug!(path = %path.display(), records = db.len(), file_len = db.file_len, "cdb opened");
        Ok(db)
    }
}

impl ConstantDatabase<Mmap> {
    /// Same as [`ConstantDatabase::open`] over a read-only memory map.
    pub fn open_mmap(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path)?;
        let mmap = unsafe { Mmap::map(&f)? };
        let db = Self::from_source(mmap)?;
        debug!(path = %path.display(), records = db.len(), file_len = db.file_len, "cdb mapped");
        Ok(db)
    }
}

impl<S: ReadAt> ConstantDatabase<S> {
    pub fn from_source(src: S) -> Result<Self> {
        let file_len = src.size()?;
        if file_len < HEADER_SIZE as u64 {
            return Err(CdbError::Corrupt("file shorter than header"));
        }
        let mut buf = [0u8; HEADER_SIZE];
        read_exact_at(&src, &mut buf, 0)?;
        let header = Header::decode(&buf)?;
        header.validate(file_len)?;
        Ok(Self { src, header, file_len })
    }

    pub fn header(&self) -> &Header { &self.header }
    pub fn file_len(&self) -> u64 { self.file_len }

    /// Number of records, one slot each.
    pub fn len(&self) -> u64 { self.header.total_slots() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Value of the first record stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut found = None;
        self.probe(key, |value| {
            found = Some(value);
            false
        })?;
        Ok(found)
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        self.probe(key, |value| {
            out.push(value);
            true
        })?;
        Ok(out)
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Walks the probe sequence of `key`, handing each matching value to
    /// `on_match` until it returns `false`.
    fn probe(&self, key: &[u8], mut on_match: impl FnMut(Vec<u8>) -> bool) -> Result<()> {
        let h = hash(key);
        let bucket = bucket_of(h);
        let table = self.header.pointer(bucket);
        if table.is_empty() {
            return Ok(());
        }
        for slot in ProbeSeq::new(h, table.slots) {
            let entry = self.slot_at(&table, slot)?;
            if entry.is_empty() {
                return Ok(());
            }
            if bucket_of(entry.hash) != bucket {
                return Err(CdbError::Corrupt("slot hash outside its bucket"));
            }
            if entry.hash != h {
                continue;
            }
            let rec = self.record_at(entry.offset)?;
            if rec.key == key && !on_match(rec.value) {
                return Ok(());
            }
        }
        // Tables are sized to their membership, so a full traversal without
        // an empty slot is the normal miss path.
        Ok(())
    }

    fn slot_at(&self, table: &TablePointer, slot: u32) -> Result<Slot> {
        let mut buf = [0u8; SLOT_SIZE as usize];
        read_exact_at(&self.src, &mut buf, table.slot_pos(slot))?;
        Ok(Slot::decode(&buf))
    }

    fn record_at(&self, offset: u32) -> Result<Record> {
        record::decode_at(&self.src, offset as u64, self.file_len)
    }

    /// Records in the order they were added, read sequentially from the
    /// records region.
    pub fn iter(&self) -> RecordIter<'_, S> {
        RecordIter {
            src: &self.src,
            pos: HEADER_SIZE as u64,
            end: self.header.records_end(self.file_len),
        }
    }

    /// Slot occupancy and probe distances, read from the tables only.
    pub fn stats(&self) -> Result<DbStats> { self.walk(false) }

    /// Full consistency check: every slot must belong to its bucket and
    /// point at a record whose key hashes to the stored hash, and the records
    /// region must hold exactly one record per slot.
    pub fn verify(&self) -> Result<DbStats> {
        let stats = self.walk(true)?;
        let mut walked = 0u64;
        for rec in self.iter() {
            rec?;
            walked += 1;
        }
        if walked != stats.records {
            return Err(CdbError::Corrupt("record count does not match index"));
        }
        Ok(stats)
    }

    fn walk(&self, check_records: bool) -> Result<DbStats> {
        let mut stats = DbStats {
            file_len: self.file_len,
            probe_distances: vec![0; PROBE_BINS],
            ..Default::default()
        };
        for (bucket, table) in self.header.pointers().iter().enumerate() {
            if table.is_empty() {
                continue;
            }
            stats.buckets_used += 1;
            stats.max_bucket_len = stats.max_bucket_len.max(table.slots);

            let mut buf = vec![0u8; (table.slots as u64 * SLOT_SIZE) as usize];
            read_exact_at(&self.src, &mut buf, table.pos as u64)?;
            for (i, chunk) in buf.chunks_exact(SLOT_SIZE as usize).enumerate() {
                let slot = Slot::decode(chunk);
                if slot.is_empty() {
                    continue;
                }
                if bucket_of(slot.hash) != bucket {
                    return Err(CdbError::Corrupt("slot hash outside its bucket"));
                }
                let slots = table.slots as u64;
                let dist = (i as u64 + slots - primary_slot(slot.hash, table.slots) as u64) % slots;
                stats.probe_distances[(dist as usize).min(PROBE_BINS - 1)] += 1;
                stats.records += 1;

                if check_records {
                    let rec = self.record_at(slot.offset)?;
                    if hash(&rec.key) != slot.hash {
                        return Err(CdbError::Corrupt("record key does not match slot hash"));
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Releases the underlying handle.
    pub fn close(self) {}
}

/// Sequential walk over the records region. Stops after the first error.
pub struct RecordIter<'a, S> {
    src: &'a S,
    pos: u64,
    end: u64,
}

impl<S: ReadAt> Iterator for RecordIter<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        match record::decode_at(self.src, self.pos, self.end) {
            Ok(rec) => {
                self.pos += rec.encoded_len();
                Some(Ok(rec))
            }
            Err(e) => {
                self.pos = self.end;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketIndex;

    /// Assembles a database image by hand from `(stored_hash, key, value)`.
    fn image(records: &[(u32, &str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut idx = BucketIndex::new();
        for (h, k, v) in records {
            let off = HEADER_SIZE as u32 + body.len() as u32;
            record::encode(&mut body, k.as_bytes(), v.as_bytes()).unwrap();
            idx.push(*h, off);
        }
        let (header, tables) = idx.layout((HEADER_SIZE + body.len()) as u64).unwrap();
        let mut buf = header.encode();
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&tables);
        buf
    }

    fn same_bucket_key(key: &[u8]) -> Vec<u8> {
        let want = bucket_of(hash(key));
        (0..100_000)
            .map(|i| format!("probe-{i}").into_bytes())
            .find(|k| bucket_of(hash(k)) == want && k.as_slice() != key)
            .unwrap()
    }

    #[test]
    fn full_hash_collision_falls_through_to_key_compare() {
        let h = hash(b"y");
        let buf = image(&[(h, "x", "decoy"), (h, "y", "real")]);
        let db = ConstantDatabase::from_source(buf).unwrap();
        assert_eq!(db.get(b"y").unwrap(), Some(b"real".to_vec()));
        assert_eq!(db.get(b"x").unwrap(), None);
        assert!(matches!(db.verify(), Err(CdbError::Corrupt(_))));
    }

    #[test]
    fn miss_in_full_bucket_is_not_found() {
        let buf = image(&[(hash(b"foo"), "foo", "bar")]);
        let db = ConstantDatabase::from_source(buf).unwrap();
        let other = same_bucket_key(b"foo");
        assert_eq!(db.get(&other).unwrap(), None);
        assert!(db.get_all(&other).unwrap().is_empty());
        assert!(db.contains_key(b"foo").unwrap());
    }

    #[test]
    fn slot_in_wrong_bucket_is_corrupt() {
        let mut buf = image(&[(hash(b"foo"), "foo", "bar")]);
        let at = buf.len() - 8;
        let bad = hash(b"foo") ^ 1;
        buf[at..at + 4].copy_from_slice(&bad.to_le_bytes());
        let db = ConstantDatabase::from_source(buf).unwrap();
        assert!(matches!(db.get(b"foo"), Err(CdbError::Corrupt(_))));
        assert!(matches!(db.stats(), Err(CdbError::Corrupt(_))));
    }

    #[test]
    fn slot_pointing_into_header_is_corrupt() {
        let mut buf = image(&[(hash(b"foo"), "foo", "bar")]);
        let at = buf.len() - 4;
        buf[at..].copy_from_slice(&16u32.to_le_bytes());
        let db = ConstantDatabase::from_source(buf).unwrap();
        assert!(matches!(db.get(b"foo"), Err(CdbError::Corrupt(_))));
    }

    #[test]
    fn short_source_is_corrupt() {
        let err = ConstantDatabase::from_source(vec![0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, CdbError::Corrupt(_)));
    }

    #[test]
    fn header_only_source_is_empty() {
        let db = ConstantDatabase::from_source(vec![0u8; HEADER_SIZE]).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.get(b"anything").unwrap(), None);
        assert_eq!(db.iter().count(), 0);
        let stats = db.verify().unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(stats.buckets_used, 0);
    }

    #[test]
    fn stats_report_probe_distances() {
        let h = hash(b"dup");
        let buf = image(&[(h, "dup", "1"), (h, "dup", "2"), (h, "dup", "3")]);
        let db = ConstantDatabase::from_source(buf).unwrap();
        let stats = db.verify().unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.buckets_used, 1);
        assert_eq!(stats.max_bucket_len, 3);
        assert_eq!(&stats.probe_distances[..3], &[1, 1, 1]);
        assert_eq!(
            db.get_all(b"dup").unwrap(),
            vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
        );
    }
}
