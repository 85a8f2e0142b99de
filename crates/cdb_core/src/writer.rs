//! Database builder.
//!
//! Records stream into a temp file in the target's directory as they are
//! added; only `(hash, offset)` per record stays in memory. `finish` lays out
//! the slot tables, patches the header, fsyncs and renames over the target.
//! A writer dropped before `finish` leaves the target untouched.

use crate::bucket::BucketIndex;
use crate::consts::{BUCKETS, HEADER_SIZE, MAX_FILE_LEN, SLOT_SIZE};
use crate::errors::{CdbError, Result};
use crate::hash::hash;
use crate::record;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = parent_dir(path);
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> { Ok(()) }

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub records: u64,
    pub file_len: u64,
    pub buckets_used: usize,
    pub max_bucket_len: usize,
}

pub struct CdbWriter {
    path_final: PathBuf,
    out: BufWriter<NamedTempFile>,
    index: BucketIndex,
    pos: u64,
}

impl CdbWriter {
    /// Starts a new database at `path`. Nothing is visible there until `finish`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path_final = path.as_ref().to_path_buf();
        let mut tmp = tempfile::Builder::new()
            .prefix(".cdb_")
            .tempfile_in(parent_dir(&path_final))?;
        tmp.as_file_mut().write_all(&[0u8; HEADER_SIZE])?; // patched in finish
        debug!(path = %path_final.display(), tmp = %tmp.path().display(), "cdb build started");
        Ok(Self {
            path_final,
            out: BufWriter::new(tmp),
            index: BucketIndex::new(),
            pos: HEADER_SIZE as u64,
        })
    }

    /// Appends one record. Duplicate keys are kept; lookups return the first.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let end = self.pos + record::encoded_len(key, value);
        let tables = (self.index.len() as u64 + 1) * SLOT_SIZE;
        if end + tables > MAX_FILE_LEN {
            return Err(CdbError::TooLarge);
        }
        record::encode(&mut self.out, key, value)?;
        self.index.push(hash(key), self.pos as u32);
        self.pos = end;
        Ok(())
    }

    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.index.is_empty() }

    /// Writes the slot tables and header, then atomically publishes the file.
    pub fn finish(self) -> Result<BuildStats> {
        let CdbWriter { path_final, mut out, index, pos } = self;

        let (header, tables) = index.layout(pos)?;
        out.write_all(&tables)?;
        let mut tmp = out.into_inner().map_err(|e| e.into_error())?;

        {
            let f = tmp.as_file_mut();
            f.seek(SeekFrom::Start(0))?;
            f.write_all(&header.encode())?;
            f.sync_all()?;
        }

        tmp.persist(&path_final)?;
        let _ = fsync_dir(&path_final);

        let stats = BuildStats {
            records: index.len() as u64,
            file_len: pos + tables.len() as u64,
            buckets_used: (0..BUCKETS).filter(|b| index.bucket_len(*b) > 0).count(),
            max_bucket_len: (0..BUCKETS).map(|b| index.bucket_len(b)).max().unwrap_or(0),
        };
        debug!(
            path = %path_final.display(),
            records = stats.records,
            file_len = stats.file_len,
            "cdb build finished"
        );
        Ok(stats)
    }
}

/// Builds a database at `path` from `records`, in order.
pub fn build<P, I, K, V>(path: P, records: I) -> Result<BuildStats>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut w = CdbWriter::create(path)?;
    for (k, v) in records {
        w.add(k.as_ref(), v.as_ref())?;
    }
    w.finish()
}

/// Builds from a map. Keys are written in sorted order so the same map
/// always produces the same bytes.
pub fn build_from_map<P, K, V, S>(path: P, map: &HashMap<K, V, S>) -> Result<BuildStats>
where
    P: AsRef<Path>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
    S: BuildHasher,
{
    let mut pairs: Vec<(&[u8], &[u8])> = map.iter().map(|(k, v)| (k.as_ref(), v.as_ref())).collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
    build(path, pairs)
}
