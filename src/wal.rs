use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record<T: Serialize>(writer: &mut impl Write, record: &T) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Result of reading a journal from disk.
#[derive(Debug)]
pub struct Replay<T> {
    pub records: Vec<T>,
    /// Byte length of the intact prefix. Anything after it is a torn or
    /// corrupt tail and is cut off by `Wal::open`.
    pub valid_len: u64,
    pub discarded_bytes: u64,
}

/// Append-only journal.
///
/// Format per entry: `[u32: len][bincode: T][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A truncated or corrupt entry ends replay; it and everything after it
///   are dropped when the journal is reopened for writing.
///
/// The file never holds bytes past the last synced batch for long: a failed
/// batch is cut back with `rollback`. If even that fails the journal is
/// poisoned and refuses further appends until compaction replaces the file.
pub struct Wal<T> {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    committed_len: u64,
    pending: u64,
    appends_since_compact: u64,
    poisoned: bool,
    _record: PhantomData<fn(T)>,
}

fn poisoned_error() -> io::Error {
    io::Error::other("journal poisoned by a failed rollback")
}

impl<T: Serialize + DeserializeOwned> Wal<T> {
    /// Open (or create) the journal at `path`, cutting it back to `valid_len`
    /// bytes so new appends never land behind a torn entry.
    pub fn open(path: &Path, valid_len: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let len = file.metadata()?.len();
        if len > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            committed_len: len.min(valid_len),
            pending: 0,
            appends_since_compact: 0,
            poisoned: false,
            _record: PhantomData,
        })
    }

    /// Append and fsync one record.
    #[cfg(test)]
    pub fn append(&mut self, record: &T) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Buffer one record without syncing. `flush_sync()` commits the batch.
    pub fn append_buffered(&mut self, record: &T) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        encode_record(&mut self.writer, record)?;
        self.pending += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Err(poisoned_error());
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact += self.pending;
        self.pending = 0;
        Ok(())
    }

    /// Drop everything written since the last successful `flush_sync`:
    /// buffered bytes are discarded and the file is cut back to its
    /// committed length. On failure the journal is poisoned.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.pending = 0;
        let result = self.truncate_to_committed();
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn truncate_to_committed(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let old = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // Unflushed bytes belong to the failed batch.
        let (old_file, _discarded) = old.into_parts();
        old_file.set_len(self.committed_len)?;
        old_file.sync_all()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write compacted records to a temp file and fsync.
    /// Slow I/O phase; the writer task calls it without touching the live file.
    pub fn write_compact_file(path: &Path, records: &[T]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the journal and reopen it for appends.
    /// A fresh file also clears a poisoned journal.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        if !self.poisoned {
            self.writer.flush()?;
        }
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.pending = 0;
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[T]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    /// Read every intact record. A missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Replay<T>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay { records: Vec::new(), valid_len: 0, discarded_bytes: 0 });
            }
            Err(e) => return Err(e),
        };
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_full(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as u64;
            if valid_len + 8 + len > total_len {
                break; // torn payload
            }

            let mut payload = vec![0u8; len as usize];
            if !read_full(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<T>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            valid_len += 8 + len;
        }

        Ok(Replay {
            records,
            valid_len,
            discarded_bytes: total_len - valid_len,
        })
    }
}

/// `read_exact` that reports a clean or torn EOF as `Ok(false)`.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
