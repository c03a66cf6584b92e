//! Write-ahead log
//!
//! Every mutation is appended here before it touches in-memory state,
//! so a crash replays to exactly the acknowledged writes. Entries are
//! framed as `len: u32 LE | crc32: u32 LE | MessagePack payload`.
//!
//! A truncated final frame (torn append) is dropped silently on read;
//! a checksum mismatch inside the log is reported as corruption.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use corpus_core::{
    CollectionId, DurabilityMode, Error, Record, RecordId, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// WAL file name inside the store data directory
pub const WAL_FILE_NAME: &str = "corpus.wal";

/// Upper bound on a single frame payload. Frames claiming more than
/// this are treated as corruption rather than an allocation request.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A logged mutation
///
/// Upserts carry the full record including its embedding. That bloats
/// the log for large dimensions but keeps replay self-contained;
/// `compact()` bounds the growth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalOp {
    /// Collection created
    CollectionCreate {
        /// Collection id assigned at creation
        id: CollectionId,
        /// Collection name
        name: String,
        /// Embedding dimension
        dim: usize,
        /// Collection-level metadata
        metadata: Option<JsonValue>,
        /// Creation timestamp (microseconds since epoch)
        created_at: u64,
    },
    /// Collection deleted (cascade is implicit on replay)
    CollectionDelete {
        /// Collection name
        name: String,
    },
    /// Record inserted or overwritten
    Upsert {
        /// Owning collection name
        collection: String,
        /// The full record as stored
        record: Record,
    },
    /// Record deleted
    Delete {
        /// Owning collection name
        collection: String,
        /// Id of the removed record
        id: RecordId,
    },
}

impl WalOp {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(data).map_err(|e| Error::Corruption(format!("bad WAL payload: {}", e)))
    }
}

/// Appender for the write-ahead log
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    mode: DurabilityMode,
}

impl WalWriter {
    /// Open (or create) the WAL at `path` for appending
    pub fn open(path: &Path, mode: DurabilityMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(WalWriter {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            mode,
        })
    }

    /// WAL file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one op. In `Always` mode the frame is fsynced before
    /// returning; in `Standard` mode it is flushed to the OS only.
    pub fn append(&mut self, op: &WalOp) -> Result<()> {
        let payload = op.to_bytes()?;
        // Reject before writing: a frame past this limit would read
        // back as corruption and poison every future open.
        if payload.len() > MAX_FRAME_LEN as usize {
            return Err(Error::invalid_argument(format!(
                "record serializes to {} bytes, over the {} byte WAL frame limit",
                payload.len(),
                MAX_FRAME_LEN
            )));
        }
        let crc = crc32fast::hash(&payload);

        self.writer.write_u32::<LittleEndian>(payload.len() as u32)?;
        self.writer.write_u32::<LittleEndian>(crc)?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;

        if self.mode == DurabilityMode::Always {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Force outstanding frames to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Read every op from the WAL at `path`.
///
/// A missing file is an empty log. A final frame cut short by a crash
/// is dropped with a warning; a complete frame with a bad checksum or
/// an undecodable payload fails with `Corruption`.
pub fn read_wal(path: &Path) -> Result<Vec<WalOp>> {
    let mut raw = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut raw)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }

    let mut ops = Vec::new();
    let mut offset = 0usize;
    while offset < raw.len() {
        if raw.len() - offset < 8 {
            tracing::warn!(
                target: "corpus::wal",
                offset,
                "dropping torn WAL tail (incomplete frame header)"
            );
            break;
        }
        let len = LittleEndian::read_u32(&raw[offset..offset + 4]);
        let crc = LittleEndian::read_u32(&raw[offset + 4..offset + 8]);
        if len > MAX_FRAME_LEN {
            return Err(Error::Corruption(format!(
                "WAL frame at offset {} claims {} bytes",
                offset, len
            )));
        }
        let start = offset + 8;
        let end = start + len as usize;
        if end > raw.len() {
            tracing::warn!(
                target: "corpus::wal",
                offset,
                "dropping torn WAL tail (incomplete frame payload)"
            );
            break;
        }
        let payload = &raw[start..end];
        if crc32fast::hash(payload) != crc {
            return Err(Error::Corruption(format!(
                "WAL checksum mismatch at offset {}",
                offset
            )));
        }
        ops.push(WalOp::from_bytes(payload)?);
        offset = end;
    }
    Ok(ops)
}

/// Rewrite the WAL at `path` to exactly `ops` (compaction).
///
/// Writes a temp file, fsyncs it, then atomically renames it over the
/// old log, so a crash mid-compaction leaves the previous log intact.
pub fn rewrite_wal(path: &Path, ops: &[WalOp], mode: DurabilityMode) -> Result<()> {
    let tmp_path = path.with_extension("wal.tmp");
    {
        // A stale temp file from an interrupted compaction must not
        // leak frames into the new log.
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let mut writer = WalWriter::open(&tmp_path, DurabilityMode::Standard)?;
        for op in ops {
            writer.append(op)?;
        }
        writer.sync()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if mode == DurabilityMode::Always {
        if let Some(parent) = path.parent() {
            // Persist the rename itself.
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corpus_core::{now_micros, RecordSeq};

    fn sample_record(ext: Option<&str>, text: &str) -> Record {
        let now = now_micros();
        Record {
            id: RecordId::new(),
            seq: RecordSeq::new(0),
            external_id: ext.map(String::from),
            text: text.to_string(),
            metadata: Some(serde_json::json!({"kind": "test"})),
            vector: vec![0.1, 0.2, 0.3],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_ops() -> Vec<WalOp> {
        vec![
            WalOp::CollectionCreate {
                id: CollectionId::new(),
                name: "docs".into(),
                dim: 3,
                metadata: None,
                created_at: now_micros(),
            },
            WalOp::Upsert {
                collection: "docs".into(),
                record: sample_record(Some("a1"), "hello"),
            },
            WalOp::Delete {
                collection: "docs".into(),
                id: RecordId::new(),
            },
            WalOp::CollectionDelete { name: "docs".into() },
        ]
    }

    #[test]
    fn test_missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let ops = read_wal(&dir.path().join("nope.wal")).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Always).unwrap();
        for op in sample_ops() {
            writer.append(&op).unwrap();
        }
        drop(writer);

        let ops = read_wal(&path).unwrap();
        assert_eq!(ops.len(), 4);
        match &ops[0] {
            WalOp::CollectionCreate { name, dim, .. } => {
                assert_eq!(name, "docs");
                assert_eq!(*dim, 3);
            }
            other => panic!("unexpected op: {:?}", other),
        }
        match &ops[1] {
            WalOp::Upsert { record, .. } => {
                assert_eq!(record.text, "hello");
                assert_eq!(record.vector, vec![0.1, 0.2, 0.3]);
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }

    #[test]
    fn test_reopen_appends_not_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        writer.append(&sample_ops()[0]).unwrap();
        drop(writer);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        writer.append(&sample_ops()[1]).unwrap();
        drop(writer);

        assert_eq!(read_wal(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_torn_tail_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        for op in sample_ops() {
            writer.append(&op).unwrap();
        }
        drop(writer);

        // Chop bytes off the final frame to simulate a crash mid-append.
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() - 5]).unwrap();

        let ops = read_wal(&path).unwrap();
        assert_eq!(ops.len(), 3);
    }

    #[test]
    fn test_checksum_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        for op in sample_ops() {
            writer.append(&op).unwrap();
        }
        drop(writer);

        // Flip a byte inside the first frame's payload.
        let mut raw = std::fs::read(&path).unwrap();
        raw[10] ^= 0xFF;
        std::fs::write(&path, &raw).unwrap();

        let err = read_wal(&path).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_oversized_frame_rejected_at_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        writer.append(&sample_ops()[0]).unwrap();

        let mut record = sample_record(None, "");
        record.text = "x".repeat(MAX_FRAME_LEN as usize + 1);
        let err = writer
            .append(&WalOp::Upsert {
                collection: "docs".into(),
                record,
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        drop(writer);

        // Nothing of the rejected frame hit the file; the log reads
        // back clean.
        let ops = read_wal(&path).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_rewrite_replaces_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(WAL_FILE_NAME);

        let mut writer = WalWriter::open(&path, DurabilityMode::Standard).unwrap();
        for op in sample_ops() {
            writer.append(&op).unwrap();
        }
        drop(writer);

        let compacted = vec![sample_ops().remove(0)];
        rewrite_wal(&path, &compacted, DurabilityMode::Always).unwrap();

        let ops = read_wal(&path).unwrap();
        assert_eq!(ops.len(), 1);
    }
}
