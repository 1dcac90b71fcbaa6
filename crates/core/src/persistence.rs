//! Snapshot framing for index persistence.
//!
//! A snapshot is `[bincode payload][magic "RKS1"][u32 CRC32 BE]`. Readers
//! verify the footer before decoding, so a truncated or bit-flipped file is
//! rejected as [`Error::Corrupt`] instead of yielding a half-built index.
//! File writes go through a temp file and a rename.

use crate::config::SNAPSHOT_MAGIC;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const FOOTER_LEN: usize = 8;

/// Serializes `value` and writes it with the checksum footer.
pub(crate) fn write_snapshot<T: Serialize>(value: &T, writer: &mut dyn Write) -> Result<()> {
    let bytes = bincode::serialize(value).map_err(|e| io::Error::other(e.to_string()))?;
    let crc = crc32fast::hash(&bytes);

    writer.write_all(&bytes)?;
    writer.write_all(SNAPSHOT_MAGIC)?;
    writer.write_all(&crc.to_be_bytes())?;
    writer.flush()?;

    tracing::debug!("Wrote snapshot ({} bytes, CRC32={:#010x})", bytes.len(), crc);
    Ok(())
}

/// Reads a snapshot written by [`write_snapshot`], verifying magic and CRC32.
pub(crate) fn read_snapshot<T: DeserializeOwned>(reader: &mut dyn Read) -> Result<T> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;

    if raw.len() < FOOTER_LEN {
        return Err(Error::Corrupt(format!(
            "snapshot too short: {} bytes",
            raw.len()
        )));
    }
    let (payload, footer) = raw.split_at(raw.len() - FOOTER_LEN);
    if &footer[..4] != SNAPSHOT_MAGIC {
        return Err(Error::Corrupt("missing snapshot footer".into()));
    }
    let stored_crc = u32::from_be_bytes([footer[4], footer[5], footer[6], footer[7]]);
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Err(Error::Corrupt(format!(
            "CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}"
        )));
    }
    tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored_crc);

    bincode::deserialize(payload).map_err(|e| Error::Corrupt(e.to_string()))
}

/// Writes to `path` atomically: `f` fills a sibling temp file that is then renamed over `path`.
pub(crate) fn write_atomic<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let result = (|| -> Result<()> {
        let file = File::create(tmp_path)?;
        let mut writer = BufWriter::new(file);
        f(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(tmp_path, path)?;
        Ok(())
    })();

    if let Err(e) = &result {
        tracing::warn!("Snapshot write to {:?} failed: {}", path, e);
        let _ = fs::remove_file(tmp_path);
    }
    result
}

/// Opens a snapshot file for reading.
pub(crate) fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip() {
        let value = vec![(1u32, "a".to_string()), (2, "b".to_string())];
        let mut buf = Vec::new();
        write_snapshot(&value, &mut buf).unwrap();
        assert_eq!(&buf[buf.len() - 8..buf.len() - 4], SNAPSHOT_MAGIC);

        let back: Vec<(u32, String)> = read_snapshot(&mut buf.as_slice()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let mut buf = Vec::new();
        write_snapshot(&vec![1u64, 2, 3], &mut buf).unwrap();
        buf[0] ^= 0xFF;
        let err = read_snapshot::<Vec<u64>>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)), "got {err:?}");
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let mut buf = Vec::new();
        write_snapshot(&42u32, &mut buf).unwrap();
        buf.truncate(5);
        assert!(matches!(
            read_snapshot::<u32>(&mut buf.as_slice()),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(
            read_snapshot::<u32>(&mut &b""[..]),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.rks");
        write_atomic(&path, |w| write_snapshot(&"hello", w)).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("index.rks.tmp").exists());

        let mut reader = open(&path).unwrap();
        let back: String = read_snapshot(&mut reader).unwrap();
        assert_eq!(back, "hello");
    }

    #[test]
    fn test_write_atomic_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.rks");
        write_atomic(&path, |w| write_snapshot(&1u8, w)).unwrap();

        let result = write_atomic(&path, |_| Err(Error::InvalidArgument("boom".into())));
        assert!(result.is_err());

        let back: u8 = read_snapshot(&mut open(&path).unwrap()).unwrap();
        assert_eq!(back, 1);
    }
}
