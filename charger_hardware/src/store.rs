//! File-backed capacity record.
//!
//! The record is a fixed 8-byte file of two little-endian u32 words. The
//! XOR keying and consistency check live in the core's tracker; this
//! backend only moves the raw words, so a short or unreadable file shows
//! up as a store error and a missing file as "no record yet".

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use charger_traits::{CapacityStore, StoreError};

const RECORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct FileCapacityStore {
    path: PathBuf,
}

impl FileCapacityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CapacityStore for FileCapacityStore {
    fn load(&mut self) -> Result<Option<[u32; 2]>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if bytes.len() < RECORD_LEN {
            return Err(StoreError::ShortRecord {
                expected: RECORD_LEN,
                got: bytes.len(),
            });
        }
        let w0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let w1 = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Some([w0, w1]))
    }

    fn save(&mut self, words: [u32; 2]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..4].copy_from_slice(&words[0].to_le_bytes());
        bytes[4..].copy_from_slice(&words[1].to_le_bytes());
        // Write-then-rename so a crash mid-write cannot leave a short
        // record in place of a good one.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "capacity record written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_no_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileCapacityStore::new(dir.path().join("record"));
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn roundtrips_words() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileCapacityStore::new(dir.path().join("record"));
        store.save([0xDEAD_BEEF, 0x0123_4567]).expect("save");
        assert_eq!(store.load().expect("load"), Some([0xDEAD_BEEF, 0x0123_4567]));
    }

    #[test]
    fn short_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("record");
        std::fs::write(&path, [1u8, 2, 3]).expect("seed");
        let mut store = FileCapacityStore::new(path);
        assert!(matches!(
            store.load(),
            Err(StoreError::ShortRecord { expected: 8, got: 3 })
        ));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("calibration").join("record");
        let mut store = FileCapacityStore::new(path);
        store.save([7, 8]).expect("save");
        assert_eq!(store.load().expect("load"), Some([7, 8]));
    }

    #[test]
    fn overwrite_replaces_the_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = FileCapacityStore::new(dir.path().join("record"));
        store.save([1, 2]).expect("save");
        store.save([3, 4]).expect("save");
        assert_eq!(store.load().expect("load"), Some([3, 4]));
    }
}
