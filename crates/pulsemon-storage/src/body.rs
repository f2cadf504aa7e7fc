//! Object store for ping bodies that do not fit inline.
//!
//! Bodies over the inline limit land here as flat files keyed by
//! `<check-id>/<n>`; the ping row records the key and size. Blocking
//! filesystem I/O is acceptable on the intake path.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub struct BodyStore {
    dir: PathBuf,
}

impl BodyStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating body store dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Store a body, returning its object key and size in bytes.
    pub fn put(&self, check_id: &str, n: i64, body: &[u8]) -> Result<(String, i64)> {
        let key = format!("{check_id}/{n}");
        let path = self.dir.join(check_id);
        fs::create_dir_all(&path)?;
        fs::write(path.join(n.to_string()), body)?;
        Ok((key, body.len() as i64))
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop all stored bodies for a check. Called when a check is deleted.
    pub fn remove_check(&self, check_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.dir.join(check_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
