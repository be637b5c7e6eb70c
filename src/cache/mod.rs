//! The on-disk subset cache, spec.md §4.5.
//!
//! A file-locked, content-addressed cache of computed lat/lon arrays and
//! whole-variable raw data. Grounded on the teacher's I/O style
//! (`examples/gadomski-las-rs/src/reader/mod.rs`'s buffered, error-mapped
//! file access) plus two `other_examples/` files for the two techniques
//! the teacher doesn't need: advisory locking
//! (`fs2::FileExt`, as used for coordinating concurrent writers) and
//! atomic publication via a temp file renamed into place
//! (`tempfile::NamedTempFile`, as in
//! `other_examples/…JoeGCServices…netcdf.rs.rs` and the `substrate2…gds`
//! example).

#![forbid(unsafe_code)]

use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error as ThisError;

use crate::catalog::ProjectionDescriptor;

/// Errors raised by the cache layer. Per spec.md §7, all of these are
/// recoverable by the read path (fall back to live computation) except
/// when propagated as `ConfigError`, which is fatal for the cache but not
/// for the request.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The cache directory is missing, unreadable, or otherwise
    /// misconfigured.
    #[error("cache configuration error: {0}")]
    Config(String),

    /// An OS-level failure (open/read/write/lock/rename).
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        /// The path the failing operation targeted.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
    Error::Io {
        path: path.into(),
        source,
    }
}

/// Builds the lat/lon cache fingerprint, spec.md §4.5: "printable
/// concatenation of: projection code, zone, sphere, pixel registration,
/// origin, (y-size, x-size) in y-major/x-major order matching
/// `ydimmajor`, the four corner coordinates each formatted `%17.6f`, and
/// the 13 GCTP parameters each formatted `%17.6f`."
pub fn latlon_fingerprint(prefix: &str, proj: &ProjectionDescriptor) -> String {
    let (first, second) = if proj.ydimmajor {
        (proj.ydim, proj.xdim)
    } else {
        (proj.xdim, proj.ydim)
    };
    let mut key = format!(
        "{prefix}{}_{}_{}_{}_{}_{}_{}",
        proj.proj_code, proj.zone, proj.sphere, proj.pix_reg, proj.origin, first, second
    );
    for corner in [proj.upleft.0, proj.upleft.1, proj.lowright.0, proj.lowright.1] {
        key.push_str(&format!("_{corner:17.6}"));
    }
    for param in proj.params {
        key.push_str(&format!("_{param:17.6}"));
    }
    key
}

/// Builds the raw-data cache fingerprint, spec.md §4.5:
/// `<prefix><sanitized-filename>_<variable-new-name>`.
pub fn raw_data_fingerprint(prefix: &str, file_path: &Path, variable_new_name: &str) -> String {
    let sanitized: String = file_path
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{prefix}{sanitized}_{variable_new_name}")
}

/// A handle on an open-for-read cache entry. Holds the shared lock for as
/// long as it's alive; releases it on drop.
pub struct ReadHandle {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
}

impl ReadHandle {
    /// Reads `len` bytes starting at byte `offset`.
    pub fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| io_err(&self.path, e))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf).map_err(|e| io_err(&self.path, e))?;
        Ok(buf)
    }
}

impl Drop for ReadHandle {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// One process's view of the on-disk cache under `dir`.
#[derive(Clone, Debug)]
pub struct SubsetCache {
    dir: PathBuf,
    cap_bytes: u64,
}

impl SubsetCache {
    /// Opens (creating if necessary) a cache rooted at `dir`, with
    /// eviction cap `cap_bytes`. Fails with `Error::Config` if `dir`
    /// exists and is not a directory, or cannot be created.
    pub fn open(dir: impl Into<PathBuf>, cap_bytes: u64) -> Result<SubsetCache, Error> {
        let dir = dir.into();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(Error::Config(format!("{dir:?} exists and is not a directory"))),
            Err(_) => {
                fs::create_dir_all(&dir).map_err(|e| Error::Config(format!("creating {dir:?}: {e}")))?;
            }
        }
        Ok(SubsetCache { dir, cap_bytes })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Opens `key` for reading if it is present and exactly `expected_bytes`
    /// long. Spec.md §4.5: "on acquisition, verify size; on mismatch, drop
    /// the lock, unlink the file, return 'miss'."
    pub fn get(&self, key: &str, expected_bytes: u64) -> Result<Option<ReadHandle>, Error> {
        let path = self.path_for(key);
        let file = match OpenOptions::new().read(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        file.lock_shared().map_err(|e| io_err(&path, e))?;
        let size = file.metadata().map_err(|e| io_err(&path, e))?.len();
        if size != expected_bytes {
            let _ = FileExt::unlock(&file);
            drop(file);
            let _ = fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(ReadHandle { file, path }))
    }

    /// Writes a new entry under an exclusive lock, publishing it
    /// atomically via rename. Spec.md §4.5: "Writers must first check
    /// that the entry is still absent after taking the lock"; "on any
    /// failure the partial file is unlinked before the lock is released."
    ///
    /// Returns `true` if this call performed the write, `false` if a
    /// concurrent writer already published the entry first (spec.md §8
    /// scenario 6: "exactly one succeeds").
    pub fn put(
        &self,
        key: &str,
        expected_bytes: u64,
        writer: impl FnOnce(&mut dyn Write) -> Result<(), Error>,
    ) -> Result<bool, Error> {
        let final_path = self.path_for(key);
        let lock_path = self.dir.join(format!("{key}.lock"));
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_err(&lock_path, e))?;
        lock_file.lock_exclusive().map_err(|e| io_err(&lock_path, e))?;

        let already_present = fs::metadata(&final_path)
            .map(|m| m.len() == expected_bytes)
            .unwrap_or(false);
        if already_present {
            let _ = FileExt::unlock(&lock_file);
            return Ok(false);
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let result = writer(&mut tmp as &mut dyn Write);
        if let Err(err) = result {
            drop(tmp);
            let _ = FileExt::unlock(&lock_file);
            return Err(err);
        }
        tmp.as_file().sync_all().map_err(|e| io_err(&final_path, e))?;
        tmp.persist(&final_path)
            .map_err(|e| io_err(&final_path, e.error))?;
        let _ = FileExt::unlock(&lock_file);
        let _ = fs::remove_file(&lock_path);

        self.evict_if_over_cap()?;
        Ok(true)
    }

    /// Best-effort unlink under exclusive lock.
    pub fn purge(&self, key: &str) -> Result<(), Error> {
        let path = self.path_for(key);
        if let Ok(file) = OpenOptions::new().write(true).open(&path) {
            let _ = file.lock_exclusive();
            let _ = fs::remove_file(&path);
            let _ = FileExt::unlock(&file);
        }
        Ok(())
    }

    /// Evicts least-recently-modified entries until total cached bytes are
    /// under the cap, skipping any entry that cannot be locked without
    /// blocking.
    fn evict_if_over_cap(&self) -> Result<(), Error> {
        let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        let mut total = 0u64;
        let dir_iter = fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        for entry in dir_iter {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if path.extension().map(|e| e == "lock").unwrap_or(false) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            total += meta.len();
            let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((path, meta.len(), mtime));
        }
        if total <= self.cap_bytes {
            return Ok(());
        }
        entries.sort_by_key(|&(_, _, mtime)| mtime);
        for (path, len, _) in entries {
            if total <= self.cap_bytes {
                break;
            }
            let file = match OpenOptions::new().write(true).open(&path) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if file.try_lock_exclusive().is_err() {
                continue;
            }
            if fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(len);
            }
            let _ = FileExt::unlock(&file);
        }
        Ok(())
    }
}

/// A stable fingerprint for a generic cacheable key, used where the
/// caller has already built a descriptive string key and only needs a
/// filesystem-safe file name.
pub fn hash_key(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::Arc;
    use std::thread;

    fn proj() -> ProjectionDescriptor {
        ProjectionDescriptor {
            proj_code: 0,
            zone: 0,
            sphere: 0,
            upleft: (-180.0, 90.0),
            lowright: (180.0, -90.0),
            params: [0.0; 13],
            xdim: 4,
            ydim: 2,
            pix_reg: 0,
            origin: 0,
            ydimmajor: true,
            special_format: 0,
        }
    }

    #[test]
    fn latlon_fingerprint_is_deterministic() {
        let proj = proj();
        assert_eq!(latlon_fingerprint("hdf4_cf_", &proj), latlon_fingerprint("hdf4_cf_", &proj));
    }

    #[test]
    fn raw_data_fingerprint_disjoint_across_variables() {
        let path = Path::new("/data/a.hdf");
        let a = raw_data_fingerprint("hdf4_cf_", path, "latitude");
        let b = raw_data_fingerprint("hdf4_cf_", path, "longitude");
        assert_ne!(a, b);
    }

    #[test]
    fn put_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubsetCache::open(dir.path(), 1024 * 1024).unwrap();
        let wrote = cache
            .put("k1", 4, |w| {
                w.write_all(&[1, 2, 3, 4]).map_err(|e| io_err("k1", e))
            })
            .unwrap();
        assert!(wrote);
        let mut handle = cache.get("k1", 4).unwrap().unwrap();
        assert_eq!(vec![1, 2, 3, 4], handle.read_at(0, 4).unwrap());
    }

    #[test]
    fn purge_then_get_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubsetCache::open(dir.path(), 1024 * 1024).unwrap();
        cache
            .put("k2", 2, |w| w.write_all(&[9, 9]).map_err(|e| io_err("k2", e)))
            .unwrap();
        cache.purge("k2").unwrap();
        assert!(cache.get("k2", 2).unwrap().is_none());
    }

    #[test]
    fn corrupt_size_is_treated_as_miss_and_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SubsetCache::open(dir.path(), 1024 * 1024).unwrap();
        cache
            .put("k3", 4, |w| w.write_all(&[1, 2, 3, 4]).map_err(|e| io_err("k3", e)))
            .unwrap();
        // Truncate by one byte.
        let path = dir.path().join("k3");
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(3).unwrap();
        drop(file);
        assert!(cache.get("k3", 4).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_put_exactly_one_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SubsetCache::open(dir.path(), 1024 * 1024).unwrap());
        let mut handles = Vec::new();
        for value in [[1u8, 1, 1, 1], [2, 2, 2, 2]] {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                cache
                    .put("k4", 4, |w| w.write_all(&value).map_err(|e| io_err("k4", e)))
                    .unwrap()
            }));
        }
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(1, results.iter().filter(|&&wrote| wrote).count());
    }
}
