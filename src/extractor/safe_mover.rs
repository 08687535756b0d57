use crate::error::{format_bytes, Result, RpfSortError};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Copies above this size get an info line once they land.
const LARGE_FILE_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Places one file into a destination folder.
pub trait FileMover: Send + Sync {
    fn move_file(&self, source: &Path, destination_dir: &Path) -> Result<PathBuf>;
}

/// Chunked copy into a fresh, never-overwritten name, synced to disk and size-checked.
///
/// The source file is left in place.
pub struct SafeMover {
    chunk_size: usize,
}

impl SafeMover {
    pub fn new() -> Self {
        Self {
            chunk_size: 8 * 1024 * 1024, // 8MB chunks
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(4096); // Minimum 4KB chunks
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Create the first free name in `dir`: `name.ext`, then `name_1.ext`,
    /// `name_2.ext`, ...
    fn reserve_destination(&self, dir: &Path, file_name: &str) -> Result<(PathBuf, File)> {
        let mut counter = 0usize;

        loop {
            let candidate = dir.join(disambiguated_name(file_name, counter));

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(RpfSortError::io_at(candidate, e)),
            }
        }
    }

    fn copy_with_chunks(&self, source: &Path, dest: &Path, dest_file: File) -> Result<u64> {
        let mut reader = File::open(source).map_err(|e| RpfSortError::io_at(source, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, dest_file);

        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RpfSortError::io_at(source, e)),
            };

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| RpfSortError::io_at(dest, e))?;

            total_bytes += bytes_read as u64;
        }

        writer.flush().map_err(|e| RpfSortError::io_at(dest, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| RpfSortError::io_at(dest, e))?;

        Ok(total_bytes)
    }

    fn copy_mtime(&self, source: &Path, dest: &Path) {
        if let Ok(source_metadata) = fs::metadata(source) {
            if let Ok(modified_time) = source_metadata.modified() {
                let _ = filetime::set_file_mtime(
                    dest,
                    filetime::FileTime::from_system_time(modified_time),
                );
            }
        }
    }
}

impl FileMover for SafeMover {
    fn move_file(&self, source: &Path, destination_dir: &Path) -> Result<PathBuf> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RpfSortError::InvalidPath {
                path: source.display().to_string(),
            })?;

        let metadata = fs::metadata(source).map_err(|e| RpfSortError::io_at(source, e))?;
        if !metadata.is_file() {
            return Err(RpfSortError::InvalidPath {
                path: format!("Source is not a file: {}", source.display()),
            });
        }
        let expected_size = metadata.len();

        let (dest, dest_file) = self.reserve_destination(destination_dir, file_name)?;

        let copied = match self.copy_with_chunks(source, &dest, dest_file) {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_file(&dest);
                return Err(e);
            }
        };

        finish_copy(&dest, expected_size, copied)?;
        self.copy_mtime(source, &dest);

        if expected_size > LARGE_FILE_THRESHOLD {
            info!(
                "Copied large file: {} ({})",
                file_name,
                format_bytes(expected_size)
            );
        }

        Ok(dest)
    }
}

impl Default for SafeMover {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the copied file on disk. Any failure removes it.
fn finish_copy(dest: &Path, expected_size: u64, copied: u64) -> Result<()> {
    let checked = fs::metadata(dest)
        .map_err(|e| RpfSortError::io_at(dest, e))
        .and_then(|metadata| verify_integrity(dest, expected_size, metadata.len()));

    if let Err(e) = checked {
        error!(
            "Discarding {}: {} (source {}, copied {} bytes)",
            dest.display(),
            e,
            format_bytes(expected_size),
            copied
        );
        let _ = fs::remove_file(dest);
        return Err(e);
    }

    Ok(())
}

/// A copy is only complete when both sides have the same length.
pub fn verify_integrity(path: &Path, expected_size: u64, actual_size: u64) -> Result<()> {
    if expected_size != actual_size {
        return Err(RpfSortError::FileIntegrityMismatch {
            path: path.to_path_buf(),
            expected_size,
            actual_size,
        });
    }
    Ok(())
}

/// `x.ydr` with counter 2 becomes `x_2.ydr`; counter 0 keeps the name.
pub fn disambiguated_name(file_name: &str, counter: usize) -> String {
    if counter == 0 {
        return file_name.to_string();
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    match path.extension().and_then(|e| e.to_str()) {
        Some(extension) => format!("{}_{}.{}", stem, counter, extension),
        None => format!("{}_{}", stem, counter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_file(dir: &Path, relative: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_move_never_overwrites() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let mover = SafeMover::new();

        let first = source_file(source_dir.path(), "a/x.ydr", b"first");
        let second = source_file(source_dir.path(), "b/x.ydr", b"second");
        let third = source_file(source_dir.path(), "c/x.ydr", b"third");

        let dest1 = mover.move_file(&first, dest_dir.path()).unwrap();
        let dest2 = mover.move_file(&second, dest_dir.path()).unwrap();
        let dest3 = mover.move_file(&third, dest_dir.path()).unwrap();

        assert_eq!(dest1, dest_dir.path().join("x.ydr"));
        assert_eq!(dest2, dest_dir.path().join("x_1.ydr"));
        assert_eq!(dest3, dest_dir.path().join("x_2.ydr"));

        assert_eq!(fs::read(&dest1).unwrap(), b"first");
        assert_eq!(fs::read(&dest2).unwrap(), b"second");
        assert_eq!(fs::read(&dest3).unwrap(), b"third");
    }

    #[test]
    fn test_source_is_left_untouched() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let source = source_file(source_dir.path(), "car.yft", b"model data");

        SafeMover::new().move_file(&source, dest_dir.path()).unwrap();

        assert_eq!(fs::read(&source).unwrap(), b"model data");
    }

    #[test]
    fn test_multi_chunk_copy_matches_source() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let source = source_file(source_dir.path(), "big.ytd", &content);

        let mover = SafeMover::new().with_chunk_size(1);
        assert_eq!(mover.chunk_size(), 4096);

        let dest = mover.move_file(&source, dest_dir.path()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), content);
        assert_eq!(
            fs::metadata(&dest).unwrap().len(),
            fs::metadata(&source).unwrap().len()
        );
    }

    #[test]
    fn test_missing_source_leaves_nothing_behind() {
        let dest_dir = TempDir::new().unwrap();
        let result = SafeMover::new().move_file(Path::new("/no/such/file.ydr"), dest_dir.path());

        assert!(matches!(result, Err(RpfSortError::IoFailure { .. })));
        assert_eq!(fs::read_dir(dest_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_verify_integrity() {
        assert!(verify_integrity(Path::new("a.ydr"), 10, 10).is_ok());

        match verify_integrity(Path::new("a.ydr"), 10, 7) {
            Err(RpfSortError::FileIntegrityMismatch {
                expected_size,
                actual_size,
                ..
            }) => {
                assert_eq!(expected_size, 10);
                assert_eq!(actual_size, 7);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_short_copy_is_removed() {
        let dest_dir = TempDir::new().unwrap();
        let dest = source_file(dest_dir.path(), "car.yft", b"short");

        let result = finish_copy(&dest, 10, 5);

        assert!(matches!(
            result,
            Err(RpfSortError::FileIntegrityMismatch { actual_size: 5, .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unreadable_copy_is_reported() {
        let dest_dir = TempDir::new().unwrap();
        let dest = dest_dir.path().join("gone.ydr");

        let result = finish_copy(&dest, 10, 10);

        assert!(matches!(result, Err(RpfSortError::IoFailure { .. })));
        assert_eq!(fs::read_dir(dest_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_disambiguated_name() {
        assert_eq!(disambiguated_name("x.ydr", 0), "x.ydr");
        assert_eq!(disambiguated_name("x.ydr", 1), "x_1.ydr");
        assert_eq!(disambiguated_name("archive.tar.gz", 3), "archive.tar_3.gz");
        assert_eq!(disambiguated_name("README", 2), "README_2");
    }

    #[test]
    fn test_mtime_preserved() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let source = source_file(source_dir.path(), "old.meta", b"<xml/>");
        let stamp = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&source, stamp).unwrap();

        let dest = SafeMover::new().move_file(&source, dest_dir.path()).unwrap();
        let dest_mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(dest).unwrap());

        assert_eq!(dest_mtime.unix_seconds(), 1_000_000_000);
    }
}
