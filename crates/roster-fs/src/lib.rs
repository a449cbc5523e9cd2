//! Crash-safe replacement of roster files, backups and configuration.
//!
//! Bytes are staged in a temp file next to the destination, synced, then renamed over it.
//! Readers see either the old file or the new one, never a partial write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Directory a file lives in; `.` for bare relative names like `lop12.xlsx`.
pub fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Replace `dest` with `bytes`, creating missing parent directories.
///
/// On error the previous contents of `dest` are left in place and the staged temp file is
/// removed.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(dest).map_err(|err| err.error)?;

    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        log::debug!("could not sync {}: {err}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_file_and_creates_parents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("backups").join("lop12a1.json");

        atomic_write_bytes(&dest, b"first").expect("first write");
        atomic_write_bytes(&dest, b"second").expect("second write");

        assert_eq!(fs::read(&dest).expect("read"), b"second");
        let entries = fs::read_dir(dest.parent().unwrap()).expect("read_dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn failed_rename_leaves_no_staged_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("lop12a1.csv");
        fs::create_dir(&dest).expect("occupy destination");

        assert!(atomic_write_bytes(&dest, "Tên Học Sinh\n".as_bytes()).is_err());
        assert!(dest.is_dir());
        let entries = fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn parent_of_bare_file_name_is_current_dir() {
        assert_eq!(parent_dir_or_dot(Path::new("lop12.xlsx")), Path::new("."));
        assert_eq!(parent_dir_or_dot(Path::new("a/lop12.xlsx")), Path::new("a"));
    }
}
