use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{SyncError, SyncResult};

/// Writes `content` next to `path` and renames it into place. With `backup`,
/// an existing file is first copied to `<path>.bak`.
pub fn write_atomic(path: &Path, content: &[u8], backup: bool) -> SyncResult<()> {
    let failed = |source: io::Error| SyncError::TargetWrite {
        path: path.to_path_buf(),
        source,
    };

    let tmp_path = unique_tmp_path(path);
    let written = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(failed(err));
    }

    if backup && path.exists() {
        if let Err(err) = fs::copy(path, backup_path(path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(failed(err));
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(failed(err));
    }

    Ok(())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn unique_tmp_path(path: &Path) -> PathBuf {
    let mut counter = 0u32;
    loop {
        let mut name = path.as_os_str().to_os_string();
        if counter == 0 {
            name.push(".tmp");
        } else {
            name.push(format!(".tmp{counter}"));
        }
        let candidate = PathBuf::from(name);

        if !candidate.exists() {
            return candidate;
        }

        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_atomically_with_backup() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("manual.docx");
        fs::write(&file_path, b"before").unwrap();

        write_atomic(&file_path, b"after", true).unwrap();

        assert_eq!(fs::read(&file_path).unwrap(), b"after");
        assert_eq!(fs::read(backup_path(&file_path)).unwrap(), b"before");
        assert!(!dir.path().join("manual.docx.tmp").exists());
    }

    #[test]
    fn new_file_needs_no_backup() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("out.docx");

        write_atomic(&file_path, b"fresh", true).unwrap();

        assert_eq!(fs::read(&file_path).unwrap(), b"fresh");
        assert!(!backup_path(&file_path).exists());
    }

    #[test]
    fn missing_directory_is_a_write_error() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("missing").join("out.docx");
        let err = write_atomic(&file_path, b"x", false).unwrap_err();
        assert!(matches!(err, SyncError::TargetWrite { .. }));
    }
}
