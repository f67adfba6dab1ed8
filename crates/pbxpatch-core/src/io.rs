use crate::error::{PatchError, Result};
use crate::paths;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting the descriptor.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a descriptor fully into memory.
pub fn read_descriptor(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(PatchError::DescriptorNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Write the original text to the `.backup` sibling, then the patched text
/// over the descriptor. Returns the backup path.
pub fn write_with_backup(path: &Path, original: &str, patched: &str) -> Result<PathBuf> {
    let backup = paths::backup_path(path);
    atomic_write(&backup, original.as_bytes())?;
    atomic_write(path, patched.as_bytes())?;
    Ok(backup)
}
