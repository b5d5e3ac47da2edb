//! Write-temp-then-rename helper used by every component that persists to
//! the vault or system-root filesystem (spec.md §5 "Vault filesystem:
//! writes are atomic").

use std::path::Path;

use crate::error::Result;

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn append(path: &Path, contents: &str, separator: &str) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    if existing.is_empty() {
        file.write_all(contents.as_bytes())?;
    } else {
        file.write_all(existing.as_bytes())?;
        file.write_all(separator.as_bytes())?;
        file.write_all(contents.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents_and_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.md");
        write_atomic(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn append_inserts_separator_between_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("c.md");
        write_atomic(&path, "first").unwrap();
        append(&path, "second", "\n---\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n---\nsecond");
    }

    #[test]
    fn append_to_missing_file_writes_without_separator() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("new.md");
        append(&path, "only", "\n---\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "only");
    }
}
