//! File operations for attachments, backups and the JSON store

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Write a file by writing a sibling temp file and renaming it into place
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create directory: {:?}", parent))?;
        }
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)
        .with_context(|| format!("Could not write to file: {:?}", tmp_path))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Could not replace file: {:?}", path))?;

    Ok(())
}

/// Delete a file if it exists
pub fn delete_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Could not delete file: {:?}", path))?;
    }
    Ok(())
}

/// Scan a directory recursively and return files with their relative path
pub fn scan_directory_relative(base_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !base_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(base_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            let full_path = entry.path().to_path_buf();
            if let Ok(relative) = full_path.strip_prefix(base_dir) {
                // Forward slashes inside archives
                let relative_normalized = relative.to_string_lossy().replace('\\', "/");
                files.push((full_path, relative_normalized));
            }
        }
    }

    Ok(files)
}

/// Generate a unique file name if the file already exists
pub fn unique_filename(dir: &Path, filename: &str) -> String {
    let path = dir.join(filename);

    if !path.exists() {
        return filename.to_string();
    }

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let extension = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    for i in 2..1000 {
        let new_name = format!("{}_{}{}", stem, i, extension);
        if !dir.join(&new_name).exists() {
            return new_name;
        }
    }

    let timestamp = chrono::Utc::now().timestamp();
    format!("{}_{}{}", stem, timestamp, extension)
}

/// Lowercase file extension
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Make sure a directory exists
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| format!("Could not create directory: {:?}", path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unique_filename() {
        let dir = tempdir().unwrap();

        assert_eq!(unique_filename(dir.path(), "letter.pdf"), "letter.pdf");

        fs::write(dir.path().join("letter.pdf"), "").unwrap();
        assert_eq!(unique_filename(dir.path(), "letter.pdf"), "letter_2.pdf");

        fs::write(dir.path().join("letter_2.pdf"), "").unwrap();
        assert_eq!(unique_filename(dir.path(), "letter.pdf"), "letter_3.pdf");
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("document_tracking.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        write_atomic(&path, b"{\"a\":2}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_scan_directory_relative() {
        let dir = tempdir().unwrap();

        let sub = dir.path().join("2025");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(sub.join("b.pdf"), "").unwrap();

        let files = scan_directory_relative(dir.path()).unwrap();
        let relatives: Vec<_> = files.iter().map(|(_, r)| r.as_str()).collect();

        assert_eq!(files.len(), 2);
        assert!(relatives.contains(&"a.txt"));
        assert!(relatives.contains(&"2025/b.pdf"));
    }
}
