//! Content fingerprints for change detection.
//!
//! Filesystem notifications are noisy: editors touch files without changing
//! them, and one save can produce several events. A fingerprint distinguishes
//! a real content change from a spurious notification.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// SHA-256 digest of a file or of a glob-selected file set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Fingerprint a single file. `Ok(None)` if the file does not exist.
pub fn fingerprint_file(path: &Path) -> io::Result<Option<Fingerprint>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(Some(Fingerprint(hasher.finalize().into())))
}

/// Fingerprint every file under `dir` matching `pattern`.
///
/// Members are hashed as sorted (relative path, contents) pairs, so the
/// result does not depend on directory-listing order. `Ok(None)` if the
/// directory does not exist.
pub fn fingerprint_glob(dir: &Path, pattern: &str) -> io::Result<Option<Fingerprint>> {
    if !dir.exists() {
        return Ok(None);
    }

    let full_pattern = dir.join(pattern);
    let entries = glob::glob(&full_pattern.to_string_lossy())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut hasher = Sha256::new();
    for file in files {
        let relative = file.strip_prefix(dir).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        // A file may vanish between listing and reading; treat it as absent.
        match std::fs::read(&file) {
            Ok(contents) => hasher.update(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        hasher.update([0u8]);
    }

    Ok(Some(Fingerprint(hasher.finalize().into())))
}

/// Fingerprint a watched path: a directory is hashed through its glob
/// (default `**/*`), a file directly.
pub fn fingerprint_path(path: &Path, pattern: Option<&str>) -> io::Result<Option<Fingerprint>> {
    if path.is_dir() {
        fingerprint_glob(path, pattern.unwrap_or("**/*"))
    } else {
        fingerprint_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widget.js");

        fs::write(&file, "var a = 1;").unwrap();
        let first = fingerprint_file(&file).unwrap().unwrap();

        // Same bytes, same digest
        assert_eq!(fingerprint_file(&file).unwrap().unwrap(), first);

        fs::write(&file, "var a = 2;").unwrap();
        let second = fingerprint_file(&file).unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn missing_file_is_none_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fingerprint_file(&dir.path().join("gone.js")).unwrap().is_none());
        assert!(
            fingerprint_glob(&dir.path().join("gone"), "*.js")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn glob_fingerprint_sees_member_changes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "a").unwrap();
        fs::write(dir.path().join("b.js"), "b").unwrap();
        fs::write(dir.path().join("ignored.css"), "c").unwrap();

        let first = fingerprint_glob(dir.path(), "*.js").unwrap().unwrap();

        // Non-matching file changes do not affect the digest
        fs::write(dir.path().join("ignored.css"), "changed").unwrap();
        assert_eq!(fingerprint_glob(dir.path(), "*.js").unwrap().unwrap(), first);

        // Matching member edits do
        fs::write(dir.path().join("b.js"), "b2").unwrap();
        assert_ne!(fingerprint_glob(dir.path(), "*.js").unwrap().unwrap(), first);

        // So do added members
        fs::write(dir.path().join("b.js"), "b").unwrap();
        fs::write(dir.path().join("c.js"), "c").unwrap();
        assert_ne!(fingerprint_glob(dir.path(), "*.js").unwrap().unwrap(), first);
    }

    #[test]
    fn renaming_a_member_changes_the_digest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "same").unwrap();
        let first = fingerprint_glob(dir.path(), "*.js").unwrap().unwrap();

        fs::rename(dir.path().join("a.js"), dir.path().join("z.js")).unwrap();
        let second = fingerprint_glob(dir.path(), "*.js").unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn directory_dispatch_uses_recursive_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/deep.js"), "x").unwrap();

        let first = fingerprint_path(dir.path(), None).unwrap().unwrap();
        fs::write(dir.path().join("nested/deep.js"), "y").unwrap();
        assert_ne!(fingerprint_path(dir.path(), None).unwrap().unwrap(), first);
    }
}
