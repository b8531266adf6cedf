//! Unsafe-path rejection and root confinement.

use std::path::{Path, PathBuf};

/// Why a candidate path failed root confinement.
#[derive(Debug)]
pub enum PathViolation {
    /// The candidate does not exist (or a component of it is missing).
    NotFound,
    /// The candidate resolves outside the declared root.
    Escapes,
    /// The root itself cannot be resolved.
    RootUnavailable(std::io::Error),
}

/// Check a user-supplied path or glob pattern for unsafe shapes.
///
/// Flags absolute paths, `..` traversal segments, NUL bytes, UNC-style
/// double-separator prefixes, and Windows drive forms (both `C:\foo` and the
/// drive-relative `C:foo`). Pure string analysis, no filesystem access: the
/// value may be a glob pattern that names no real file yet.
pub fn is_unsafe_pattern(value: &str) -> bool {
    if value.is_empty() || value.contains('\0') {
        return true;
    }

    // UNC prefixes and absolute paths, either separator flavor.
    if value.starts_with("//")
        || value.starts_with("\\\\")
        || value.starts_with('/')
        || value.starts_with('\\')
    {
        return true;
    }

    // Drive prefix: covers C:\foo, C:/foo and the drive-relative C:foo.
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }

    // Traversal segments, split on either separator.
    value.split(['/', '\\']).any(|segment| segment == "..")
}

/// Confine a candidate path inside a declared root.
///
/// Canonicalizes both sides (resolving symlinks) and requires the candidate
/// to be a strict descendant of the root. Returns the canonical candidate.
///
/// The ancestor test is `Path::starts_with`, which compares whole
/// components: `/srv/gauge-extra` is never inside `/srv/gauge`, and paths on
/// different drives simply fail to match.
pub fn ensure_within_root(candidate: &Path, root: &Path) -> Result<PathBuf, PathViolation> {
    let canonical_root = root.canonicalize().map_err(PathViolation::RootUnavailable)?;

    let canonical = candidate.canonicalize().map_err(|_| PathViolation::NotFound)?;

    if canonical == canonical_root || !canonical.starts_with(&canonical_root) {
        return Err(PathViolation::Escapes);
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn traversal_and_absolute_patterns_are_unsafe() {
        for value in [
            "../secret.js",
            "a/../../b.css",
            "..",
            "/etc/passwd",
            "\\windows\\system32",
            "//server/share/x.js",
            "\\\\server\\share\\x.js",
            "C:\\Windows\\x.js",
            "C:foo.js",
            "d:/assets/x.css",
            "x\0.js",
            "",
        ] {
            assert!(is_unsafe_pattern(value), "expected unsafe: {value:?}");
        }
    }

    #[test]
    fn relative_paths_and_globs_are_safe() {
        for value in [
            "widget.js",
            "build/widget.min.js",
            "build/*.js",
            "a/b/c.css",
            "dotted..name.js",
            "..hidden/x.css",
        ] {
            assert!(!is_unsafe_pattern(value), "expected safe: {value:?}");
        }
    }

    #[test]
    fn within_root_accepts_descendants_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gauge");
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("build/widget.js"), "export {}").unwrap();

        let ok = ensure_within_root(&root.join("build/widget.js"), &root).unwrap();
        assert!(ok.ends_with("build/widget.js"));

        // The root itself is not a strict descendant.
        let err = ensure_within_root(&root, &root).unwrap_err();
        assert!(matches!(err, PathViolation::Escapes));
    }

    #[test]
    fn sibling_directory_with_common_prefix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gauge");
        let sibling = dir.path().join("gauge-extra");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join("x.js"), "export {}").unwrap();

        let err = ensure_within_root(&sibling.join("x.js"), &root).unwrap_err();
        assert!(matches!(err, PathViolation::Escapes));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_the_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gauge");
        let outside = dir.path().join("outside.js");
        fs::create_dir_all(&root).unwrap();
        fs::write(&outside, "export {}").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.js")).unwrap();

        let err = ensure_within_root(&root.join("link.js"), &root).unwrap_err();
        assert!(matches!(err, PathViolation::Escapes));
    }

    #[test]
    fn missing_candidate_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_within_root(&dir.path().join("nope.js"), dir.path()).unwrap_err();
        assert!(matches!(err, PathViolation::NotFound));
    }

    #[test]
    fn missing_root_reports_root_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_within_root(
            &dir.path().join("x.js"),
            &dir.path().join("never-created"),
        )
        .unwrap_err();
        assert!(matches!(err, PathViolation::RootUnavailable(_)));
    }
}
