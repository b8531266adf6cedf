//! Resolution of caller inputs into complete component definitions.

use std::path::{Path, PathBuf};

use crate::registry::{AssetSource, ComponentDefinition};

use super::classify::{AssetInput, classify};
use super::error::{ResolveError, ResolveResult};
use super::validate::{PathViolation, ensure_within_root, is_unsafe_pattern};

/// Which definition field an input belongs to, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Style,
    Script,
}

impl std::fmt::Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetRole::Style => write!(f, "style"),
            AssetRole::Script => write!(f, "script"),
        }
    }
}

/// Resolve caller inputs into a [`ComponentDefinition`].
///
/// Markup is always taken literally. Style and script are classified
/// independently: inline content is kept as supplied; paths and globs are
/// resolved against `root` and confined to it. Re-resolving identical inputs
/// against an unchanged filesystem yields an identical definition.
pub fn resolve(
    name: &str,
    root: Option<&Path>,
    html: Option<&str>,
    css: Option<&str>,
    js: Option<&str>,
) -> ResolveResult<ComponentDefinition> {
    let css = css
        .map(|value| resolve_asset(AssetRole::Style, root, value))
        .transpose()?;
    let js = js
        .map(|value| resolve_asset(AssetRole::Script, root, value))
        .transpose()?;

    Ok(ComponentDefinition::new(
        name,
        root.map(Path::to_path_buf),
        html.map(str::to_string),
        css,
        js,
    ))
}

fn resolve_asset(
    role: AssetRole,
    root: Option<&Path>,
    value: &str,
) -> ResolveResult<AssetSource> {
    match classify(value) {
        AssetInput::Inline(text) => Ok(AssetSource::Inline(text.to_string())),
        AssetInput::PathRef(path) => resolve_path(role, root, path),
        AssetInput::Glob(pattern) => resolve_glob(role, root, pattern),
    }
}

fn resolve_path(role: AssetRole, root: Option<&Path>, value: &str) -> ResolveResult<AssetSource> {
    if is_unsafe_pattern(value) {
        return Err(ResolveError::UnsafePattern {
            role,
            value: value.to_string(),
        });
    }

    let root = declared_root(role, root, value)?;
    let resolved = ensure_within_root(&root.join(value), root)
        .map_err(|violation| violation_error(violation, role, root, value))?;
    file_source(role, root, resolved, value)
}

fn violation_error(
    violation: PathViolation,
    role: AssetRole,
    root: &Path,
    value: &str,
) -> ResolveError {
    match violation {
        PathViolation::NotFound => ResolveError::NoMatches {
            role,
            value: value.to_string(),
        },
        PathViolation::Escapes => ResolveError::OutsideRoot {
            role,
            value: value.to_string(),
        },
        PathViolation::RootUnavailable(source) => ResolveError::RootUnavailable {
            root: root.to_path_buf(),
            source,
        },
    }
}

fn resolve_glob(role: AssetRole, root: Option<&Path>, pattern: &str) -> ResolveResult<AssetSource> {
    if is_unsafe_pattern(pattern) {
        return Err(ResolveError::UnsafePattern {
            role,
            value: pattern.to_string(),
        });
    }

    let root = declared_root(role, root, pattern)?;
    let canonical_root = root
        .canonicalize()
        .map_err(|source| ResolveError::RootUnavailable {
            root: root.to_path_buf(),
            source,
        })?;

    let full_pattern = canonical_root.join(pattern);
    let entries = glob::glob(&full_pattern.to_string_lossy()).map_err(|source| {
        ResolveError::BadPattern {
            role,
            value: pattern.to_string(),
            source,
        }
    })?;

    // Matches that escape the root through symlinks are silently dropped,
    // so an attacker-controlled link can at worst make a pattern ambiguous
    // or empty, never servable.
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter_map(|path| confined(&path, &canonical_root))
        .collect();
    candidates.sort();
    candidates.dedup();

    match candidates.len() {
        0 => Err(ResolveError::NoMatches {
            role,
            value: pattern.to_string(),
        }),
        1 => {
            let resolved = candidates.remove(0);
            file_source(role, root, resolved, pattern)
        }
        _ => Err(ResolveError::Ambiguous {
            role,
            value: pattern.to_string(),
            candidates,
        }),
    }
}

fn declared_root<'a>(
    role: AssetRole,
    root: Option<&'a Path>,
    value: &str,
) -> ResolveResult<&'a Path> {
    root.ok_or_else(|| ResolveError::MissingRoot {
        role,
        value: value.to_string(),
    })
}

/// Canonicalize a glob match and keep it only if it is strictly inside root.
fn confined(candidate: &Path, canonical_root: &Path) -> Option<PathBuf> {
    let canonical = candidate.canonicalize().ok()?;
    (canonical != canonical_root && canonical.starts_with(canonical_root)).then_some(canonical)
}

fn file_source(
    role: AssetRole,
    root: &Path,
    resolved: PathBuf,
    value: &str,
) -> ResolveResult<AssetSource> {
    let canonical_root = root
        .canonicalize()
        .map_err(|source| ResolveError::RootUnavailable {
            root: root.to_path_buf(),
            source,
        })?;

    let relative = resolved
        .strip_prefix(&canonical_root)
        .map_err(|_| ResolveError::OutsideRoot {
            role,
            value: value.to_string(),
        })?;

    Ok(AssetSource::File {
        url: posix_fragment(relative),
        path: resolved,
    })
}

/// Root-relative fragment with forward slashes, used in serving URLs.
fn posix_fragment(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn component_root() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gauge");
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("widget.js"), "export default 1;").unwrap();
        fs::write(root.join("theme.css"), ".gauge {}").unwrap();
        fs::write(root.join("build/gauge.min.js"), "var g=1;").unwrap();
        (dir, root)
    }

    #[test]
    fn inline_values_pass_through() {
        let def = resolve(
            "gauge",
            None,
            Some("<div class='gauge'></div>"),
            Some("body { margin: 0 }"),
            Some("console.log('gauge')"),
        )
        .unwrap();

        assert_eq!(def.html(), Some("<div class='gauge'></div>"));
        assert_eq!(
            def.css(),
            Some(&AssetSource::Inline("body { margin: 0 }".to_string()))
        );
        assert_eq!(
            def.js(),
            Some(&AssetSource::Inline("console.log('gauge')".to_string()))
        );
    }

    #[test]
    fn concrete_path_resolves_with_relative_url() {
        let (_dir, root) = component_root();
        let def = resolve("gauge", Some(&root), None, Some("theme.css"), Some("widget.js")).unwrap();

        assert_eq!(def.css().unwrap().url(), Some("theme.css"));
        assert_eq!(def.js().unwrap().url(), Some("widget.js"));
        assert!(def.js().unwrap().path().unwrap().ends_with("gauge/widget.js"));
    }

    #[test]
    fn nested_path_produces_posix_fragment() {
        let (_dir, root) = component_root();
        let def = resolve("gauge", Some(&root), None, None, Some("build/gauge.min.js")).unwrap();
        assert_eq!(def.js().unwrap().url(), Some("build/gauge.min.js"));
    }

    #[test]
    fn glob_with_single_match_resolves() {
        let (_dir, root) = component_root();
        let def = resolve("gauge", Some(&root), None, None, Some("build/*.js")).unwrap();
        assert_eq!(def.js().unwrap().url(), Some("build/gauge.min.js"));
    }

    #[test]
    fn glob_with_no_match_names_the_pattern() {
        let (_dir, root) = component_root();
        let err = resolve("gauge", Some(&root), None, None, Some("dist/*.js")).unwrap_err();
        match err {
            ResolveError::NoMatches { role, value } => {
                assert_eq!(role, AssetRole::Script);
                assert_eq!(value, "dist/*.js");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ambiguous_glob_lists_candidates() {
        let (_dir, root) = component_root();
        fs::write(root.join("build/extra.js"), "var e=1;").unwrap();

        let err = resolve("gauge", Some(&root), None, None, Some("build/*.js")).unwrap_err();
        match err {
            ResolveError::Ambiguous { value, candidates, .. } => {
                assert_eq!(value, "build/*.js");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_backed_input_requires_a_root() {
        let err = resolve("gauge", None, None, None, Some("widget.js")).unwrap_err();
        assert!(matches!(err, ResolveError::MissingRoot { role: AssetRole::Script, .. }));

        let err = resolve("gauge", None, None, Some("*.css"), None).unwrap_err();
        assert!(matches!(err, ResolveError::MissingRoot { role: AssetRole::Style, .. }));
    }

    #[test]
    fn unsafe_inputs_fail_before_any_io() {
        // Root intentionally nonexistent: the unsafe check must fire first.
        let root = Path::new("/nonexistent/never-created");
        for value in ["../x.js", "/etc/passwd.js", "C:evil.js", "..\\..\\x.js"] {
            let err = resolve("gauge", Some(root), None, None, Some(value)).unwrap_err();
            assert!(
                matches!(err, ResolveError::UnsafePattern { .. }),
                "expected UnsafePattern for {value:?}, got {err}"
            );
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let (_dir, root) = component_root();
        let a = resolve(
            "gauge",
            Some(&root),
            Some("<div></div>"),
            Some("theme.css"),
            Some("build/*.js"),
        )
        .unwrap();
        let b = resolve(
            "gauge",
            Some(&root),
            Some("<div></div>"),
            Some("theme.css"),
            Some("build/*.js"),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn role_appears_in_error_messages() {
        let (_dir, root) = component_root();
        let err = resolve("gauge", Some(&root), None, Some("missing.css"), None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("style"), "message should name the role: {message}");
        assert!(message.contains("missing.css"), "message should name the input: {message}");
    }
}
