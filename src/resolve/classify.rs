//! Inline-versus-path classification of caller inputs.

/// What a caller-supplied style/script value turned out to be.
///
/// Callers match exhaustively instead of re-sniffing strings at each site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetInput<'a> {
    /// Literal content to embed as-is.
    Inline(&'a str),
    /// A concrete path, resolved relative to the component asset root.
    PathRef(&'a str),
    /// A glob pattern, expanded under the component asset root.
    Glob(&'a str),
}

/// File extensions treated as asset references when a value has no other
/// path markers.
const ASSET_EXTENSIONS: [&str; 4] = [".js", ".mjs", ".cjs", ".css"];

const GLOB_METACHARS: [char; 4] = ['*', '?', '[', '{'];

/// Classify a style/script value as inline content, a path, or a glob.
///
/// Heuristics, first match wins:
/// - any newline means inline content (paths never span lines)
/// - glob metacharacters (`*?[{`) mean a glob pattern
/// - a leading path separator or a recognized asset extension means a path
/// - everything else is inline content
pub fn classify(value: &str) -> AssetInput<'_> {
    if value.contains('\n') || value.contains('\r') {
        return AssetInput::Inline(value);
    }

    if value.contains(GLOB_METACHARS) {
        return AssetInput::Glob(value);
    }

    if value.starts_with('/') || value.starts_with('\\') {
        return AssetInput::PathRef(value);
    }

    let lowered = value.to_ascii_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        return AssetInput::PathRef(value);
    }

    AssetInput::Inline(value)
}
