//! Immutable component definition values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One style or script asset of a component.
///
/// A file-backed source always carries the root-relative URL fragment it was
/// resolved with, so a resolved asset can never lack a serving URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Literal content supplied inline by the caller.
    Inline(String),
    /// A file under the component's asset root.
    File {
        /// Canonical absolute path on disk.
        path: PathBuf,
        /// Root-relative POSIX-style fragment used to build the serving URL.
        url: String,
    },
}

impl AssetSource {
    /// The serving URL fragment, if this source is file-backed.
    pub fn url(&self) -> Option<&str> {
        match self {
            AssetSource::Inline(_) => None,
            AssetSource::File { url, .. } => Some(url),
        }
    }

    /// The on-disk path, if this source is file-backed.
    pub fn path(&self) -> Option<&Path> {
        match self {
            AssetSource::Inline(_) => None,
            AssetSource::File { path, .. } => Some(path),
        }
    }
}

/// A registered component: name, declared asset root, and resolved content.
///
/// Definitions are immutable. Every change produces a new value that replaces
/// the old one wholesale in the [`ComponentRegistry`](super::ComponentRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDefinition {
    name: Arc<str>,
    root: Option<PathBuf>,
    html: Option<String>,
    css: Option<AssetSource>,
    js: Option<AssetSource>,
}

impl ComponentDefinition {
    /// Create a fully specified definition.
    pub fn new(
        name: impl Into<Arc<str>>,
        root: Option<PathBuf>,
        html: Option<String>,
        css: Option<AssetSource>,
        js: Option<AssetSource>,
    ) -> Self {
        Self {
            name: name.into(),
            root,
            html,
            css,
            js,
        }
    }

    /// Create a discovery-time placeholder: name and root, no content.
    pub fn placeholder(name: impl Into<Arc<str>>, root: PathBuf) -> Self {
        Self {
            name: name.into(),
            root: Some(root),
            html: None,
            css: None,
            js: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared asset root, the confinement boundary for file-backed
    /// style/script assets.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    pub fn css(&self) -> Option<&AssetSource> {
        self.css.as_ref()
    }

    pub fn js(&self) -> Option<&AssetSource> {
        self.js.as_ref()
    }

    /// True iff markup, style and script are all absent.
    ///
    /// Placeholders are created during discovery before the host supplies
    /// real content; replacing one does not warrant an overwrite diagnostic.
    pub fn is_placeholder(&self) -> bool {
        self.html.is_none() && self.css.is_none() && self.js.is_none()
    }
}
