//! Document identity and metadata enrichment.
//!
//! [`DocId`] is the only key used to decide whether two [`FileIndex`]
//! values are the same document. It is a plain struct compared field by
//! field, so a path or repository name containing `:` cannot collide with
//! another document the way a joined string key could.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::FileIndex;

/// Organization / project / repository triple that scopes documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoScope {
    pub organization: String,
    pub project: String,
    pub repository: String,
}

impl RepoScope {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for RepoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.repository)
    }
}

/// Composite document key: content (`blob`) plus location (`scope`, `path`).
///
/// Refs and content are deliberately not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId {
    pub organization: String,
    pub project: String,
    pub repository: String,
    pub blob: String,
    pub path: String,
}

impl DocId {
    pub fn of(file: &FileIndex) -> Self {
        let m = &file.metadata;
        Self {
            organization: m.organization.clone(),
            project: m.project.clone(),
            repository: m.repository.clone(),
            blob: file.blob.clone(),
            path: m.path.clone(),
        }
    }

    pub fn scope(&self) -> RepoScope {
        RepoScope::new(&self.organization, &self.project, &self.repository)
    }
}

/// Renders `organization:project:repository:blob:path`, for logs only.
impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.organization, self.project, self.repository, self.blob, self.path
        )
    }
}

/// Extension of the last path element, including the leading dot.
///
/// Returns an empty string when the last element has no dot.
pub fn file_ext(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(i) => &name[i..],
        None => "",
    }
}

/// Derive `metadata.ext` from `metadata.path`.
pub fn fill_file_ext(file: &mut FileIndex) {
    file.metadata.ext = file_ext(&file.metadata.path).to_string();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(blob: &str, path: &str, reference: &str, content: &str) -> FileIndex {
        FileIndex::new(
            &RepoScope::new("acme", "core", "api"),
            blob,
            reference,
            path,
            content,
        )
    }

    #[test]
    fn test_doc_id_ignores_refs_and_content() {
        let a = file("abc123", "src/a.go", "main", "package a");
        let b = file("abc123", "src/a.go", "dev", "something else");
        assert_eq!(DocId::of(&a), DocId::of(&b));
    }

    #[test]
    fn test_doc_id_distinguishes_paths_and_blobs() {
        let a = file("abc123", "src/a.go", "main", "");
        assert_ne!(DocId::of(&a), DocId::of(&file("abc123", "src/b.go", "main", "")));
        assert_ne!(DocId::of(&a), DocId::of(&file("def456", "src/a.go", "main", "")));
    }

    #[test]
    fn test_doc_id_no_delimiter_collision() {
        let mut a = file("x", "c", "main", "");
        a.metadata.repository = "api:b".into();
        let mut b = file("b:x", "c", "main", "");
        b.metadata.repository = "api".into();
        // Both render as acme:core:api:b:x:c but are different documents.
        assert_eq!(DocId::of(&a).to_string(), DocId::of(&b).to_string());
        assert_ne!(DocId::of(&a), DocId::of(&b));
    }

    #[test]
    fn test_doc_id_display() {
        let id = DocId::of(&file("abc123", "/a.go", "main", ""));
        assert_eq!(id.to_string(), "acme:core:api:abc123:/a.go");
        assert_eq!(id.scope().to_string(), "acme/core/api");
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("src/main.rs"), ".rs");
        assert_eq!(file_ext("archive.tar.gz"), ".gz");
        assert_eq!(file_ext("Makefile"), "");
        assert_eq!(file_ext("dir.d/README"), "");
        assert_eq!(file_ext(".bashrc"), ".bashrc");
        assert_eq!(file_ext(""), "");
    }

    #[test]
    fn test_fill_file_ext() {
        let mut f = file("abc", "web/app.tsx", "main", "");
        assert_eq!(f.metadata.ext, "");
        fill_file_ext(&mut f);
        assert_eq!(f.metadata.ext, ".tsx");
    }
}
