//! Document selector and the documents routed through a session

use std::path::{Path, PathBuf};

/// Language identifier of Beef sources
pub const BEEF_LANGUAGE_ID: &str = "bf";

/// URI scheme of documents on disk
pub const FILE_SCHEME: &str = "file";

/// One filter of a document selector; `None` fields match anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub scheme: Option<String>,
    pub language: Option<String>,
}

impl DocumentFilter {
    pub fn new(scheme: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            scheme: Some(scheme.into()),
            language: Some(language.into()),
        }
    }

    pub fn matches(&self, document: &TextDocument) -> bool {
        let scheme_ok = self
            .scheme
            .as_deref()
            .is_none_or(|scheme| scheme == document.scheme());
        let language_ok = self
            .language
            .as_deref()
            .is_none_or(|language| language == document.language_id);
        scheme_ok && language_ok
    }
}

/// Immutable set of filters deciding which documents belong to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSelector {
    filters: Vec<DocumentFilter>,
}

impl DocumentSelector {
    pub fn new(filters: Vec<DocumentFilter>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// A document matches if any filter matches
    pub fn matches(&self, document: &TextDocument) -> bool {
        self.filters.iter().any(|filter| filter.matches(document))
    }
}

impl Default for DocumentSelector {
    /// `{ scheme: "file", language: "bf" }`
    fn default() -> Self {
        Self::new(vec![DocumentFilter::new(FILE_SCHEME, BEEF_LANGUAGE_ID)])
    }
}

/// Language id for a path, from its extension
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "bf" => Some(BEEF_LANGUAGE_ID),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Path cannot be expressed as a file URI: {}", path.display())]
pub struct FileUriError {
    pub path: PathBuf,
}

/// `file://` URI for an absolute path
pub fn file_uri(path: &Path) -> Result<String, FileUriError> {
    url::Url::from_file_path(path)
        .map(String::from)
        .map_err(|()| FileUriError {
            path: path.to_path_buf(),
        })
}

/// An open document as the host sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

impl TextDocument {
    pub fn new(
        uri: impl Into<String>,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            language_id: language_id.into(),
            version,
            text: text.into(),
        }
    }

    /// Scheme part of the URI (empty if the URI has none)
    pub fn scheme(&self) -> &str {
        self.uri
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .unwrap_or_default()
    }

    /// Load a document from disk; language id comes from the extension
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let absolute = std::path::absolute(path)?;
        let text = tokio::fs::read_to_string(&absolute).await?;
        let language_id = language_for_path(&absolute).unwrap_or("plaintext");
        let uri = file_uri(&absolute)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        Ok(Self::new(uri, language_id, 1, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selector_routes_only_beef_files() {
        let selector = DocumentSelector::default();

        let beef = TextDocument::new("file:///src/Program.bf", "bf", 1, "");
        let csharp = TextDocument::new("file:///src/Program.cs", "csharp", 1, "");
        let untitled_beef = TextDocument::new("untitled:Untitled-1", "bf", 1, "");

        assert!(selector.matches(&beef));
        assert!(!selector.matches(&csharp));
        assert!(!selector.matches(&untitled_beef));
    }

    #[test]
    fn test_filter_wildcards_and_union() {
        let any_scheme = DocumentFilter {
            scheme: None,
            language: Some("bf".to_string()),
        };
        let untitled = TextDocument::new("untitled:Untitled-1", "bf", 1, "");
        assert!(any_scheme.matches(&untitled));

        let selector = DocumentSelector::new(vec![
            DocumentFilter::new("file", "bf"),
            DocumentFilter::new("file", "toml"),
        ]);
        assert!(selector.matches(&TextDocument::new("file:///BeefSpace.toml", "toml", 1, "")));
        assert!(DocumentSelector::new(vec![]).is_empty());
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path(Path::new("a/b/Program.bf")), Some("bf"));
        assert_eq!(language_for_path(Path::new("BeefSpace.toml")), None);
        assert_eq!(language_for_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_file_uri_encodes_reserved_characters() {
        assert_eq!(
            file_uri(Path::new("/home/me/My Project/Program.bf")).unwrap(),
            "file:///home/me/My%20Project/Program.bf"
        );
        let uri = file_uri(Path::new("/x.bf")).unwrap();
        assert_eq!(TextDocument::new(uri, "bf", 1, "").scheme(), "file");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uri_keeps_backslash_in_file_name() {
        let uri = file_uri(Path::new("/tmp/a\\b.bf")).unwrap();
        assert!(uri.starts_with("file:///tmp/a"));
        assert_ne!(uri, "file:///tmp/a/b.bf");
    }

    #[test]
    fn test_file_uri_rejects_relative_paths() {
        assert_eq!(
            file_uri(Path::new("src/Program.bf")),
            Err(FileUriError {
                path: PathBuf::from("src/Program.bf")
            })
        );
    }

    #[tokio::test]
    async fn test_from_file_reads_text_and_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Program.bf");
        std::fs::write(&path, "class Program {}").unwrap();

        let document = TextDocument::from_file(&path).await.unwrap();

        assert_eq!(document.language_id, "bf");
        assert_eq!(document.text, "class Program {}");
        assert!(document.uri.starts_with("file:///"));
        assert!(document.uri.ends_with("/Program.bf"));
    }
}
