use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::cache::ParseCache;
use crate::datastore::DataStore;
use crate::error::{FetchError, LinkError};
use crate::model::{Resource, ResourceKind, ResourceLink, Uri};
use crate::parser;
use crate::resolver;
use crate::workspace::Workspace;

/// A file-type-specific source of resources. The workspace dispatches
/// every URI to the first provider whose `supports` returns true and
/// never parses content itself.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn supports(&self, uri: &Uri) -> bool;

    /// Build a resource for a URI. `Ok(None)` means the provider has
    /// nothing to say about this URI after all.
    async fn fetch(&self, uri: &Uri) -> Result<Option<Resource>, FetchError>;

    /// Resolve one of this provider's links against workspace state.
    fn resolve_link(
        &self,
        workspace: &Workspace,
        source: &Resource,
        link: &ResourceLink,
    ) -> Result<Uri, LinkError> {
        resolver::resolve_link(workspace, source, link)
    }

    /// Markdown rendition of the resource, if it has one.
    async fn read_as_markdown(&self, uri: &Uri) -> Result<Option<String>, FetchError>;
}

/// Provider for markdown notes. Parses wikilinks, direct links, tags,
/// sections and front matter; parse results are memoized by content
/// digest so unchanged content is never parsed twice.
pub struct MarkdownProvider {
    data_store: Arc<dyn DataStore>,
    extensions: Vec<String>,
    cache: RwLock<ParseCache>,
}

impl MarkdownProvider {
    pub fn new(data_store: Arc<dyn DataStore>) -> Self {
        Self::with_extensions(data_store, vec!["md".into(), "markdown".into()])
    }

    pub fn with_extensions(data_store: Arc<dyn DataStore>, extensions: Vec<String>) -> Self {
        Self {
            data_store,
            extensions,
            cache: RwLock::new(ParseCache::new()),
        }
    }

    /// Seed the memo from a previously serialized cache snapshot.
    pub fn restore_cache(&self, cache: ParseCache) {
        if let Ok(mut current) = self.cache.write() {
            *current = cache;
        }
    }

    /// Snapshot of the memo for the host to persist.
    pub fn cache_snapshot(&self) -> Option<Vec<u8>> {
        self.cache.read().ok().and_then(|c| c.to_bytes().ok())
    }

    fn cached(&self, digest: &str, uri: &Uri) -> Option<Resource> {
        let cache = self.cache.read().ok()?;
        let hit = cache.get(digest)?;
        // same content may live at a new path after a rename
        let mut resource = hit.clone();
        if resource.title == resource.uri.stem() {
            resource.title = uri.stem().to_string();
        }
        resource.uri = uri.clone();
        Some(resource)
    }

    fn remember(&self, digest: String, resource: &Resource) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(digest, resource.clone());
        }
    }
}

#[async_trait]
impl ResourceProvider for MarkdownProvider {
    fn supports(&self, uri: &Uri) -> bool {
        uri.is_file()
            && uri
                .extension()
                .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    async fn fetch(&self, uri: &Uri) -> Result<Option<Resource>, FetchError> {
        let text = self.data_store.read(uri).await?;
        let digest = parser::compute_digest(&text);

        if let Some(resource) = self.cached(&digest, uri) {
            return Ok(Some(resource));
        }

        let resource = parser::parse(&text).into_resource(uri.clone());
        self.remember(digest, &resource);
        Ok(Some(resource))
    }

    async fn read_as_markdown(&self, uri: &Uri) -> Result<Option<String>, FetchError> {
        Ok(Some(self.data_store.read(uri).await?))
    }
}

/// Provider for binary assets referenced from notes. Produces link-less
/// resources classified as image or attachment by extension; content is
/// never read.
pub struct AttachmentProvider {
    image_extensions: Vec<String>,
    attachment_extensions: Vec<String>,
}

impl AttachmentProvider {
    pub fn new(image_extensions: Vec<String>, attachment_extensions: Vec<String>) -> Self {
        Self {
            image_extensions,
            attachment_extensions,
        }
    }

    fn kind_for(&self, uri: &Uri) -> Option<ResourceKind> {
        let ext = uri.extension()?;
        if self
            .image_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
        {
            return Some(ResourceKind::Image);
        }
        if self
            .attachment_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
        {
            return Some(ResourceKind::Attachment);
        }
        None
    }
}

impl Default for AttachmentProvider {
    fn default() -> Self {
        Self::new(
            vec![
                "png".into(),
                "jpg".into(),
                "jpeg".into(),
                "gif".into(),
                "svg".into(),
                "webp".into(),
            ],
            vec!["pdf".into()],
        )
    }
}

#[async_trait]
impl ResourceProvider for AttachmentProvider {
    fn supports(&self, uri: &Uri) -> bool {
        uri.is_file() && self.kind_for(uri).is_some()
    }

    async fn fetch(&self, uri: &Uri) -> Result<Option<Resource>, FetchError> {
        match self.kind_for(uri) {
            Some(kind) => Ok(Some(Resource::empty(uri.clone(), kind))),
            None => Ok(None),
        }
    }

    async fn read_as_markdown(&self, _uri: &Uri) -> Result<Option<String>, FetchError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::LocalFileDataStore;

    #[tokio::test]
    async fn test_markdown_provider_fetch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.md"), "# Title\n\n[[other]]").unwrap();
        let store = Arc::new(LocalFileDataStore::new(dir.path()));
        let provider = MarkdownProvider::new(store);

        let uri = Uri::file(dir.path().join("note.md"));
        assert!(provider.supports(&uri));
        let resource = provider.fetch(&uri).await.unwrap().unwrap();
        assert_eq!(resource.title, "Title");
        assert_eq!(resource.links.len(), 1);
    }

    #[tokio::test]
    async fn test_markdown_provider_memoizes_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "same content").unwrap();
        std::fs::write(dir.path().join("b.md"), "same content").unwrap();
        let store = Arc::new(LocalFileDataStore::new(dir.path()));
        let provider = MarkdownProvider::new(store);

        let a = provider
            .fetch(&Uri::file(dir.path().join("a.md")))
            .await
            .unwrap()
            .unwrap();
        let b = provider
            .fetch(&Uri::file(dir.path().join("b.md")))
            .await
            .unwrap()
            .unwrap();

        // cache hit still reports the URI it was fetched under
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.uri, b.uri);
        assert_eq!(b.uri, Uri::file(dir.path().join("b.md")));
    }

    #[tokio::test]
    async fn test_cache_snapshot_restores_into_fresh_provider() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.md"), "# Cached\n\n[[x]]").unwrap();
        let store = Arc::new(LocalFileDataStore::new(dir.path()));
        let uri = Uri::file(dir.path().join("note.md"));

        let provider = MarkdownProvider::new(store.clone());
        let fetched = provider.fetch(&uri).await.unwrap().unwrap();
        let bytes = provider.cache_snapshot().unwrap();

        let fresh = MarkdownProvider::new(store);
        fresh.restore_cache(ParseCache::from_bytes(&bytes).unwrap());
        let refetched = fresh.fetch(&uri).await.unwrap().unwrap();
        assert_eq!(fetched, refetched);
    }

    #[tokio::test]
    async fn test_attachment_provider_kinds() {
        let provider = AttachmentProvider::default();
        let image = Uri::file("/v/pic.PNG");
        let doc = Uri::file("/v/paper.pdf");
        let note = Uri::file("/v/note.md");

        assert!(provider.supports(&image));
        assert!(provider.supports(&doc));
        assert!(!provider.supports(&note));

        let fetched = provider.fetch(&image).await.unwrap().unwrap();
        assert_eq!(fetched.kind, ResourceKind::Image);
        assert_eq!(fetched.title, "pic");
        assert!(fetched.links.is_empty());

        let fetched = provider.fetch(&doc).await.unwrap().unwrap();
        assert_eq!(fetched.kind, ResourceKind::Attachment);
    }
}
