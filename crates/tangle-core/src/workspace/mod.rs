use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::datastore::{DataStore, Matcher};
use crate::error::{FetchError, LinkError};
use crate::model::{Resource, ResourceLink, Uri};
use crate::provider::ResourceProvider;
use crate::resolver;


/// How many fetches the initial bulk load keeps in flight at once.
/// Fetch completion order does not affect the final state; insertion is
/// idempotent per URI.
const MAX_CONCURRENT_FETCHES: usize = 64;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted at the end of every mutating workspace operation. Derived
/// indices (graph, tags) consume these to update incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub kind: ChangeKind,
    pub uri: Uri,
}

/// Identifier lookup outcome. `ambiguous_with` lists the candidates that
/// lost the deterministic tie-break, lexicographically ordered.
#[derive(Debug, Clone)]
pub struct IdentifierMatch {
    pub uri: Uri,
    pub ambiguous_with: Vec<Uri>,
}

/// The authoritative URI -> Resource mapping.
///
/// Sole writer of resource state; the graph and tag index hold read
/// references only and rebuild their own structures from change events.
/// Resources are stored behind `Arc` and replaced wholesale on re-fetch,
/// so readers always see a complete snapshot.
pub struct Workspace {
    resources: HashMap<Uri, Arc<Resource>>,
    /// lowercase basename -> URIs carrying it, for identifier resolution
    by_name: HashMap<String, BTreeSet<Uri>>,
    providers: Vec<Arc<dyn ResourceProvider>>,
    default_extension: String,
    events: broadcast::Sender<ResourceEvent>,
}

impl Workspace {
    pub fn new(default_extension: &str) -> Workspace {
        let default_extension = if default_extension.starts_with('.') {
            default_extension.to_string()
        } else {
            format!(".{}", default_extension)
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Workspace {
            resources: HashMap::new(),
            by_name: HashMap::new(),
            providers: Vec::new(),
            default_extension,
            events,
        }
    }

    /// Bulk-load a workspace: enumerate the data store, dispatch every
    /// matching URI to the first supporting provider, fetch concurrently
    /// and insert as results land. A failed fetch skips that resource
    /// and never aborts the load.
    pub async fn from_providers(
        providers: Vec<Arc<dyn ResourceProvider>>,
        data_store: &dyn DataStore,
        matcher: &dyn Matcher,
        default_extension: &str,
    ) -> Result<Workspace, FetchError> {
        let mut workspace = Workspace::new(default_extension);
        for provider in providers {
            workspace.add_provider(provider);
        }

        let candidates: Vec<(Uri, Arc<dyn ResourceProvider>)> = data_store
            .list()
            .await?
            .into_iter()
            .filter(|uri| matcher.is_match(uri))
            .filter_map(|uri| workspace.provider_for(&uri).map(|p| (uri, p)))
            .collect();

        let mut fetches = stream::iter(candidates.into_iter().map(|(uri, provider)| async move {
            let fetched = provider.fetch(&uri).await;
            (uri, fetched)
        }))
        .buffer_unordered(MAX_CONCURRENT_FETCHES);

        while let Some((uri, fetched)) = fetches.next().await {
            match fetched {
                Ok(Some(resource)) => {
                    workspace.set(resource);
                }
                Ok(None) => {}
                Err(err) => warn!(uri = %uri, error = %err, "skipping resource during bulk load"),
            }
        }

        info!(resources = workspace.resources.len(), "workspace loaded");
        Ok(workspace)
    }

    pub fn add_provider(&mut self, provider: Arc<dyn ResourceProvider>) {
        self.providers.push(provider);
    }

    pub fn default_extension(&self) -> &str {
        &self.default_extension
    }

    /// Receiver for change events. Each subscriber gets every event
    /// emitted after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    pub fn contains(&self, uri: &Uri) -> bool {
        self.resources.contains_key(uri)
    }

    pub fn get(&self, uri: &Uri) -> Option<Arc<Resource>> {
        self.resources.get(uri).cloned()
    }

    /// Point-in-time snapshot of all resources, ordered by URI.
    pub fn list(&self) -> Vec<Arc<Resource>> {
        let mut all: Vec<Arc<Resource>> = self.resources.values().cloned().collect();
        all.sort_by(|a, b| a.uri.cmp(&b.uri));
        all
    }

    /// Look up by URI or by loose identifier, whichever matches first.
    pub fn find(&self, needle: &str) -> Option<Arc<Resource>> {
        if let Ok(uri) = Uri::parse(needle) {
            if let Some(resource) = self.get(&uri) {
                return Some(resource);
            }
        }
        let matched = self.resolve_identifier(needle)?;
        self.get(&matched.uri)
    }

    /// Insert or replace a resource, emitting the matching change event.
    pub fn set(&mut self, resource: Resource) -> Arc<Resource> {
        let uri = resource.uri.clone();
        let stored = Arc::new(resource);
        let existed = self
            .resources
            .insert(uri.clone(), stored.clone())
            .is_some();
        if !existed {
            self.by_name
                .entry(uri.basename().to_lowercase())
                .or_default()
                .insert(uri.clone());
        }
        let kind = if existed {
            ChangeKind::Updated
        } else {
            ChangeKind::Created
        };
        let _ = self.events.send(ResourceEvent { kind, uri });
        stored
    }

    /// Remove a resource. Its identifier goes back into the ambiguity
    /// pool, so surviving same-name resources may shorten theirs.
    pub fn delete(&mut self, uri: &Uri) -> Option<Arc<Resource>> {
        let removed = self.resources.remove(uri)?;
        let key = uri.basename().to_lowercase();
        if let Some(set) = self.by_name.get_mut(&key) {
            set.remove(uri);
            if set.is_empty() {
                self.by_name.remove(&key);
            }
        }
        let _ = self.events.send(ResourceEvent {
            kind: ChangeKind::Deleted,
            uri: uri.clone(),
        });
        Some(removed)
    }

    /// Re-fetch a single URI and atomically replace its entry. On
    /// failure the previous snapshot is retained; a transient read error
    /// must not destroy history.
    pub async fn fetch_and_set(&mut self, uri: &Uri) -> Result<Arc<Resource>, FetchError> {
        let provider = self
            .provider_for(uri)
            .ok_or_else(|| FetchError::Unsupported(uri.clone()))?;
        match provider.fetch(uri).await {
            Ok(Some(resource)) => Ok(self.set(resource)),
            Ok(None) => Err(FetchError::Empty(uri.clone())),
            Err(err) => Err(err),
        }
    }

    pub fn provider_for(&self, uri: &Uri) -> Option<Arc<dyn ResourceProvider>> {
        self.providers.iter().find(|p| p.supports(uri)).cloned()
    }

    /// Resolve a link owned by `source`, dispatching to the provider
    /// that understands the source resource.
    pub fn resolve_link(
        &self,
        source: &Resource,
        link: &ResourceLink,
    ) -> Result<Uri, LinkError> {
        match self.provider_for(&source.uri) {
            Some(provider) => provider.resolve_link(self, source, link),
            None => resolver::resolve_link(self, source, link),
        }
    }

    /// Resolve a loose identifier (wikilink target) to a resource URI.
    ///
    /// Matching is case-insensitive on trailing path segments. When
    /// several resources share the suffix the lexicographically first
    /// path wins and the others are reported, never silently dropped.
    pub fn resolve_identifier(&self, identifier: &str) -> Option<IdentifierMatch> {
        let segments = self.identifier_segments(identifier);
        let key = segments.last()?;

        let mut matching: Vec<&Uri> = self
            .by_name
            .get(key)?
            .iter()
            .filter(|uri| uri_ends_with(uri, &segments))
            .collect();
        matching.sort();

        let mut iter = matching.into_iter();
        let first = iter.next()?;
        Some(IdentifierMatch {
            uri: first.clone(),
            ambiguous_with: iter.cloned().collect(),
        })
    }

    /// The shortest path suffix that names `uri` unambiguously among all
    /// loaded resources. Two resources sharing a suffix both grow by one
    /// segment until they differ, up to the full path.
    pub fn identifier_for(&self, uri: &Uri) -> String {
        let segments: Vec<&str> = uri.segments().collect();
        if segments.is_empty() {
            return String::new();
        }

        let rivals: Vec<Vec<String>> = self
            .by_name
            .get(&uri.basename().to_lowercase())
            .map(|set| {
                set.iter()
                    .filter(|other| *other != uri)
                    .map(|other| other.segments().map(|s| s.to_lowercase()).collect())
                    .collect()
            })
            .unwrap_or_default();

        let mut take = 1;
        while take < segments.len() {
            let suffix: Vec<String> = segments[segments.len() - take..]
                .iter()
                .map(|s| s.to_lowercase())
                .collect();
            let collides = rivals.iter().any(|rival| {
                rival.len() >= take && rival[rival.len() - take..] == suffix[..]
            });
            if !collides {
                break;
            }
            take += 1;
        }

        let identifier = segments[segments.len() - take..].join("/");
        strip_suffix_ignore_case(&identifier, &self.default_extension)
    }

    /// Identifier segments, lowercased, with the default extension
    /// appended to an extension-less final segment.
    fn identifier_segments(&self, identifier: &str) -> Vec<String> {
        let mut segments: Vec<String> = identifier
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect();
        if let Some(last) = segments.last_mut() {
            if !last.contains('.') {
                last.push_str(&self.default_extension.to_lowercase());
            }
        }
        segments
    }
}

fn uri_ends_with(uri: &Uri, segments: &[String]) -> bool {
    let own: Vec<String> = uri.segments().map(|s| s.to_lowercase()).collect();
    if own.len() < segments.len() {
        return false;
    }
    own[own.len() - segments.len()..] == segments[..]
}

fn strip_suffix_ignore_case(value: &str, suffix: &str) -> String {
    if value.len() >= suffix.len() && value.is_char_boundary(value.len() - suffix.len()) {
        let (head, tail) = value.split_at(value.len() - suffix.len());
        if tail.eq_ignore_ascii_case(suffix) {
            return head.to_string();
        }
    }
    value.to_string()
}
