use std::collections::{BTreeSet, HashMap};

use tokio::sync::broadcast::{self, error::TryRecvError, Receiver, Sender};
use tracing::{debug, warn};

use crate::model::{Resource, ResourceLink, Uri};
use crate::workspace::{ChangeKind, ResourceEvent, Workspace};

/// A directed, resolved edge. Backlinks are the reverse index over the
/// same connections, not separate edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub source: Uri,
    pub target: Uri,
    pub link: ResourceLink,
}

/// Notification payload emitted after each completed update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphUpdate {
    pub events_applied: usize,
}

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Derived link graph over a workspace.
///
/// Rebuildable in full from workspace state at any time; normally kept
/// current by draining workspace change events. Holds no resources of
/// its own -- the workspace stays the single writer.
///
/// Deletion policy: when a target resource disappears, connections
/// pointing at it are re-resolved, which degrades them to placeholder
/// edges. The link text still exists in its source resource, so the
/// reference survives as a placeholder until the source itself changes.
pub struct NoteGraph {
    /// source URI -> outgoing connections
    links: HashMap<Uri, Vec<Connection>>,
    /// target URI -> incoming connections
    backlinks: HashMap<Uri, Vec<Connection>>,
    /// URIs backed by a workspace resource
    resources: BTreeSet<Uri>,
    /// link targets with no backing resource
    placeholders: BTreeSet<Uri>,
    events: Option<Receiver<ResourceEvent>>,
    updates: Sender<GraphUpdate>,
}

impl NoteGraph {
    /// Full build from current workspace state. With `keep_monitoring`
    /// the graph subscribes to workspace events and [`NoteGraph::sync`]
    /// keeps it current incrementally.
    pub fn from_workspace(workspace: &Workspace, keep_monitoring: bool) -> NoteGraph {
        let events = keep_monitoring.then(|| workspace.subscribe());
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut graph = NoteGraph {
            links: HashMap::new(),
            backlinks: HashMap::new(),
            resources: BTreeSet::new(),
            placeholders: BTreeSet::new(),
            events,
            updates,
        };
        graph.rebuild(workspace);
        graph
    }

    /// Subscribe to end-of-cycle notifications.
    pub fn on_did_update(&self) -> Receiver<GraphUpdate> {
        self.updates.subscribe()
    }

    /// Apply all pending workspace events. Returns how many were
    /// applied. An overflowed event queue falls back to a full rebuild.
    pub fn sync(&mut self, workspace: &Workspace) -> usize {
        let mut pending = Vec::new();
        let mut lagged = false;
        let mut closed = false;

        if let Some(receiver) = self.events.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(missed)) => {
                        warn!(missed, "graph event queue overflowed, rebuilding");
                        lagged = true;
                    }
                    Err(TryRecvError::Closed) => {
                        closed = true;
                        break;
                    }
                }
            }
        }
        if closed {
            self.events = None;
        }

        let applied = if lagged {
            self.rebuild(workspace);
            pending.len().max(1)
        } else {
            for event in &pending {
                self.apply_event(workspace, event);
            }
            pending.len()
        };

        if applied > 0 {
            debug!(applied, "graph updated");
            let _ = self.updates.send(GraphUpdate {
                events_applied: applied,
            });
        }
        applied
    }

    /// Forced full recompute, exposed for a host refresh command.
    /// Pending events are subsumed by the rebuild and discarded.
    pub fn update(&mut self, workspace: &Workspace) {
        if let Some(receiver) = self.events.as_mut() {
            while !matches!(
                receiver.try_recv(),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed)
            ) {}
        }
        self.rebuild(workspace);
        let _ = self.updates.send(GraphUpdate { events_applied: 0 });
    }

    /// Outgoing connections of a URI.
    pub fn connections_of(&self, uri: &Uri) -> &[Connection] {
        self.links.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Incoming connections of a URI.
    pub fn backlinks_of(&self, uri: &Uri) -> &[Connection] {
        self.backlinks.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_connections(&self) -> impl Iterator<Item = &Connection> {
        self.links.values().flatten()
    }

    /// Every URI appearing in the graph: resources, placeholders, and
    /// link targets outside the workspace (tags, external URLs).
    pub fn all_nodes(&self) -> BTreeSet<Uri> {
        let mut nodes = self.resources.clone();
        nodes.extend(self.placeholders.iter().cloned());
        nodes.extend(self.backlinks.keys().cloned());
        nodes
    }

    pub fn contains(&self, uri: &Uri) -> bool {
        self.resources.contains(uri)
            || self.placeholders.contains(uri)
            || self.backlinks.contains_key(uri)
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Uri> {
        self.placeholders.iter()
    }

    fn rebuild(&mut self, workspace: &Workspace) {
        self.links.clear();
        self.backlinks.clear();
        self.resources.clear();
        self.placeholders.clear();
        for resource in workspace.list() {
            self.index_resource(workspace, &resource);
        }
    }

    fn apply_event(&mut self, workspace: &Workspace, event: &ResourceEvent) {
        match event.kind {
            ChangeKind::Created => {
                self.refresh_source(workspace, &event.uri);
                self.heal_placeholders(workspace);
            }
            ChangeKind::Updated => {
                self.refresh_source(workspace, &event.uri);
            }
            ChangeKind::Deleted => {
                self.resources.remove(&event.uri);
                self.remove_outgoing(&event.uri);
                // incoming edges degrade to placeholders via re-resolution
                let sources: BTreeSet<Uri> = self
                    .backlinks_of(&event.uri)
                    .iter()
                    .map(|c| c.source.clone())
                    .collect();
                for source in sources {
                    self.refresh_source(workspace, &source);
                }
            }
        }
    }

    /// Drop a source's outgoing connections and re-resolve its current
    /// links against workspace state.
    fn refresh_source(&mut self, workspace: &Workspace, uri: &Uri) {
        self.remove_outgoing(uri);
        if let Some(resource) = workspace.get(uri) {
            self.index_resource(workspace, &resource);
        }
    }

    /// Re-resolve the sources of any placeholder whose name a workspace
    /// resource now satisfies, replacing the placeholder edges with
    /// resolved ones. Runs after every resource creation so no full
    /// rebuild is needed to heal dangling links.
    fn heal_placeholders(&mut self, workspace: &Workspace) {
        for placeholder in self.placeholders.clone() {
            if workspace.resolve_identifier(placeholder.path()).is_none() {
                continue;
            }
            let sources: BTreeSet<Uri> = self
                .backlinks_of(&placeholder)
                .iter()
                .map(|c| c.source.clone())
                .collect();
            for source in sources {
                self.refresh_source(workspace, &source);
            }
        }
    }

    fn index_resource(&mut self, workspace: &Workspace, resource: &Resource) {
        let source = resource.uri.clone();
        self.resources.insert(source.clone());

        let mut outgoing = Vec::new();
        for link in &resource.links {
            match workspace.resolve_link(resource, link) {
                Ok(target) => {
                    let connection = Connection {
                        source: source.clone(),
                        target: target.clone(),
                        link: link.clone(),
                    };
                    self.backlinks
                        .entry(target.clone())
                        .or_default()
                        .push(connection.clone());
                    if target.is_placeholder() {
                        self.placeholders.insert(target);
                    }
                    outgoing.push(connection);
                }
                Err(err) => {
                    warn!(uri = %source, error = %err, "dropping malformed link");
                }
            }
        }
        if !outgoing.is_empty() {
            self.links.insert(source, outgoing);
        }
    }

    fn remove_outgoing(&mut self, source: &Uri) {
        let Some(connections) = self.links.remove(source) else {
            return;
        };
        for connection in connections {
            let mut drained = false;
            if let Some(incoming) = self.backlinks.get_mut(&connection.target) {
                incoming.retain(|c| c.source != *source);
                drained = incoming.is_empty();
            }
            if drained {
                self.backlinks.remove(&connection.target);
                if connection.target.is_placeholder() {
                    self.placeholders.remove(&connection.target);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn note(path: &str, content: &str) -> Resource {
        parser::parse(content).into_resource(Uri::file(path))
    }

    fn workspace_with(resources: Vec<Resource>) -> Workspace {
        let mut ws = Workspace::new(".md");
        for resource in resources {
            ws.set(resource);
        }
        ws
    }

    #[test]
    fn test_two_note_scenario() {
        let ws = workspace_with(vec![
            note("/v/a.md", "[[b]]"),
            note("/v/b.md", "no links"),
        ]);
        let graph = NoteGraph::from_workspace(&ws, false);

        let a = Uri::file("/v/a.md");
        let b = Uri::file("/v/b.md");

        let nodes = graph.all_nodes();
        assert_eq!(nodes, BTreeSet::from([a.clone(), b.clone()]));

        let forward = graph.connections_of(&a);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].source, a);
        assert_eq!(forward[0].target, b);

        assert_eq!(graph.backlinks_of(&b), forward);
        assert!(graph.backlinks_of(&a).is_empty());
    }

    #[test]
    fn test_backlink_symmetry() {
        let ws = workspace_with(vec![
            note("/v/a.md", "[[b]] and [[c]] and [[missing]]"),
            note("/v/b.md", "[[c]]"),
            note("/v/c.md", ""),
        ]);
        let graph = NoteGraph::from_workspace(&ws, false);

        for connection in graph.all_connections() {
            assert!(
                graph.backlinks_of(&connection.target).contains(connection),
                "forward edge {} -> {} missing from backlink index",
                connection.source,
                connection.target
            );
        }
        let backlink_count: usize = graph
            .all_nodes()
            .iter()
            .map(|n| graph.backlinks_of(n).len())
            .sum();
        assert_eq!(backlink_count, graph.all_connections().count());
    }

    #[test]
    fn test_placeholder_node_for_missing_target() {
        let ws = workspace_with(vec![note("/v/a.md", "[[Missing]]")]);
        let graph = NoteGraph::from_workspace(&ws, false);

        let placeholder = Uri::placeholder("Missing");
        assert!(graph.all_nodes().contains(&placeholder));
        assert!(graph.contains(&placeholder));
        assert_eq!(graph.placeholders().collect::<Vec<_>>(), vec![&placeholder]);
        assert_eq!(graph.connections_of(&Uri::file("/v/a.md"))[0].target, placeholder);
    }

    #[test]
    fn test_placeholder_healing_without_full_rebuild() {
        let mut ws = workspace_with(vec![note("/v/a.md", "[[Missing]]")]);
        let mut graph = NoteGraph::from_workspace(&ws, true);
        assert!(graph.all_nodes().contains(&Uri::placeholder("Missing")));

        ws.set(note("/v/missing.md", "# Missing"));
        graph.sync(&ws);

        let a = Uri::file("/v/a.md");
        let target = Uri::file("/v/missing.md");
        assert!(!graph.all_nodes().contains(&Uri::placeholder("Missing")));
        assert_eq!(graph.connections_of(&a)[0].target, target);
        assert_eq!(graph.backlinks_of(&target)[0].source, a);
    }

    #[test]
    fn test_deleting_source_prunes_unreferenced_placeholder() {
        let mut ws = workspace_with(vec![
            note("/v/a.md", "[[ghost]]"),
            note("/v/b.md", "[[ghost]]"),
        ]);
        let mut graph = NoteGraph::from_workspace(&ws, true);
        let ghost = Uri::placeholder("ghost");
        assert_eq!(graph.backlinks_of(&ghost).len(), 2);

        ws.delete(&Uri::file("/v/a.md"));
        graph.sync(&ws);
        assert!(graph.all_nodes().contains(&ghost), "still referenced by b");

        ws.delete(&Uri::file("/v/b.md"));
        graph.sync(&ws);
        assert!(!graph.all_nodes().contains(&ghost), "last reference gone");
    }

    #[test]
    fn test_deleting_target_degrades_incoming_to_placeholder() {
        let mut ws = workspace_with(vec![
            note("/v/a.md", "[[b]]"),
            note("/v/b.md", ""),
        ]);
        let mut graph = NoteGraph::from_workspace(&ws, true);
        let a = Uri::file("/v/a.md");
        let b = Uri::file("/v/b.md");
        assert_eq!(graph.connections_of(&a)[0].target, b);

        ws.delete(&b);
        graph.sync(&ws);

        // the link text still exists in a.md, so the edge survives as a
        // placeholder edge
        let placeholder = Uri::placeholder("b");
        assert!(!graph.all_nodes().contains(&b));
        assert_eq!(graph.connections_of(&a)[0].target, placeholder);
        assert_eq!(graph.backlinks_of(&placeholder)[0].source, a);
    }

    #[test]
    fn test_update_replaces_connections_without_duplicates() {
        let mut ws = workspace_with(vec![
            note("/v/a.md", "[[b]]"),
            note("/v/b.md", ""),
            note("/v/c.md", ""),
        ]);
        let mut graph = NoteGraph::from_workspace(&ws, true);

        // same content applied again: connections must not duplicate
        ws.set(note("/v/a.md", "[[b]]"));
        graph.sync(&ws);
        assert_eq!(graph.connections_of(&Uri::file("/v/a.md")).len(), 1);
        assert_eq!(graph.backlinks_of(&Uri::file("/v/b.md")).len(), 1);

        // retargeted content moves the backlink
        ws.set(note("/v/a.md", "[[c]]"));
        graph.sync(&ws);
        assert!(graph.backlinks_of(&Uri::file("/v/b.md")).is_empty());
        assert_eq!(graph.backlinks_of(&Uri::file("/v/c.md")).len(), 1);
    }

    #[test]
    fn test_manual_update_matches_incremental_state() {
        let mut ws = workspace_with(vec![note("/v/a.md", "[[b]]")]);
        let mut graph = NoteGraph::from_workspace(&ws, true);
        ws.set(note("/v/b.md", "[[a]]"));
        graph.update(&ws);

        let a = Uri::file("/v/a.md");
        let b = Uri::file("/v/b.md");
        assert_eq!(graph.connections_of(&a)[0].target, b);
        assert_eq!(graph.connections_of(&b)[0].target, a);
    }

    #[test]
    fn test_on_did_update_fires_after_sync() {
        let mut ws = workspace_with(vec![]);
        let mut graph = NoteGraph::from_workspace(&ws, true);
        let mut updates = graph.on_did_update();

        ws.set(note("/v/a.md", "[[b]]"));
        graph.sync(&ws);

        let update = updates.try_recv().unwrap();
        assert_eq!(update.events_applied, 1);
    }

    #[test]
    fn test_malformed_link_excluded_resource_still_indexed() {
        use crate::model::{LinkKind, TextRange};
        let mut resource = note("/v/a.md", "[[ok]]");
        resource.links.push(crate::model::ResourceLink {
            kind: LinkKind::Wikilink,
            raw_text: "[[broken".to_string(),
            is_embed: false,
            range: TextRange::new(0, 0, 0, 8),
        });
        let ws = workspace_with(vec![resource]);
        let graph = NoteGraph::from_workspace(&ws, false);
        assert_eq!(graph.connections_of(&Uri::file("/v/a.md")).len(), 1);
    }
}
