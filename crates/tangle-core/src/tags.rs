use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::warn;

use crate::model::Uri;
use crate::workspace::{ChangeKind, ResourceEvent, Workspace};

/// Derived tag -> resources index, maintained on the same workspace
/// events as the graph.
pub struct TagIndex {
    tags: BTreeMap<String, BTreeSet<Uri>>,
    events: Option<Receiver<ResourceEvent>>,
}

impl TagIndex {
    pub fn from_workspace(workspace: &Workspace, keep_monitoring: bool) -> TagIndex {
        let events = keep_monitoring.then(|| workspace.subscribe());
        let mut index = TagIndex {
            tags: BTreeMap::new(),
            events,
        };
        index.rebuild(workspace);
        index
    }

    /// Apply all pending workspace events; returns how many were applied.
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
                        warn!(missed, "tag index event queue overflowed, rebuilding");
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

        if lagged {
            self.rebuild(workspace);
            return pending.len().max(1);
        }
        for event in &pending {
            self.apply_event(workspace, event);
        }
        pending.len()
    }

    /// Forced full recompute; pending events are subsumed and discarded.
    pub fn update(&mut self, workspace: &Workspace) {
        if let Some(receiver) = self.events.as_mut() {
            while !matches!(
                receiver.try_recv(),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed)
            ) {}
        }
        self.rebuild(workspace);
    }

    /// All tag labels with their resource counts, ordered by label.
    pub fn labels(&self) -> Vec<(&str, usize)> {
        self.tags
            .iter()
            .map(|(label, uris)| (label.as_str(), uris.len()))
            .collect()
    }

    /// Resources carrying a tag, ordered by URI.
    pub fn resources_for(&self, label: &str) -> Vec<Uri> {
        self.tags
            .get(label)
            .map(|uris| uris.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.tags.contains_key(label)
    }

    fn rebuild(&mut self, workspace: &Workspace) {
        self.tags.clear();
        for resource in workspace.list() {
            self.add_occurrences(workspace, &resource.uri);
        }
    }

    fn apply_event(&mut self, workspace: &Workspace, event: &ResourceEvent) {
        match event.kind {
            ChangeKind::Created | ChangeKind::Updated => {
                self.remove_resource(&event.uri);
                self.add_occurrences(workspace, &event.uri);
            }
            ChangeKind::Deleted => self.remove_resource(&event.uri),
        }
    }

    fn add_occurrences(&mut self, workspace: &Workspace, uri: &Uri) {
        let Some(resource) = workspace.get(uri) else {
            return;
        };
        for tag in &resource.tags {
            self.tags
                .entry(tag.label.clone())
                .or_default()
                .insert(uri.clone());
        }
    }

    fn remove_resource(&mut self, uri: &Uri) {
        self.tags.retain(|_, uris| {
            uris.remove(uri);
            !uris.is_empty()
        });
    }
}
