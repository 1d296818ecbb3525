use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};

use crate::config::NotebookConfig;
use crate::datastore::{DataStore, IgnorePatternMatcher, Matcher};
use crate::error::FetchError;
use crate::graph::NoteGraph;
use crate::provider::{AttachmentProvider, MarkdownProvider, ResourceProvider};
use crate::tags::TagIndex;
use crate::watch::WatchEvent;
use crate::workspace::Workspace;

/// The assembled system: workspace plus its derived indices, wired to
/// stay consistent as watch events arrive.
///
/// # Architecture: single entry point for mutation
///
/// All state changes flow through `Notebook` methods, which mutate the
/// workspace and then let the derived indices drain the resulting
/// events. Read-only access goes straight to the public `workspace`,
/// `graph` and `tags` fields; queries need no wrapping.
pub struct Notebook {
    pub workspace: Workspace,
    pub graph: NoteGraph,
    pub tags: TagIndex,
    matcher: Arc<dyn Matcher>,
}

impl Notebook {
    /// Load everything: enumerate the data store, fetch all matching
    /// resources through the provider chain, then derive graph and tag
    /// indices with monitoring enabled.
    pub async fn bootstrap(
        matcher: Arc<dyn Matcher>,
        data_store: Arc<dyn DataStore>,
        providers: Vec<Arc<dyn ResourceProvider>>,
        default_extension: &str,
    ) -> Result<Notebook, FetchError> {
        let started = Instant::now();
        let workspace =
            Workspace::from_providers(providers, data_store.as_ref(), matcher.as_ref(), default_extension)
                .await?;
        let workspace_done = Instant::now();
        info!(
            elapsed_ms = (workspace_done - started).as_millis() as u64,
            "workspace ready"
        );

        let graph = NoteGraph::from_workspace(&workspace, true);
        let graph_done = Instant::now();
        info!(
            elapsed_ms = (graph_done - workspace_done).as_millis() as u64,
            "graph ready"
        );

        let tags = TagIndex::from_workspace(&workspace, true);
        info!(
            elapsed_ms = graph_done.elapsed().as_millis() as u64,
            "tags ready"
        );

        Ok(Notebook {
            workspace,
            graph,
            tags,
            matcher,
        })
    }

    /// Convenience bootstrap from a config: markdown and attachment
    /// providers over the given data store, ignore patterns applied.
    pub async fn bootstrap_with_config(
        config: &NotebookConfig,
        data_store: Arc<dyn DataStore>,
    ) -> Result<Notebook, FetchError> {
        let matcher = Arc::new(IgnorePatternMatcher::new(
            config.workspace.ignore_patterns.clone(),
        ));
        let providers: Vec<Arc<dyn ResourceProvider>> = vec![
            Arc::new(MarkdownProvider::new(data_store.clone())),
            Arc::new(AttachmentProvider::new(
                config.attachments.image_extensions.clone(),
                config.attachments.attachment_extensions.clone(),
            )),
        ];
        Self::bootstrap(
            matcher,
            data_store,
            providers,
            &config.workspace.default_extension,
        )
        .await
    }

    /// Apply one watch event and bring the derived indices up to date.
    ///
    /// Events for a single URI are handled to completion before the
    /// next one is looked at, so an earlier fetch can never overwrite a
    /// later one; a fetch outcome for a URI deleted in the meantime is
    /// simply never applied.
    pub async fn process_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Created(uri) => {
                self.matcher.refresh().await;
                if self.matcher.is_match(&uri) {
                    if let Err(err) = self.workspace.fetch_and_set(&uri).await {
                        warn!(uri = %uri, error = %err, "could not load created resource");
                    }
                }
            }
            WatchEvent::Changed(uri) => {
                if self.matcher.is_match(&uri) {
                    // on failure the previous snapshot stays in place
                    if let Err(err) = self.workspace.fetch_and_set(&uri).await {
                        warn!(uri = %uri, error = %err, "re-fetch failed, keeping previous snapshot");
                    }
                }
            }
            WatchEvent::Deleted(uri) => {
                self.workspace.delete(&uri);
            }
        }
        self.graph.sync(&self.workspace);
        self.tags.sync(&self.workspace);
    }

    /// Drive the notebook from a watcher subscription until the channel
    /// closes.
    pub async fn run(&mut self, mut events: Receiver<WatchEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.process_watch_event(event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "watch events dropped, rebuilding derived indices");
                    self.update();
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Forced full recompute of the derived indices, for a host refresh
    /// command.
    pub fn update(&mut self) {
        self.graph.update(&self.workspace);
        self.tags.update(&self.workspace);
    }
}
