//! tangle-core
//!
//! A live, queryable graph over a directory of interlinked plain-text
//! notes. The workspace owns resource state, derived indices (link
//! graph, tags) follow it through change events, and everything updates
//! incrementally as files change on disk.

pub mod cache;
pub mod config;
pub mod datastore;
pub mod error;
pub mod graph;
pub mod link;
pub mod model;
pub mod notebook;
pub mod parser;
pub mod provider;
pub mod resolver;
pub mod tags;
pub mod watch;
pub mod workspace;

pub use config::NotebookConfig;
pub use error::{CacheError, FetchError, LinkError, UriError};
pub use graph::{Connection, NoteGraph};
pub use model::{Resource, ResourceKind, ResourceLink, Uri, UriScheme};
pub use notebook::Notebook;
pub use tags::TagIndex;
pub use watch::{WatchEvent, Watcher};
pub use workspace::{ChangeKind, ResourceEvent, Workspace};
