use thiserror::Error;

use crate::model::resource::LinkKind;
use crate::model::uri::Uri;

/// Errors raised while constructing a [`Uri`](crate::model::uri::Uri).
#[derive(Debug, Error)]
pub enum UriError {
    /// The input carried a scheme the workspace does not understand.
    /// Fatal to the call that tried to build the URI, nothing else.
    #[error("invalid uri `{0}`: unrecognized scheme")]
    InvalidUri(String),
}

/// Errors raised while analyzing a single raw link.
///
/// A malformed link is dropped from the graph; the owning resource stays
/// valid and every other link of that resource is still indexed.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not parse {kind} link `{raw}`")]
    Malformed { kind: LinkKind, raw: String },
}

/// Errors raised while fetching a resource through a provider chain.
///
/// A failed re-fetch never removes the previous snapshot from the
/// workspace; callers log the error and keep going.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read `{uri}`: {source}")]
    Read {
        uri: Uri,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enumerate data store: {source}")]
    List {
        #[source]
        source: std::io::Error,
    },

    #[error("no provider accepts `{0}`")]
    Unsupported(Uri),

    #[error("provider produced no resource for `{0}`")]
    Empty(Uri),
}

/// Errors raised while decoding a serialized parse cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("incompatible cache version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}
