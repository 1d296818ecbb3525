//! Link resolution: raw link text + workspace state -> target URI.
//!
//! Resolution never fails on a missing target; it materializes a
//! placeholder URI instead. Only malformed link syntax is an error, and
//! that error drops the single link, not the resource.

use tracing::warn;

use crate::error::LinkError;
use crate::link;
use crate::model::{LinkKind, Resource, ResourceLink, Uri};
use crate::workspace::Workspace;

/// Resolution outcome plus any ambiguity encountered. The chosen URI is
/// deterministic (lexicographically first path); the rest of the
/// candidate set rides along for callers that surface diagnostics.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub uri: Uri,
    pub ambiguous_with: Vec<Uri>,
}

impl Resolution {
    fn exact(uri: Uri) -> Resolution {
        Resolution {
            uri,
            ambiguous_with: Vec::new(),
        }
    }
}

/// Resolve a link to its target URI.
pub fn resolve_link(
    workspace: &Workspace,
    source: &Resource,
    link: &ResourceLink,
) -> Result<Uri, LinkError> {
    resolve_link_with_report(workspace, source, link).map(|r| r.uri)
}

/// Resolve a link, reporting ambiguity to the caller.
pub fn resolve_link_with_report(
    workspace: &Workspace,
    source: &Resource,
    link: &ResourceLink,
) -> Result<Resolution, LinkError> {
    let parts = link::analyze(link)?;

    let resolution = match link.kind {
        LinkKind::Wikilink => {
            if parts.target.is_empty() {
                // section-only link, points back at the source itself
                Resolution::exact(source.uri.without_fragment())
            } else {
                match workspace.resolve_identifier(&parts.target) {
                    Some(found) => {
                        if !found.ambiguous_with.is_empty() {
                            warn!(
                                identifier = %parts.target,
                                chosen = %found.uri,
                                others = found.ambiguous_with.len(),
                                "ambiguous wikilink target"
                            );
                        }
                        Resolution {
                            uri: found.uri,
                            ambiguous_with: found.ambiguous_with,
                        }
                    }
                    None => Resolution::exact(Uri::placeholder(&parts.target)),
                }
            }
        }
        LinkKind::Link => {
            if parts.target.is_empty() {
                Resolution::exact(source.uri.without_fragment())
            } else if parts.target.contains("://") || parts.target.starts_with("mailto:") {
                let uri = Uri::parse(&parts.target).map_err(|_| LinkError::Malformed {
                    kind: link.kind,
                    raw: link.raw_text.clone(),
                })?;
                Resolution::exact(uri.without_fragment())
            } else {
                let mut resolved = source.uri.join(&parts.target);
                if resolved.extension().is_none() {
                    resolved = Uri::file(format!(
                        "{}{}",
                        resolved.path(),
                        workspace.default_extension()
                    ));
                }
                if workspace.contains(&resolved) {
                    Resolution::exact(resolved)
                } else {
                    Resolution::exact(Uri::placeholder(resolved.path()))
                }
            }
        }
        LinkKind::Taglink => Resolution::exact(Uri::tag(&parts.target)),
    };

    Ok(resolution)
}
