//! Raw link text analysis and rewriting.
//!
//! Parsing splits a link's raw text into target, section and alias;
//! rewriting produces replacement text for in-place link edits. Neither
//! touches the workspace: resolution against loaded resources lives in
//! [`crate::resolver`].

use crate::error::LinkError;
use crate::model::{LinkKind, ResourceLink, TextRange};

/// The pieces of a link after analysis. Empty pieces come back as `None`
/// except `target`, which may legitimately be empty for same-document
/// section links (`[[#section]]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParts {
    pub target: String,
    pub section: Option<String>,
    pub alias: Option<String>,
}

/// Split a raw link into its parts.
pub fn analyze(link: &ResourceLink) -> Result<LinkParts, LinkError> {
    let raw = link.raw_text.trim();
    let raw = raw.strip_prefix('!').unwrap_or(raw);

    let malformed = || LinkError::Malformed {
        kind: link.kind,
        raw: link.raw_text.clone(),
    };

    match link.kind {
        LinkKind::Wikilink => {
            let inner = raw
                .strip_prefix("[[")
                .and_then(|s| s.strip_suffix("]]"))
                .ok_or_else(malformed)?;
            if inner.contains('[') || inner.contains(']') {
                return Err(malformed());
            }
            let (target_part, alias) = match inner.split_once('|') {
                Some((t, a)) => (t, non_empty(a)),
                None => (inner, None),
            };
            let (target, section) = split_section(target_part);
            Ok(LinkParts {
                target: target.replace('\\', ""),
                section,
                alias,
            })
        }
        LinkKind::Link => {
            let inner = raw
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(malformed)?;
            let (alias, dest) = inner.rsplit_once("](").ok_or_else(malformed)?;
            let dest = dest
                .strip_prefix('<')
                .map(|d| d.strip_suffix('>').unwrap_or(d))
                .unwrap_or(dest);
            let (target, section) = split_section(dest);
            Ok(LinkParts {
                target,
                section,
                alias: non_empty(alias),
            })
        }
        LinkKind::Taglink => {
            let label = raw.strip_prefix('#').ok_or_else(malformed)?;
            if label.is_empty() {
                return Err(malformed());
            }
            Ok(LinkParts {
                target: label.to_string(),
                section: None,
                alias: None,
            })
        }
    }
}

/// Requested changes for [`update_link`]. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct LinkEdit {
    pub target: Option<String>,
    pub section: Option<String>,
    pub alias: Option<String>,
}

/// Rewrite a link in place, preserving its kind and embed marker.
/// Returns the replacement text and the range it replaces.
pub fn update_link(link: &ResourceLink, edit: &LinkEdit) -> Result<(String, TextRange), LinkError> {
    let parts = analyze(link)?;
    let target = edit.target.clone().unwrap_or(parts.target);
    let section = edit.section.clone().or(parts.section).unwrap_or_default();
    let alias = edit.alias.clone().or(parts.alias).unwrap_or_default();

    let embed = if link.is_embed { "!" } else { "" };
    let section_divider = if section.is_empty() { "" } else { "#" };

    let new_text = match link.kind {
        LinkKind::Wikilink => {
            let alias_divider = if alias.is_empty() { "" } else { "|" };
            format!(
                "{}[[{}{}{}{}{}]]",
                embed, target, section_divider, section, alias_divider, alias
            )
        }
        LinkKind::Link => format!(
            "{}[{}]({}{}{})",
            embed, alias, target, section_divider, section
        ),
        LinkKind::Taglink => format!("{}#{}", embed, target),
    };
    Ok((new_text, link.range))
}

fn split_section(target: &str) -> (String, Option<String>) {
    match target.split_once('#') {
        Some((t, s)) => (t.trim().to_string(), non_empty(s)),
        None => (target.trim().to_string(), None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
