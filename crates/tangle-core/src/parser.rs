use pulldown_cmark::{Event, LinkType, MetadataBlockKind, Options, Parser, Tag, TagEnd};
use serde_json::Value;

use crate::model::{
    LinkKind, Point, Resource, ResourceKind, ResourceLink, Section, TagOccurrence, TextRange, Uri,
};

/// Parser output before a URI is attached.
pub struct ParsedNote {
    pub title: Option<String>,
    pub links: Vec<ResourceLink>,
    pub tags: Vec<TagOccurrence>,
    pub sections: Vec<Section>,
    pub properties: Value,
    pub digest: String,
}

impl ParsedNote {
    /// Bind the parse result to a URI, producing a note resource.
    /// Title falls back to the file stem when neither front matter nor a
    /// level-1 heading supplied one.
    pub fn into_resource(self, uri: Uri) -> Resource {
        let title = self.title.unwrap_or_else(|| uri.stem().to_string());
        Resource {
            uri,
            kind: ResourceKind::Note,
            title,
            links: self.links,
            tags: self.tags,
            sections: self.sections,
            properties: self.properties,
            digest: self.digest,
        }
    }
}

pub(crate) fn compute_digest(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text);
    format!("{:x}", hasher.finalize())
}

/// Parse markdown text into title, links, tags, sections and properties.
pub fn parse(text: &str) -> ParsedNote {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_WIKILINKS);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let parser = Parser::new_ext(text, options);
    let ranges = RangeIndex::new(text);

    let mut links = Vec::new();
    let mut tags: Vec<TagOccurrence> = Vec::new();
    let mut sections = Vec::new();
    let mut title = None;
    let mut properties = Value::Object(serde_json::Map::new());
    let mut fm_title: Option<String> = None;

    // (kind, is_embed) for open link/image elements
    let mut link_stack: Vec<(LinkKind, bool)> = Vec::new();
    let mut pending_heading: Option<(u8, String)> = None;

    let mut in_frontmatter = false;
    let mut frontmatter_text = String::new();
    let mut in_code_block = false;

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_frontmatter = true;
            }
            Event::End(TagEnd::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_frontmatter = false;
                if let Ok(json) = serde_yaml::from_str::<Value>(&frontmatter_text) {
                    if let Some(t) = json.get("title").and_then(|v| v.as_str()) {
                        fm_title = Some(t.to_string());
                    }
                    let fm_range = ranges.range(text, range.start, range.end);
                    for label in frontmatter_tag_labels(&json) {
                        tags.push(TagOccurrence {
                            label,
                            range: fm_range,
                        });
                    }
                    if json.is_object() {
                        properties = json;
                    }
                }
            }

            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,

            Event::Start(Tag::Heading { level, .. }) => {
                pending_heading = Some((level as u8, String::new()));
            }
            Event::End(TagEnd::Heading(..)) => {
                if let Some((level, label)) = pending_heading.take() {
                    let label = label.trim().to_string();
                    if !label.is_empty() {
                        if level == 1 && title.is_none() {
                            title = Some(label.clone());
                        }
                        sections.push(Section {
                            label,
                            level,
                            range: ranges.range(text, range.start, range.end),
                        });
                    }
                }
            }

            Event::Start(Tag::Link { link_type, .. }) => {
                link_stack.push(match link_type {
                    LinkType::WikiLink { .. } => (LinkKind::Wikilink, false),
                    _ => (LinkKind::Link, false),
                });
            }
            Event::Start(Tag::Image { link_type, .. }) => {
                link_stack.push(match link_type {
                    LinkType::WikiLink { .. } => (LinkKind::Wikilink, true),
                    _ => (LinkKind::Link, true),
                });
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                if let Some((kind, is_embed)) = link_stack.pop() {
                    // pulldown-cmark occasionally reports the range ending
                    // before the final ']' of a wikilink
                    let mut end_offset = range.end;
                    if kind == LinkKind::Wikilink {
                        while end_offset < text.len() && text.as_bytes()[end_offset] == b']' {
                            end_offset += 1;
                        }
                    }
                    let raw_text = text[range.start..end_offset].to_string();
                    if autolink_like(&raw_text) {
                        continue;
                    }
                    links.push(ResourceLink {
                        kind,
                        raw_text,
                        is_embed,
                        range: ranges.range(text, range.start, end_offset),
                    });
                }
            }

            Event::Text(cow) => {
                let chunk = cow.as_ref();
                if in_frontmatter {
                    frontmatter_text.push_str(chunk);
                } else if let Some((_, label)) = pending_heading.as_mut() {
                    if !label.is_empty() {
                        label.push(' ');
                    }
                    label.push_str(chunk);
                } else if !in_code_block && link_stack.is_empty() {
                    for (idx, label) in scan_tags(chunk) {
                        let start = range.start + idx;
                        let end = start + 1 + label.len();
                        tags.push(TagOccurrence {
                            label,
                            range: ranges.range(text, start, end),
                        });
                    }
                }
            }
            Event::Code(cow) => {
                if let Some((_, label)) = pending_heading.as_mut() {
                    if !label.is_empty() {
                        label.push(' ');
                    }
                    label.push_str(cow.as_ref());
                }
            }
            _ => {}
        }
    }

    ParsedNote {
        title: fm_title.or(title),
        links,
        tags,
        sections,
        properties,
        digest: compute_digest(text),
    }
}

/// Autolinks (`<https://...>`) surface as link elements but carry no
/// bracket syntax to analyze; they are not note references.
fn autolink_like(raw: &str) -> bool {
    raw.starts_with('<')
}

/// Front-matter `tags:` may be a YAML list or a comma-separated string.
fn frontmatter_tag_labels(json: &Value) -> Vec<String> {
    match json.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().trim_start_matches('#').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().trim_start_matches('#').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Find `#tag` occurrences in a text chunk. Returns byte index of the
/// `#` plus the label. A tag label may contain letters, digits, `-`,
/// `_` and `/`, and must contain at least one non-digit.
fn scan_tags(chunk: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let bytes = chunk.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'#' {
            i += 1;
            continue;
        }
        let boundary = i == 0
            || bytes[i - 1].is_ascii_whitespace()
            || bytes[i - 1] == b'('
            || bytes[i - 1] == b',';
        if !boundary {
            i += 1;
            continue;
        }
        let rest = &chunk[i + 1..];
        let label: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '/')
            .collect();
        if label.is_empty() || label.chars().all(|c| c.is_ascii_digit()) {
            i += 1;
            continue;
        }
        let len = label.len();
        found.push((i, label));
        i += 1 + len;
    }
    found
}

/// Converts the parser's byte-offset spans into line/column ranges.
/// Columns are UTF-16 code units so ranges line up with what editors
/// report.
struct RangeIndex {
    line_starts: Vec<usize>,
}

impl RangeIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    fn range(&self, text: &str, start: usize, end: usize) -> TextRange {
        TextRange {
            start: self.point(text, start),
            end: self.point(text, end),
        }
    }

    fn point(&self, text: &str, offset: usize) -> Point {
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let col = text[self.line_starts[line]..offset].encode_utf16().count();
        Point {
            line: line as u32,
            col: col as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_title_and_properties() {
        let parsed = parse("---\ntitle: My Note\ndraft: true\n---\n# Heading");
        assert_eq!(parsed.title.as_deref(), Some("My Note"));
        assert_eq!(parsed.properties["draft"], true);
    }

    #[test]
    fn test_title_from_first_h1() {
        let parsed = parse("# First\n\n# Second");
        assert_eq!(parsed.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_title_fallback_to_stem() {
        let resource = parse("no headings here").into_resource(Uri::file("/v/plain.md"));
        assert_eq!(resource.title, "plain");
    }

    #[test]
    fn test_wikilink_raw_text_and_range() {
        let parsed = parse("See [[note2]] for more");
        assert_eq!(parsed.links.len(), 1);
        let link = &parsed.links[0];
        assert_eq!(link.kind, LinkKind::Wikilink);
        assert_eq!(link.raw_text, "[[note2]]");
        assert!(!link.is_embed);
        assert_eq!(link.range.start.col, 4);
        assert_eq!(link.range.end.col, 13);
    }

    #[test]
    fn test_wikilink_with_alias_and_section() {
        let parsed = parse("[[note#sec|Alias]]");
        assert_eq!(parsed.links[0].raw_text, "[[note#sec|Alias]]");
    }

    #[test]
    fn test_embedded_wikilink() {
        let parsed = parse("![[image.png]]");
        assert_eq!(parsed.links.len(), 1);
        assert!(parsed.links[0].is_embed);
        assert_eq!(parsed.links[0].kind, LinkKind::Wikilink);
    }

    #[test]
    fn test_direct_link() {
        let parsed = parse("a [label](other.md#top) link");
        assert_eq!(parsed.links.len(), 1);
        let link = &parsed.links[0];
        assert_eq!(link.kind, LinkKind::Link);
        assert_eq!(link.raw_text, "[label](other.md#top)");
    }

    #[test]
    fn test_autolinks_skipped() {
        let parsed = parse("see <https://example.com> there");
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_multiple_links_in_order() {
        let parsed = parse("[[a]] then [b](b.md) then [[c]]");
        let kinds: Vec<_> = parsed.links.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LinkKind::Wikilink, LinkKind::Link, LinkKind::Wikilink]);
    }

    #[test]
    fn test_inline_tags() {
        let parsed = parse("working on #rust and #knowledge-bases today");
        let labels: Vec<_> = parsed.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["rust", "knowledge-bases"]);
        assert_eq!(parsed.tags[0].range.start.col, 11);
    }

    #[test]
    fn test_tags_not_scanned_in_code() {
        let parsed = parse("```\n#not-a-tag\n```\n\ntext `#also-not` here\n\n#yes");
        let labels: Vec<_> = parsed.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["yes"]);
    }

    #[test]
    fn test_numeric_only_tags_rejected() {
        let parsed = parse("issue #123 and #1a");
        let labels: Vec<_> = parsed.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["1a"]);
    }

    #[test]
    fn test_frontmatter_tags_list_and_string() {
        let parsed = parse("---\ntags: [alpha, beta]\n---\nbody");
        let labels: Vec<_> = parsed.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["alpha", "beta"]);

        let parsed = parse("---\ntags: one, two\n---\nbody");
        let labels: Vec<_> = parsed.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["one", "two"]);
    }

    #[test]
    fn test_sections() {
        let parsed = parse("# Top\n\n## Details\n\ntext");
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].label, "Top");
        assert_eq!(parsed.sections[0].level, 1);
        assert_eq!(parsed.sections[1].label, "Details");
        assert_eq!(parsed.sections[1].level, 2);
    }

    #[test]
    fn test_ranges_span_lines_and_wide_chars() {
        let parsed = parse("first\n你好 [[note]]");
        let link = &parsed.links[0];
        assert_eq!(link.range.start.line, 1);
        // two CJK chars and a space are three UTF-16 units
        assert_eq!(link.range.start.col, 3);
        assert_eq!(link.range.end.col, 11);
    }

    #[test]
    fn test_digest_stability() {
        assert_eq!(parse("same").digest, parse("same").digest);
        assert_ne!(parse("one").digest, parse("two").digest);
        assert_eq!(parse("x").digest.len(), 64);
    }
}
