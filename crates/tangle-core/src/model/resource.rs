use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::uri::Uri;

/// 0-based text coordinate. Columns are UTF-16 code units so ranges line
/// up with what editors report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Point,
    pub end: Point,
}

impl TextRange {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> TextRange {
        TextRange {
            start: Point {
                line: start_line,
                col: start_col,
            },
            end: Point {
                line: end_line,
                col: end_col,
            },
        }
    }
}

/// Kind of a raw link as it appeared in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    /// `[[target#section|alias]]`
    Wikilink,
    /// `[alias](target#section)`
    Link,
    /// `#tag`
    Taglink,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Wikilink => write!(f, "wikilink"),
            LinkKind::Link => write!(f, "link"),
            LinkKind::Taglink => write!(f, "taglink"),
        }
    }
}

/// A raw link occurrence inside a resource. Immutable; re-parsed fresh on
/// every fetch of the owning resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub kind: LinkKind,
    /// The link exactly as written, brackets included.
    pub raw_text: String,
    pub is_embed: bool,
    pub range: TextRange,
}

/// A tag occurrence with its source range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagOccurrence {
    pub label: String,
    pub range: TextRange,
}

/// A section header inside a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub label: String,
    pub level: u8,
    pub range: TextRange,
}

/// Resource classification. Closed set with an explicit extension point
/// for host-registered types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Note,
    Attachment,
    Image,
    Other(String),
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Note => write!(f, "note"),
            ResourceKind::Attachment => write!(f, "attachment"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Other(s) => write!(f, "{}", s),
        }
    }
}

/// A parsed resource. Owned exclusively by the workspace and replaced
/// wholesale on re-fetch, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: Uri,
    pub kind: ResourceKind,
    pub title: String,
    pub links: Vec<ResourceLink>,
    pub tags: Vec<TagOccurrence>,
    pub sections: Vec<Section>,
    /// Front-matter properties, arbitrary key/value pairs. Crosses the
    /// wire as JSON text: bincode is not self-describing and cannot
    /// decode a bare `serde_json::Value`.
    #[serde(with = "properties_codec")]
    pub properties: Value,
    /// Content digest of the backing text at fetch time.
    pub digest: String,
}

impl Resource {
    /// An empty resource of the given kind, titled after the file stem.
    /// Attachment providers use this; note providers go through the
    /// parser instead.
    pub fn empty(uri: Uri, kind: ResourceKind) -> Resource {
        let title = uri.stem().to_string();
        Resource {
            uri,
            kind,
            title,
            links: Vec::new(),
            tags: Vec::new(),
            sections: Vec::new(),
            properties: Value::Object(serde_json::Map::new()),
            digest: String::new(),
        }
    }

    /// Section whose label matches, case-insensitively.
    pub fn section(&self, label: &str) -> Option<&Section> {
        let needle = label.to_lowercase();
        self.sections
            .iter()
            .find(|s| s.label.to_lowercase() == needle)
    }
}

mod properties_codec {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}
