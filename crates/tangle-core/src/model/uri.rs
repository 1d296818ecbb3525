use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UriError;

/// Scheme of a [`Uri`].
///
/// The set is closed; hosts registering custom resource locations go
/// through `Other` rather than ad-hoc strings scattered across the code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UriScheme {
    /// An on-disk file.
    File,
    /// An unresolved link target; the path carries the literal link text.
    Placeholder,
    /// A tag namespace entry.
    Tag,
    /// Anything else the host understands (`https`, `mailto`, ...).
    Other(String),
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriScheme::File => write!(f, "file"),
            UriScheme::Placeholder => write!(f, "placeholder"),
            UriScheme::Tag => write!(f, "tag"),
            UriScheme::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Immutable identifier of a resource.
///
/// Two URIs are equal iff scheme, normalized path and fragment match
/// exactly. Path case is preserved (case policy is the host filesystem's
/// business); identifier resolution, not URI equality, is where
/// case-insensitive matching happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uri {
    scheme: UriScheme,
    path: String,
    fragment: Option<String>,
}

impl Uri {
    /// A `file:` URI from a path. The path is normalized but not
    /// canonicalized; no filesystem access happens here.
    pub fn file(path: impl AsRef<Path>) -> Uri {
        Uri {
            scheme: UriScheme::File,
            path: normalize_path(&path.as_ref().to_string_lossy()),
            fragment: None,
        }
    }

    /// A `placeholder:` URI carrying the literal text of an unresolved
    /// link target, so a matching note created later can re-resolve it.
    pub fn placeholder(name: &str) -> Uri {
        Uri {
            scheme: UriScheme::Placeholder,
            path: name.trim().to_string(),
            fragment: None,
        }
    }

    /// A `tag:` URI for a tag label.
    pub fn tag(label: &str) -> Uri {
        Uri {
            scheme: UriScheme::Tag,
            path: label.to_string(),
            fragment: None,
        }
    }

    /// Parse a URI from a string.
    ///
    /// Schemeless input is treated as a file path. Recognized schemes are
    /// `file`, `placeholder`, `tag` and the common external ones
    /// (`http`, `https`, `mailto`); anything else fails with
    /// [`UriError::InvalidUri`].
    pub fn parse(value: &str) -> Result<Uri, UriError> {
        let (raw, fragment) = split_fragment(value);

        let Some((scheme, rest)) = split_scheme(raw) else {
            return Ok(Uri {
                scheme: UriScheme::File,
                path: normalize_path(raw),
                fragment,
            });
        };

        let path = rest.trim_start_matches("//");
        let uri = match scheme {
            "file" => Uri {
                scheme: UriScheme::File,
                path: normalize_path(path),
                fragment,
            },
            "placeholder" => Uri {
                scheme: UriScheme::Placeholder,
                path: path.to_string(),
                fragment,
            },
            "tag" => Uri {
                scheme: UriScheme::Tag,
                path: path.to_string(),
                fragment,
            },
            "http" | "https" | "mailto" => Uri {
                scheme: UriScheme::Other(scheme.to_string()),
                path: rest.to_string(),
                fragment,
            },
            _ => return Err(UriError::InvalidUri(value.to_string())),
        };
        Ok(uri)
    }

    pub fn scheme(&self) -> &UriScheme {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn is_file(&self) -> bool {
        self.scheme == UriScheme::File
    }

    pub fn is_placeholder(&self) -> bool {
        self.scheme == UriScheme::Placeholder
    }

    pub fn with_fragment(&self, fragment: Option<String>) -> Uri {
        Uri {
            scheme: self.scheme.clone(),
            path: self.path.clone(),
            fragment,
        }
    }

    pub fn without_fragment(&self) -> Uri {
        self.with_fragment(None)
    }

    /// Resolve a path against this URI's directory. Absolute inputs
    /// replace the path wholesale; relative ones are joined and
    /// normalized.
    pub fn join(&self, relative: &str) -> Uri {
        let joined = if relative.starts_with('/') {
            relative.to_string()
        } else {
            match self.parent() {
                Some(dir) => format!("{}/{}", dir, relative),
                None => relative.to_string(),
            }
        };
        Uri {
            scheme: self.scheme.clone(),
            path: normalize_path(&joined),
            fragment: None,
        }
    }

    /// Directory part of the path, `None` at the root.
    pub fn parent(&self) -> Option<&str> {
        let idx = self.path.rfind('/')?;
        if idx == 0 {
            Some("/")
        } else {
            Some(&self.path[..idx])
        }
    }

    /// Final path segment, extension included.
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Final path segment without its extension.
    pub fn stem(&self) -> &str {
        let base = self.basename();
        match base.rfind('.') {
            Some(0) | None => base,
            Some(idx) => &base[..idx],
        }
    }

    pub fn extension(&self) -> Option<&str> {
        let base = self.basename();
        match base.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&base[idx + 1..]),
        }
    }

    /// Path segments, leading separator excluded.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            UriScheme::File => write!(f, "{}", self.path)?,
            scheme => write!(f, "{}:{}", scheme, self.path)?,
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

fn split_fragment(value: &str) -> (&str, Option<String>) {
    match value.split_once('#') {
        Some((head, frag)) if !frag.is_empty() => (head, Some(frag.to_string())),
        Some((head, _)) => (head, None),
        None => (value, None),
    }
}

/// `scheme:rest` split, only when the prefix looks like an actual scheme
/// (letters first, then letters/digits/`+`/`-`/`.`). Windows drive
/// letters (`c:\...`) are a single character and do not qualify.
fn split_scheme(value: &str) -> Option<(&str, &str)> {
    let idx = value.find(':')?;
    let head = &value[..idx];
    if head.len() < 2 {
        return None;
    }
    let mut chars = head.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        return None;
    }
    Some((head, &value[idx + 1..]))
}

/// Normalize a path string: forward slashes, `.` dropped, `..` collapsed,
/// no trailing separator.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
