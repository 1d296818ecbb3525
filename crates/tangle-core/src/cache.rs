use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::model::Resource;

/// Parse results keyed by content digest.
///
/// The markdown provider consults this before re-parsing, so unchanged
/// files (and renamed files with identical content) skip the parser.
/// The core owns no persisted state: hosts that want the cache to
/// survive a restart serialize it with [`ParseCache::to_bytes`] and feed
/// the bytes back through [`ParseCache::from_bytes`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ParseCache {
    version: u32,
    entries: HashMap<String, Resource>,
}

impl ParseCache {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, digest: &str) -> Option<&Resource> {
        self.entries.get(digest)
    }

    pub fn insert(&mut self, digest: String, resource: Resource) {
        self.entries.insert(digest, resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        let cache: ParseCache = bincode::deserialize(bytes)?;
        if cache.version != Self::CURRENT_VERSION {
            return Err(CacheError::Version {
                found: cache.version,
                expected: Self::CURRENT_VERSION,
            });
        }
        Ok(cache)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
        Ok(bincode::serialize(self)?)
    }
}
